//! Deterministic per-dimension scoring of section answers.
//!
//! Each section carries three dimensions (positive, negative, solution) and
//! each dimension is answered through three sub-answers: a short list of
//! topics, a free-text elaboration, and a reviewer-only elaboration. The
//! score is a fixed function of which of the three are present.

/// Placeholder phrase respondents leave when they ran out of time. Text whose
/// normalized form contains it counts as absent.
const SKIPPED_PLACEHOLDER: &str = "nao deu tempo";

/// The three sub-answers of one dimension, as supplied by the writer.
#[derive(Debug, Clone, Default)]
pub struct DimensionInput<'a> {
    pub topics: &'a [String],
    pub elaboration: Option<&'a str>,
    pub reviewer_elaboration: Option<&'a str>,
}

/// Lowercase and strip the diacritics that occur in Portuguese answer text,
/// so the placeholder check is accent-insensitive.
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' => 'a',
            'é' | 'ê' => 'e',
            'í' => 'i',
            'ó' | 'ô' | 'õ' => 'o',
            'ú' | 'ü' => 'u',
            'ç' => 'c',
            other => other,
        })
        .collect()
}

/// Whether a free-text sub-answer counts as present. Blank strings and the
/// skipped-answer placeholder do not.
pub fn text_present(text: Option<&str>) -> bool {
    match text {
        None => false,
        Some(raw) => {
            let trimmed = raw.trim();
            !trimmed.is_empty() && !normalize(trimmed).contains(SKIPPED_PLACEHOLDER)
        }
    }
}

fn topics_present(topics: &[String]) -> bool {
    topics.iter().any(|t| !t.trim().is_empty())
}

/// Respondent-facing score for one dimension.
///
/// - 8: all three sub-answers present
/// - 7: topics and elaboration present, reviewer elaboration absent
/// - 6: exactly one of the three present
/// - 0: none present, or any other combination
pub fn dimension_score(input: &DimensionInput<'_>) -> i32 {
    let topics = topics_present(input.topics);
    let elaboration = text_present(input.elaboration);
    let reviewer = text_present(input.reviewer_elaboration);

    let present = [topics, elaboration, reviewer]
        .iter()
        .filter(|p| **p)
        .count();

    match (topics, elaboration, reviewer) {
        (true, true, true) => 8,
        (true, true, false) => 7,
        _ if present == 1 => 6,
        _ => 0,
    }
}

/// Reviewer-facing score: only populated once the reviewer elaboration is
/// non-empty, so "not yet reviewed" stays distinguishable from "reviewed as
/// zero".
pub fn reviewer_score(input: &DimensionInput<'_>) -> Option<i32> {
    if text_present(input.reviewer_elaboration) {
        Some(dimension_score(input))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(
        topics: &'a [String],
        elaboration: Option<&'a str>,
        reviewer: Option<&'a str>,
    ) -> DimensionInput<'a> {
        DimensionInput {
            topics,
            elaboration,
            reviewer_elaboration: reviewer,
        }
    }

    #[test]
    fn all_empty_scores_zero() {
        assert_eq!(dimension_score(&input(&[], Some(""), Some(""))), 0);
    }

    #[test]
    fn topics_and_elaboration_score_seven() {
        let topics = vec!["a".to_string()];
        assert_eq!(dimension_score(&input(&topics, Some("x"), Some(""))), 7);
    }

    #[test]
    fn topics_alone_score_six() {
        let topics = vec!["a".to_string()];
        assert_eq!(dimension_score(&input(&topics, Some(""), None)), 6);
    }

    #[test]
    fn all_three_score_eight() {
        let topics = vec!["a".to_string()];
        assert_eq!(dimension_score(&input(&topics, Some("x"), Some("y"))), 8);
    }

    #[test]
    fn elaboration_alone_scores_six() {
        assert_eq!(dimension_score(&input(&[], Some("relevant text"), None)), 6);
    }

    #[test]
    fn reviewer_alone_scores_six() {
        assert_eq!(dimension_score(&input(&[], None, Some("analysis"))), 6);
    }

    #[test]
    fn elaboration_plus_reviewer_without_topics_scores_zero() {
        assert_eq!(dimension_score(&input(&[], Some("x"), Some("y"))), 0);
    }

    #[test]
    fn topics_plus_reviewer_without_elaboration_scores_zero() {
        let topics = vec!["a".to_string()];
        assert_eq!(dimension_score(&input(&topics, None, Some("y"))), 0);
    }

    #[test]
    fn skipped_placeholder_counts_as_absent() {
        let topics = vec!["a".to_string()];
        // Placeholder text demotes an 8 to a 7.
        assert_eq!(
            dimension_score(&input(&topics, Some("x"), Some("não deu tempo"))),
            7
        );
        // And demotes a 7 to a 6.
        assert_eq!(
            dimension_score(&input(&topics, Some("Nao deu tempo aqui"), None)),
            6
        );
    }

    #[test]
    fn whitespace_only_topics_count_as_absent() {
        let topics = vec!["   ".to_string()];
        assert_eq!(dimension_score(&input(&topics, None, None)), 0);
    }

    #[test]
    fn reviewer_score_unset_until_reviewer_writes() {
        let topics = vec!["a".to_string()];
        assert_eq!(reviewer_score(&input(&topics, Some("x"), None)), None);
        assert_eq!(reviewer_score(&input(&topics, Some("x"), Some(""))), None);
        assert_eq!(reviewer_score(&input(&topics, Some("x"), Some("y"))), Some(8));
    }

    #[test]
    fn normalization_folds_accents() {
        assert!(!text_present(Some("NÃO DEU TEMPO")));
        assert!(text_present(Some("não houve consenso")));
    }
}
