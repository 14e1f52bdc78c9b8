//! Join-code and secret-token generation for diagnostic sessions.
//!
//! Codes are short, human-typable, and drawn from an alphabet without
//! ambiguous glyphs (no `0/O`, `1/I/L`). Tokens are random secrets whose
//! plaintext is shown exactly once; only the SHA-256 digest is stored.

use rand::Rng;

use crate::hashing;

/// Alphabet for join codes. Excludes `0`, `O`, `1`, `I` and `L`.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Length of a generated join code.
pub const CODE_LENGTH: usize = 6;

/// Number of random bytes in a join token (hex-encoded to twice this length).
pub const TOKEN_BYTES: usize = 12;

/// Maximum insert attempts when a generated code collides with an existing
/// session. Collisions are absorbed by the caller's insert-retry loop.
pub const CODE_COLLISION_ATTEMPTS: u32 = 6;

/// The result of issuing a new session join token.
pub struct IssuedToken {
    /// The plaintext token (returned to the facilitator exactly once,
    /// never stored and never logged).
    pub plaintext: String,
    /// The SHA-256 hex digest of the plaintext (stored in the database).
    pub hash: String,
}

/// Generate a short join code from the unambiguous alphabet.
///
/// Uniqueness is not guaranteed here; the caller enforces it via the unique
/// index on the sessions table and a bounded insert-retry loop.
pub fn generate_join_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| {
            let idx = rng.random_range(0..CODE_ALPHABET.len());
            CODE_ALPHABET[idx] as char
        })
        .collect()
}

/// Issue a fresh join token: random bytes, hex-encoded plaintext plus the
/// digest for storage.
pub fn issue_token() -> IssuedToken {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill(&mut bytes);
    let plaintext: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    let hash = hash_token(&plaintext);
    IssuedToken { plaintext, hash }
}

/// Compute the storage digest of a token plaintext.
pub fn hash_token(token: &str) -> String {
    hashing::sha256_hex(token.as_bytes())
}

/// Verify a candidate token against the stored digest in constant time.
///
/// The candidate is hashed first, so the comparison always runs over two
/// equal-length digests regardless of candidate length.
pub fn verify_token(candidate: &str, stored_hash: &str) -> bool {
    let candidate_hash = hash_token(candidate);
    constant_time_eq(candidate_hash.as_bytes(), stored_hash.as_bytes())
}

/// Byte-wise constant-time equality. Length mismatch returns false without
/// short-circuiting the per-byte scan.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
