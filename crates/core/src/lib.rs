//! Domain logic for the civica diagnostic-session platform.
//!
//! This crate has no internal dependencies and holds everything that can be
//! expressed as pure functions and plain types: session lifecycle rules,
//! join-code/token generation, the layered access gate, scoring, snapshot
//! envelopes with conflict detection, and audit constants. Persistence and
//! HTTP concerns live in `civica-db` and `civica-api`.

pub mod access;
pub mod audit;
pub mod classroom;
pub mod error;
pub mod hashing;
pub mod identity;
pub mod lifecycle;
pub mod roles;
pub mod scoring;
pub mod snapshot;
pub mod types;
