//! Common library for the Resume Rewriter gate
//!
//! This crate provides shared infrastructure used by the gate service:
//! PostgreSQL connectivity, the Redis pool backing the distributed rate
//! limit counters, database error types and an injectable clock.

pub mod cache;
pub mod clock;
pub mod database;
pub mod error;
