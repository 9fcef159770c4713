//! # Postgres
//!
//! This crate provides the connection pool and schema migrations for the
//! Parkwatch database.

/// Pool construction, migrations, and connection smoke test.
pub mod database;
