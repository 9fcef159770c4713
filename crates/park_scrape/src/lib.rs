//! # Park Scrape
//!
//! This crate implements the crawl flows for the provincial-park reservation
//! site (parks, campsites, reservations) and the reconciliation persistors
//! that write scraped items into the database.

/// Error type shared by crawl and persistence code.
mod error;
pub use error::*;

/// Scraped item records.
pub mod items;

/// Pure HTML fragment extractors.
pub mod extract;

/// The three crawl flows.
pub mod spiders;

/// Reconciliation persistors (insert-or-update against existing rows).
pub mod pipeline;
