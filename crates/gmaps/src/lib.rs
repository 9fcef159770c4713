//! # Gmaps
//!
//! This crate provides a client for the Google Maps Distance Matrix API,
//! which is used to look up drive times from an origin city to a park.

/// Distance Matrix client and duration-text parsing.
mod distance;
pub use distance::*;
