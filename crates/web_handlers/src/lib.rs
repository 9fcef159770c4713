//! # Web Handlers for the Park Watch Web Application
//!
//! This crate provides the read-only availability endpoints.

/// Handlers for the free-campsites and free-parks endpoints
mod availability_handlers;
pub use availability_handlers::*;

/// Database queries behind the availability endpoints
mod availability_service;
pub use availability_service::*;

/// Query, response, and error types of the availability API
mod availability_types;
pub use availability_types::*;
