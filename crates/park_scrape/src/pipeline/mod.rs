/// Persists scraped parks, with drive-time lookup for new parks.
mod park;
pub use park::*;

/// Persists scraped campsites and their images.
mod campsite;
pub use campsite::*;

/// Reconciles scraped availability against stored reservations.
mod reservation;
pub use reservation::*;
