use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;

/// A park scraped from the park portal, before persistence.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ParkItem {
    /// Park name from the portal heading.
    pub park_name: String,
    /// Name of the parent park, for child parks of a two-level tree.
    pub parent_park_name: Option<String>,
    /// Resolved database id of the parent park, set during persistence.
    pub parent_park_id: Option<i32>,
    /// Activity label to description.
    pub activities: HashMap<String, String>,
    /// Facility label to description.
    pub facilities: HashMap<String, String>,
    /// Cached drive durations keyed by origin city.
    pub travel_times: HashMap<String, String>,
    /// Usage tags (camping, backcountry, day-use).
    pub usages: Vec<String>,
    /// First operating day of the season.
    pub operating_date_from: Option<NaiveDate>,
    /// Last operating day of the season.
    pub operating_date_to: Option<NaiveDate>,
}

/// A campsite scraped from the reservation viewer, before persistence.
#[derive(Debug, Clone, Serialize)]
pub struct CampSiteItem {
    /// Database id, populated by the persistor.
    pub campsite_id: Option<i32>,
    /// Database id of the owning park, populated by the persistor.
    pub park_id: Option<i32>,
    /// Park name from the viewer selection.
    pub park_name: String,
    /// Parent park name when the selection is `"Parent - Park"`.
    pub parent_park_name: Option<String>,
    /// Campground area name, absent when the listing covers all campgrounds.
    pub campground_name: Option<String>,
    /// Site number within the park. Identity together with `park_name`.
    pub site_number: String,
    /// Site type column of the listing row.
    pub site_type: Option<String>,
    /// Label to value pairs from the details table.
    pub details: HashMap<String, String>,
    /// Source URLs of the site photos.
    pub image_urls: Vec<String>,
    /// Image file names reconciled into the database.
    pub images: Vec<String>,
}

impl CampSiteItem {
    /// Create an item carrying only identity fields.
    pub fn new(park_name: String, site_number: String) -> Self {
        Self {
            campsite_id: None,
            park_id: None,
            park_name,
            parent_park_name: None,
            campground_name: None,
            site_number,
            site_type: None,
            details: HashMap::new(),
            image_urls: Vec::new(),
            images: Vec::new(),
        }
    }
}

/// One (site, date) availability observation, before persistence.
#[derive(Debug, Clone, Serialize)]
pub struct ReservationItem {
    /// Database id of the campsite, populated by the persistor.
    pub campsite_id: Option<i32>,
    /// Park name from the viewer selection.
    pub park_name: String,
    /// Site number within the park.
    pub site_number: String,
    /// Date the observation applies to.
    pub reserve_date: NaiveDate,
    /// Raw status string scraped from the listing row.
    pub reason: String,
}
