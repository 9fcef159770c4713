use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Query parameters of the free-campsites endpoint.
#[derive(Debug, Deserialize)]
pub struct FreeCampSitesQuery {
    /// First night of the stay, `YYYY-MM-DD`.
    pub start_date: String,
    /// Departure date, `YYYY-MM-DD`. Must be strictly after `start_date`.
    pub end_date: String,
}

/// Query parameters of the free-parks endpoint.
#[derive(Debug, Deserialize)]
pub struct FreeParksQuery {
    /// First night of the stay, `YYYY-MM-DD`.
    pub start_date: String,
    /// Departure date, `YYYY-MM-DD`. Must be strictly after `start_date`.
    pub end_date: String,
    /// Maximum drive from `from_place`, in hours. `0` means no limit.
    pub drive_hours: Option<f64>,
    /// Origin for drive-time lookups, e.g. `"Toronto, Ontario"`.
    pub from_place: Option<String>,
}

/// Validated stay window. A site is free when no reservation row falls on
/// any night of the stay; the departure date itself is not a night.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    /// First night of the stay.
    pub first_night: NaiveDate,
    /// Last night of the stay (departure date minus one day).
    pub last_night: NaiveDate,
}

impl DateWindow {
    /// Parse and validate the raw query dates.
    pub fn parse(start_date: &str, end_date: &str) -> Result<Self, ApiError> {
        let start = parse_query_date("start_date", start_date)?;
        let end = parse_query_date("end_date", end_date)?;

        if end <= start {
            return Err(ApiError::Validation(
                "end_date must be after start_date".to_string(),
            ));
        }

        Ok(Self {
            first_night: start,
            last_night: end - chrono::Duration::days(1),
        })
    }
}

fn parse_query_date(name: &str, raw: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        ApiError::Validation(format!("{} must be a date formatted YYYY-MM-DD", name))
    })
}

/// Effective drive-hours limit: zero and negative values mean no limit.
pub fn max_drive_hours(requested: Option<f64>) -> Option<f64> {
    requested.filter(|hours| *hours > 0.0)
}

/// One free campsite of the requested park.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FreeCampSite {
    /// Database id of the campsite.
    pub campsite_id: i32,
    /// Park the site belongs to.
    pub park_name: String,
    /// Parent park, when the park is part of a two-level tree.
    pub parent_park_name: Option<String>,
    /// Site number within the park.
    pub site_number: String,
    /// Site type, when known.
    pub site_type: Option<String>,
    /// Campground area, when known.
    pub campground_name: Option<String>,
    /// Label to value details scraped for the site.
    pub details: serde_json::Value,
    /// Image URLs, base URL already applied.
    pub images: Vec<String>,
}

/// One park with at least one free campsite in the window.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FreePark {
    /// Database id of the park.
    pub park_id: i32,
    /// Park name.
    pub park_name: String,
    /// Number of free campsites in the window.
    pub free_campsites: i64,
    /// Drive from the requested origin in hours, rounded to one decimal.
    pub drive_hours: Option<f64>,
}

/// Response envelope: every endpoint returns `{"data": [...]}`.
#[derive(Debug, Serialize)]
pub struct DataEnvelope<T> {
    /// The result rows.
    pub data: Vec<T>,
}

/// Error type of the availability endpoints.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    /// A query parameter failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Drive-time lookup failed.
    #[error("Distance lookup error: {0}")]
    Distance(#[from] gmaps::DistanceError),
}

impl actix_web::ResponseError for ApiError {
    fn error_response(&self) -> actix_web::HttpResponse {
        use actix_web::HttpResponse;

        match self {
            ApiError::Validation(msg) => HttpResponse::BadRequest().json(serde_json::json!({
                "error": "validation_error",
                "message": msg
            })),
            ApiError::Database(_) => {
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "internal_error",
                    "message": "An internal error occurred"
                }))
            }
            ApiError::Distance(_) => HttpResponse::BadGateway().json(serde_json::json!({
                "error": "distance_lookup_failed",
                "message": "Drive time lookup failed"
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_excludes_the_departure_date() {
        let window = DateWindow::parse("2024-07-01", "2024-07-04").unwrap();
        assert_eq!(window.first_night, NaiveDate::from_ymd_opt(2024, 7, 1).unwrap());
        assert_eq!(window.last_night, NaiveDate::from_ymd_opt(2024, 7, 3).unwrap());
    }

    #[test]
    fn single_night_stays_are_valid() {
        let window = DateWindow::parse("2024-07-01", "2024-07-02").unwrap();
        assert_eq!(window.first_night, window.last_night);
    }

    #[test]
    fn end_date_must_follow_start_date() {
        assert!(DateWindow::parse("2024-07-04", "2024-07-01").is_err());
        assert!(DateWindow::parse("2024-07-01", "2024-07-01").is_err());
    }

    #[test]
    fn malformed_dates_are_rejected() {
        assert!(DateWindow::parse("07/01/2024", "2024-07-04").is_err());
        assert!(DateWindow::parse("2024-07-01", "tomorrow").is_err());
        assert!(DateWindow::parse("", "2024-07-04").is_err());
    }

    #[test]
    fn campsite_rows_serialize_in_camel_case() {
        let row = FreeCampSite {
            campsite_id: 7,
            park_name: "Achray".to_string(),
            parent_park_name: Some("Algonquin".to_string()),
            site_number: "407".to_string(),
            site_type: Some("Regular Campsite".to_string()),
            campground_name: None,
            details: serde_json::json!({"Privacy": "Good"}),
            images: vec!["https://host/50231-1.jpg".to_string()],
        };
        let json = serde_json::to_value(&row).unwrap();

        assert_eq!(json["parkName"], "Achray");
        assert_eq!(json["parentParkName"], "Algonquin");
        assert_eq!(json["siteNumber"], "407");
        assert_eq!(json["campgroundName"], serde_json::Value::Null);
    }

    #[test]
    fn zero_drive_hours_means_no_limit() {
        assert_eq!(max_drive_hours(Some(0.0)), None);
        assert_eq!(max_drive_hours(Some(-1.0)), None);
        assert_eq!(max_drive_hours(Some(3.5)), Some(3.5));
        assert_eq!(max_drive_hours(None), None);
    }
}
