use chrono::Duration;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

lazy_static! {
    static ref DURATION_RE: Regex =
        Regex::new(r"^(?:(?P<hours>\d+)\s*hours?)?\s*(?:(?P<minutes>\d+)\s*mins?)?")
            .unwrap();
}

/// Errors from the Distance Matrix client.
#[derive(Debug, thiserror::Error)]
pub enum DistanceError {
    /// The HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Client for the Google Maps Distance Matrix API.
pub struct DistanceClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

/// Response body of a Distance Matrix lookup, trimmed to the fields we read.
#[derive(Debug, Deserialize)]
struct MatrixResponse {
    rows: Vec<MatrixRow>,
}

#[derive(Debug, Deserialize)]
struct MatrixRow {
    elements: Vec<MatrixElement>,
}

#[derive(Debug, Deserialize)]
struct MatrixElement {
    duration: Option<MatrixDuration>,
}

#[derive(Debug, Deserialize)]
struct MatrixDuration {
    text: String,
}

impl DistanceClient {
    /// Create a new Distance Matrix client.
    pub fn new(api_key: String) -> Result<Self, DistanceError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: "https://maps.googleapis.com/maps/api/distancematrix/json".to_string(),
            api_key,
        })
    }

    /// Look up the drive duration text (e.g. `"2 hours 15 mins"`) from
    /// `origin` to `destination`. Returns `None` when the API has no route.
    pub async fn duration_text(
        &self,
        origin: &str,
        destination: &str,
    ) -> Result<Option<String>, DistanceError> {
        log::debug!("Distance lookup. {} -> {}", origin, destination);

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("units", "metric"),
                ("origins", origin),
                ("destinations", destination),
                ("key", &self.api_key),
            ])
            .send()
            .await?
            .error_for_status()?;

        let matrix: MatrixResponse = response.json().await?;

        let text = matrix
            .rows
            .first()
            .and_then(|row| row.elements.first())
            .and_then(|el| el.duration.as_ref())
            .map(|d| d.text.clone());

        if text.is_none() {
            log::warn!("No duration in distance response. {} -> {}", origin, destination);
        }

        Ok(text)
    }

    /// Look up the drive time from `origin` to `destination` as a duration.
    /// Unroutable destinations and unparsable duration strings yield `None`.
    pub async fn drive_time(
        &self,
        origin: &str,
        destination: &str,
    ) -> Result<Option<Duration>, DistanceError> {
        let text = self.duration_text(origin, destination).await?;
        Ok(text.as_deref().and_then(parse_duration_text))
    }
}

/// Parse a duration string of the form `"<N> hours <M> mins"` (either part
/// optional) into a duration. Strings with neither part are unknown.
pub fn parse_duration_text(text: &str) -> Option<Duration> {
    let captures = DURATION_RE.captures(text.trim())?;

    let hours = captures.name("hours");
    let minutes = captures.name("minutes");
    if hours.is_none() && minutes.is_none() {
        log::debug!("Could not parse duration string: \"{}\"", text);
        return None;
    }

    let hours: i64 = hours.map_or(0, |m| m.as_str().parse().unwrap_or(0));
    let minutes: i64 = minutes.map_or(0, |m| m.as_str().parse().unwrap_or(0));

    Some(Duration::hours(hours) + Duration::minutes(minutes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hours_and_minutes() {
        assert_eq!(
            parse_duration_text("2 hours 15 mins"),
            Some(Duration::minutes(135))
        );
    }

    #[test]
    fn parses_minutes_only() {
        assert_eq!(parse_duration_text("45 mins"), Some(Duration::minutes(45)));
        assert_eq!(parse_duration_text("1 min"), Some(Duration::minutes(1)));
    }

    #[test]
    fn parses_hours_only() {
        assert_eq!(parse_duration_text("3 hours"), Some(Duration::hours(3)));
        assert_eq!(parse_duration_text("1 hour"), Some(Duration::hours(1)));
    }

    #[test]
    fn unparsable_is_unknown() {
        assert_eq!(parse_duration_text("soon"), None);
        assert_eq!(parse_duration_text(""), None);
    }
}
