use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use reqwest::Client;
use settings::ScrapeSettings;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::extract::ViewerForm;
use crate::ScrapeError;

/// Crawls the park portal and persists parks.
mod parks;
pub use parks::*;

/// Crawls the reservation viewer and persists campsites.
mod campsites;
pub use campsites::*;

/// Crawls the reservation viewer per date and persists availability.
mod reservations;
pub use reservations::*;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 6.1) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/41.0.2228.0 Safari/537.36";

/// Equipment selection submitted with every viewer search.
const EQUIPMENT: &str = "Single Tent/Shelter";

/// Runtime configuration shared by the three crawl flows.
#[derive(Debug, Clone)]
pub struct SpiderConfig {
    /// Park portal root page.
    pub portal_url: String,
    /// Reservation viewer listing page.
    pub listing_url: String,
    /// Minimum interval between request dispatches.
    pub download_delay: Duration,
    /// Maximum sibling entities crawled concurrently.
    pub max_concurrency: usize,
    /// Directory campsite images are downloaded into, when set.
    pub images_store: Option<PathBuf>,
}

impl SpiderConfig {
    /// Build a config from the `scrape.*` settings section.
    pub fn from_settings(settings: &ScrapeSettings) -> Self {
        Self {
            portal_url: settings.portal_url.clone(),
            listing_url: settings.listing_url.clone(),
            download_delay: Duration::from_millis(settings.download_delay_ms),
            max_concurrency: settings.max_concurrency.max(1),
            images_store: settings.images_store.clone().map(PathBuf::from),
        }
    }
}

impl Default for SpiderConfig {
    fn default() -> Self {
        Self::from_settings(&ScrapeSettings::default())
    }
}

/// Counts of the items a crawl produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlStats {
    /// Items scraped and handed to a persistor.
    pub items: usize,
    /// Entities skipped because an expected page fragment was absent.
    pub skipped: usize,
    /// Entities dropped because a step failed.
    pub failed: usize,
}

/// Shared counters for concurrent crawl tasks.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    items: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
}

impl Counters {
    pub(crate) fn item(&self) {
        self.items.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn fail(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CrawlStats {
        CrawlStats {
            items: self.items.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Paces request dispatch: concurrent tasks take turns waiting out the
/// configured delay since the previous dispatch.
#[derive(Debug)]
pub(crate) struct Throttle {
    min_interval: Duration,
    last_dispatch: Mutex<Option<Instant>>,
}

impl Throttle {
    pub(crate) fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_dispatch: Mutex::new(None),
        }
    }

    pub(crate) async fn wait(&self) {
        let mut last = self.last_dispatch.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// HTTP client for the crawl flows: desktop user agent, cookie store for the
/// viewer session, 30 second timeout.
pub(crate) fn crawl_client() -> Result<Client, ScrapeError> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .cookie_store(true)
        .timeout(Duration::from_secs(30))
        .build()?;
    Ok(client)
}

/// Form parameters for a viewer park/date selection: the page's hidden
/// fields with the search fields layered on top.
pub(crate) fn viewer_form_params(
    form: &ViewerForm,
    park_value: &str,
    reserve_date: NaiveDate,
) -> Vec<(String, String)> {
    // The form wants both the first of the month and the date searched for.
    let month_start = reserve_date.with_day(1).unwrap_or(reserve_date);
    let month_str = format!(
        "{} 00:00:00 GMT-0400 (EDT)",
        month_start.format("%a %b %d %Y")
    );
    let date_str = format!(
        "{} 00:00:00 GMT-0400 (EDT)",
        reserve_date.format("%a %b %d %Y")
    );

    let overrides: Vec<(String, String)> = vec![
        (
            "ctl00$MainContentPlaceHolder$LocationList".to_string(),
            park_value.to_string(),
        ),
        ("selArrMth".to_string(), month_str),
        ("selArrDay".to_string(), date_str),
        (
            "txtArrDateHidden".to_string(),
            reserve_date.format("%Y-%m-%d").to_string(),
        ),
        ("selNumNights".to_string(), "1".to_string()),
        ("selEquipmentSub".to_string(), EQUIPMENT.to_string()),
        ("selPartySize".to_string(), "1".to_string()),
    ];

    let mut params: Vec<(String, String)> = form
        .hidden_fields
        .iter()
        .filter(|(name, _)| !overrides.iter().any(|(o, _)| o == name))
        .cloned()
        .collect();
    params.extend(overrides);
    params
}

/// Cookie header the viewer expects alongside the search form.
pub(crate) fn arrival_cookies(reserve_date: NaiveDate) -> String {
    format!(
        "ArrivalDate={}; NumberOfNights=1",
        reserve_date.format("%Y-%m-%d")
    )
}

/// Dates of the reservation season: from the later of June 19 and today,
/// through October 31 of the current year.
pub fn season_dates(today: NaiveDate) -> Vec<NaiveDate> {
    let year = today.year();
    let season_start = NaiveDate::from_ymd_opt(year, 6, 19);
    let season_end = NaiveDate::from_ymd_opt(year, 10, 31);
    let (Some(season_start), Some(season_end)) = (season_start, season_end) else {
        return Vec::new();
    };

    let start = season_start.max(today);
    start
        .iter_days()
        .take_while(|date| *date <= season_end)
        .collect()
}

/// Date used when searching for campsites: the search is really a search
/// for reservations, so a mid-season date is pinned.
pub fn campsite_check_date(today: NaiveDate) -> NaiveDate {
    let year = today.year();
    NaiveDate::from_ymd_opt(year, 6, 1).unwrap_or(today)
}

/// File name of an image URL, query string stripped.
pub(crate) fn image_name(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.rsplit('/').next().unwrap_or(path);
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn season_starts_june_19_before_the_season() {
        let dates = season_dates(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(dates.first(), NaiveDate::from_ymd_opt(2024, 6, 19).as_ref());
        assert_eq!(dates.last(), NaiveDate::from_ymd_opt(2024, 10, 31).as_ref());
    }

    #[test]
    fn season_starts_today_mid_season() {
        let today = NaiveDate::from_ymd_opt(2024, 8, 2).unwrap();
        let dates = season_dates(today);
        assert_eq!(dates.first(), Some(&today));
    }

    #[test]
    fn season_is_empty_after_october() {
        let dates = season_dates(NaiveDate::from_ymd_opt(2024, 11, 5).unwrap());
        assert!(dates.is_empty());
    }

    #[test]
    fn check_date_pins_june_first() {
        let today = NaiveDate::from_ymd_opt(2025, 2, 10).unwrap();
        assert_eq!(
            campsite_check_date(today),
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
        );
    }

    #[test]
    fn form_params_layer_overrides_on_hidden_fields() {
        let form = ViewerForm {
            action: Some("Viewer.aspx".to_string()),
            hidden_fields: vec![
                ("__VIEWSTATE".to_string(), "abc".to_string()),
                ("selNumNights".to_string(), "7".to_string()),
            ],
        };
        let date = NaiveDate::from_ymd_opt(2024, 6, 19).unwrap();
        let params = viewer_form_params(&form, "101", date);

        assert!(params.contains(&("__VIEWSTATE".to_string(), "abc".to_string())));
        let nights: Vec<_> = params.iter().filter(|(k, _)| k == "selNumNights").collect();
        assert_eq!(nights, vec![&("selNumNights".to_string(), "1".to_string())]);
        assert!(params.contains(&(
            "txtArrDateHidden".to_string(),
            "2024-06-19".to_string()
        )));
        assert!(params
            .iter()
            .any(|(k, v)| k == "selArrMth" && v.starts_with("Sat Jun 01 2024")));
    }

    #[test]
    fn image_names_drop_path_and_query() {
        assert_eq!(
            image_name("/Photos/714/50231-1.jpg?w=640").as_deref(),
            Some("50231-1.jpg")
        );
        assert_eq!(image_name("https://host/a/b/site.png").as_deref(), Some("site.png"));
        assert_eq!(image_name(""), None);
    }
}
