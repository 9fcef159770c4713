use futures_util::future::{BoxFuture, FutureExt};
use futures_util::StreamExt;
use reqwest::header::COOKIE;
use reqwest::{Client, Url};
use scraper::Html;
use sqlx::PgPool;
use tracing::{debug, error, info, warn};

use crate::extract::{self, ParkOption, SelectedNames, SiteRow, ViewerForm};
use crate::items::CampSiteItem;
use crate::pipeline::CampSitePersistor;
use crate::spiders::{
    arrival_cookies, campsite_check_date, crawl_client, image_name, viewer_form_params, Counters,
    CrawlStats, SpiderConfig, Throttle,
};
use crate::ScrapeError;

/// Crawls the reservation viewer for every park and emits one campsite item
/// per site listing row, enriched with details and photos.
pub struct CampSiteSpider {
    client: Client,
    config: SpiderConfig,
    persistor: CampSitePersistor,
    throttle: Throttle,
    counters: Counters,
}

/// Owned scan of a viewer park page, parsed before any await point.
struct ParkPageScan {
    area_links: Option<Vec<String>>,
    names: Option<SelectedNames>,
    rows: Vec<SiteRow>,
}

fn scan_park_page(html: &str) -> ParkPageScan {
    let doc = Html::parse_document(html);
    if extract::needs_area_choice(&doc) {
        return ParkPageScan {
            area_links: Some(extract::area_links(&doc)),
            names: None,
            rows: Vec::new(),
        };
    }
    ParkPageScan {
        area_links: None,
        names: extract::selected_names(&doc),
        rows: extract::site_rows(&doc),
    }
}

fn scan_listing_page(html: &str) -> (Option<ViewerForm>, Vec<ParkOption>) {
    let doc = Html::parse_document(html);
    let parks = extract::park_options(&doc)
        .into_iter()
        .filter(|park| park.name != "Ontario Parks")
        .collect();
    (extract::main_form(&doc), parks)
}

impl CampSiteSpider {
    /// Create a spider writing through the given pool.
    pub fn new(pool: PgPool, config: SpiderConfig) -> Result<Self, ScrapeError> {
        Ok(Self {
            client: crawl_client()?,
            throttle: Throttle::new(config.download_delay),
            config,
            persistor: CampSitePersistor::new(pool),
            counters: Counters::default(),
        })
    }

    /// Run the crawl to completion and return what it produced.
    pub async fn run(&self) -> Result<CrawlStats, ScrapeError> {
        let check_date = campsite_check_date(chrono::Utc::now().date_naive());
        info!("Starting campsite crawl. Check date: {}", check_date);

        self.throttle.wait().await;
        let response = self
            .client
            .get(&self.config.listing_url)
            .send()
            .await?
            .error_for_status()?;
        let listing_url = response.url().clone();
        let listing_html = response.text().await?;

        let (form, parks) = scan_listing_page(&listing_html);
        let form = form.ok_or_else(|| {
            ScrapeError::MissingFragment("viewer main form on listing page".to_string())
        })?;
        let post_url = resolve_action(&listing_url, form.action.as_deref())?;

        info!("Found {} parks in the viewer listing", parks.len());

        futures_util::stream::iter(parks)
            .for_each_concurrent(self.config.max_concurrency, |park| {
                let form = &form;
                let post_url = &post_url;
                async move {
                    if let Err(err) = self.crawl_park(post_url, form, &park, check_date).await {
                        error!("Failed to crawl park {}: {}", park.name, err);
                        self.counters.fail();
                    }
                }
            })
            .await;

        Ok(self.counters.snapshot())
    }

    /// Submit the viewer form for one park and walk the resulting pages.
    async fn crawl_park(
        &self,
        post_url: &Url,
        form: &ViewerForm,
        park: &ParkOption,
        check_date: chrono::NaiveDate,
    ) -> Result<(), ScrapeError> {
        debug!("Selecting park: {}", park.name);

        self.throttle.wait().await;
        let params = viewer_form_params(form, &park.value, check_date);
        let response = self
            .client
            .post(post_url.clone())
            .header(COOKIE, arrival_cookies(check_date))
            .form(&params)
            .send()
            .await?
            .error_for_status()?;

        let page_url = response.url().clone();
        let html = response.text().await?;
        self.process_park_page(page_url, html).await
    }

    /// Handle one viewer park page: recurse into campground areas when the
    /// page demands a choice, otherwise emit one item per site row.
    fn process_park_page(
        &self,
        page_url: Url,
        html: String,
    ) -> BoxFuture<'_, Result<(), ScrapeError>> {
        async move {
            let scan = scan_park_page(&html);

            if let Some(links) = scan.area_links {
                // Not a real park page: one request per campground area,
                // re-entering this handler.
                for link in links {
                    let Ok(area_url) = page_url.join(&link) else {
                        warn!("Skipping unjoinable area link: {}", link);
                        self.counters.skip();
                        continue;
                    };
                    self.throttle.wait().await;
                    let result = async {
                        let response = self
                            .client
                            .get(area_url.clone())
                            .send()
                            .await?
                            .error_for_status()?;
                        let url = response.url().clone();
                        let html = response.text().await?;
                        self.process_park_page(url, html).await
                    }
                    .await;

                    if let Err(err) = result {
                        error!("Failed to crawl campground area {}: {}", area_url, err);
                        self.counters.fail();
                    }
                }
                return Ok(());
            }

            let Some(names) = scan.names else {
                warn!("No park selection found on page {}", page_url);
                self.counters.skip();
                return Ok(());
            };

            debug!("On page for park: {}", names.park_name);

            for row in scan.rows {
                match self.populate_site(&page_url, &names, row).await {
                    Ok(true) => self.counters.item(),
                    Ok(false) => self.counters.skip(),
                    Err(err) => {
                        error!(
                            "Failed to persist campsite in {}: {}",
                            names.park_name, err
                        );
                        self.counters.fail();
                    }
                }
            }

            Ok(())
        }
        .boxed()
    }

    /// Fetch details and photos for one site row and persist the item.
    /// Returns `Ok(false)` when the row lacks the expected details link.
    async fn populate_site(
        &self,
        page_url: &Url,
        names: &SelectedNames,
        row: SiteRow,
    ) -> Result<bool, ScrapeError> {
        let Some(href) = row.detail_href.as_deref() else {
            warn!(
                "{} - {}. No details link in site row.",
                names.park_name, row.site_number
            );
            return Ok(false);
        };
        let Some((loc_id, rce_id)) = extract::detail_call(href) else {
            warn!("Could not find JS call for campsite details.");
            return Ok(false);
        };

        let mut item = CampSiteItem::new(names.park_name.clone(), row.site_number);
        item.parent_park_name = names.parent_park_name.clone();
        item.campground_name = names.campground_name.clone();
        item.site_type = row.site_type;

        debug!(
            "Populating site details. {} - {}",
            item.park_name, item.site_number
        );

        // The details response carries the rceId-keyed table; the photo page
        // needs both ids, so this order is fixed.
        self.throttle.wait().await;
        let details_url = page_url
            .join("/Details.ashx")
            .map_err(|e| ScrapeError::DataFormat(e.to_string()))?;
        let details_html = self
            .client
            .post(details_url)
            .form(&[("type", "Resource"), ("id", rce_id.as_str())])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        item.details = extract::details_table(&Html::parse_document(&details_html));

        self.throttle.wait().await;
        let pictures_url = page_url
            .join("/Pictures.aspx")
            .map_err(|e| ScrapeError::DataFormat(e.to_string()))?;
        let pictures_html = self
            .client
            .get(pictures_url)
            .query(&[("locId", loc_id.as_str()), ("rceId", rce_id.as_str())])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        item.image_urls = extract::site_image_urls(&Html::parse_document(&pictures_html));
        item.images = item
            .image_urls
            .iter()
            .filter_map(|url| image_name(url))
            .collect();

        if let Some(store) = &self.config.images_store {
            self.download_images(page_url, &item, store).await;
        }

        self.persistor.save(item).await?;
        Ok(true)
    }

    /// Download the site photos into the image store. Failures are logged
    /// per image and never fail the item.
    async fn download_images(
        &self,
        page_url: &Url,
        item: &CampSiteItem,
        store: &std::path::Path,
    ) {
        for url in &item.image_urls {
            let result = self.download_image(page_url, url, store).await;
            if let Err(err) = result {
                warn!(
                    "{} - {}. Failed to download image {}: {}",
                    item.park_name, item.site_number, url, err
                );
            }
        }
    }

    async fn download_image(
        &self,
        page_url: &Url,
        url: &str,
        store: &std::path::Path,
    ) -> Result<(), ScrapeError> {
        let Some(name) = image_name(url) else {
            return Ok(());
        };
        let image_url = page_url
            .join(url)
            .map_err(|e| ScrapeError::DataFormat(e.to_string()))?;

        self.throttle.wait().await;
        let bytes = self
            .client
            .get(image_url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        tokio::fs::create_dir_all(store).await?;
        tokio::fs::write(store.join(name), &bytes).await?;
        Ok(())
    }
}

/// Resolve the form action against the page it was served on.
fn resolve_action(page_url: &Url, action: Option<&str>) -> Result<Url, ScrapeError> {
    match action {
        Some(action) => page_url
            .join(action)
            .map_err(|e| ScrapeError::DataFormat(e.to_string())),
        None => Ok(page_url.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_scan_drops_the_placeholder_option() {
        let (form, parks) = scan_listing_page(
            r#"<form name="MainForm" action="Viewer.aspx">
               <input type="hidden" name="__VIEWSTATE" value="x" />
               <select name="ctl00$MainContentPlaceHolder$LocationList">
                 <option value="-2147483648">Ontario Parks</option>
                 <option value="5">Bon Echo</option>
               </select></form>"#,
        );
        assert!(form.is_some());
        assert_eq!(parks.len(), 1);
        assert_eq!(parks[0].name, "Bon Echo");
    }

    #[test]
    fn area_pages_scan_to_links_only() {
        let scan = scan_park_page(
            r#"<div id="viewAvailabilityMsg"></div>
               <table class="list_new"><tbody>
               <tr><td><a href="Viewer.aspx?map=1">Achray</a></td></tr>
               </tbody></table>"#,
        );
        assert_eq!(scan.area_links, Some(vec!["Viewer.aspx?map=1".to_string()]));
        assert!(scan.rows.is_empty());
    }

    #[test]
    fn form_action_resolves_relative_to_page() {
        let page = Url::parse("https://reservations.example.com/Algonquin?List").unwrap();
        let url = resolve_action(&page, Some("Viewer.aspx")).unwrap();
        assert_eq!(url.as_str(), "https://reservations.example.com/Viewer.aspx");
    }
}
