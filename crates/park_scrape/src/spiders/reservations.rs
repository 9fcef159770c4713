use chrono::NaiveDate;
use futures_util::future::{BoxFuture, FutureExt};
use futures_util::StreamExt;
use reqwest::header::COOKIE;
use reqwest::{Client, Url};
use scraper::Html;
use sqlx::PgPool;
use tracing::{debug, error, info, warn};

use crate::extract::{self, ParkOption, SelectedNames, SiteRow, ViewerForm};
use crate::items::ReservationItem;
use crate::pipeline::ReservationPersistor;
use crate::spiders::{
    arrival_cookies, crawl_client, season_dates, viewer_form_params, Counters, CrawlStats,
    SpiderConfig, Throttle,
};
use crate::ScrapeError;

/// Crawls the reservation viewer for every park and season date and emits
/// one availability observation per site listing row.
pub struct ReservationSpider {
    client: Client,
    config: SpiderConfig,
    persistor: ReservationPersistor,
    throttle: Throttle,
    counters: Counters,
}

/// Owned scan of a viewer park page, parsed before any await point.
struct PageScan {
    area_links: Option<Vec<String>>,
    names: Option<SelectedNames>,
    rows: Vec<SiteRow>,
}

fn scan_page(html: &str) -> PageScan {
    let doc = Html::parse_document(html);
    if extract::needs_area_choice(&doc) {
        return PageScan {
            area_links: Some(extract::area_links(&doc)),
            names: None,
            rows: Vec::new(),
        };
    }
    PageScan {
        area_links: None,
        names: extract::selected_names(&doc),
        rows: extract::site_rows(&doc),
    }
}

impl ReservationSpider {
    /// Create a spider writing through the given pool.
    pub fn new(pool: PgPool, config: SpiderConfig) -> Result<Self, ScrapeError> {
        Ok(Self {
            client: crawl_client()?,
            throttle: Throttle::new(config.download_delay),
            config,
            persistor: ReservationPersistor::new(pool),
            counters: Counters::default(),
        })
    }

    /// Run the crawl to completion: every park in the viewer listing, for
    /// every remaining date of the season.
    pub async fn run(&self) -> Result<CrawlStats, ScrapeError> {
        let dates = season_dates(chrono::Utc::now().date_naive());
        let Some((first, last)) = dates.first().zip(dates.last()) else {
            info!("Reservation season is over; nothing to crawl.");
            return Ok(self.counters.snapshot());
        };
        info!(
            "Starting reservation crawl. Dates: {} through {}",
            first, last
        );

        self.throttle.wait().await;
        let response = self
            .client
            .get(&self.config.listing_url)
            .send()
            .await?
            .error_for_status()?;
        let listing_url = response.url().clone();
        let listing_html = response.text().await?;

        let doc = Html::parse_document(&listing_html);
        let parks: Vec<ParkOption> = extract::park_options(&doc)
            .into_iter()
            .filter(|park| park.name != "Ontario Parks")
            .collect();
        let form = extract::main_form(&doc).ok_or_else(|| {
            ScrapeError::MissingFragment("viewer main form on listing page".to_string())
        })?;
        drop(doc);

        let post_url = match form.action.as_deref() {
            Some(action) => listing_url
                .join(action)
                .map_err(|e| ScrapeError::DataFormat(e.to_string()))?,
            None => listing_url,
        };

        info!(
            "Found {} parks; checking {} dates each",
            parks.len(),
            dates.len()
        );

        futures_util::stream::iter(parks)
            .for_each_concurrent(self.config.max_concurrency, |park| {
                let form = &form;
                let post_url = &post_url;
                let dates = &dates;
                async move {
                    for date in dates {
                        if let Err(err) = self.crawl_park_date(post_url, form, &park, *date).await {
                            error!(
                                "Failed to crawl park {} for {}: {}",
                                park.name, date, err
                            );
                            self.counters.fail();
                        }
                    }
                }
            })
            .await;

        Ok(self.counters.snapshot())
    }

    /// Submit the viewer form for one park and date and walk the result.
    async fn crawl_park_date(
        &self,
        post_url: &Url,
        form: &ViewerForm,
        park: &ParkOption,
        date: NaiveDate,
    ) -> Result<(), ScrapeError> {
        debug!("Selecting park {} for {}", park.name, date);

        self.throttle.wait().await;
        let params = viewer_form_params(form, &park.value, date);
        let response = self
            .client
            .post(post_url.clone())
            .header(COOKIE, arrival_cookies(date))
            .form(&params)
            .send()
            .await?
            .error_for_status()?;

        let page_url = response.url().clone();
        let html = response.text().await?;
        self.process_page(page_url, html, date).await
    }

    /// Handle one viewer page: recurse into campground areas when the page
    /// demands a choice, otherwise emit one observation per site row.
    fn process_page(
        &self,
        page_url: Url,
        html: String,
        date: NaiveDate,
    ) -> BoxFuture<'_, Result<(), ScrapeError>> {
        async move {
            let scan = scan_page(&html);

            if let Some(links) = scan.area_links {
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
                        self.process_page(url, html, date).await
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

            for row in scan.rows {
                let Some(reason) = row.status else {
                    warn!(
                        "{} - {}. No status in site row for {}.",
                        names.park_name, row.site_number, date
                    );
                    self.counters.skip();
                    continue;
                };

                let item = ReservationItem {
                    campsite_id: None,
                    park_name: names.park_name.clone(),
                    site_number: row.site_number,
                    reserve_date: date,
                    reason,
                };

                match self.persistor.save(item).await {
                    Ok(_) => self.counters.item(),
                    Err(err) => {
                        error!(
                            "Failed to persist reservation in {} for {}: {}",
                            names.park_name, date, err
                        );
                        self.counters.fail();
                    }
                }
            }

            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_rows_scan_with_statuses() {
        let scan = scan_page(
            r##"<select name="ctl00$MainContentPlaceHolder$LocationList">
                 <option value="5" selected="selected">Bon Echo</option>
               </select>
               <table class="list_new"><tbody>
               <tr>
                 <td><input /></td>
                 <td><a href="javascript:SelectRce('1','x','2');">101</a></td>
                 <td>Regular Campsite</td>
                 <td><a href="#">Reserve!</a></td>
               </tr>
               </tbody></table>"##,
        );
        assert!(scan.area_links.is_none());
        assert_eq!(scan.names.unwrap().park_name, "Bon Echo");
        assert_eq!(scan.rows.len(), 1);
        assert_eq!(scan.rows[0].status.as_deref(), Some("Reserve!"));
    }
}
