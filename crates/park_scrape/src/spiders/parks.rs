use std::collections::HashMap;

use futures_util::StreamExt;
use gmaps::DistanceClient;
use reqwest::{Client, Url};
use scraper::Html;
use sqlx::PgPool;
use tracing::{debug, error, info, warn};

use crate::extract::{self, OperatingRow};
use crate::items::ParkItem;
use crate::pipeline::ParkPersistor;
use crate::spiders::{crawl_client, Counters, CrawlStats, SpiderConfig, Throttle};
use crate::ScrapeError;

/// Crawls the park portal and emits one item per park, plus one per child
/// park named by the operating-dates panel.
pub struct ParkSpider {
    client: Client,
    config: SpiderConfig,
    persistor: ParkPersistor,
    throttle: Throttle,
    counters: Counters,
}

/// Owned scan of a portal park page, parsed before any await point.
struct ParkPageScan {
    heading: Option<String>,
    operating: Vec<OperatingRow>,
}

fn scan_park_page(html: &str) -> ParkPageScan {
    let doc = Html::parse_document(html);
    ParkPageScan {
        heading: extract::park_heading(&doc),
        operating: extract::operating_rows(&doc),
    }
}

fn scan_description_list(html: &str, section_id: &str) -> HashMap<String, String> {
    let doc = Html::parse_document(html);
    extract::description_list(&doc, section_id)
}

fn scan_overview_map(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    extract::park_overview_map(&doc)
}

/// Split the operating rows into the parent park's own row and the rows
/// naming child parks.
fn split_operating_rows(
    park_name: &str,
    rows: Vec<OperatingRow>,
) -> (Option<OperatingRow>, Vec<OperatingRow>) {
    let mut own = None;
    let mut children = Vec::new();
    for row in rows {
        if row.name == park_name {
            own = Some(row);
        } else {
            children.push(row);
        }
    }
    (own, children)
}

impl ParkSpider {
    /// Create a spider writing through the given pool, using the distance
    /// client to cache a reference drive time for new parks.
    pub fn new(pool: PgPool, distance: DistanceClient, config: SpiderConfig) -> Result<Self, ScrapeError> {
        Ok(Self {
            client: crawl_client()?,
            throttle: Throttle::new(config.download_delay),
            config,
            persistor: ParkPersistor::new(pool, distance),
            counters: Counters::default(),
        })
    }

    /// Run the crawl to completion and return what it produced.
    pub async fn run(&self) -> Result<CrawlStats, ScrapeError> {
        info!("Starting park crawl from {}", self.config.portal_url);

        self.throttle.wait().await;
        let response = self
            .client
            .get(&self.config.portal_url)
            .send()
            .await?
            .error_for_status()?;
        let portal_url = response.url().clone();
        let html = response.text().await?;

        let links = {
            let doc = Html::parse_document(&html);
            extract::portal_park_links(&doc)
        };
        info!("Found {} parks in the portal navigation", links.len());

        futures_util::stream::iter(links)
            .for_each_concurrent(self.config.max_concurrency, |(name, href)| {
                let portal_url = &portal_url;
                async move {
                    match self.crawl_park(portal_url, &name, &href).await {
                        Ok(items) => {
                            for _ in 0..items {
                                self.counters.item();
                            }
                        }
                        Err(err) => {
                            error!("Failed to crawl park {}: {}", name, err);
                            self.counters.fail();
                        }
                    }
                }
            })
            .await;

        Ok(self.counters.snapshot())
    }

    /// Crawl one park's portal pages and persist the park and its children.
    /// Returns how many items were persisted.
    async fn crawl_park(
        &self,
        portal_url: &Url,
        link_name: &str,
        href: &str,
    ) -> Result<usize, ScrapeError> {
        let park_url = portal_url
            .join(href)
            .map_err(|e| ScrapeError::DataFormat(e.to_string()))?;
        debug!("Crawling park page: {}", park_url);

        let scan = scan_park_page(&self.fetch(park_url.clone()).await?);
        let park_name = scan.heading.unwrap_or_else(|| link_name.to_string());

        let activities = scan_description_list(
            &self.fetch_page(&park_url, "activities").await?,
            "activities",
        );
        let facilities = scan_description_list(
            &self.fetch_page(&park_url, "facilities").await?,
            "facilities",
        );

        match self.fetch_page(&park_url, "maps").await {
            Ok(html) => match scan_overview_map(&html) {
                Some(map) => debug!("{}. Park overview map: {}", park_name, map),
                None => debug!("{}. No park overview map.", park_name),
            },
            Err(err) => warn!("{}. Could not fetch maps page: {}", park_name, err),
        }

        let (own_row, child_rows) = split_operating_rows(&park_name, scan.operating);

        let mut parent = ParkItem {
            park_name: park_name.clone(),
            activities,
            facilities,
            ..ParkItem::default()
        };
        if let Some(row) = own_row {
            parent.usages = row.usages;
            parent.operating_date_from = row.from;
            parent.operating_date_to = row.to;
        }

        // Parent first: children resolve parent_park_id by name.
        let parent = self.persistor.save(parent).await?;
        let mut saved = 1;

        for row in child_rows {
            let child = ParkItem {
                park_name: row.name,
                parent_park_name: Some(parent.park_name.clone()),
                activities: parent.activities.clone(),
                facilities: parent.facilities.clone(),
                usages: row.usages,
                operating_date_from: row.from,
                operating_date_to: row.to,
                ..ParkItem::default()
            };
            self.persistor.save(child).await?;
            saved += 1;
        }

        Ok(saved)
    }

    async fn fetch(&self, url: Url) -> Result<String, ScrapeError> {
        self.throttle.wait().await;
        let html = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(html)
    }

    /// Fetch a section page hanging off the park page, e.g. `activities`.
    async fn fetch_page(&self, park_url: &Url, section: &str) -> Result<String, ScrapeError> {
        let url = Url::parse(&format!(
            "{}/{}",
            park_url.as_str().trim_end_matches('/'),
            section
        ))
        .map_err(|e| ScrapeError::DataFormat(e.to_string()))?;
        self.fetch(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(name: &str) -> OperatingRow {
        OperatingRow {
            name: name.to_string(),
            usages: vec!["Camping".to_string()],
            from: NaiveDate::from_ymd_opt(2024, 5, 12),
            to: NaiveDate::from_ymd_opt(2024, 10, 14),
        }
    }

    #[test]
    fn operating_rows_split_into_own_and_children() {
        let rows = vec![row("Achray"), row("Algonquin"), row("Brent")];
        let (own, children) = split_operating_rows("Algonquin", rows);
        assert_eq!(own.map(|r| r.name).as_deref(), Some("Algonquin"));
        let names: Vec<_> = children.into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["Achray", "Brent"]);
    }

    #[test]
    fn park_pages_scan_to_heading_and_rows() {
        let scan = scan_park_page(
            r#"<h1 class="park-heading">Algonquin</h1>
               <div class="panel-operating-dates"><table>
               <tr><th>Area</th><th>Usage</th><th>Dates</th></tr>
               <tr>
                 <td>Algonquin - Achray</td>
                 <td><span class="campin-icon"></span></td>
                 <td>May 12, 2024 to October 14, 2024</td>
               </tr>
               </table></div>"#,
        );
        assert_eq!(scan.heading.as_deref(), Some("Algonquin"));
        assert_eq!(scan.operating.len(), 1);
        assert_eq!(scan.operating[0].name, "Achray");
    }
}
