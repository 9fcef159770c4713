use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::debug;

use crate::items::CampSiteItem;
use crate::ScrapeError;

/// What the persistor will do with a scraped campsite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampSiteWrite {
    /// No row exists yet: insert the full record.
    Insert,
    /// A row exists and fresh details were scraped: replace only `details`.
    UpdateDetails,
    /// A row exists but the scrape produced no details: leave it untouched.
    Skip,
}

/// Decide the write action for a campsite. Identity fields are immutable
/// once a row exists, and empty details never overwrite stored ones.
pub fn write_action(existing_id: Option<i32>, details_empty: bool) -> CampSiteWrite {
    match existing_id {
        None => CampSiteWrite::Insert,
        Some(_) if details_empty => CampSiteWrite::Skip,
        Some(_) => CampSiteWrite::UpdateDetails,
    }
}

/// Reconciles one scraped campsite against the database.
pub struct CampSitePersistor {
    pool: PgPool,
}

impl CampSitePersistor {
    /// Create a persistor on the shared pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert or update the campsite and its images, returning the item with
    /// `park_id` and `campsite_id` populated.
    pub async fn save(&self, mut item: CampSiteItem) -> Result<CampSiteItem, ScrapeError> {
        self.set_park_id(&mut item).await?;
        self.set_campsite_id(&mut item).await?;

        match write_action(item.campsite_id, item.details.is_empty()) {
            CampSiteWrite::Insert => self.insert_campsite(&mut item).await?,
            CampSiteWrite::UpdateDetails => self.update_details(&item).await?,
            CampSiteWrite::Skip => {
                debug!(
                    "{} - {}. Not updating campsite, because no details set.",
                    item.park_name, item.site_number
                );
            }
        }

        self.save_images(&item).await?;

        Ok(item)
    }

    /// Resolve the park id by name, inserting a bare park row when the park
    /// has not been seen yet.
    async fn set_park_id(&self, item: &mut CampSiteItem) -> Result<(), ScrapeError> {
        let existing = sqlx::query("SELECT park_id FROM parks WHERE park_name = $1")
            .bind(&item.park_name)
            .fetch_optional(&self.pool)
            .await?;

        let park_id = match existing {
            Some(row) => row.get("park_id"),
            None => {
                let row = sqlx::query(
                    "INSERT INTO parks (park_name) VALUES ($1) RETURNING park_id",
                )
                .bind(&item.park_name)
                .fetch_one(&self.pool)
                .await?;
                row.get("park_id")
            }
        };

        item.park_id = Some(park_id);
        Ok(())
    }

    /// Resolve the campsite id for an existing row, keyed by
    /// (park name, site number).
    async fn set_campsite_id(&self, item: &mut CampSiteItem) -> Result<(), ScrapeError> {
        let row = sqlx::query(
            "SELECT campsite_id FROM campsites WHERE park_name = $1 AND site_number = $2",
        )
        .bind(&item.park_name)
        .bind(&item.site_number)
        .fetch_optional(&self.pool)
        .await?;

        item.campsite_id = row.map(|r| r.get("campsite_id"));
        Ok(())
    }

    async fn insert_campsite(&self, item: &mut CampSiteItem) -> Result<(), ScrapeError> {
        debug!(
            "{} - {}. Inserting new campsite.",
            item.park_name, item.site_number
        );

        let row = sqlx::query(
            r#"
            INSERT INTO campsites (
                park_id, park_name, site_number, site_type,
                campground_name, parent_park_name, details, images
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING campsite_id
            "#,
        )
        .bind(item.park_id)
        .bind(&item.park_name)
        .bind(&item.site_number)
        .bind(&item.site_type)
        .bind(&item.campground_name)
        .bind(&item.parent_park_name)
        .bind(Json(&item.details))
        .bind(&item.images)
        .fetch_one(&self.pool)
        .await?;

        item.campsite_id = Some(row.get("campsite_id"));
        Ok(())
    }

    async fn update_details(&self, item: &CampSiteItem) -> Result<(), ScrapeError> {
        debug!(
            "{} - {}. Updating campsite details.",
            item.park_name, item.site_number
        );

        sqlx::query("UPDATE campsites SET details = $1 WHERE campsite_id = $2")
            .bind(Json(&item.details))
            .bind(item.campsite_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Insert image rows that do not exist yet, one existence check per image.
    async fn save_images(&self, item: &CampSiteItem) -> Result<(), ScrapeError> {
        debug!(
            "{} - {}. Saving images in DB: {:?}",
            item.park_name, item.site_number, item.images
        );

        for image_name in &item.images {
            let row = sqlx::query(
                r#"
                SELECT COUNT(campsite_image_id) AS image_count
                FROM campsite_images
                WHERE campsite_id = $1 AND image_name = $2
                "#,
            )
            .bind(item.campsite_id)
            .bind(image_name)
            .fetch_one(&self.pool)
            .await?;

            let image_count: i64 = row.get("image_count");
            if image_count > 0 {
                debug!(
                    "{} - {}. Found existing image record: {}",
                    item.park_name, item.site_number, image_name
                );
                continue;
            }

            debug!(
                "{} - {}. Inserting campsite image: {}",
                item.park_name, item.site_number, image_name
            );
            sqlx::query(
                "INSERT INTO campsite_images (campsite_id, image_name) VALUES ($1, $2)",
            )
            .bind(item.campsite_id)
            .bind(image_name)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_sites_are_inserted() {
        assert_eq!(write_action(None, true), CampSiteWrite::Insert);
        assert_eq!(write_action(None, false), CampSiteWrite::Insert);
    }

    #[test]
    fn existing_sites_only_update_details() {
        assert_eq!(write_action(Some(7), false), CampSiteWrite::UpdateDetails);
    }

    #[test]
    fn empty_details_never_overwrite() {
        assert_eq!(write_action(Some(7), true), CampSiteWrite::Skip);
    }
}
