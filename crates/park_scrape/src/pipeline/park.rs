use gmaps::DistanceClient;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::{debug, warn};

use crate::items::ParkItem;
use crate::ScrapeError;

/// Origin city used when caching a drive time for a newly seen park.
pub const REFERENCE_ORIGIN: &str = "Toronto, Ontario";

/// Key the reference origin is stored under in `travel_times`.
pub const REFERENCE_ORIGIN_LABEL: &str = "Toronto";

/// Destination string handed to the distance API for a park.
pub fn park_destination(park_name: &str) -> String {
    format!("{} Provincial Park, Ontario, Canada", park_name)
}

/// Reconciles one scraped park against the database.
pub struct ParkPersistor {
    pool: PgPool,
    distance: DistanceClient,
}

impl ParkPersistor {
    /// Create a persistor on the shared pool.
    pub fn new(pool: PgPool, distance: DistanceClient) -> Self {
        Self { pool, distance }
    }

    /// Insert a newly seen park (with a reference drive time) or update the
    /// descriptive fields of an existing one. Parks are never deleted.
    pub async fn save(&self, mut item: ParkItem) -> Result<ParkItem, ScrapeError> {
        debug!("Checking if park exists. {}", item.park_name);
        let exists = self.exists(&item).await?;

        if !exists {
            self.set_reference_travel_time(&mut item).await;
        }

        if let Some(parent_name) = item.parent_park_name.clone() {
            item.parent_park_id = self.park_id(&parent_name).await?;
        }

        if exists {
            self.update(&item).await?;
        } else {
            self.insert(&item).await?;
        }

        Ok(item)
    }

    async fn exists(&self, item: &ParkItem) -> Result<bool, ScrapeError> {
        let row = sqlx::query("SELECT count(park_name) AS park_count FROM parks WHERE park_name = $1")
            .bind(&item.park_name)
            .fetch_one(&self.pool)
            .await?;

        let park_count: i64 = row.get("park_count");
        Ok(park_count > 0)
    }

    async fn park_id(&self, park_name: &str) -> Result<Option<i32>, ScrapeError> {
        let row = sqlx::query("SELECT park_id FROM parks WHERE park_name = $1")
            .bind(park_name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get("park_id")))
    }

    /// Look up the drive duration from the reference city. Lookup failures
    /// leave the cache entry absent; they never fail the item.
    async fn set_reference_travel_time(&self, item: &mut ParkItem) {
        debug!("Finding distance to {}. {}", REFERENCE_ORIGIN_LABEL, item.park_name);

        let destination = park_destination(&item.park_name);
        match self.distance.duration_text(REFERENCE_ORIGIN, &destination).await {
            Ok(Some(text)) => {
                item.travel_times
                    .insert(REFERENCE_ORIGIN_LABEL.to_string(), text);
            }
            Ok(None) => {
                warn!(
                    "Could not find distance from {}. Park: {}",
                    REFERENCE_ORIGIN_LABEL, item.park_name
                );
            }
            Err(err) => {
                warn!(
                    "Distance lookup failed for {}: {}",
                    item.park_name, err
                );
            }
        }
    }

    async fn update(&self, item: &ParkItem) -> Result<(), ScrapeError> {
        debug!("Updating existing park. {}", item.park_name);

        sqlx::query(
            r#"
            UPDATE parks
            SET activities = $1,
                facilities = $2,
                usages = $3,
                operating_date_from = $4,
                operating_date_to = $5
            WHERE park_name = $6
            "#,
        )
        .bind(Json(&item.activities))
        .bind(Json(&item.facilities))
        .bind(&item.usages)
        .bind(item.operating_date_from)
        .bind(item.operating_date_to)
        .bind(&item.park_name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert(&self, item: &ParkItem) -> Result<(), ScrapeError> {
        debug!("Inserting new park. {}", item.park_name);

        sqlx::query(
            r#"
            INSERT INTO parks (
                park_name, activities, facilities, travel_times,
                usages, operating_date_from, operating_date_to, parent_park_id
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&item.park_name)
        .bind(Json(&item.activities))
        .bind(Json(&item.facilities))
        .bind(Json(&item.travel_times))
        .bind(&item.usages)
        .bind(item.operating_date_from)
        .bind(item.operating_date_to)
        .bind(item.parent_park_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_names_the_provincial_park() {
        assert_eq!(
            park_destination("Killarney"),
            "Killarney Provincial Park, Ontario, Canada"
        );
    }
}
