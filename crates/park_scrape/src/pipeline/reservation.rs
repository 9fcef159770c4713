use sqlx::{PgPool, Row};
use tracing::{debug, info};

use crate::items::ReservationItem;
use crate::ScrapeError;

/// Map a scraped status string onto the stored vocabulary. The site labels
/// a bookable date with a `"Reserve!"` link; everything else passes through.
pub fn normalize_status(raw: &str) -> &str {
    match raw {
        "Reserve!" => "Available",
        other => other,
    }
}

/// What the persistor will do with one (site, date) observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationAction {
    /// Date is available and no row exists: nothing to record.
    Ignore,
    /// Date is taken and no row exists: insert one.
    Insert,
    /// Date is taken and a row exists: update its reason.
    Update,
    /// Date became available again: delete the stored row.
    Delete,
}

/// Decide the reconciliation action from the stored row (if any) and the
/// normalized status. Row absence is the authoritative "available" signal.
pub fn reconcile(existing_id: Option<i32>, reason: &str) -> ReservationAction {
    match (existing_id, reason) {
        (None, "Available") => ReservationAction::Ignore,
        (None, _) => ReservationAction::Insert,
        (Some(_), "Available") => ReservationAction::Delete,
        (Some(_), _) => ReservationAction::Update,
    }
}

/// Reconciles one scraped availability observation against the database.
pub struct ReservationPersistor {
    pool: PgPool,
}

impl ReservationPersistor {
    /// Create a persistor on the shared pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the decision table for one observation. Observations for sites
    /// the campsite crawl has not seen yet are discarded with a log line.
    pub async fn save(&self, mut item: ReservationItem) -> Result<ReservationItem, ScrapeError> {
        let campsite_id = self.campsite_id(&item).await?;

        let Some(campsite_id) = campsite_id else {
            info!(
                "Campsite not found. Park name: {}. Site number: {}.",
                item.park_name, item.site_number
            );
            return Ok(item);
        };
        item.campsite_id = Some(campsite_id);

        let reservation_id = self.reservation_id(campsite_id, &item).await?;
        let reason = normalize_status(&item.reason).to_string();

        match reconcile(reservation_id, &reason) {
            ReservationAction::Ignore => {
                debug!(
                    "Not inserting reservation for available date. Park name: {}. Site number: {}.",
                    item.park_name, item.site_number
                );
            }
            ReservationAction::Insert => {
                debug!(
                    "Inserting new reservation. Park name: {}. Site number: {}. Status: {}",
                    item.park_name, item.site_number, reason
                );
                sqlx::query(
                    r#"
                    INSERT INTO reservations (campsite_id, reserve_date, reason)
                    VALUES ($1, $2, $3)
                    "#,
                )
                .bind(campsite_id)
                .bind(item.reserve_date)
                .bind(&reason)
                .execute(&self.pool)
                .await?;
            }
            ReservationAction::Update => {
                debug!(
                    "Updating existing reservation. Park name: {}. Site number: {}. Status: {}",
                    item.park_name, item.site_number, reason
                );
                sqlx::query("UPDATE reservations SET reason = $1 WHERE reservation_id = $2")
                    .bind(&reason)
                    .bind(reservation_id)
                    .execute(&self.pool)
                    .await?;
            }
            ReservationAction::Delete => {
                debug!(
                    "Removing reservation that is now available. Park name: {}. Site number: {}",
                    item.park_name, item.site_number
                );
                sqlx::query("DELETE FROM reservations WHERE reservation_id = $1")
                    .bind(reservation_id)
                    .execute(&self.pool)
                    .await?;
            }
        }

        item.reason = reason;
        Ok(item)
    }

    async fn campsite_id(&self, item: &ReservationItem) -> Result<Option<i32>, ScrapeError> {
        let row = sqlx::query(
            "SELECT campsite_id FROM campsites WHERE park_name = $1 AND site_number = $2",
        )
        .bind(&item.park_name)
        .bind(&item.site_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get("campsite_id")))
    }

    async fn reservation_id(
        &self,
        campsite_id: i32,
        item: &ReservationItem,
    ) -> Result<Option<i32>, ScrapeError> {
        let row = sqlx::query(
            r#"
            SELECT reservation_id
            FROM reservations
            WHERE campsite_id = $1 AND reserve_date = $2
            "#,
        )
        .bind(campsite_id)
        .bind(item.reserve_date)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get("reservation_id")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_link_means_available() {
        assert_eq!(normalize_status("Reserve!"), "Available");
        assert_eq!(normalize_status("Unavailable"), "Unavailable");
        assert_eq!(normalize_status("On Hold"), "On Hold");
    }

    #[test]
    fn available_date_with_no_row_is_ignored() {
        assert_eq!(reconcile(None, "Available"), ReservationAction::Ignore);
    }

    #[test]
    fn taken_date_with_no_row_is_inserted() {
        assert_eq!(reconcile(None, "Unavailable"), ReservationAction::Insert);
    }

    #[test]
    fn freed_date_deletes_the_row() {
        assert_eq!(reconcile(Some(3), "Available"), ReservationAction::Delete);
    }

    #[test]
    fn changed_status_updates_the_row() {
        assert_eq!(reconcile(Some(3), "On Hold"), ReservationAction::Update);
    }
}
