use futures_util::future::join_all;
use gmaps::DistanceClient;
use sqlx::{PgPool, Row};
use tracing::{debug, warn};

use crate::availability_types::{ApiError, DateWindow, FreeCampSite, FreePark};

/// Destination string handed to the distance API for a park.
fn park_destination(park_name: &str) -> String {
    format!("{} Provincial Park, Ontario, Canada", park_name)
}

/// Round drive hours to one decimal for the API.
fn round_hours(hours: f64) -> f64 {
    (hours * 10.0).round() / 10.0
}

/// Whether a park stays in the free-parks response after drive-time
/// resolution. With a maximum requested, only parks whose resolved time
/// satisfies it are kept; an unresolvable time then excludes the park.
fn keep_park(resolved_hours: Option<f64>, max_hours: Option<f64>) -> bool {
    match (resolved_hours, max_hours) {
        (Some(hours), Some(max)) => hours <= max,
        (None, Some(_)) => false,
        (_, None) => true,
    }
}

/// Service answering the availability queries.
pub struct AvailabilityService {
    pool: PgPool,
}

impl AvailabilityService {
    /// Creates a new instance on the provided database connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Campsites of `park_name` with no reservation on any night of the
    /// window, ordered by zero-padded site number. Image names are joined
    /// from the image table and prefixed with `image_base_url`.
    pub async fn free_campsites(
        &self,
        window: DateWindow,
        park_name: &str,
        image_base_url: &str,
    ) -> Result<Vec<FreeCampSite>, ApiError> {
        let rows = sqlx::query(
            r#"
            SELECT
                c.campsite_id, c.park_name, c.parent_park_name, c.site_number,
                c.site_type, c.campground_name, c.details,
                array_remove(array_agg($4::text || ci.image_name), NULL) AS images
            FROM campsites c
            LEFT OUTER JOIN campsite_images ci ON ci.campsite_id = c.campsite_id
            WHERE c.park_name = $3
              AND c.campsite_id NOT IN (
                SELECT r.campsite_id
                FROM reservations r
                WHERE r.reserve_date BETWEEN $1 AND $2
              )
            GROUP BY c.campsite_id
            ORDER BY c.park_name, LPAD(c.site_number, 3, '0')
            "#,
        )
        .bind(window.first_night)
        .bind(window.last_night)
        .bind(park_name)
        .bind(image_base_url)
        .fetch_all(&self.pool)
        .await?;

        let campsites = rows
            .into_iter()
            .map(|row| FreeCampSite {
                campsite_id: row.get("campsite_id"),
                park_name: row.get("park_name"),
                parent_park_name: row.get("parent_park_name"),
                site_number: row.get("site_number"),
                site_type: row.get("site_type"),
                campground_name: row.get("campground_name"),
                details: row.get("details"),
                images: row.get("images"),
            })
            .collect();

        Ok(campsites)
    }

    /// Parks with at least one free campsite in the window, with drive
    /// hours from `origin`. Parks lacking a cached drive time get a live
    /// lookup (parallel across parks); resolved times are saved back.
    /// `max_hours` filters on the resolved time when given.
    pub async fn free_parks(
        &self,
        window: DateWindow,
        origin: Option<&str>,
        max_hours: Option<f64>,
        distance: &DistanceClient,
    ) -> Result<Vec<FreePark>, ApiError> {
        let mut parks = self.free_park_rows(window, origin, max_hours).await?;

        if let Some(origin) = origin {
            parks = self
                .backfill_drive_hours(parks, origin, max_hours, distance)
                .await?;
        }

        parks.sort_by(|a, b| a.park_name.cmp(&b.park_name));
        for park in &mut parks {
            park.drive_hours = park.drive_hours.map(round_hours);
        }

        Ok(parks)
    }

    /// The SQL side of the free-parks query. Parks whose cached time
    /// exceeds the maximum are dropped here; parks with no cached time
    /// survive for the lookup pass.
    async fn free_park_rows(
        &self,
        window: DateWindow,
        origin: Option<&str>,
        max_hours: Option<f64>,
    ) -> Result<Vec<FreePark>, ApiError> {
        let rows = sqlx::query(
            r#"
            SELECT
                p.park_id, p.park_name,
                count(c.campsite_id) AS free_campsites, dh.drive_hours
            FROM parks p
            JOIN campsites c ON c.park_id = p.park_id
            LEFT OUTER JOIN park_drive_hours dh
                ON dh.park_id = p.park_id AND dh.origin = $3
            WHERE c.campsite_id NOT IN (
                SELECT r.campsite_id
                FROM reservations r
                WHERE r.reserve_date BETWEEN $1 AND $2
              )
              AND (dh.drive_hours <= coalesce($4, dh.drive_hours)
                   OR dh.drive_hours IS NULL)
            GROUP BY p.park_id, p.park_name, dh.drive_hours
            ORDER BY p.park_name
            "#,
        )
        .bind(window.first_night)
        .bind(window.last_night)
        .bind(origin)
        .bind(max_hours)
        .fetch_all(&self.pool)
        .await?;

        let parks = rows
            .into_iter()
            .map(|row| FreePark {
                park_id: row.get("park_id"),
                park_name: row.get("park_name"),
                free_campsites: row.get("free_campsites"),
                drive_hours: row.get("drive_hours"),
            })
            .collect();

        Ok(parks)
    }

    /// Resolve drive hours for parks without a cached time. Lookups run in
    /// parallel; resolved times are persisted one at a time. A park is kept
    /// when its resolved time satisfies the maximum, or when no maximum was
    /// requested.
    async fn backfill_drive_hours(
        &self,
        parks: Vec<FreePark>,
        origin: &str,
        max_hours: Option<f64>,
        distance: &DistanceClient,
    ) -> Result<Vec<FreePark>, ApiError> {
        let lookups = parks.iter().map(|park| async move {
            match park.drive_hours {
                Some(hours) => Ok(Some(hours)),
                None => {
                    debug!("No cached drive time. {} from {}", park.park_name, origin);
                    let time = distance
                        .drive_time(origin, &park_destination(&park.park_name))
                        .await?;
                    Ok::<_, ApiError>(time.map(|t| t.num_minutes() as f64 / 60.0))
                }
            }
        });
        let resolved = join_all(lookups).await;

        let mut kept = Vec::with_capacity(parks.len());
        for (mut park, hours) in parks.into_iter().zip(resolved) {
            let hours = hours?;

            if park.drive_hours.is_none() {
                if let Some(hours) = hours {
                    self.save_drive_hours(park.park_id, origin, hours).await?;
                } else {
                    warn!("Could not resolve drive time. {}", park.park_name);
                }
            }
            park.drive_hours = hours;

            if keep_park(hours, max_hours) {
                kept.push(park);
            }
        }

        Ok(kept)
    }

    async fn save_drive_hours(
        &self,
        park_id: i32,
        origin: &str,
        hours: f64,
    ) -> Result<(), ApiError> {
        debug!("Caching drive time. Park id: {}. {:.1} hours", park_id, hours);

        sqlx::query(
            r#"
            INSERT INTO park_drive_hours (park_id, origin, drive_hours)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(park_id)
        .bind(origin)
        .bind(hours)
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

    #[test]
    fn hours_round_to_one_decimal() {
        assert_eq!(round_hours(2.25), 2.3);
        assert_eq!(round_hours(2.24), 2.2);
        assert_eq!(round_hours(3.0), 3.0);
    }

    #[test]
    fn resolved_time_is_checked_against_the_maximum() {
        assert!(keep_park(Some(2.5), Some(3.0)));
        assert!(keep_park(Some(3.0), Some(3.0)));
        assert!(!keep_park(Some(3.1), Some(3.0)));
    }

    #[test]
    fn unresolvable_time_is_excluded_when_a_maximum_is_requested() {
        assert!(!keep_park(None, Some(3.0)));
    }

    #[test]
    fn without_a_maximum_every_park_is_kept() {
        assert!(keep_park(Some(9.5), None));
        assert!(keep_park(None, None));
    }
}
