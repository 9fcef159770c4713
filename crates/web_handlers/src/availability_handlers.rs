use actix_web::{web, HttpResponse, Result};
use gmaps::DistanceClient;
use settings::ApiSettings;

use crate::availability_service::AvailabilityService;
use crate::availability_types::*;

/// Free campsites of one park for a stay window.
pub async fn free_campsites(
    pool: web::Data<sqlx::PgPool>,
    api: web::Data<ApiSettings>,
    path: web::Path<String>,
    query: web::Query<FreeCampSitesQuery>,
) -> Result<HttpResponse, ApiError> {
    let window = DateWindow::parse(&query.start_date, &query.end_date)?;
    let park_name = path.into_inner();

    let service = AvailabilityService::new(pool.get_ref().clone());
    let campsites = service
        .free_campsites(window, &park_name, &api.image_base_url)
        .await?;

    Ok(HttpResponse::Ok().json(DataEnvelope { data: campsites }))
}

/// Parks with free campsites for a stay window, with drive times from the
/// requested origin and an optional maximum drive filter.
pub async fn free_parks(
    pool: web::Data<sqlx::PgPool>,
    distance: web::Data<DistanceClient>,
    query: web::Query<FreeParksQuery>,
) -> Result<HttpResponse, ApiError> {
    let window = DateWindow::parse(&query.start_date, &query.end_date)?;
    let max_hours = max_drive_hours(query.drive_hours);

    let service = AvailabilityService::new(pool.get_ref().clone());
    let parks = service
        .free_parks(
            window,
            query.from_place.as_deref(),
            max_hours,
            distance.get_ref(),
        )
        .await?;

    Ok(HttpResponse::Ok().json(DataEnvelope { data: parks }))
}
