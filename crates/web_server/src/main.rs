//! Main entry point for the Park Watch API server.
//! Serves the read-only park and campsite availability endpoints.

use actix_web::middleware::{DefaultHeaders, Logger};
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use clap::Parser;
use gmaps::DistanceClient;
use postgres::database::*;
use settings::Settings;
use web_handlers::*;

/// Read-only availability API over the scraped park database.
#[derive(Debug, Parser)]
#[command(name = "web_server")]
struct Args {
    /// Path to the settings file.
    #[arg(short, long, default_value = "config.toml")]
    config: std::path::PathBuf,
}

/// Catch-all for unmatched routes. Browsers preflight with OPTIONS against
/// arbitrary paths, so those get an empty 200 with the CORS headers.
async fn not_found(req: HttpRequest) -> HttpResponse {
    if req.method() == actix_web::http::Method::OPTIONS {
        HttpResponse::Ok().finish()
    } else {
        HttpResponse::NotFound().json(serde_json::json!({
            "error": "not_found",
            "message": "No such route"
        }))
    }
}

fn cors_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add(("Access-Control-Allow-Origin", "*"))
        .add(("Access-Control-Allow-Methods", "POST,GET,DELETE,PUT,OPTIONS"))
        .add((
            "Access-Control-Allow-Headers",
            "Origin, Content-Type, Accept, Authorization",
        ))
        .add(("Access-Control-Allow-Credentials", "true"))
        .add(("Access-Control-Max-Age", "1728000"))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let args = Args::parse();
    let settings = match Settings::from_file(&args.config) {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("Failed to load settings: {:#}", e);
            std::process::exit(1);
        }
    };

    log::info!("Starting park watch API server...");

    let pool = match create_connection_pool(&settings.db, settings.api.min_connections).await {
        Ok(pool) => {
            log::info!("Database pool created successfully");

            if let Err(e) = test_connection(&pool).await {
                log::error!("Database connection test failed: {}", e);
            }
            pool
        }
        Err(e) => {
            log::error!("Failed to create database pool: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run_migrations(&pool).await {
        log::error!("Failed to run migrations: {}", e);
        std::process::exit(1);
    }

    let distance = match DistanceClient::new(settings.gmaps.apikey.clone()) {
        Ok(client) => web::Data::new(client),
        Err(e) => {
            log::error!("Failed to create distance client: {}", e);
            std::process::exit(1);
        }
    };

    let bind_address = settings.api.bind_address.clone();
    let api_settings = web::Data::new(settings.api.clone());
    log::info!("Server will be available at: http://{}", bind_address);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(pool.clone()))
            .app_data(distance.clone())
            .app_data(api_settings.clone())
            .wrap(Logger::default())
            .wrap(cors_headers())
            .route("/parks/free", web::get().to(free_parks))
            .route(
                "/parks/{park_name}/campsites/free",
                web::get().to(free_campsites),
            )
            .default_service(web::route().to(not_found))
    })
    .bind(&bind_address)?
    .run()
    .await
}
