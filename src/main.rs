use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use dotenv::dotenv;
use slidesync_server::{configure_routes, AppError, AppState, Settings};
use std::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> slidesync_server::Result<()> {
    // Load environment variables
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    let config = Settings::new()?;
    info!("Configuration loaded successfully ({})", config.environment);

    let state = AppState::new(config.clone()).await?;

    let ws_listener =
        tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.ws_port)).await?;
    info!(
        "WebSocket sync server accepting connections at ws://{}",
        ws_listener.local_addr()?
    );
    tokio::spawn(state.ws_server.clone().serve(ws_listener));

    let listener = TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))?;
    info!("Starting HTTP server at http://{}", listener.local_addr()?);

    let cors_config = config.cors.clone();
    let app_state = web::Data::new(state.clone());

    HttpServer::new(move || {
        let cors = if cors_config.enabled && cors_config.allow_any_origin {
            Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .max_age(cors_config.max_age as usize)
        } else if cors_config.enabled {
            Cors::default()
                .allowed_origin("http://localhost:3000")
                .allowed_origin("http://127.0.0.1:3000")
                .allowed_methods(vec!["GET", "POST", "DELETE"])
                .allowed_headers(vec!["Content-Type"])
                .max_age(cors_config.max_age as usize)
        } else {
            // CORS disabled - use most restrictive settings
            Cors::default()
        };

        App::new()
            .wrap(cors)
            .app_data(app_state.clone())
            .configure(configure_routes)
    })
    .listen(listener)?
    .workers(config.server.workers as usize)
    .run()
    .await
    .map_err(|e| AppError::InternalError(e.to_string()))?;

    state.shutdown().await?;
    info!("Server stopped");

    Ok(())
}
