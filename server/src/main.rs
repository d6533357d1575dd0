mod config;
mod routes;
mod services;
mod state;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = config::Config::from_env();
    let port = config.port;
    tracing::info!(
        quorum = config.ready_quorum,
        countdown = ?config.load_countdown,
        "wall session configured"
    );

    let state = state::AppState::new(config);

    // Drives the Loading countdown and the optional play timer.
    let _ticker = services::session::spawn_session_ticker(state.clone());

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "spraywall listening");
    axum::serve(listener, app).await.expect("server failed");
}
