mod db;
mod event;
mod routes;
mod services;
mod state;
mod validate;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()
        .expect("invalid PORT");

    let pool = db::init_pool(&database_url)
        .await
        .expect("database init failed");

    let sessions = services::session::SessionManager::new(std::sync::Arc::new(
        services::session::PgSessionStore::new(pool.clone()),
    ));
    let state = state::AppState::new(pool, sessions);

    if state.admin_key.is_some() {
        tracing::info!("admin surface enabled");
    } else {
        tracing::warn!("ADMIN_API_KEY not set — admin surface disabled");
    }

    // Spawn background tasks: the 1 s trial ticker and the 60 s sweeper.
    let _ticker = services::trial::spawn_trial_ticker(state.clone());
    let _sweeper = services::sweeper::spawn_sweeper(state.clone());

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "vitrine listening");
    axum::serve(listener, app).await.expect("server failed");
}
