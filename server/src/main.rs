mod db;
mod routes;
mod services;
mod state;

use std::sync::Arc;

use services::auth::PgAuthenticator;
use services::store::PgDocumentStore;

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

    let state = state::AppState::new(
        Arc::new(PgDocumentStore::new(pool.clone())),
        Arc::new(PgAuthenticator::new(pool)),
    );

    // Spawn background document persistence.
    let _flush = services::store::spawn_flush_task(state.clone());

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "sync server listening");
    axum::serve(listener, app).await.expect("server failed");
}
