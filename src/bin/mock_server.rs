//! Local chat endpoint serving the scripted producer over SSE

use pharmacy_chat::api::{create_router, AppState};
use pharmacy_chat::config::ChatConfig;
use pharmacy_chat::logging;
use pharmacy_chat::transport::{LoggingProducer, ScriptedProducer};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init("pharmacy_chat=info,tower_http=debug");

    let config = ChatConfig::from_env();
    let producer = LoggingProducer::new(Arc::new(ScriptedProducer::new(config.scripted_delay)));
    let state = AppState::new(Arc::new(producer));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.mock_port));
    tracing::info!(%addr, delay = ?config.scripted_delay, "Starting mock chat server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
