//! Server binary: default in-process wiring, suitable for development and
//! integration testing. Production swaps the backends for real services.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;

use lexrag::Settings;
use lexrag::embed::HashedEmbedder;
use lexrag::stores::{MemoryDocumentStore, MemoryKvStore, MemoryQueryLog, MemoryVectorStore};

use lexrag_server::llm::EchoLlm;
use lexrag_server::{AppState, Backends, router};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let settings = Settings::from_env();
    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|err| tracing::warn!(error = %err, "metrics recorder not installed"))
        .ok();

    let kv_connections = settings.kv_max_connections;
    let state = AppState::new(
        settings,
        Backends {
            embedder: Arc::new(HashedEmbedder::default()),
            vectors: Arc::new(MemoryVectorStore::new()),
            kv: Arc::new(MemoryKvStore::new(kv_connections)),
            documents: Arc::new(MemoryDocumentStore::new()),
            query_log: Arc::new(MemoryQueryLog::new()),
            llm: Arc::new(EchoLlm),
            ocr: None,
            pii_detector: None,
        },
        prometheus,
    );

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8000")
        .await
        .expect("binding 0.0.0.0:8000");
    tracing::info!("listening on 0.0.0.0:8000");
    axum::serve(listener, router(state))
        .await
        .expect("server run");
}
