use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use eventstore_bin::{
    aggregate_type, backend_name, batch_size, database_pool_size, log_and_subscribe,
    poll_limit_seconds, subscription_name,
};
use eventstore_client::Client;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            running.store(false, Ordering::Relaxed);
        });
    }

    let backend = backend_name();
    let sub_name = subscription_name();
    let agg_type = aggregate_type();
    let batch = batch_size();
    let poll = poll_limit_seconds();

    info!(
        %backend,
        subscription_name = %sub_name,
        aggregate_type = %agg_type,
        batch_size = batch,
        "starting EventStore subscription demo"
    );

    match backend.as_str() {
        "memory" => {
            let store = eventstore_backend_memory::InMemoryStore::new();
            let client = Client::new(store);
            client.setup_tables().await?;
            log_and_subscribe(&client, &sub_name, &agg_type, batch, poll, &running).await?;
        }
        "postgres" => {
            let url = env::var("DATABASE_URL")
                .context("DATABASE_URL must be set when BACKEND=postgres")?;
            let pool_size = database_pool_size();
            let store = eventstore_backend_postgres::PostgresStore::connect_with_max_connections(
                &url, pool_size,
            )
            .await?;
            let client = Client::new(store);
            client.setup_tables().await?;
            log_and_subscribe(&client, &sub_name, &agg_type, batch, poll, &running).await?;
        }
        other => anyhow::bail!("unsupported BACKEND '{}'. Supported: memory, postgres", other),
    }

    Ok(())
}
