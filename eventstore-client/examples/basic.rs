use eventstore_client::Client;
use eventstore_core::{LoadStreamOptions, NewEvent};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let client = Client::new(eventstore_backend_memory::InMemoryStore::new());
    client.setup_tables().await?;

    let stream_id = "Order-RS-1".to_string();

    client
        .append(
            "Order",
            &stream_id,
            vec![NewEvent::new(&stream_id, 1, "OrderCreated", json!({ "payload": "hello" }))],
        )
        .await?;

    let out = client
        .load_stream(&stream_id, LoadStreamOptions::default())
        .await?;

    println!("read count: {}", out.len());

    Ok(())
}
