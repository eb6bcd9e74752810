use std::env;
use std::sync::atomic::AtomicBool;

use eventstore_client::Client;
use eventstore_core::{EventStore as EventStoreTrait, RecordedEvent};
use tracing::info;

pub const DEFAULT_SUBSCRIPTION_NAME: &str = "demo_sub";
pub const DEFAULT_AGGREGATE_TYPE: &str = "cats";
pub const DEFAULT_BATCH_SIZE: i64 = 10;
pub const DEFAULT_POLL_LIMIT_SECONDS: u64 = 2;
pub const DEFAULT_DATABASE_POOL_SIZE: u32 = 5;

/// Which `EventStore` impl to wire up. Each backend has its own
/// `EventStore::Session` type, so picking one here only decides which
/// concrete `Client<B>` `main` constructs; there is no single dyn-trait
/// object that can front both at once.
pub fn backend_name() -> String {
    env::var("BACKEND").unwrap_or_else(|_| "memory".to_string())
}

pub fn subscription_name() -> String {
    env::var("SUBSCRIPTION_NAME").unwrap_or_else(|_| DEFAULT_SUBSCRIPTION_NAME.to_string())
}

pub fn aggregate_type() -> String {
    env::var("AGGREGATE_TYPE").unwrap_or_else(|_| DEFAULT_AGGREGATE_TYPE.to_string())
}

pub fn batch_size() -> i64 {
    env::var("BATCH_SIZE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_BATCH_SIZE)
}

pub fn poll_limit_seconds() -> u64 {
    env::var("POLL_LIMIT_SECONDS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_POLL_LIMIT_SECONDS)
}

/// Only consulted when `BACKEND=postgres`.
pub fn database_pool_size() -> u32 {
    env::var("DATABASE_POOL_SIZE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_DATABASE_POOL_SIZE)
}

/// Logs every event of `aggregate_type` dispatched through
/// `subscription_name` and runs until `running` flips to `false`. Generic
/// over the backend: the handler never touches the session, so the same
/// closure type-checks for any `B`.
pub async fn log_and_subscribe<B: EventStoreTrait>(
    client: &Client<B>,
    subscription_name: &str,
    aggregate_type: &str,
    batch_size: i64,
    poll_limit_seconds: u64,
    running: &AtomicBool,
) -> anyhow::Result<()> {
    let handler = |_session: &mut B::Session, event: &RecordedEvent| async move {
        info!(
            event_id = event.id,
            aggregate_id = %event.aggregate_id,
            version = event.version,
            event_type = %event.event_type,
            "event"
        );
        Ok::<(), anyhow::Error>(())
    };

    client
        .subscribe(
            subscription_name,
            aggregate_type,
            &handler,
            batch_size,
            poll_limit_seconds,
            running,
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn set_env_and_get_prev(key: &str, val: Option<&str>) -> Option<String> {
        let prev = env::var(key).ok();
        match val {
            Some(v) => env::set_var(key, v),
            None => env::remove_var(key),
        }
        prev
    }

    fn restore_env(key: &str, prev: Option<String>) {
        match prev {
            Some(v) => env::set_var(key, v),
            None => env::remove_var(key),
        }
    }

    #[test]
    #[serial]
    fn backend_name_defaults_to_memory() {
        let prev = set_env_and_get_prev("BACKEND", None);
        assert_eq!(backend_name(), "memory");
        restore_env("BACKEND", prev);
    }

    #[test]
    #[serial]
    fn backend_name_reads_override() {
        let prev = set_env_and_get_prev("BACKEND", Some("postgres"));
        assert_eq!(backend_name(), "postgres");
        restore_env("BACKEND", prev);
    }

    #[test]
    #[serial]
    fn batch_size_parses_override() {
        let prev = set_env_and_get_prev("BATCH_SIZE", Some("25"));
        assert_eq!(batch_size(), 25);
        restore_env("BATCH_SIZE", prev);
    }

    #[test]
    #[serial]
    fn batch_size_falls_back_on_garbage() {
        let prev = set_env_and_get_prev("BATCH_SIZE", Some("not-a-number"));
        assert_eq!(batch_size(), DEFAULT_BATCH_SIZE);
        restore_env("BATCH_SIZE", prev);
    }

    #[test]
    #[serial]
    fn database_pool_size_defaults_when_unset() {
        let prev = set_env_and_get_prev("DATABASE_POOL_SIZE", None);
        assert_eq!(database_pool_size(), DEFAULT_DATABASE_POOL_SIZE);
        restore_env("DATABASE_POOL_SIZE", prev);
    }

    #[test]
    #[serial]
    fn database_pool_size_parses_override() {
        let prev = set_env_and_get_prev("DATABASE_POOL_SIZE", Some("16"));
        assert_eq!(database_pool_size(), 16);
        restore_env("DATABASE_POOL_SIZE", prev);
    }
}
