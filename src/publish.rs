//! Run lifecycle event publishing, compiled in with the `publish` feature.
//!
//! When the `publish` feature is enabled, events are sent to RabbitMQ via the
//! `awful_publish` crate. When disabled, [`init`] returns `false` and the
//! [`publish_info!`] and [`publish_error!`] macros expand to empty blocks, so
//! the pipeline calls them unconditionally without `#[cfg]` noise.
//!
//! Events bypass the tracing subscriber entirely; structured logs are
//! unaffected by whether the bus is up.
//!
//! # Events Published
//!
//! | Event Kind | Description |
//! |------------|-------------|
//! | `run.started` | A tracker run began for a source |
//! | `fetch.completed` | Feeds read; count of new links |
//! | `drain.completed` | Pending queue drained; summarized and failed counts |
//! | `notify.completed` | Notification step finished with its outcome |
//! | `run.completed` | Run finished and the cutoff record was advanced |
//! | `run.failed` | Run aborted (unknown source, cutoff write failure) |
//!
//! # Usage
//!
//! ```ignore
//! publish::init(Some(&"amqp://localhost:5672".to_string()), "events").await;
//!
//! publish_info!(
//!     "feed_digest",
//!     event_kind = "run.started",
//!     source = "OpenAI",
//!     "Tracker run starting"
//! );
//! ```
//!
//! Enable with: `cargo build --features publish` (requires access to the
//! private `awful_publish` repository).

/// Connect to the message bus.
///
/// Returns `true` when publishing is live. A connection failure is logged and
/// the run proceeds without events.
#[cfg(feature = "publish")]
pub async fn init(amqp_url: Option<&String>, exchange: &str) -> bool {
    use awful_publish::BusConfig;
    use tracing::{info, warn};

    let Some(url) = amqp_url else {
        return false;
    };
    let config = BusConfig::new(url.clone(), exchange.to_string());
    match awful_publish::init_global(config).await {
        Ok(_) => {
            info!(%exchange, "Message bus initialized");
            true
        }
        Err(e) => {
            warn!(error = %e, "Failed to initialize message bus; continuing without event publishing");
            false
        }
    }
}

/// Connect to the message bus (no-op when `publish` feature is disabled).
#[cfg(not(feature = "publish"))]
pub async fn init(_amqp_url: Option<&String>, _exchange: &str) -> bool {
    false
}

/// Publish an info-level event.
///
/// ```ignore
/// publish_info!(service, field1 = value1, field2 = value2, "message");
/// ```
#[cfg(feature = "publish")]
#[macro_export]
macro_rules! publish_info {
    ($service:expr, $($($k:ident).+ = $val:expr),+ , $msg:literal) => {
        awful_publish::publish(
            $service,
            tracing::Level::INFO,
            $msg,
            vec![$(
                (stringify!($($k).+), serde_json::json!($val)),
            )+],
        )
    };
    ($service:expr, $msg:literal) => {
        awful_publish::publish($service, tracing::Level::INFO, $msg, vec![])
    };
}

/// Publish an info-level event (no-op when `publish` feature is disabled).
#[cfg(not(feature = "publish"))]
#[macro_export]
macro_rules! publish_info {
    ($service:expr, $($tt:tt)*) => {};
}

/// Publish an error-level event.
#[cfg(feature = "publish")]
#[macro_export]
macro_rules! publish_error {
    ($service:expr, $($($k:ident).+ = $val:expr),+ , $msg:literal) => {
        awful_publish::publish(
            $service,
            tracing::Level::ERROR,
            $msg,
            vec![$(
                (stringify!($($k).+), serde_json::json!($val)),
            )+],
        )
    };
    ($service:expr, $msg:literal) => {
        awful_publish::publish($service, tracing::Level::ERROR, $msg, vec![])
    };
}

/// Publish an error-level event (no-op when `publish` feature is disabled).
#[cfg(not(feature = "publish"))]
#[macro_export]
macro_rules! publish_error {
    ($service:expr, $($tt:tt)*) => {};
}
