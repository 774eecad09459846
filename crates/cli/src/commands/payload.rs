//! Order payload commands.
//!
//! # Usage
//!
//! ```bash
//! # Validate a payload the way the service will
//! oc-cli check fixtures/model.json
//!
//! # Publish it to the orders subject
//! oc-cli publish fixtures/model.json
//!
//! # Publish without validating (e.g. to exercise the malformed path)
//! oc-cli publish --skip-check broken.json
//! ```
//!
//! # Environment Variables
//!
//! `publish` reads the `NATS_*` variables described in the service config.

use std::path::Path;

use order_cache_core::{Order, decode_order};
use order_cache_service::BusConfig;
use order_cache_service::bus::NatsPublisher;
use tracing::{info, warn};

/// Read a payload file.
async fn read_payload(path: &Path) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| format!("Cannot read {}: {e}", path.display()).into())
}

fn summarize(order: &Order) {
    info!(
        order_uid = %order.order_uid,
        items = order.items.len(),
        amount = order.payment.amount,
        currency = %order.payment.currency,
        "Payload is a valid order"
    );
}

/// Decode and validate a payload file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a valid order.
pub async fn check(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let payload = read_payload(path).await?;
    let order = decode_order(&payload)?;
    summarize(&order);
    Ok(())
}

/// Publish a payload file to the orders subject.
///
/// # Errors
///
/// Returns an error if the file is unreadable, fails validation (unless
/// `skip_check`), or the bus rejects it.
pub async fn publish(path: &Path, skip_check: bool) -> Result<(), Box<dyn std::error::Error>> {
    let payload = read_payload(path).await?;

    if skip_check {
        warn!("Publishing without validation");
    } else {
        summarize(&decode_order(&payload)?);
    }

    let config = BusConfig::load()?;
    info!(url = %config.redacted_url(), subject = %config.subject, "Connecting to NATS");

    let publisher = NatsPublisher::connect(&config).await?;
    publisher.publish(payload).await?;
    publisher.close().await?;

    info!(path = %path.display(), "Payload published");
    Ok(())
}
