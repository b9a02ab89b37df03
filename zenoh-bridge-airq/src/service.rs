//! Zenoh query front-end for the sensor hub.
//!
//! Consumers `get` on `<prefix>/<address>/<metric>` and receive the latest
//! fresh [`SensorValue`], or an error reply while none is available. Querying
//! a device registers it, so the first query for a new address will normally
//! be answered "not ready" and later ones with data once the next cycle has
//! read it. Devices can also be registered without querying by putting their
//! address on `<prefix>/@/register`.

use airq_common::{Format, SensorKeyBuilder, SensorValue, encode, parse_sensor_key};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};
use zenoh::Session;
use zenoh::query::Query;
use zenoh::sample::{Sample, SampleKind};

use crate::hub::SensorHub;

/// Reasons a sensor query cannot be answered with a value.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Invalid sensor key: {0}")]
    InvalidKey(String),
    #[error("sensor is not ready yet")]
    NotReady,
    #[error("Failed to encode reply: {0}")]
    Encode(String),
}

/// Resolve one sensor query against the hub.
///
/// A well-formed key registers its device before the cache is consulted.
pub fn answer(hub: &SensorHub, prefix: &str, key: &str) -> Result<SensorValue, QueryError> {
    let parsed =
        parse_sensor_key(prefix, key).map_err(|e| QueryError::InvalidKey(e.to_string()))?;

    hub.add_address(parsed.address);

    hub.get_sensor_value(parsed.address, parsed.metric)
        .map(|reading| reading.to_sensor_value(parsed.address, parsed.metric))
        .ok_or(QueryError::NotReady)
}

/// Serves sensor queries and registration messages on a Zenoh session.
pub struct QueryService {
    session: Session,
    hub: SensorHub,
    keys: SensorKeyBuilder,
    format: Format,
}

impl QueryService {
    pub fn new(session: Session, hub: SensorHub, key_prefix: &str, format: Format) -> Self {
        Self {
            session,
            hub,
            keys: SensorKeyBuilder::with_prefix(key_prefix),
            format,
        }
    }

    /// Serve until `shutdown` turns `true` or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> airq_common::Result<()> {
        let sensors_key = self.keys.sensors_wildcard();
        let register_key = self.keys.register_key();

        let queryable = self.session.declare_queryable(&sensors_key).await?;
        let subscriber = self.session.declare_subscriber(&register_key).await?;

        info!(
            sensors = %sensors_key,
            register = %register_key,
            "Query service started"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutdown signal received, stopping query service");
                        break;
                    }
                }

                query = queryable.recv_async() => {
                    match query {
                        Ok(query) => self.handle_query(query).await,
                        Err(e) => {
                            warn!(error = %e, "Queryable closed");
                            break;
                        }
                    }
                }

                sample = subscriber.recv_async() => {
                    match sample {
                        Ok(sample) => self.handle_register(&sample),
                        Err(e) => {
                            warn!(error = %e, "Register subscriber closed");
                            break;
                        }
                    }
                }
            }
        }

        subscriber.undeclare().await?;
        queryable.undeclare().await?;

        info!("Query service stopped");
        Ok(())
    }

    async fn handle_query(&self, query: Query) {
        let key = query.key_expr().as_str().to_string();
        trace!(key = %key, "Sensor query");

        let reply = answer(&self.hub, self.keys.prefix(), &key).and_then(|value| {
            encode(&value, self.format).map_err(|e| QueryError::Encode(e.to_string()))
        });

        let sent = match reply {
            Ok(payload) => query.reply(query.key_expr().clone(), payload).await,
            Err(e) => {
                match &e {
                    QueryError::NotReady => debug!(key = %key, "Sensor is not ready yet"),
                    _ => warn!(key = %key, error = %e, "Rejected sensor query"),
                }
                query.reply_err(e.to_string()).await
            }
        };

        if let Err(e) = sent {
            warn!(key = %key, error = %e, "Failed to reply to query");
        }
    }

    fn handle_register(&self, sample: &Sample) {
        if sample.kind() == SampleKind::Delete {
            trace!(key = %sample.key_expr(), "Ignoring delete sample");
            return;
        }

        let payload = sample.payload().to_bytes();
        let raw = match std::str::from_utf8(&payload) {
            Ok(raw) => raw.trim(),
            Err(_) => {
                warn!(key = %sample.key_expr(), "Ignoring non UTF-8 registration");
                return;
            }
        };

        // Rejections are logged by the hub
        let _ = self.hub.add_device(raw);
    }
}
