//! Conflating telemetry subscriber.
//!
//! A background reader task dials the publisher, decodes frames and stores
//! only the newest message.  When the connection drops (or was never
//! established) it redials every [`RECONNECT_INTERVAL`].  [`receive`]
//! samples whatever arrived since the previous call.
//!
//! [`receive`]: TelemetrySubscriber::receive

use std::time::Duration;

use futures_util::StreamExt;
use metaball_types::{MetaballError, TelemetryMessage};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, trace, warn};

use crate::endpoint::Endpoint;
use crate::frame_codec;
use crate::wire;

pub const RECONNECT_INTERVAL: Duration = Duration::from_millis(100);

pub struct TelemetrySubscriber {
    endpoint: Endpoint,
    timeout_ms: u64,
    latest: watch::Receiver<Option<TelemetryMessage>>,
    reader: JoinHandle<()>,
}

impl TelemetrySubscriber {
    /// Start reading from `address`.  Succeeds even when no publisher is
    /// listening yet.
    ///
    /// # Errors
    ///
    /// [`MetaballError::Configuration`] for a malformed address.
    pub async fn connect(address: &str, timeout_ms: u64) -> Result<Self, MetaballError> {
        let endpoint: Endpoint = address.parse()?;
        let (tx, latest) = watch::channel(None);
        let reader = tokio::spawn(read_loop(endpoint.clone(), tx));
        info!(endpoint = %endpoint, timeout_ms, "telemetry subscriber started");
        Ok(Self {
            endpoint,
            timeout_ms,
            latest,
            reader,
        })
    }

    /// Wait up to the configured timeout for a message newer than the last
    /// one returned.
    ///
    /// # Errors
    ///
    /// * [`MetaballError::Timeout`] when nothing new arrived in time.
    /// * [`MetaballError::Transport`] when the reader task has stopped.
    pub async fn receive(&mut self) -> Result<TelemetryMessage, MetaballError> {
        let deadline = Duration::from_millis(self.timeout_ms);
        match tokio::time::timeout(deadline, self.latest.changed()).await {
            Err(_) => Err(MetaballError::Timeout(self.timeout_ms)),
            Ok(Err(_)) => Err(MetaballError::Transport(format!(
                "reader for {} stopped",
                self.endpoint
            ))),
            Ok(Ok(())) => self.latest.borrow_and_update().clone().ok_or_else(|| {
                MetaballError::Transport("reader published an empty slot".to_string())
            }),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }
}

impl Drop for TelemetrySubscriber {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(endpoint: Endpoint, tx: watch::Sender<Option<TelemetryMessage>>) {
    let addr = endpoint.connect_addr();
    while !tx.is_closed() {
        match TcpStream::connect(&addr).await {
            Ok(stream) => {
                debug!(endpoint = %endpoint, "connected to publisher");
                let mut frames = FramedRead::new(stream, frame_codec());
                while let Some(frame) = frames.next().await {
                    match frame {
                        Ok(bytes) => match wire::decode(&bytes) {
                            Ok(msg) => {
                                if tx.send(Some(msg)).is_err() {
                                    return;
                                }
                            }
                            Err(e) => warn!(endpoint = %endpoint, error = %e, "dropping undecodable frame"),
                        },
                        Err(e) => {
                            debug!(endpoint = %endpoint, error = %e, "read failed");
                            break;
                        }
                    }
                }
                debug!(endpoint = %endpoint, "publisher connection closed");
            }
            Err(e) => trace!(endpoint = %endpoint, error = %e, "connect failed"),
        }
        tokio::time::sleep(RECONNECT_INTERVAL).await;
    }
}
