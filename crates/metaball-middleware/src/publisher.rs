//! Latest-value-wins telemetry publisher.
//!
//! The publisher holds exactly one pending frame in a [`tokio::sync::watch`]
//! channel.  Every accepted TCP connection gets its own writer task that
//! waits for the watched value to change and forwards the newest frame;
//! anything published while a writer is still busy with a previous frame is
//! superseded.  [`TelemetryPublisher::publish`] therefore never blocks and
//! never fails for lack of subscribers.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use futures_util::SinkExt;
use metaball_types::{MetaballError, TelemetryMessage};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::endpoint::Endpoint;
use crate::frame_codec;
use crate::wire;

pub struct TelemetryPublisher {
    endpoint: Endpoint,
    local_addr: SocketAddr,
    latest: watch::Sender<Option<Bytes>>,
    subscribers: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

impl TelemetryPublisher {
    /// Bind to `address` (`tcp://host:port`) and start accepting subscribers.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// * [`MetaballError::Configuration`] for a malformed address.
    /// * [`MetaballError::Transport`] when the listener cannot be bound.
    pub async fn bind(address: &str) -> Result<Self, MetaballError> {
        let endpoint: Endpoint = address.parse()?;
        let listener = TcpListener::bind(endpoint.bind_addr())
            .await
            .map_err(|e| MetaballError::Transport(format!("bind {endpoint}: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| MetaballError::Transport(format!("local address: {e}")))?;

        let (latest, _) = watch::channel(None);
        let subscribers = Arc::new(AtomicUsize::new(0));
        let shutdown = CancellationToken::new();

        tokio::spawn(accept_loop(
            listener,
            latest.clone(),
            Arc::clone(&subscribers),
            shutdown.clone(),
        ));

        info!(endpoint = %endpoint, local = %local_addr, "telemetry publisher bound");
        Ok(Self {
            endpoint,
            local_addr,
            latest,
            subscribers,
            shutdown,
        })
    }

    /// Stamp and publish one tick.
    pub fn publish(
        &self,
        image: Vec<u8>,
        pose: Vec<f32>,
        force: Vec<f32>,
        node: Vec<f32>,
    ) -> Result<(), MetaballError> {
        self.publish_message(&TelemetryMessage::now(image, pose, force, node))
    }

    /// Replace the pending frame with `msg`.
    ///
    /// Returns [`MetaballError::Transport`] only after [`close`](Self::close).
    pub fn publish_message(&self, msg: &TelemetryMessage) -> Result<(), MetaballError> {
        if self.shutdown.is_cancelled() {
            return Err(MetaballError::Transport(format!(
                "publisher on {} is closed",
                self.endpoint
            )));
        }
        self.latest.send_replace(Some(wire::encode(msg)));
        Ok(())
    }

    /// Number of currently attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load(Ordering::SeqCst)
    }

    /// The address actually bound; useful when binding port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Stop accepting and terminate every writer task.  Idempotent.
    pub fn close(&self) {
        if !self.shutdown.is_cancelled() {
            self.shutdown.cancel();
            info!(endpoint = %self.endpoint, "telemetry publisher closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Drop for TelemetryPublisher {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn accept_loop(
    listener: TcpListener,
    latest: watch::Sender<Option<Bytes>>,
    subscribers: Arc<AtomicUsize>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    // Subscribing marks the current frame as seen, so a new
                    // subscriber only gets frames published after this point.
                    let rx = latest.subscribe();
                    subscribers.fetch_add(1, Ordering::SeqCst);
                    debug!(peer = %peer, "subscriber attached");
                    tokio::spawn(write_loop(
                        stream,
                        peer,
                        rx,
                        Arc::clone(&subscribers),
                        shutdown.clone(),
                    ));
                }
                Err(e) => warn!(error = %e, "accept failed"),
            },
        }
    }
}

async fn write_loop(
    stream: TcpStream,
    peer: SocketAddr,
    mut rx: watch::Receiver<Option<Bytes>>,
    subscribers: Arc<AtomicUsize>,
    shutdown: CancellationToken,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(peer = %peer, error = %e, "set_nodelay failed");
    }
    let mut sink = FramedWrite::new(stream, frame_codec());

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let frame = rx.borrow_and_update().clone();
                let Some(frame) = frame else { continue };
                if let Err(e) = sink.send(frame).await {
                    debug!(peer = %peer, error = %e, "subscriber went away");
                    break;
                }
            }
        }
    }

    subscribers.fetch_sub(1, Ordering::SeqCst);
    debug!(peer = %peer, "subscriber detached");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriber::TelemetrySubscriber;
    use std::time::Duration;

    fn message(ts: f64) -> TelemetryMessage {
        TelemetryMessage {
            timestamp: ts,
            image: vec![0xFF, 0xD8, 0xFF, 0xD9],
            pose: vec![ts as f32; 6],
            force: vec![0.0; 6],
            node: vec![],
        }
    }

    async fn wait_for_subscribers(publisher: &TelemetryPublisher, n: usize) {
        for _ in 0..200 {
            if publisher.subscriber_count() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("subscriber never attached");
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() -> Result<(), Box<dyn std::error::Error>> {
        let publisher = TelemetryPublisher::bind("tcp://127.0.0.1:0").await?;
        assert_eq!(publisher.subscriber_count(), 0);
        publisher.publish(vec![1, 2, 3], vec![0.0; 6], vec![0.0; 6], vec![])?;
        publisher.publish_message(&message(1.0))?;
        Ok(())
    }

    #[tokio::test]
    async fn bind_rejects_unsupported_scheme() {
        let err = TelemetryPublisher::bind("ipc:///tmp/telemetry").await.err();
        assert!(matches!(err, Some(MetaballError::Configuration(_))));
    }

    #[tokio::test]
    async fn publish_after_close_fails() -> Result<(), Box<dyn std::error::Error>> {
        let publisher = TelemetryPublisher::bind("tcp://127.0.0.1:0").await?;
        publisher.close();
        publisher.close();
        assert!(publisher.is_closed());
        assert!(matches!(
            publisher.publish_message(&message(1.0)),
            Err(MetaballError::Transport(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn subscriber_receives_only_latest() -> Result<(), Box<dyn std::error::Error>> {
        let publisher = TelemetryPublisher::bind("tcp://127.0.0.1:0").await?;
        let address = format!("tcp://{}", publisher.local_addr());
        let mut subscriber = TelemetrySubscriber::connect(&address, 300).await?;
        wait_for_subscribers(&publisher, 1).await;

        for ts in [1.0, 2.0, 3.0] {
            publisher.publish_message(&message(ts))?;
        }
        tokio::time::sleep(Duration::from_millis(150)).await;

        let received = subscriber.receive().await?;
        assert_eq!(received, message(3.0));

        let second = subscriber.receive().await;
        assert!(matches!(second, Err(MetaballError::Timeout(300))));
        Ok(())
    }

    #[tokio::test]
    async fn late_subscriber_gets_no_backlog() -> Result<(), Box<dyn std::error::Error>> {
        let publisher = TelemetryPublisher::bind("tcp://127.0.0.1:0").await?;
        publisher.publish_message(&message(1.0))?;

        let address = format!("tcp://{}", publisher.local_addr());
        let mut subscriber = TelemetrySubscriber::connect(&address, 200).await?;
        wait_for_subscribers(&publisher, 1).await;

        assert!(matches!(
            subscriber.receive().await,
            Err(MetaballError::Timeout(_))
        ));

        publisher.publish_message(&message(2.0))?;
        assert_eq!(subscriber.receive().await?.timestamp, 2.0);
        Ok(())
    }

    #[tokio::test]
    async fn fans_out_to_every_subscriber() -> Result<(), Box<dyn std::error::Error>> {
        let publisher = TelemetryPublisher::bind("tcp://127.0.0.1:0").await?;
        let address = format!("tcp://{}", publisher.local_addr());
        let mut first = TelemetrySubscriber::connect(&address, 500).await?;
        let mut second = TelemetrySubscriber::connect(&address, 500).await?;
        wait_for_subscribers(&publisher, 2).await;

        publisher.publish_message(&message(7.0))?;
        assert_eq!(first.receive().await?.timestamp, 7.0);
        assert_eq!(second.receive().await?.timestamp, 7.0);
        Ok(())
    }

    #[tokio::test]
    async fn close_detaches_subscribers() -> Result<(), Box<dyn std::error::Error>> {
        let publisher = TelemetryPublisher::bind("tcp://127.0.0.1:0").await?;
        let address = format!("tcp://{}", publisher.local_addr());
        let _subscriber = TelemetrySubscriber::connect(&address, 100).await?;
        wait_for_subscribers(&publisher, 1).await;

        publisher.close();
        for _ in 0..100 {
            if publisher.subscriber_count() == 0 {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("writer task survived close");
    }
}
