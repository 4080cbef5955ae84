//! `metaball-middleware` – telemetry transport.
//!
//! Moves one [`TelemetryMessage`](metaball_types::TelemetryMessage) per
//! acquisition tick from the pipeline to any number of consumers, keeping
//! only the newest message in flight.
//!
//! # Modules
//!
//! - [`endpoint`] – `tcp://host:port` address parsing.
//! - [`wire`] – protobuf-compatible message encoding.
//! - [`publisher`] – one-to-many TCP publisher with latest-value-wins
//!   delivery.
//! - [`subscriber`] – reconnecting, conflating subscriber with a receive
//!   deadline.
//!
//! Frames on the socket are a 4-byte big-endian length followed by the
//! encoded message.

pub mod endpoint;
pub mod publisher;
pub mod subscriber;
pub mod wire;

pub use endpoint::Endpoint;
pub use publisher::TelemetryPublisher;
pub use subscriber::TelemetrySubscriber;

use tokio_util::codec::LengthDelimitedCodec;

/// Upper bound on a single frame; large enough for uncompressed camera
/// frames.
pub const MAX_FRAME_LEN: usize = 32 * 1024 * 1024;

pub(crate) fn frame_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .big_endian()
        .max_frame_length(MAX_FRAME_LEN)
        .new_codec()
}
