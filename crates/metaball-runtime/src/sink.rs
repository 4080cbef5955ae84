//! Where the acquisition loop sends each tick.

use metaball_middleware::TelemetryPublisher;
use metaball_types::{MetaballError, TelemetryMessage};

pub trait TelemetrySink: Send {
    fn publish(&self, msg: &TelemetryMessage) -> Result<(), MetaballError>;

    /// Stop publishing.  Must tolerate repeated calls.
    fn close(&self);
}

impl TelemetrySink for TelemetryPublisher {
    fn publish(&self, msg: &TelemetryMessage) -> Result<(), MetaballError> {
        self.publish_message(msg)
    }

    fn close(&self) {
        TelemetryPublisher::close(self);
    }
}
