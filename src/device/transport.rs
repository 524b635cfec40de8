use async_trait::async_trait;
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::error::TransportError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub uuid: Uuid,
    pub value: Vec<u8>,
}

pub type NotificationStream = BoxStream<'static, Notification>;

/// The radio link to one peripheral. Knows characteristics only by UUID.
///
/// Implementations must never run two GATT operations against the peripheral at the same time;
/// concurrent callers wait for their turn. Every error is transient from the point of view of
/// the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Scans until the peripheral with `address` is seen.
    async fn find_device(&mut self, address: &str) -> Result<(), TransportError>;

    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Returns the UUIDs of every characteristic the peripheral offers.
    async fn discover_characteristics(&mut self) -> Result<Vec<Uuid>, TransportError>;

    async fn read_characteristic(&self, uuid: Uuid) -> Result<Vec<u8>, TransportError>;

    async fn write_characteristic(&self, uuid: Uuid, value: &[u8]) -> Result<(), TransportError>;

    async fn subscribe(&mut self, uuid: Uuid) -> Result<(), TransportError>;

    /// Stream of notifications for all subscribed characteristics, in arrival order. The stream
    /// ends when the link is gone.
    async fn notifications(&self) -> Result<NotificationStream, TransportError>;

    async fn is_connected(&self) -> Result<bool, TransportError>;

    /// Best effort signal strength of the current link.
    async fn rssi(&self) -> Option<i16>;

    async fn disconnect(&mut self) -> Result<(), TransportError>;
}
