//! BLE transport capability
//!
//! The session never talks to a Bluetooth stack directly. Anything that can
//! connect, subscribe to notifications and write a characteristic can drive a
//! drone: a platform GATT binding in production, [`MockTransport`] in tests.
//!
//! Writes to one characteristic must not overlap; the session awaits each
//! write before issuing the next one on the same characteristic.
//!
//! [`MockTransport`]: crate::infrastructure::bluetooth::mock::MockTransport

use crate::error::TransportError;
use crate::infrastructure::bluetooth::protocol::DiscoveryFilter;
use std::future::Future;
use tokio::sync::mpsc;

pub trait Transport: Send + Sync + 'static {
    /// Discover a matching device and open the GATT connection
    fn connect(
        &self,
        filter: &DiscoveryFilter,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Subscribe to a characteristic; each notification arrives as one buffer
    fn start_notifications(
        &self,
        service: &'static str,
        characteristic: &'static str,
    ) -> impl Future<Output = Result<mpsc::UnboundedReceiver<Vec<u8>>, TransportError>> + Send;

    /// Write a frame, resolving once the stack accepted it
    fn write(
        &self,
        service: &'static str,
        characteristic: &'static str,
        bytes: Vec<u8>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}
