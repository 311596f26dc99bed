use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;
use tokio::net::UdpSocket;

/// Outgoing datagram sink. Sends never block; failures are logged and the
/// datagram is lost, which the protocol tolerates.
pub trait Transmit: Send + Sync + 'static {
    fn transmit(&self, addr: SocketAddr, data: &[u8]);
}

impl Transmit for UdpSocket {
    fn transmit(&self, addr: SocketAddr, data: &[u8]) {
        if let Err(e) = self.try_send_to(data, addr) {
            log::warn!("failed to send {} bytes to {}: {}", data.len(), addr, e);
        }
    }
}

impl<T: Transmit + ?Sized> Transmit for Arc<T> {
    fn transmit(&self, addr: SocketAddr, data: &[u8]) {
        (**self).transmit(addr, data);
    }
}

/// Drops a share of outgoing datagrams, for exercising retransmission
/// against a real client.
pub struct LossyTransmit<T> {
    inner: T,
    loss_percent: f32,
}

impl<T: Transmit> LossyTransmit<T> {
    pub fn new(inner: T, loss_percent: f32) -> Self {
        Self {
            inner,
            loss_percent: loss_percent.clamp(0.0, 100.0),
        }
    }

    pub fn should_drop(&self) -> bool {
        self.loss_percent > 0.0 && rand::thread_rng().gen_range(0.0..100.0) < self.loss_percent
    }
}

impl<T: Transmit> Transmit for LossyTransmit<T> {
    fn transmit(&self, addr: SocketAddr, data: &[u8]) {
        if self.should_drop() {
            log::trace!("simulated loss of {} bytes to {}", data.len(), addr);
            return;
        }
        self.inner.transmit(addr, data);
    }
}

/// Keeps every datagram in memory instead of sending it.
#[derive(Debug, Default)]
pub struct RecordingTransmit {
    sent: Mutex<Vec<(SocketAddr, Vec<u8>)>>,
}

impl RecordingTransmit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<(SocketAddr, Vec<u8>)> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn len(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.lock().is_empty()
    }
}

impl Transmit for RecordingTransmit {
    fn transmit(&self, addr: SocketAddr, data: &[u8]) {
        self.sent.lock().push((addr, data.to_vec()));
    }
}
