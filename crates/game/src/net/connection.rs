use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;

use super::endpoint::Transmit;
use super::protocol::Command;
use super::wire::{WireError, WireReader, WireWriter};
use crate::config::SimConfig;

const WELCOME_SIZE: usize = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Challenged,
    Connected,
}

/// Challenge/response handshake for one peer.
pub struct Connector {
    protocol_id: u32,
    max_msg_size: usize,
    interval: Duration,
    attempts: u32,
    state: ConnectionState,
    client_salt: i64,
    server_salt: i64,
    peer: Option<SocketAddr>,
    transmit: Arc<dyn Transmit>,
    repeater: Option<JoinHandle<()>>,
}

impl Connector {
    pub fn new(config: &SimConfig, transmit: Arc<dyn Transmit>) -> Self {
        Self {
            protocol_id: config.protocol_id,
            max_msg_size: config.max_msg_size,
            interval: config.handshake_interval,
            attempts: config.handshake_attempts.max(1),
            state: ConnectionState::Disconnected,
            client_salt: 0,
            server_salt: 0,
            peer: None,
            transmit,
            repeater: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn client_salt(&self) -> i64 {
        self.client_salt
    }

    pub fn server_salt(&self) -> i64 {
        self.server_salt
    }

    /// Session token carried in every packet header once connected.
    pub fn secret(&self) -> i64 {
        self.client_salt ^ self.server_salt
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn is_repeating(&self) -> bool {
        self.repeater.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Advances the handshake with one datagram. Returns true exactly when
    /// the peer has just become connected.
    pub fn authenticate(&mut self, packet: &[u8], addr: SocketAddr) -> bool {
        if packet.len() < self.max_msg_size {
            log::debug!("unpadded handshake packet of {} bytes from {}", packet.len(), addr);
            return false;
        }
        match self.try_authenticate(packet, addr) {
            Ok(connected) => connected,
            Err(e) => {
                log::debug!("malformed handshake packet from {}: {}", addr, e);
                false
            }
        }
    }

    fn try_authenticate(&mut self, packet: &[u8], addr: SocketAddr) -> Result<bool, WireError> {
        let mut reader = WireReader::new(packet);
        if reader.read_u32()? != self.protocol_id {
            return Ok(false);
        }
        let command = Command::try_from(reader.read_u8()?)?;

        match (self.state, command) {
            (ConnectionState::Disconnected | ConnectionState::Challenged, Command::Hello) => {
                let client_salt = reader.read_i64()?;
                self.challenge(client_salt, addr)?;
                Ok(false)
            }
            (ConnectionState::Challenged, Command::Challenge) => {
                let response = reader.read_i64()?;
                if self.peer != Some(addr) || response != self.secret() {
                    log::debug!("rejected challenge response from {}", addr);
                    return Ok(false);
                }
                self.welcome(addr)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn challenge(&mut self, client_salt: i64, addr: SocketAddr) -> Result<(), WireError> {
        self.client_salt = client_salt;
        self.server_salt = rand::thread_rng().gen_range(0..i64::MAX);
        self.peer = Some(addr);

        let mut payload = vec![0u8; self.max_msg_size];
        let mut writer = WireWriter::new(&mut payload);
        writer.write_u32(self.protocol_id)?;
        writer.write_u8(Command::Challenge as u8)?;
        writer.write_i64(self.client_salt)?;
        writer.write_i64(self.server_salt)?;

        if self.state == ConnectionState::Challenged {
            log::debug!("{} restarted its handshake", addr);
        }
        self.state = ConnectionState::Challenged;
        self.repeat(addr, payload);
        Ok(())
    }

    fn welcome(&mut self, addr: SocketAddr) -> Result<(), WireError> {
        let mut payload = vec![0u8; WELCOME_SIZE];
        let mut writer = WireWriter::new(&mut payload);
        writer.write_u32(self.protocol_id)?;
        writer.write_u8(Command::Welcome as u8)?;
        writer.write_i64(self.secret())?;

        self.state = ConnectionState::Connected;
        self.repeat(addr, payload);
        Ok(())
    }

    // Sends `payload` now and keeps resending it on the handshake interval,
    // replacing any sequence already running.
    fn repeat(&mut self, addr: SocketAddr, payload: Vec<u8>) {
        self.stop_repeating();
        self.transmit.transmit(addr, &payload);

        if self.attempts <= 1 {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::debug!("no runtime, handshake to {} will not be repeated", addr);
            return;
        };

        let transmit = Arc::clone(&self.transmit);
        let interval = self.interval;
        let attempts = self.attempts;
        self.repeater = Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            for _ in 1..attempts {
                ticker.tick().await;
                transmit.transmit(addr, &payload);
            }
        }));
    }

    pub fn stop_repeating(&mut self) {
        if let Some(task) = self.repeater.take() {
            task.abort();
        }
    }

    pub fn disconnect(&mut self) {
        self.stop_repeating();
        self.state = ConnectionState::Disconnected;
        self.client_salt = 0;
        self.server_salt = 0;
        self.peer = None;
    }
}

impl Drop for Connector {
    fn drop(&mut self) {
        self.stop_repeating();
    }
}

/// Builds a padded HELLO the way a client would.
pub fn hello_packet(protocol_id: u32, client_salt: i64, size: usize) -> Result<Vec<u8>, WireError> {
    handshake_packet(protocol_id, Command::Hello, client_salt, size)
}

/// Builds a padded CHALLENGE response the way a client would.
pub fn challenge_response(protocol_id: u32, secret: i64, size: usize) -> Result<Vec<u8>, WireError> {
    handshake_packet(protocol_id, Command::Challenge, secret, size)
}

fn handshake_packet(
    protocol_id: u32,
    command: Command,
    value: i64,
    size: usize,
) -> Result<Vec<u8>, WireError> {
    let mut packet = vec![0u8; size];
    let mut writer = WireWriter::new(&mut packet);
    writer.write_u32(protocol_id)?;
    writer.write_u8(command as u8)?;
    writer.write_i64(value)?;
    Ok(packet)
}
