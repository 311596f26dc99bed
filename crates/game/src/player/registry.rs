use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{self, Receiver, Sender};
use uuid::Uuid;

use super::state::PlayerStatus;
use crate::config::SimConfig;
use crate::net::{
    peek_protocol_id, ChannelStats, ConnectionState, Connector, InboundMessage, ReliableChannel,
    ServerMessage, Transmit, UnpackOutcome,
};

/// One player as seen by the simulation server.
pub struct Player {
    id: Uuid,
    ip: IpAddr,
    status: Mutex<PlayerStatus>,
    connector: Mutex<Connector>,
    channel: Mutex<ReliableChannel>,
    outbox: Sender<ServerMessage>,
    inbound: Mutex<Receiver<InboundMessage>>,
    last_receive: Mutex<Instant>,
    cull: AtomicBool,
}

impl Player {
    fn new(config: &SimConfig, id: Uuid, ip: IpAddr, transmit: Arc<dyn Transmit>, now: Instant) -> Self {
        let (outbox_tx, outbox_rx) = mpsc::channel(config.outbound_capacity);
        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_capacity);
        Self {
            id,
            ip,
            status: Mutex::new(PlayerStatus::Joined),
            connector: Mutex::new(Connector::new(config, transmit)),
            channel: Mutex::new(ReliableChannel::new(config, id, outbox_rx, inbound_tx)),
            outbox: outbox_tx,
            inbound: Mutex::new(inbound_rx),
            last_receive: Mutex::new(now),
            cull: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn status(&self) -> PlayerStatus {
        *self.status.lock()
    }

    pub fn set_status(&self, status: PlayerStatus) {
        *self.status.lock() = status;
    }

    pub fn is_admitted(&self) -> bool {
        self.status().is_admitted()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connector.lock().state()
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.connector.lock().peer()
    }

    pub fn channel_stats(&self) -> ChannelStats {
        *self.channel.lock().stats()
    }

    pub fn last_receive(&self) -> Instant {
        *self.last_receive.lock()
    }

    /// Flags the player for removal on the next sweep.
    pub fn cull(&self) {
        self.cull.store(true, Ordering::Relaxed);
    }

    pub fn should_cull(&self) -> bool {
        self.cull.load(Ordering::Relaxed)
    }

    pub fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        self.should_cull()
            || (self.is_admitted() && now.saturating_duration_since(self.last_receive()) > timeout)
    }

    /// Queues a message for the next outgoing packet.
    pub fn push(&self, message: ServerMessage) -> bool {
        match self.outbox.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                log::warn!(
                    "outbound queue for {} is full, dropping {:?}",
                    self.id,
                    message.command()
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                log::debug!("push to disconnected player {}", self.id);
                false
            }
        }
    }

    /// Takes at most `limit` messages the player has sent since the last call.
    pub fn drain_inbound(&self, limit: usize) -> Vec<InboundMessage> {
        let mut inbound = self.inbound.lock();
        let mut messages = Vec::new();
        while messages.len() < limit {
            match inbound.try_recv() {
                Ok(message) => messages.push(message),
                Err(_) => break,
            }
        }
        messages
    }

    // Joined -> Spectating, once.
    fn admit(&self) -> bool {
        let mut status = self.status.lock();
        if *status != PlayerStatus::Joined {
            return false;
        }
        *status = PlayerStatus::Spectating;
        true
    }

    fn touch(&self, now: Instant) {
        *self.last_receive.lock() = now;
    }

    fn pack_and_send(&self, transmit: &dyn Transmit, now: Instant) {
        let peer = {
            let connector = self.connector.lock();
            if connector.state() != ConnectionState::Connected {
                return;
            }
            connector.peer()
        };
        let Some(peer) = peer else {
            return;
        };
        let packet = self.channel.lock().pack(now);
        if let Some(packet) = packet {
            transmit.transmit(peer, &packet);
        }
    }

    fn shutdown(&self) {
        self.connector.lock().disconnect();
        self.channel.lock().close();
    }
}

/// Every player the world service has announced, keyed by id with address
/// and IP indexes for routing datagrams.
pub struct PlayerRegistry {
    config: SimConfig,
    transmit: Arc<dyn Transmit>,
    players: DashMap<Uuid, Arc<Player>>,
    by_addr: DashMap<SocketAddr, Uuid>,
    by_ip: DashMap<IpAddr, Uuid>,
}

impl PlayerRegistry {
    pub fn new(config: SimConfig, transmit: Arc<dyn Transmit>) -> Self {
        Self {
            config,
            transmit,
            players: DashMap::new(),
            by_addr: DashMap::new(),
            by_ip: DashMap::new(),
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<Player>> {
        self.players.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Announces a player. Their first HELLO must come from `ip`.
    pub fn join(&self, id: Uuid, ip: IpAddr, now: Instant) -> bool {
        if self.players.contains_key(&id) {
            log::warn!("player {} joined twice", id);
            return false;
        }
        let player = Player::new(&self.config, id, ip, Arc::clone(&self.transmit), now);
        self.players.insert(id, Arc::new(player));
        if let Some(previous) = self.by_ip.insert(ip, id) {
            log::info!("{} now routes to {} instead of {}", ip, id, previous);
        }
        log::info!("player {} joined from {}", id, ip);
        true
    }

    /// The world service reports the player gone; the next sweep removes them.
    pub fn leave(&self, id: &Uuid) {
        match self.players.get(id) {
            Some(player) => player.cull(),
            None => log::debug!("leave for unknown player {}", id),
        }
    }

    /// Routes one datagram to the handshake or the channel of its sender.
    pub fn receive(&self, packet: &[u8], addr: SocketAddr, now: Instant) {
        if peek_protocol_id(packet) != Some(self.config.protocol_id) {
            log::debug!("foreign datagram of {} bytes from {}", packet.len(), addr);
            return;
        }
        if let Some(id) = self.by_addr.get(&addr).map(|entry| *entry.value()) {
            if let Some(player) = self.get(&id) {
                if player.connection_state() == ConnectionState::Connected {
                    self.receive_connected(&player, packet, now);
                    return;
                }
                self.handshake(&player, packet, addr, now);
                return;
            }
        }

        let Some(id) = self.by_ip.get(&addr.ip()).map(|entry| *entry.value()) else {
            log::debug!("datagram from unknown address {}", addr);
            return;
        };
        match self.get(&id) {
            Some(player) if player.connection_state() != ConnectionState::Connected => {
                self.handshake(&player, packet, addr, now)
            }
            _ => log::debug!("datagram from {} does not match a pending handshake", addr),
        }
    }

    fn receive_connected(&self, player: &Player, packet: &[u8], now: Instant) {
        let outcome = player.channel.lock().unpack(packet, now);
        if outcome == UnpackOutcome::Rejected {
            return;
        }
        player.touch(now);
        // First valid packet proves the WELCOME arrived.
        player.connector.lock().stop_repeating();
    }

    fn handshake(&self, player: &Player, packet: &[u8], addr: SocketAddr, now: Instant) {
        let (connected, peer, secret) = {
            let mut connector = player.connector.lock();
            let previous = connector.peer();
            let connected = connector.authenticate(packet, addr);
            let peer = connector.peer();
            if previous != peer {
                if let Some(old) = previous {
                    self.by_addr.remove(&old);
                }
            }
            (connected, peer, connector.secret())
        };
        if let Some(peer) = peer {
            self.by_addr.insert(peer, player.id);
        }
        if !connected {
            return;
        }

        player.channel.lock().open(secret);
        player.touch(now);
        if player.admit() {
            log::info!("player {} connected from {}", player.id, addr);
        }
    }

    pub fn snapshot(&self) -> Vec<Arc<Player>> {
        self.players.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    pub fn push(&self, id: &Uuid, message: ServerMessage) -> bool {
        match self.get(id) {
            Some(player) => player.push(message),
            None => false,
        }
    }

    /// Queues `message` for every admitted player.
    pub fn push_all(&self, message: &ServerMessage) {
        for player in self.snapshot() {
            if player.is_admitted() {
                player.push(message.clone());
            }
        }
    }

    pub fn push_excluding(&self, excluded: &Uuid, message: &ServerMessage) {
        for player in self.snapshot() {
            if player.id != *excluded && player.is_admitted() {
                player.push(message.clone());
            }
        }
    }

    pub fn pack_and_send(&self, now: Instant) {
        for player in self.snapshot() {
            player.pack_and_send(self.transmit.as_ref(), now);
        }
    }

    /// Players that timed out or were flagged for removal.
    pub fn expired(&self, now: Instant) -> Vec<Arc<Player>> {
        self.snapshot()
            .into_iter()
            .filter(|player| player.is_expired(now, self.config.peer_timeout))
            .collect()
    }

    /// Drops the player, closing their outbound queue and stopping any
    /// handshake still repeating.
    pub fn remove(&self, id: &Uuid) -> Option<Arc<Player>> {
        let (_, player) = self.players.remove(id)?;
        player.shutdown();
        self.by_addr.retain(|_, owner| *owner != *id);
        self.by_ip.retain(|_, owner| *owner != *id);
        log::info!("player {} removed", id);
        Some(player)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{
        challenge_response, client_packet, hello_packet, read_server_packet, ClientMessage,
        PacketHeader, RecordingTransmit, WireReader,
    };

    fn registry() -> (PlayerRegistry, Arc<RecordingTransmit>) {
        let recorder = Arc::new(RecordingTransmit::new());
        let transmit: Arc<dyn Transmit> = recorder.clone();
        (PlayerRegistry::new(SimConfig::default(), transmit), recorder)
    }

    fn addr() -> SocketAddr {
        "10.0.0.2:6000".parse().unwrap()
    }

    // Completes the handshake and returns the session secret.
    fn connect(registry: &PlayerRegistry, recorder: &RecordingTransmit, now: Instant) -> i64 {
        let config = registry.config().clone();
        registry.receive(&hello_packet(config.protocol_id, 42, config.max_msg_size).unwrap(), addr(), now);
        let sent = recorder.take();
        let mut reader = WireReader::new(&sent[0].1);
        reader.skip(13).unwrap();
        let server_salt = reader.read_i64().unwrap();

        let secret = 42 ^ server_salt;
        registry.receive(
            &challenge_response(config.protocol_id, secret, config.max_msg_size).unwrap(),
            addr(),
            now,
        );
        recorder.take();
        secret
    }

    #[test]
    fn duplicate_join_is_refused() {
        let (registry, _) = registry();
        let id = Uuid::from_u128(1);
        assert!(registry.join(id, addr().ip(), Instant::now()));
        assert!(!registry.join(id, addr().ip(), Instant::now()));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&id).unwrap().ip(), addr().ip());
    }

    #[test]
    fn handshake_admits_player_once() {
        let (registry, recorder) = registry();
        let id = Uuid::from_u128(1);
        let now = Instant::now();
        registry.join(id, addr().ip(), now);

        let player = registry.get(&id).unwrap();
        assert_eq!(player.status(), PlayerStatus::Joined);

        connect(&registry, &recorder, now);
        assert_eq!(player.connection_state(), ConnectionState::Connected);
        assert_eq!(player.status(), PlayerStatus::Spectating);
        assert_eq!(player.peer(), Some(addr()));

        player.set_status(PlayerStatus::Playing);
        // A replayed CHALLENGE after connecting changes nothing.
        let config = registry.config().clone();
        registry.receive(
            &challenge_response(config.protocol_id, 0, config.max_msg_size).unwrap(),
            addr(),
            now,
        );
        assert_eq!(player.status(), PlayerStatus::Playing);
    }

    #[test]
    fn unknown_sender_is_ignored() {
        let (registry, recorder) = registry();
        let config = registry.config().clone();
        registry.receive(
            &hello_packet(config.protocol_id, 1, config.max_msg_size).unwrap(),
            addr(),
            Instant::now(),
        );
        assert!(recorder.is_empty());
    }

    #[test]
    fn foreign_protocol_never_reaches_the_handshake() {
        let (registry, recorder) = registry();
        let now = Instant::now();
        registry.join(Uuid::from_u128(1), addr().ip(), now);
        let config = registry.config().clone();
        registry.receive(
            &hello_packet(config.protocol_id ^ 1, 42, config.max_msg_size).unwrap(),
            addr(),
            now,
        );
        registry.receive(&[1, 2], addr(), now);
        assert!(recorder.is_empty());
    }

    #[test]
    fn connected_packets_reach_the_inbound_queue() {
        let (registry, recorder) = registry();
        let id = Uuid::from_u128(1);
        let now = Instant::now();
        registry.join(id, addr().ip(), now);
        let secret = connect(&registry, &recorder, now);

        let header = PacketHeader {
            protocol_id: registry.config().protocol_id,
            salt: secret,
            ack: 0,
            seq: 1,
            redundancy: 1,
        };
        let later = now + Duration::from_secs(1);
        registry.receive(&client_packet(&header, &[ClientMessage::Sync]).unwrap(), addr(), later);

        let player = registry.get(&id).unwrap();
        let inbound = player.drain_inbound(50);
        assert_eq!(inbound.len(), 1);
        assert_eq!(inbound[0].message, ClientMessage::Sync);
        assert_eq!(inbound[0].player_id, id);
        assert_eq!(player.last_receive(), later);
    }

    #[test]
    fn broadcasts_skip_unadmitted_and_excluded() {
        let (registry, recorder) = registry();
        let now = Instant::now();
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        registry.join(a, addr().ip(), now);
        connect(&registry, &recorder, now);
        registry.join(b, "10.0.0.3".parse().unwrap(), now);

        registry.push_excluding(&a, &ServerMessage::Exit { body_id: 1 });
        registry.push_all(&ServerMessage::Exit { body_id: 2 });
        registry.pack_and_send(now);

        let sent = recorder.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, addr());
        let (_, messages) = read_server_packet(&sent[0].1).unwrap();
        assert_eq!(messages, vec![ServerMessage::Exit { body_id: 2 }]);
    }

    #[test]
    fn silent_player_expires() {
        let (registry, recorder) = registry();
        let id = Uuid::from_u128(1);
        let now = Instant::now();
        registry.join(id, addr().ip(), now);
        connect(&registry, &recorder, now);

        assert!(registry.expired(now + Duration::from_secs(4)).is_empty());
        let expired = registry.expired(now + Duration::from_secs(6));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id(), id);
    }

    #[test]
    fn leave_culls_and_remove_closes() {
        let (registry, _) = registry();
        let id = Uuid::from_u128(1);
        let now = Instant::now();
        registry.join(id, addr().ip(), now);

        registry.leave(&id);
        assert_eq!(registry.expired(now).len(), 1);

        let player = registry.remove(&id).unwrap();
        assert!(registry.is_empty());
        assert!(!player.push(ServerMessage::Exit { body_id: 1 }));
        assert!(!registry.push(&id, ServerMessage::Exit { body_id: 1 }));
    }
}
