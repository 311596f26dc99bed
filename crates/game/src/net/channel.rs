use std::time::Instant;

use bytes::{Buf, Bytes, BytesMut};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{Receiver, Sender};
use uuid::Uuid;

use super::message::{ClientMessage, InboundMessage, ServerMessage};
use super::protocol::{sequence_greater_than, Command, PacketHeader, HEADER_SIZE};
use super::stats::ChannelStats;
use super::wire::{WireError, WireReader, WireWriter};
use crate::config::SimConfig;

const RING_SIZE: usize = 1024;
const MAX_IN_FLIGHT: usize = u8::MAX as usize;

#[derive(Debug, Clone, Copy, Default)]
struct PacketData {
    seq: u16,
    acked: bool,
    send_time: Option<Instant>,
    size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnpackOutcome {
    /// Bad header, foreign protocol or wrong session salt.
    Rejected,
    /// Valid header but nothing newer than what was already received.
    Stale,
    Shutup,
    Delivered(usize),
}

/// Sequenced, redundantly retransmitted message stream to one peer.
///
/// Every outgoing packet carries all messages the peer has not acked yet, so
/// a lost packet is recovered by whichever packet arrives next.
pub struct ReliableChannel {
    player_id: Uuid,
    protocol_id: u32,
    secret: Option<i64>,
    max_msg_size: usize,
    messages_per_pack: usize,
    quiet_threshold: u32,

    tx_seq: u16,
    tx_ack: u16,
    rx_seq: u16,
    packets: Vec<PacketData>,
    in_flight: BytesMut,
    acked_bytes: usize,
    deferred: Option<ServerMessage>,

    shutup_tx: u32,
    shutup_rx: u32,

    outbox: Receiver<ServerMessage>,
    inbound: Sender<InboundMessage>,
    stats: ChannelStats,
}

impl ReliableChannel {
    pub fn new(
        config: &SimConfig,
        player_id: Uuid,
        outbox: Receiver<ServerMessage>,
        inbound: Sender<InboundMessage>,
    ) -> Self {
        Self {
            player_id,
            protocol_id: config.protocol_id,
            secret: None,
            max_msg_size: config.max_msg_size,
            messages_per_pack: config.messages_per_tick,
            quiet_threshold: config.quiet_threshold,
            tx_seq: 0,
            tx_ack: 0,
            rx_seq: 0,
            packets: vec![PacketData::default(); RING_SIZE],
            in_flight: BytesMut::with_capacity(config.max_msg_size),
            acked_bytes: 0,
            deferred: None,
            shutup_tx: 0,
            shutup_rx: 0,
            outbox,
            inbound,
            stats: ChannelStats::default(),
        }
    }

    /// Starts accepting and producing packets under the session secret.
    pub fn open(&mut self, secret: i64) {
        self.secret = Some(secret);
    }

    /// Closes the outbound queue; later sends from producers are rejected.
    pub fn close(&mut self) {
        self.secret = None;
        self.outbox.close();
    }

    pub fn is_open(&self) -> bool {
        self.secret.is_some()
    }

    pub fn tx_ack(&self) -> u16 {
        self.tx_ack
    }

    pub fn rx_seq(&self) -> u16 {
        self.rx_seq
    }

    pub fn in_flight(&self) -> usize {
        self.tx_seq.wrapping_sub(self.tx_ack) as usize
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }

    pub fn unpack(&mut self, packet: &[u8], now: Instant) -> UnpackOutcome {
        let Some(secret) = self.secret else {
            return UnpackOutcome::Rejected;
        };
        let mut reader = WireReader::new(packet);
        let header = match PacketHeader::decode(&mut reader) {
            Ok(header) => header,
            Err(e) => {
                log::debug!("dropping packet from {}: {}", self.player_id, e);
                self.stats.packets_dropped += 1;
                return UnpackOutcome::Rejected;
            }
        };
        if header.protocol_id != self.protocol_id || header.salt != secret {
            log::debug!("dropping packet from {} with foreign header", self.player_id);
            self.stats.packets_dropped += 1;
            return UnpackOutcome::Rejected;
        }
        self.stats.record_received(packet.len());

        self.acknowledge(header.ack, now);

        let shutup = reader.peek_u8().ok() == Some(Command::Shutup as u8);
        if shutup {
            self.shutup_rx = self.shutup_rx.saturating_add(1);
        } else {
            self.shutup_rx = 0;
        }

        if !sequence_greater_than(header.seq, self.rx_seq) {
            return if shutup {
                UnpackOutcome::Shutup
            } else {
                UnpackOutcome::Stale
            };
        }

        let messages = self.decode_messages(&mut reader);
        let previous = self.rx_seq;
        self.rx_seq = header.seq;

        let count = messages.len();
        let mut delivered = 0;
        for (i, message) in messages.into_iter().enumerate() {
            let seq = if header.redundancy > 0 {
                header.seq.wrapping_sub((count - 1 - i) as u16)
            } else {
                header.seq
            };
            if header.redundancy > 0 && !sequence_greater_than(seq, previous) {
                continue;
            }
            if self.publish(InboundMessage {
                player_id: self.player_id,
                seq,
                message,
            }) {
                delivered += 1;
            }
        }

        if shutup {
            UnpackOutcome::Shutup
        } else {
            UnpackOutcome::Delivered(delivered)
        }
    }

    fn acknowledge(&mut self, ack: u16, now: Instant) {
        if !sequence_greater_than(ack, self.tx_ack) || sequence_greater_than(ack, self.tx_seq) {
            return;
        }
        let mut seq = self.tx_ack;
        while seq != ack {
            seq = seq.wrapping_add(1);
            let slot = &mut self.packets[seq as usize % RING_SIZE];
            if slot.seq != seq || slot.acked {
                continue;
            }
            slot.acked = true;
            self.acked_bytes += slot.size;
            self.stats.messages_acked += 1;
            if let Some(sent) = slot.send_time {
                self.stats.update_rtt(now.saturating_duration_since(sent));
            }
        }
        self.tx_ack = ack;
    }

    fn decode_messages(&self, reader: &mut WireReader<'_>) -> Vec<ClientMessage> {
        let mut messages = Vec::new();
        while !reader.is_empty() {
            match ClientMessage::decode(reader) {
                Ok(message) => messages.push(message),
                Err(WireError::UnknownTag(tag)) if tag == Command::Shutup as u8 => break,
                Err(e) => {
                    log::debug!("stopped decoding packet from {}: {}", self.player_id, e);
                    break;
                }
            }
        }
        messages
    }

    fn publish(&self, message: InboundMessage) -> bool {
        match self.inbound.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                log::warn!(
                    "inbound queue for {} is full, dropping {:?}",
                    self.player_id,
                    message.message.command()
                );
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Builds the next packet for the peer, or `None` when both sides have
    /// been quiet long enough that even a SHUTUP probe is unnecessary.
    pub fn pack(&mut self, now: Instant) -> Option<Bytes> {
        let secret = self.secret?;

        let acked = self.acked_bytes.min(self.in_flight.len());
        self.in_flight.advance(acked);
        self.acked_bytes = 0;

        let next = self.deferred.take().or_else(|| self.outbox.try_recv().ok());
        let Some(first) = next else {
            if self.tx_seq == self.tx_ack {
                return self.shutup(secret);
            }
            self.shutup_tx = 0;
            return self.emit(secret);
        };

        let mut pending = Some(first);
        let mut added = 0;
        while let Some(message) = pending.take() {
            if !self.append(message, now) {
                break;
            }
            added += 1;
            if added >= self.messages_per_pack {
                break;
            }
            pending = self.outbox.try_recv().ok();
        }

        self.shutup_tx = 0;
        self.emit(secret)
    }

    // Appends one message at the tail of the in-flight buffer. A message that
    // does not fit is parked for the next pack.
    fn append(&mut self, message: ServerMessage, now: Instant) -> bool {
        let size = message.size();
        let fits = HEADER_SIZE + self.in_flight.len() + size <= self.max_msg_size
            && self.in_flight() < MAX_IN_FLIGHT;
        if !fits {
            if self.in_flight.is_empty() {
                log::warn!(
                    "dropping {:?} of {} bytes for {}, larger than a packet",
                    message.command(),
                    size,
                    self.player_id
                );
                return true;
            }
            self.deferred = Some(message);
            return false;
        }

        let start = self.in_flight.len();
        self.in_flight.resize(start + size, 0);
        let mut writer = WireWriter::new(&mut self.in_flight[start..]);
        if let Err(e) = message.encode(&mut writer) {
            log::warn!("failed to encode {:?} for {}: {}", message.command(), self.player_id, e);
            self.in_flight.truncate(start);
            return true;
        }

        self.tx_seq = self.tx_seq.wrapping_add(1);
        self.packets[self.tx_seq as usize % RING_SIZE] = PacketData {
            seq: self.tx_seq,
            acked: false,
            send_time: Some(now),
            size,
        };
        true
    }

    fn shutup(&mut self, secret: i64) -> Option<Bytes> {
        if self.shutup_tx > self.quiet_threshold && self.shutup_rx > self.quiet_threshold {
            return None;
        }
        self.shutup_tx = self.shutup_tx.saturating_add(1);

        let header = self.header(secret, 0);
        let mut packet = BytesMut::with_capacity(HEADER_SIZE + 1);
        self.write_header(&mut packet, &header)?;
        packet.extend_from_slice(&[Command::Shutup as u8]);
        self.stats.record_sent(packet.len());
        Some(packet.freeze())
    }

    fn emit(&mut self, secret: i64) -> Option<Bytes> {
        let header = self.header(secret, self.in_flight() as u8);
        let mut packet = BytesMut::with_capacity(HEADER_SIZE + self.in_flight.len());
        self.write_header(&mut packet, &header)?;
        packet.extend_from_slice(&self.in_flight);
        self.stats.record_sent(packet.len());
        Some(packet.freeze())
    }

    fn header(&self, secret: i64, redundancy: u8) -> PacketHeader {
        PacketHeader {
            protocol_id: self.protocol_id,
            salt: secret,
            ack: self.rx_seq,
            seq: self.tx_seq,
            redundancy,
        }
    }

    fn write_header(&self, packet: &mut BytesMut, header: &PacketHeader) -> Option<()> {
        packet.resize(HEADER_SIZE, 0);
        let mut writer = WireWriter::new(&mut packet[..]);
        if let Err(e) = header.encode(&mut writer) {
            log::warn!("failed to encode header for {}: {}", self.player_id, e);
            return None;
        }
        Some(())
    }
}

/// Builds a client packet carrying `messages`.
pub fn client_packet(header: &PacketHeader, messages: &[ClientMessage]) -> Result<Vec<u8>, WireError> {
    let size = HEADER_SIZE + messages.iter().map(ClientMessage::size).sum::<usize>();
    let mut packet = vec![0u8; size];
    let mut writer = WireWriter::new(&mut packet);
    header.encode(&mut writer)?;
    for message in messages {
        message.encode(&mut writer)?;
    }
    Ok(packet)
}

/// Builds a client SHUTUP probe.
pub fn client_shutup(header: &PacketHeader) -> Result<Vec<u8>, WireError> {
    let mut packet = vec![0u8; HEADER_SIZE + 1];
    let mut writer = WireWriter::new(&mut packet);
    header.encode(&mut writer)?;
    writer.write_u8(Command::Shutup as u8)?;
    Ok(packet)
}

/// Splits a server packet into its header and messages.
pub fn read_server_packet(packet: &[u8]) -> Result<(PacketHeader, Vec<ServerMessage>), WireError> {
    let mut reader = WireReader::new(packet);
    let header = PacketHeader::decode(&mut reader)?;
    let mut messages = Vec::new();
    while !reader.is_empty() {
        messages.push(ServerMessage::decode(&mut reader)?);
    }
    Ok((header, messages))
}
