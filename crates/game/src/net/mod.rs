mod channel;
mod connection;
mod endpoint;
mod link;
mod message;
mod protocol;
mod stats;
mod wire;

pub use channel::{client_packet, client_shutup, read_server_packet, ReliableChannel, UnpackOutcome};
pub use connection::{challenge_response, hello_packet, ConnectionState, Connector};
pub use endpoint::{LossyTransmit, RecordingTransmit, Transmit};
pub use link::{BodyCell, LinkTag, MapHeader, WorldCommand, WorldEvent};
pub use message::{BodyState, ClientMessage, InboundMessage, ServerMessage, MAX_SYNC_BODIES};
pub use protocol::{
    peek_protocol_id, protocol_id, sequence_greater_than, Command, PacketHeader,
    DEFAULT_UDP_PORT, DEFAULT_WORLD_PORT, HEADER_SIZE, MAX_MSG_SIZE, PROTOCOL_NAME,
    PROTOCOL_VERSION,
};
pub use stats::ChannelStats;
pub use wire::{WireError, WireReader, WireWriter};
