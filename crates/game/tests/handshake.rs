use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use spacesim::net::{
    challenge_response, hello_packet, Command, RecordingTransmit, Transmit, WireReader,
};
use spacesim::{ConnectionState, PlayerRegistry, PlayerStatus, SimConfig};
use tokio::net::UdpSocket;
use uuid::Uuid;

async fn wait_for_packet(socket: &UdpSocket, timeout_ms: u64) -> Option<(Vec<u8>, SocketAddr)> {
    let mut buf = [0u8; 2048];
    let received = tokio::time::timeout(
        Duration::from_millis(timeout_ms),
        socket.recv_from(&mut buf),
    )
    .await
    .ok()?;
    let (len, from) = received.ok()?;
    Some((buf[..len].to_vec(), from))
}

#[tokio::test]
async fn test_handshake_full_flow_over_udp() {
    let server = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let server_addr = server.local_addr().unwrap();

    let config = SimConfig::default();
    let transmit: Arc<dyn Transmit> = server.clone();
    let registry = PlayerRegistry::new(config.clone(), transmit);
    let id = Uuid::new_v4();
    registry.join(id, client.local_addr().unwrap().ip(), Instant::now());

    let hello = hello_packet(config.protocol_id, 42, config.max_msg_size).unwrap();
    client.send_to(&hello, server_addr).await.unwrap();
    let (packet, from) = wait_for_packet(&server, 500).await.expect("no HELLO received");
    registry.receive(&packet, from, Instant::now());

    let (challenge, _) = wait_for_packet(&client, 500).await.expect("no CHALLENGE received");
    assert_eq!(challenge.len(), config.max_msg_size);
    let mut reader = WireReader::new(&challenge);
    assert_eq!(reader.read_u32().unwrap(), config.protocol_id);
    assert_eq!(reader.read_u8().unwrap(), Command::Challenge as u8);
    assert_eq!(reader.read_i64().unwrap(), 42);
    let server_salt = reader.read_i64().unwrap();

    let response = challenge_response(config.protocol_id, 42 ^ server_salt, config.max_msg_size).unwrap();
    client.send_to(&response, server_addr).await.unwrap();
    let (packet, from) = wait_for_packet(&server, 500).await.expect("no CHALLENGE response received");
    registry.receive(&packet, from, Instant::now());

    let (welcome, _) = wait_for_packet(&client, 500).await.expect("no WELCOME received");
    assert_eq!(welcome.len(), 13);
    let mut reader = WireReader::new(&welcome);
    assert_eq!(reader.read_u32().unwrap(), config.protocol_id);
    assert_eq!(reader.read_u8().unwrap(), Command::Welcome as u8);
    assert_eq!(reader.read_i64().unwrap(), 42 ^ server_salt);

    let player = registry.get(&id).unwrap();
    assert_eq!(player.connection_state(), ConnectionState::Connected);
    assert_eq!(player.status(), PlayerStatus::Spectating);
}

#[tokio::test]
async fn test_wrong_secret_gets_no_welcome() {
    let server = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let server_addr = server.local_addr().unwrap();

    let config = SimConfig::default();
    let transmit: Arc<dyn Transmit> = server.clone();
    let registry = PlayerRegistry::new(config.clone(), transmit);
    let id = Uuid::new_v4();
    registry.join(id, client.local_addr().unwrap().ip(), Instant::now());

    let hello = hello_packet(config.protocol_id, 42, config.max_msg_size).unwrap();
    client.send_to(&hello, server_addr).await.unwrap();
    let (packet, from) = wait_for_packet(&server, 500).await.unwrap();
    registry.receive(&packet, from, Instant::now());
    wait_for_packet(&client, 500).await.expect("no CHALLENGE received");

    let response = challenge_response(config.protocol_id, 42, config.max_msg_size).unwrap();
    client.send_to(&response, server_addr).await.unwrap();
    let (packet, from) = wait_for_packet(&server, 500).await.unwrap();
    registry.receive(&packet, from, Instant::now());

    assert!(wait_for_packet(&client, 200).await.is_none());
    let player = registry.get(&id).unwrap();
    assert_eq!(player.connection_state(), ConnectionState::Challenged);
    assert_eq!(player.status(), PlayerStatus::Joined);
}

#[test]
fn test_restarted_handshake_invalidates_old_salts() {
    let recorder = Arc::new(RecordingTransmit::new());
    let transmit: Arc<dyn Transmit> = recorder.clone();
    let config = SimConfig::default();
    let registry = PlayerRegistry::new(config.clone(), transmit);
    let addr: SocketAddr = "10.1.0.5:7000".parse().unwrap();
    let id = Uuid::new_v4();
    let now = Instant::now();
    registry.join(id, addr.ip(), now);

    let server_salt = |packet: &[u8]| {
        let mut reader = WireReader::new(packet);
        reader.skip(13).unwrap();
        reader.read_i64().unwrap()
    };

    registry.receive(&hello_packet(config.protocol_id, 1, config.max_msg_size).unwrap(), addr, now);
    let first = server_salt(&recorder.take()[0].1);
    registry.receive(&hello_packet(config.protocol_id, 2, config.max_msg_size).unwrap(), addr, now);
    let second = server_salt(&recorder.take()[0].1);

    let stale = challenge_response(config.protocol_id, 1 ^ first, config.max_msg_size).unwrap();
    registry.receive(&stale, addr, now);
    let player = registry.get(&id).unwrap();
    assert_eq!(player.connection_state(), ConnectionState::Challenged);

    let fresh = challenge_response(config.protocol_id, 2 ^ second, config.max_msg_size).unwrap();
    registry.receive(&fresh, addr, now);
    assert_eq!(player.connection_state(), ConnectionState::Connected);
    assert_eq!(player.status(), PlayerStatus::Spectating);
}

#[test]
fn test_handshake_from_unannounced_ip_is_ignored() {
    let recorder = Arc::new(RecordingTransmit::new());
    let transmit: Arc<dyn Transmit> = recorder.clone();
    let config = SimConfig::default();
    let registry = PlayerRegistry::new(config.clone(), transmit);
    registry.join(Uuid::new_v4(), "10.1.0.5".parse().unwrap(), Instant::now());

    let stranger: SocketAddr = "10.1.0.6:7000".parse().unwrap();
    registry.receive(
        &hello_packet(config.protocol_id, 1, config.max_msg_size).unwrap(),
        stranger,
        Instant::now(),
    );
    assert!(recorder.is_empty());
}
