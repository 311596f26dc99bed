use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use spacesim::net::{
    challenge_response, client_packet, client_shutup, hello_packet, read_server_packet,
    BodyCell, RecordingTransmit, Transmit, WireReader,
};
use spacesim::physics::Buttons;
use spacesim::{
    ClientMessage, GridMap, PacketHeader, PlayerRegistry, PlayerStatus, ServerMessage, SimConfig,
    Simulation, WorldEvent,
};
use tokio::sync::mpsc;
use uuid::Uuid;

const SPAWN_CELL: (u32, u32) = (20, 20);

struct Client {
    id: Uuid,
    addr: SocketAddr,
    secret: i64,
    seq: u16,
    ack: u16,
}

struct Harness {
    config: SimConfig,
    recorder: Arc<RecordingTransmit>,
    registry: Arc<PlayerRegistry>,
    sim: Simulation,
    world_rx: mpsc::Receiver<WorldEvent>,
    start: Instant,
    frames: u32,
}

impl Harness {
    fn new() -> Self {
        let config = SimConfig::default();
        let recorder = Arc::new(RecordingTransmit::new());
        let transmit: Arc<dyn Transmit> = recorder.clone();
        let registry = Arc::new(PlayerRegistry::new(config.clone(), transmit));
        let (world_tx, world_rx) = mpsc::channel(config.world_capacity);
        let mut sim = Simulation::new(config.clone(), Arc::clone(&registry), world_tx);

        let start = Instant::now();
        sim.start(Arc::new(GridMap::new(64, 32, SPAWN_CELL)), start);
        Self {
            config,
            recorder,
            registry,
            sim,
            world_rx,
            start,
            frames: 0,
        }
    }

    fn now(&self) -> Instant {
        self.start + self.config.timestep * self.frames
    }

    fn connect(&mut self, n: u8) -> Client {
        let id = Uuid::from_u128(n as u128);
        let addr: SocketAddr = format!("10.0.0.{}:7000", n).parse().unwrap();
        let now = self.now();
        let pid = self.config.protocol_id;
        let size = self.config.max_msg_size;
        self.registry.join(id, addr.ip(), now);

        self.registry.receive(&hello_packet(pid, n as i64, size).unwrap(), addr, now);
        let challenge = self.recorder.take();
        let mut reader = WireReader::new(&challenge[0].1);
        reader.skip(13).unwrap();
        let secret = n as i64 ^ reader.read_i64().unwrap();

        self.registry.receive(&challenge_response(pid, secret, size).unwrap(), addr, now);
        self.recorder.take();
        Client {
            id,
            addr,
            secret,
            seq: 0,
            ack: 0,
        }
    }

    fn send(&self, client: &mut Client, messages: &[ClientMessage]) {
        client.seq += 1;
        let header = PacketHeader {
            protocol_id: self.config.protocol_id,
            salt: client.secret,
            ack: client.ack,
            seq: client.seq,
            redundancy: 0,
        };
        self.registry
            .receive(&client_packet(&header, messages).unwrap(), client.addr, self.now());
    }

    fn step(&mut self, frames: u32) -> Vec<(SocketAddr, Vec<u8>)> {
        self.frames += frames;
        let processed = self.sim.tick(self.now());
        assert_eq!(processed, frames as usize);
        self.recorder.take()
    }

    fn world_events(&mut self) -> Vec<WorldEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.world_rx.try_recv() {
            events.push(event);
        }
        events
    }
}

// Messages in every packet sent to `client`; acks the newest one.
fn received(sent: &[(SocketAddr, Vec<u8>)], client: &mut Client) -> Vec<ServerMessage> {
    let mut messages = Vec::new();
    for (to, packet) in sent {
        if *to != client.addr {
            continue;
        }
        let (header, mut decoded) = read_server_packet(packet).unwrap();
        client.ack = header.seq;
        messages.append(&mut decoded);
    }
    messages
}

fn enters(messages: &[ServerMessage]) -> usize {
    messages
        .iter()
        .filter(|m| matches!(m, ServerMessage::Enter { .. }))
        .count()
}

#[test]
fn test_enter_broadcasts_once_to_everyone() {
    let mut h = Harness::new();
    let mut a = h.connect(1);
    let mut b = h.connect(2);

    h.send(&mut a, &[ClientMessage::Enter]);
    let sent = h.step(1);

    let body_id = h.sim.body_id(&a.id).expect("body spawned");
    let expected = ServerMessage::Enter {
        player_id: a.id,
        body_id,
        x: SPAWN_CELL.0,
        y: SPAWN_CELL.1,
    };
    assert_eq!(received(&sent, &mut a), vec![expected.clone()]);
    assert_eq!(received(&sent, &mut b), vec![expected]);
    assert_eq!(
        h.world_events(),
        vec![WorldEvent::Spawn {
            body_id,
            player_id: a.id,
        }]
    );
    assert_eq!(h.registry.get(&a.id).unwrap().status(), PlayerStatus::Playing);
}

#[test]
fn test_second_enter_is_ignored() {
    let mut h = Harness::new();
    let mut a = h.connect(1);

    h.send(&mut a, &[ClientMessage::Enter]);
    let sent = h.step(1);
    assert_eq!(enters(&received(&sent, &mut a)), 1);

    h.send(&mut a, &[ClientMessage::Enter]);
    let sent = h.step(1);
    assert_eq!(enters(&received(&sent, &mut a)), 0);
    assert_eq!(h.sim.body_count(), 1);
    assert_eq!(h.world_events().len(), 1);
}

#[test]
fn test_exit_returns_player_to_spectating() {
    let mut h = Harness::new();
    let mut a = h.connect(1);
    let mut b = h.connect(2);

    h.send(&mut a, &[ClientMessage::Enter]);
    let sent = h.step(1);
    received(&sent, &mut a);
    received(&sent, &mut b);
    let body_id = h.sim.body_id(&a.id).unwrap();
    h.world_events();

    h.send(&mut b, &[ClientMessage::None]);
    h.send(&mut a, &[ClientMessage::Exit]);
    let sent = h.step(1);
    assert_eq!(received(&sent, &mut a), vec![ServerMessage::Exit { body_id }]);
    assert_eq!(received(&sent, &mut b), vec![ServerMessage::Exit { body_id }]);
    assert_eq!(h.world_events(), vec![WorldEvent::Spec { body_id }]);
    assert_eq!(h.registry.get(&a.id).unwrap().status(), PlayerStatus::Spectating);
    assert_eq!(h.sim.body_count(), 0);
    assert!(h.sim.body_id(&a.id).is_none());
}

#[test]
fn test_exit_while_spectating_is_ignored() {
    let mut h = Harness::new();
    let mut a = h.connect(1);

    h.send(&mut a, &[ClientMessage::Exit]);
    let sent = h.step(1);
    assert_eq!(received(&sent, &mut a), vec![ServerMessage::Shutup]);
    assert!(h.world_events().is_empty());
}

#[test]
fn test_sync_reply_lists_bodies() {
    let mut h = Harness::new();
    let mut a = h.connect(1);
    let mut b = h.connect(2);

    h.send(&mut a, &[ClientMessage::Enter]);
    let sent = h.step(1);
    received(&sent, &mut b);

    h.send(&mut b, &[ClientMessage::Sync]);
    let sent = h.step(1);
    let messages = received(&sent, &mut b);
    let [ServerMessage::Sync { seq, time_ms, bodies }] = messages.as_slice() else {
        panic!("expected a single SYNC, got {:?}", messages);
    };

    assert_eq!(*seq, h.sim.seq());
    assert_eq!(*time_ms, h.sim.frame_time_ms());
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0].body_id, h.sim.body_id(&a.id).unwrap());
    assert_eq!(bodies[0].position, GridMap::new(64, 32, SPAWN_CELL).cell_center(20, 20));
}

#[test]
fn test_input_is_rebroadcast_with_delay() {
    let mut h = Harness::new();
    let mut a = h.connect(1);
    let mut b = h.connect(2);

    h.send(&mut a, &[ClientMessage::Enter]);
    let sent = h.step(1);
    received(&sent, &mut a);
    received(&sent, &mut b);
    let body_id = h.sim.body_id(&a.id).unwrap();

    let tick = h.sim.seq();
    let forward = Buttons::FORWARD.bits();
    h.send(&mut a, &[ClientMessage::MoveShoot { tick, buttons: forward }]);
    h.send(&mut b, &[ClientMessage::None]);
    let sent = h.step(1);

    assert_eq!(
        received(&sent, &mut b),
        vec![ServerMessage::MoveShoot {
            body_id,
            tick: tick + h.config.input_delay as u16,
            buttons: forward,
        }]
    );
    assert!(!received(&sent, &mut a)
        .iter()
        .any(|m| matches!(m, ServerMessage::MoveShoot { .. })));

    // Input lands in the future, so the body is still at rest.
    assert_eq!(h.sim.body_state(&a.id).unwrap().velocity.y, 0.0);
    h.send(&mut a, &[ClientMessage::None]);
    h.step(h.config.input_delay as u32 + 1);
    assert!(h.sim.body_state(&a.id).unwrap().velocity.y > 0.0);
}

#[test]
fn test_world_receives_body_cells() {
    let mut h = Harness::new();
    let mut a = h.connect(1);
    h.send(&mut a, &[ClientMessage::Enter]);
    h.step(1);
    h.world_events();

    h.send(&mut a, &[ClientMessage::None]);
    h.step(h.config.world_rate - 1);
    let body_id = h.sim.body_id(&a.id).unwrap();
    assert_eq!(
        h.world_events(),
        vec![WorldEvent::State(vec![BodyCell {
            body_id,
            x: SPAWN_CELL.0 as u16,
            y: SPAWN_CELL.1 as u16,
        }])]
    );
}

#[test]
fn test_silent_player_times_out() {
    let mut h = Harness::new();
    let mut a = h.connect(1);
    h.send(&mut a, &[ClientMessage::Enter]);
    h.step(1);
    let body_id = h.sim.body_id(&a.id).unwrap();
    h.world_events();

    // Five seconds is a little over 151 frames.
    h.step(150);
    assert!(h.registry.get(&a.id).is_some());
    h.world_events();

    h.step(5);
    assert!(h.registry.get(&a.id).is_none());
    assert_eq!(h.world_events(), vec![WorldEvent::Spec { body_id }]);
    assert!(h.step(1).is_empty());
}

#[test]
fn test_disconnect_removes_player() {
    let mut h = Harness::new();
    let mut a = h.connect(1);
    let mut b = h.connect(2);
    h.send(&mut a, &[ClientMessage::Enter]);
    let sent = h.step(1);
    received(&sent, &mut b);
    let body_id = h.sim.body_id(&a.id).unwrap();

    h.send(&mut a, &[ClientMessage::Disconnect]);
    h.send(&mut b, &[ClientMessage::None]);
    let sent = h.step(1);

    assert!(h.registry.get(&a.id).is_none());
    assert_eq!(h.sim.body_count(), 0);
    assert!(sent.iter().all(|(to, _)| *to != a.addr));
    assert_eq!(received(&sent, &mut b), vec![ServerMessage::Exit { body_id }]);
}

#[test]
fn test_quiet_peers_stop_probing() {
    let mut h = Harness::new();
    let mut a = h.connect(1);

    let sent = h.step(20);
    assert_eq!(sent.len(), 20);
    for (to, packet) in &sent {
        assert_eq!(*to, a.addr);
        let (header, messages) = read_server_packet(packet).unwrap();
        assert_eq!(header.redundancy, 0);
        assert_eq!(messages, vec![ServerMessage::Shutup]);
    }

    for _ in 0..=h.config.quiet_threshold {
        let header = PacketHeader {
            protocol_id: h.config.protocol_id,
            salt: a.secret,
            ack: 0,
            seq: a.seq,
            redundancy: 0,
        };
        h.registry
            .receive(&client_shutup(&header).unwrap(), a.addr, h.now());
    }
    assert!(h.step(5).is_empty());

    h.send(&mut a, &[ClientMessage::Sync]);
    let sent = h.step(1);
    assert!(matches!(
        received(&sent, &mut a).as_slice(),
        [ServerMessage::Sync { .. }]
    ));
}

#[test]
fn test_rollover_syncs_everyone_and_keeps_input_ticks() {
    let mut h = Harness::new();
    let mut a = h.connect(1);
    let mut b = h.connect(2);
    let epoch_ms = h.sim.frame_time_ms();

    h.send(&mut a, &[ClientMessage::Enter]);
    let sent = h.step(1);
    received(&sent, &mut a);
    received(&sent, &mut b);
    let body_id = h.sim.body_id(&a.id).unwrap();

    // Keep both peers alive up to the last seq before the rollover.
    while h.sim.seq() < u16::MAX {
        h.send(&mut a, &[ClientMessage::None]);
        h.send(&mut b, &[ClientMessage::None]);
        let frames = 100.min((u16::MAX - h.sim.seq()) as u32);
        let sent = h.step(frames);
        received(&sent, &mut a);
        received(&sent, &mut b);
        h.world_events();
    }
    assert_eq!(h.sim.frame(), u16::MAX as i32);
    assert!(h.registry.get(&a.id).is_some());
    assert!(h.registry.get(&b.id).is_some());

    // Tagged one frame back, handled on the first frame after the rollover.
    let tick = u16::MAX - 1;
    let target = h.sim.frame() - 1 + h.config.input_delay;
    let forward = Buttons::FORWARD.bits();
    h.send(&mut a, &[ClientMessage::MoveShoot { tick, buttons: forward }]);
    h.send(&mut b, &[ClientMessage::None]);
    let sent = h.step(1);
    assert_eq!(h.sim.seq(), 1);

    let frame_ms = h.config.timestep.as_millis() as u64;
    let expected_ms = epoch_ms + (u16::MAX as u64 + 1) * frame_ms;
    assert_eq!(h.sim.frame_time_ms(), expected_ms);

    let to_a = received(&sent, &mut a);
    let to_b = received(&sent, &mut b);
    for messages in [&to_a, &to_b] {
        let syncs: Vec<_> = messages
            .iter()
            .filter_map(|m| match m {
                ServerMessage::Sync { seq, time_ms, bodies } => Some((*seq, *time_ms, bodies.len())),
                _ => None,
            })
            .collect();
        assert_eq!(syncs, vec![(1, expected_ms, 1)]);
    }

    // Frame 65546 is seq 11 once seq restarts at 1.
    assert_eq!(target, u16::MAX as i32 + 11);
    let rebroadcast: Vec<_> = to_b
        .iter()
        .filter(|m| matches!(m, ServerMessage::MoveShoot { .. }))
        .cloned()
        .collect();
    assert_eq!(
        rebroadcast,
        vec![ServerMessage::MoveShoot {
            body_id,
            tick: 11,
            buttons: forward,
        }]
    );

    h.send(&mut a, &[ClientMessage::None]);
    h.send(&mut b, &[ClientMessage::None]);
    h.step((target - h.sim.frame() - 1) as u32);
    assert_eq!(h.sim.body_state(&a.id).unwrap().velocity.y, 0.0);
    h.step(1);
    assert_eq!(h.sim.frame(), target);
    assert!(h.sim.body_state(&a.id).unwrap().velocity.y > 0.0);
}
