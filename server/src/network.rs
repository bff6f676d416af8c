//! Server network layer coordinating the packet surface, roster polling,
//! event generation and scheduled maintenance on one task.
//!
//! Every state mutation (stats, roster, death log, subscriber registry)
//! happens inside the `run` loop, so updates are naturally serialized. The
//! roster query is the only operation allowed to suspend for long; it runs
//! in the poller task and reports back over the server channel, guarded so
//! two refreshes can never overlap.

use crate::events::{EventError, EventGenerator, SimulationConfig};
use crate::roster::{RosterError, RosterSource, RosterSynchronizer};
use crate::stats::StatsStore;
use crate::subscribers::{SubscriberManager, SUBSCRIBER_QUEUE_CAP};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{DeathEvent, Notification, Packet, RosterEntry, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};

/// Messages sent from background tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    /// One roster poll completed; failure degrades to an empty roster.
    RosterFetched(Result<Vec<String>, RosterError>),
    #[allow(dead_code)]
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Cadence of the online-roster poll.
    pub roster_interval: Duration,
    /// Demo-mode event generation, `None` when fed by real game events.
    pub simulation: Option<SimulationConfig>,
    /// Cadence of the demo simulation tick.
    pub simulation_interval: Duration,
    pub max_subscribers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            roster_interval: Duration::from_secs(5),
            simulation: Some(SimulationConfig::default()),
            simulation_interval: Duration::from_secs(5),
            max_subscribers: 64,
        }
    }
}

/// Main server owning all authoritative dashboard state.
pub struct Server {
    socket: Arc<UdpSocket>,
    config: ServerConfig,

    stats: StatsStore,
    synchronizer: RosterSynchronizer,
    events: EventGenerator,
    subscribers: SubscriberManager,
    /// Roster of record from the last completed poll.
    roster: Vec<RosterEntry>,
    rng: StdRng,

    /// Set while a roster poll is outstanding; ticks are skipped meanwhile.
    refresh_in_flight: bool,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    poll_tx: mpsc::Sender<()>,
    poll_rx: Option<mpsc::Receiver<()>>,
}

impl Server {
    pub async fn new(addr: &str, config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", addr);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (poll_tx, poll_rx) = mpsc::channel(1);
        let max_subscribers = config.max_subscribers;

        Ok(Server {
            socket,
            config,
            stats: StatsStore::new(),
            synchronizer: RosterSynchronizer::new(),
            events: EventGenerator::new(),
            subscribers: SubscriberManager::new(max_subscribers),
            roster: Vec::new(),
            rng: StdRng::from_entropy(),
            refresh_in_flight: false,
            server_tx,
            server_rx,
            poll_tx,
            poll_rx: Some(poll_rx),
        })
    }

    /// Moves the roster source into its own task. Polls are strictly
    /// sequential: the task serves one request at a time and the loop sends
    /// the next request only after the previous answer arrived.
    pub fn spawn_roster_poller<S: RosterSource>(&mut self, mut source: S) {
        let server_tx = self.server_tx.clone();
        let mut poll_rx = match self.poll_rx.take() {
            Some(rx) => rx,
            None => {
                warn!("Roster poller already spawned");
                return;
            }
        };

        tokio::spawn(async move {
            while poll_rx.recv().await.is_some() {
                let result = source.fetch_online().await;
                if server_tx.send(ServerMessage::RosterFetched(result)).is_err() {
                    break;
                }
            }
        });
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns the writer task draining one subscriber's bounded queue.
    fn spawn_subscriber_writer(&self, addr: SocketAddr, mut rx: mpsc::Receiver<Packet>) {
        let socket = Arc::clone(&self.socket);

        tokio::spawn(async move {
            while let Some(packet) = rx.recv().await {
                match serialize(&packet) {
                    Ok(data) => {
                        if let Err(e) = socket.send_to(&data, addr).await {
                            error!("Failed to send to subscriber at {}: {}", addr, e);
                            break;
                        }
                    }
                    Err(e) => error!("Failed to serialize packet for {}: {}", addr, e),
                }
            }
        });
    }

    async fn send_packet(&self, packet: &Packet, addr: SocketAddr) {
        match serialize(packet) {
            Ok(data) => {
                if let Err(e) = self.socket.send_to(&data, addr).await {
                    error!("Failed to send packet to {}: {}", addr, e);
                }
            }
            Err(e) => error!("Failed to serialize packet: {}", e),
        }
    }

    /// Fans a notification out to every subscriber and disconnects the ones
    /// whose queues overflowed or whose writers died.
    async fn broadcast(&mut self, notification: Notification) {
        let dead = self.subscribers.broadcast(&Packet::Notify(notification));
        for id in dead {
            if let Some(addr) = self.subscribers.remove_subscriber(id) {
                let packet = Packet::Unsubscribed {
                    reason: "queue overflow".to_string(),
                };
                self.send_packet(&packet, addr).await;
            }
        }
    }

    fn stats_delta(&self, name: &str) -> Option<Notification> {
        self.stats.get(name).map(|player| Notification::StatsChanged {
            name: player.name.clone(),
            kills: player.kills,
            deaths: player.deaths,
        })
    }

    /// Pushes the deltas and the event for one recorded death.
    async fn publish_death(&mut self, event: DeathEvent) {
        if let Some(killer) = event.killer.clone() {
            if let Some(delta) = self.stats_delta(&killer) {
                self.broadcast(delta).await;
            }
        }
        if let Some(delta) = self.stats_delta(&event.victim) {
            self.broadcast(delta).await;
        }
        self.broadcast(Notification::DeathOccurred(event)).await;
    }

    async fn handle_subscribe(&mut self, addr: SocketAddr, client_version: u32) {
        if client_version != PROTOCOL_VERSION {
            info!(
                "Rejecting subscriber at {} (version {}, want {})",
                addr, client_version, PROTOCOL_VERSION
            );
            let packet = Packet::Unsubscribed {
                reason: "protocol version mismatch".to_string(),
            };
            self.send_packet(&packet, addr).await;
            return;
        }

        // A resubscribe from the same address replaces the old registration.
        if let Some(existing) = self.subscribers.find_by_addr(addr) {
            info!("Replacing existing subscriber {} from {}", existing, addr);
            self.subscribers.remove_subscriber(existing);
        }

        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAP);
        match self.subscribers.add_subscriber(addr, tx) {
            Some(id) => {
                self.spawn_subscriber_writer(addr, rx);
                self.subscribers.enqueue(id, Packet::Subscribed { subscriber_id: id });
                // Handshake: late joiners get the presence baseline pushed,
                // the death log still comes from the fetch surface.
                self.subscribers.enqueue(
                    id,
                    Packet::Notify(Notification::RosterChanged(self.roster.clone())),
                );
            }
            None => {
                let packet = Packet::Unsubscribed {
                    reason: "server full".to_string(),
                };
                self.send_packet(&packet, addr).await;
            }
        }
    }

    /// Forces a synthetic kill between two random distinct roster entries.
    async fn handle_test_event(&mut self, addr: SocketAddr) {
        if self.roster.len() < 2 {
            let packet = Packet::RequestFailed {
                reason: EventError::NotEnoughPlayers.to_string(),
            };
            self.send_packet(&packet, addr).await;
            return;
        }

        let killer_idx = self.rng.gen_range(0..self.roster.len());
        let victim_idx =
            (killer_idx + 1 + self.rng.gen_range(0..self.roster.len() - 1)) % self.roster.len();
        let killer = self.roster[killer_idx].name.clone();
        let victim = self.roster[victim_idx].name.clone();

        match self
            .events
            .trigger_kill(&mut self.stats, &self.roster, &killer, &victim)
        {
            Ok(event) => {
                self.send_packet(&Packet::TestEventResult(event.clone()), addr)
                    .await;
                self.publish_death(event).await;
            }
            Err(e) => {
                let packet = Packet::RequestFailed {
                    reason: e.to_string(),
                };
                self.send_packet(&packet, addr).await;
            }
        }
    }

    /// Processes one inbound packet from a viewer.
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        // Any traffic counts as liveness.
        self.subscribers.touch(addr);

        match packet {
            Packet::Subscribe { client_version } => {
                self.handle_subscribe(addr, client_version).await;
            }
            Packet::FetchRoster => {
                self.send_packet(&Packet::Roster(self.roster.clone()), addr)
                    .await;
            }
            Packet::FetchLeaderboard => {
                self.send_packet(&Packet::Leaderboard(self.stats.leaderboard()), addr)
                    .await;
            }
            Packet::FetchDeathLog => {
                self.send_packet(&Packet::DeathLog(self.events.recent()), addr)
                    .await;
            }
            Packet::TriggerTestEvent => {
                self.handle_test_event(addr).await;
            }
            Packet::Heartbeat => {
                // A heartbeat from an address we no longer track means the
                // viewer missed its removal (timeout sweep, server restart).
                // Tell it explicitly so it re-bootstraps instead of
                // heartbeating into the void against a stale mirror.
                if self.subscribers.find_by_addr(addr).is_none() {
                    let packet = Packet::Unsubscribed {
                        reason: "not subscribed".to_string(),
                    };
                    self.send_packet(&packet, addr).await;
                }
            }
            Packet::Unsubscribe => {
                if let Some(id) = self.subscribers.find_by_addr(addr) {
                    self.subscribers.remove_subscriber(id);
                }
            }
            _ => {
                warn!("Unexpected packet type from viewer at {}", addr);
            }
        }
    }

    async fn handle_roster_fetched(&mut self, result: Result<Vec<String>, RosterError>) {
        self.refresh_in_flight = false;
        self.roster = self.synchronizer.reconcile(result, &mut self.stats);
        self.broadcast(Notification::RosterChanged(self.roster.clone()))
            .await;
    }

    fn request_roster_refresh(&mut self) {
        if self.refresh_in_flight {
            debug!("Roster refresh still in flight, skipping tick");
            return;
        }
        match self.poll_tx.try_send(()) {
            Ok(()) => self.refresh_in_flight = true,
            Err(e) => warn!("Failed to request roster poll: {}", e),
        }
    }

    async fn run_simulation_tick(&mut self) {
        let config = match self.config.simulation {
            Some(config) => config,
            None => return,
        };

        let event = self
            .events
            .simulate_tick(&mut self.stats, &self.roster, &mut self.rng, &config);

        if let Some(event) = event {
            self.publish_death(event).await;
        }
    }

    async fn run_daily_reset(&mut self) {
        info!("Daily boundary reached, truncating death log");
        self.events.reset();
        self.broadcast(Notification::DeathLogReset).await;
    }

    async fn sweep_timeouts(&mut self) {
        for id in self.subscribers.check_timeouts() {
            info!("Subscriber {} timed out", id);
            if let Some(addr) = self.subscribers.remove_subscriber(id) {
                // Best effort: if the viewer is merely slow rather than gone,
                // this tells it to re-bootstrap.
                let packet = Packet::Unsubscribed {
                    reason: "timed out".to_string(),
                };
                self.send_packet(&packet, addr).await;
            }
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver();

        let mut roster_tick = interval(self.config.roster_interval);
        roster_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut simulation_tick = interval(self.config.simulation_interval);
        simulation_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let simulate = self.config.simulation.is_some();

        let mut sweep_tick = interval(Duration::from_secs(1));

        // First reset fires at the next wall-clock midnight, then every 24h.
        let mut reset_tick = interval_at(
            Instant::now() + until_next_midnight(),
            Duration::from_secs(86_400),
        );

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        }
                        Some(ServerMessage::RosterFetched(result)) => {
                            self.handle_roster_fetched(result).await;
                        }
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = roster_tick.tick() => {
                    self.request_roster_refresh();
                },

                _ = simulation_tick.tick(), if simulate => {
                    self.run_simulation_tick().await;
                },

                _ = reset_tick.tick() => {
                    self.run_daily_reset().await;
                },

                _ = sweep_tick.tick() => {
                    self.sweep_timeouts().await;

                    if self.events.len() % 25 == 0 && !self.events.is_empty() {
                        debug!(
                            "{} subscribers, {} roster entries, {} tracked players, {} deaths logged",
                            self.subscribers.len(),
                            self.roster.len(),
                            self.stats.len(),
                            self.events.len()
                        );
                    }
                },
            }
        }

        Ok(())
    }
}

/// Time remaining until the next wall-clock (UTC) midnight.
pub fn until_next_midnight() -> Duration {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0));
    let secs_today = now.as_secs() % 86_400;
    Duration::from_secs(86_400 - secs_today)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_server_message_packet_received() {
        let packet = Packet::Subscribe { client_version: 1 };
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8080);

        let msg = ServerMessage::PacketReceived {
            packet: packet.clone(),
            addr,
        };

        match msg {
            ServerMessage::PacketReceived { packet: p, addr: a } => {
                assert_eq!(a, addr);
                match p {
                    Packet::Subscribe { client_version } => assert_eq!(client_version, 1),
                    _ => panic!("Unexpected packet type"),
                }
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_roster_fetched_message_carries_failure() {
        let msg = ServerMessage::RosterFetched(Err(RosterError::Unreachable("timeout".into())));

        match msg {
            ServerMessage::RosterFetched(Err(RosterError::Unreachable(detail))) => {
                assert_eq!(detail, "timeout");
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_until_next_midnight_bounds() {
        let remaining = until_next_midnight();
        assert!(remaining > Duration::from_secs(0));
        assert!(remaining <= Duration::from_secs(86_400));
    }

    #[tokio::test]
    async fn test_refresh_guard_skips_overlapping_ticks() {
        let mut server = Server::new("127.0.0.1:0", ServerConfig::default())
            .await
            .unwrap();

        server.request_roster_refresh();
        assert!(server.refresh_in_flight);

        // Second tick while the poll is outstanding must not queue another
        // request; the poll channel has capacity one and is still full.
        server.request_roster_refresh();
        assert!(server.refresh_in_flight);

        let mut poll_rx = server.poll_rx.take().unwrap();
        assert!(poll_rx.try_recv().is_ok());
        assert!(poll_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_roster_fetch_failure_clears_roster() {
        let mut server = Server::new("127.0.0.1:0", ServerConfig::default())
            .await
            .unwrap();

        server
            .handle_roster_fetched(Ok(vec!["Alice".to_string(), "Bob".to_string()]))
            .await;
        assert_eq!(server.roster.len(), 2);

        server
            .handle_roster_fetched(Err(RosterError::Unreachable("timeout".into())))
            .await;
        assert!(server.roster.is_empty());
        // Counters survive the cleared roster.
        assert_eq!(server.stats.len(), 2);
    }

    #[tokio::test]
    async fn test_heartbeat_from_unknown_address_triggers_resubscribe() {
        let mut server = Server::new("127.0.0.1:0", ServerConfig::default())
            .await
            .unwrap();

        // Viewer whose registration was swept away (or never existed, as
        // after a server restart) keeps heartbeating.
        let viewer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let viewer_addr = viewer.local_addr().unwrap();

        server.handle_packet(Packet::Heartbeat, viewer_addr).await;

        let mut buffer = [0u8; 2048];
        let (len, _) = tokio::time::timeout(Duration::from_secs(1), viewer.recv_from(&mut buffer))
            .await
            .expect("server must answer an untracked heartbeat")
            .unwrap();

        match deserialize::<Packet>(&buffer[0..len]).unwrap() {
            Packet::Unsubscribed { reason } => assert_eq!(reason, "not subscribed"),
            other => panic!("Expected Unsubscribed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_heartbeat_from_registered_subscriber_is_not_rejected() {
        let mut server = Server::new("127.0.0.1:0", ServerConfig::default())
            .await
            .unwrap();

        let viewer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let viewer_addr = viewer.local_addr().unwrap();

        server.handle_subscribe(viewer_addr, PROTOCOL_VERSION).await;
        server.handle_packet(Packet::Heartbeat, viewer_addr).await;

        // The viewer sees only the handshake, never an Unsubscribed.
        let mut buffer = [0u8; 2048];
        loop {
            match tokio::time::timeout(
                Duration::from_millis(200),
                viewer.recv_from(&mut buffer),
            )
            .await
            {
                Ok(Ok((len, _))) => match deserialize::<Packet>(&buffer[0..len]).unwrap() {
                    Packet::Subscribed { .. } | Packet::Notify(_) => {}
                    other => panic!("Unexpected packet for live subscriber: {:?}", other),
                },
                _ => break,
            }
        }
    }

    #[tokio::test]
    async fn test_test_event_rejected_without_two_players() {
        let mut server = Server::new("127.0.0.1:0", ServerConfig::default())
            .await
            .unwrap();
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 9999);

        // Roster empty: request is rejected and no event is logged.
        server.handle_test_event(addr).await;
        assert!(server.events.is_empty());
    }
}
