//! Viewer-side networking: bootstrap over request/response, then subscribe
//! for incremental pushes.
//!
//! The baseline roster and death log are fetched before subscribing so the
//! first push can never precede its baseline. Anything missed while
//! disconnected is not replayed; on reconnect the client simply
//! re-bootstraps from scratch.

use crate::mirror::DashboardMirror;
use crate::overlay::DeathOverlay;
use crate::view::render_dashboard;
use bincode::{deserialize, serialize};
use log::{error, info, warn};
use shared::{DeathEvent, Notification, Packet, RosterEntry, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{interval, timeout, Instant};

/// How long to wait for one bootstrap response before resending the request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

/// Bootstrap attempts per request before giving up on the server.
const REQUEST_RETRIES: u32 = 5;

/// Cadence of keep-alive heartbeats while subscribed.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2);

/// Cadence of overlay-expiry checks and re-renders.
const RENDER_INTERVAL: Duration = Duration::from_millis(500);

/// A live subscription sees a roster push every poll, so this much inbound
/// silence means the subscription was lost without an `Unsubscribed`.
const SERVER_SILENCE_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay before retrying a failed bootstrap, doubled per consecutive
/// failure up to [`BOOTSTRAP_RETRY_MAX`].
const BOOTSTRAP_RETRY_MIN: Duration = Duration::from_secs(1);
const BOOTSTRAP_RETRY_MAX: Duration = Duration::from_secs(30);

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    subscriber_id: Option<u32>,
    connected: bool,

    mirror: DashboardMirror,
    overlay: DeathOverlay,
    /// Redraw requested by a state change since the last render tick.
    dirty: bool,
}

impl Client {
    pub async fn new(server_addr: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        Ok(Client {
            socket,
            server_addr,
            subscriber_id: None,
            connected: false,
            mirror: DashboardMirror::new(),
            overlay: DeathOverlay::new(),
            dirty: false,
        })
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    /// Sends `request` and waits for the response `extract` accepts,
    /// retrying on timeout. Unrelated packets arriving in between are
    /// discarded; we are not subscribed yet, so nothing pushed matters.
    async fn request<T>(
        &mut self,
        request: Packet,
        extract: fn(Packet) -> Option<T>,
    ) -> Result<T, Box<dyn std::error::Error>> {
        let mut buffer = [0u8; 65536];

        for attempt in 1..=REQUEST_RETRIES {
            self.send_packet(&request).await?;

            let deadline = Instant::now() + REQUEST_TIMEOUT;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match timeout(remaining, self.socket.recv_from(&mut buffer)).await {
                    Ok(Ok((len, _))) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Some(value) = extract(packet) {
                                return Ok(value);
                            }
                        }
                    }
                    Ok(Err(e)) => return Err(e.into()),
                    Err(_) => {
                        warn!("Request timed out (attempt {}/{})", attempt, REQUEST_RETRIES);
                        break;
                    }
                }
            }
        }

        Err("server did not answer bootstrap request".into())
    }

    /// Fetches the baseline roster and death log, then subscribes. Ordering
    /// matters: subscribing first could race a push past the baseline.
    async fn bootstrap(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Bootstrapping baseline state from {}", self.server_addr);

        let roster: Vec<RosterEntry> = self
            .request(Packet::FetchRoster, |packet| match packet {
                Packet::Roster(roster) => Some(roster),
                _ => None,
            })
            .await?;

        let deaths: Vec<DeathEvent> = self
            .request(Packet::FetchDeathLog, |packet| match packet {
                Packet::DeathLog(deaths) => Some(deaths),
                _ => None,
            })
            .await?;

        self.mirror.bootstrap(roster, deaths);

        self.send_packet(&Packet::Subscribe {
            client_version: PROTOCOL_VERSION,
        })
        .await?;
        self.dirty = true;

        Ok(())
    }

    /// Returns `true` if the server dropped this subscription.
    fn handle_packet(&mut self, packet: Packet) -> bool {
        match packet {
            Packet::Subscribed { subscriber_id } => {
                info!("Subscribed! Viewer ID: {}", subscriber_id);
                self.subscriber_id = Some(subscriber_id);
                self.connected = true;
            }

            Packet::Notify(notification) => {
                if let Notification::DeathOccurred(event) = &notification {
                    self.overlay.show(event.clone(), std::time::Instant::now());
                }
                self.mirror.apply(notification);
                self.dirty = true;
            }

            Packet::Unsubscribed { reason } => {
                warn!("Unsubscribed by server: {}", reason);
                self.connected = false;
                return true;
            }

            // Stray bootstrap responses from a retried request.
            Packet::Roster(_) | Packet::DeathLog(_) | Packet::Leaderboard(_) => {}

            _ => {
                warn!("Unexpected packet type");
            }
        }
        false
    }

    fn render(&mut self) {
        let overlay = self.overlay.current(std::time::Instant::now());
        let text = render_dashboard(&self.mirror, overlay);
        println!("{}", text);
        self.dirty = false;
    }

    /// One connected session: runs until the server drops us.
    async fn run_session(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let mut heartbeat_tick = interval(HEARTBEAT_INTERVAL);
        let mut render_tick = interval(RENDER_INTERVAL);
        let mut buffer = [0u8; 65536];
        let mut last_inbound = std::time::Instant::now();

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => {
                            last_inbound = std::time::Instant::now();
                            if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                                if self.handle_packet(packet) {
                                    return Ok(());
                                }
                            }
                        }
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = heartbeat_tick.tick() => {
                    // Nothing to keep alive until the server confirms us.
                    if self.connected {
                        if let Err(e) = self.send_packet(&Packet::Heartbeat).await {
                            error!("Error sending heartbeat: {}", e);
                        }
                    }
                },

                _ = render_tick.tick() => {
                    // The server acks nothing, but a live subscription still
                    // gets the per-poll roster push. Total silence past the
                    // threshold means we were dropped without notice.
                    if self.connected && last_inbound.elapsed() > SERVER_SILENCE_TIMEOUT {
                        warn!(
                            "No server traffic for {:?}, assuming subscription lost",
                            SERVER_SILENCE_TIMEOUT
                        );
                        return Ok(());
                    }

                    let was_showing = self.overlay.is_showing();
                    let overlay_expired =
                        was_showing && self.overlay.current(std::time::Instant::now()).is_none();
                    if self.dirty || overlay_expired {
                        self.render();
                    }
                },
            }
        }
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let mut retry_delay = BOOTSTRAP_RETRY_MIN;

        loop {
            // A server outage is an expected condition, never fatal; keep
            // retrying until the server comes back.
            let bootstrapped = match self.bootstrap().await {
                Ok(()) => true,
                Err(e) => {
                    warn!("Bootstrap failed ({}), retrying in {:?}", e, retry_delay);
                    false
                }
            };
            if !bootstrapped {
                tokio::time::sleep(retry_delay).await;
                retry_delay = (retry_delay * 2).min(BOOTSTRAP_RETRY_MAX);
                continue;
            }
            retry_delay = BOOTSTRAP_RETRY_MIN;
            self.render();

            self.run_session().await?;

            if let Some(id) = self.subscriber_id.take() {
                warn!("Viewer {} lost its subscription, re-bootstrapping...", id);
            } else {
                warn!("Connection lost, re-bootstrapping...");
            }
            self.connected = false;
            self.mirror = DashboardMirror::new();
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bootstrap_failure_retries_instead_of_exiting() {
        // Grab a port nobody listens on, so every bootstrap request times out.
        let unused = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let dead_addr = unused.local_addr().unwrap().to_string();
        drop(unused);

        let mut client = Client::new(&dead_addr).await.unwrap();
        let handle = tokio::spawn(async move { client.run().await.map_err(|e| e.to_string()) });

        // One full bootstrap attempt exhausts its retries well within this
        // window; a viewer that treated the failure as fatal would have
        // returned by now.
        tokio::time::sleep(REQUEST_TIMEOUT * REQUEST_RETRIES + Duration::from_millis(1500)).await;
        assert!(
            !handle.is_finished(),
            "Viewer must survive a server outage and keep retrying"
        );
        handle.abort();
    }

    #[test]
    fn test_silence_threshold_spans_multiple_roster_pushes() {
        // The watchdog must tolerate at least two missed roster polls (5 s
        // cadence) before declaring the subscription lost, or a single
        // delayed push would cause spurious re-bootstraps.
        assert!(SERVER_SILENCE_TIMEOUT >= Duration::from_secs(10));
        assert!(SERVER_SILENCE_TIMEOUT > HEARTBEAT_INTERVAL);
    }
}
