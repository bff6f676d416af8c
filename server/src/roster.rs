//! Roster synchronization against the external game server.
//!
//! The external source of truth is abstracted behind [`RosterSource`] so the
//! demo simulation, the real game-server query and test doubles all feed the
//! same reconciliation path. A failed query is an expected condition and maps
//! to an empty roster rather than a stale one, so disconnected "ghost"
//! players are never displayed.

use crate::stats::StatsStore;
use log::{info, warn};
use rand::Rng;
use shared::{unix_millis, RosterEntry};
use std::fmt;
use std::future::Future;

/// Why a roster query produced no player list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterError {
    /// The game server could not be reached (timeout, refused, ...).
    Unreachable(String),
    /// The game server answered something we could not interpret.
    Protocol(String),
}

impl fmt::Display for RosterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RosterError::Unreachable(detail) => write!(f, "roster source unreachable: {}", detail),
            RosterError::Protocol(detail) => write!(f, "roster source protocol error: {}", detail),
        }
    }
}

impl std::error::Error for RosterError {}

/// Query interface to the game server's online-player list.
///
/// Implementations may suspend for as long as they like; the server loop
/// guarantees that at most one `fetch_online` is in flight at a time.
pub trait RosterSource: Send + 'static {
    fn fetch_online(
        &mut self,
    ) -> impl Future<Output = Result<Vec<String>, RosterError>> + Send;
}

/// Assembles fresh [`RosterEntry`] lists from polled identity names.
///
/// Session ids are regenerated on every poll; no roster entry keeps object
/// identity across polls.
#[derive(Debug, Default)]
pub struct RosterSynchronizer {
    next_session_id: u64,
}

impl RosterSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the roster of record for one poll, creating zeroed stats for
    /// identities seen for the first time.
    pub fn build_roster(&mut self, names: &[String], stats: &mut StatsStore) -> Vec<RosterEntry> {
        let joined_at_ms = unix_millis();

        names
            .iter()
            .map(|name| {
                self.next_session_id += 1;
                let player = stats.get_or_create(name);
                RosterEntry {
                    name: player.name.clone(),
                    session_id: self.next_session_id,
                    kills: player.kills,
                    deaths: player.deaths,
                    joined_at_ms,
                }
            })
            .collect()
    }

    /// Maps a completed query onto the roster of record. Failures degrade to
    /// an empty roster (correctness over availability for presence data).
    pub fn reconcile(
        &mut self,
        fetched: Result<Vec<String>, RosterError>,
        stats: &mut StatsStore,
    ) -> Vec<RosterEntry> {
        match fetched {
            Ok(names) => self.build_roster(&names, stats),
            Err(e) => {
                warn!("Roster query failed, clearing roster: {}", e);
                Vec::new()
            }
        }
    }
}

/// Demo-mode roster source: players join and leave at random, as the real
/// game server would report.
pub struct SimulatedRosterSource<R: Rng + Send + 'static> {
    online: Vec<String>,
    rng: R,
    join_chance: f64,
    leave_chance: f64,
    max_players: usize,
}

impl<R: Rng + Send + 'static> SimulatedRosterSource<R> {
    pub fn new(rng: R) -> Self {
        Self {
            online: Vec::new(),
            rng,
            join_chance: 0.3,
            leave_chance: 0.05,
            max_players: 20,
        }
    }

    fn churn(&mut self) {
        if self.online.len() < self.max_players && self.rng.gen::<f64>() < self.join_chance {
            let guest = format!("Guest_{}", self.rng.gen_range(1000..10000));
            if !self.online.contains(&guest) {
                info!("Simulated join: {}", guest);
                self.online.push(guest);
            }
        }

        if !self.online.is_empty() && self.rng.gen::<f64>() < self.leave_chance {
            let idx = self.rng.gen_range(0..self.online.len());
            let gone = self.online.remove(idx);
            info!("Simulated leave: {}", gone);
        }
    }
}

impl<R: Rng + Send + 'static> RosterSource for SimulatedRosterSource<R> {
    async fn fetch_online(&mut self) -> Result<Vec<String>, RosterError> {
        self.churn();
        Ok(self.online.clone())
    }
}
