//! Client-local mirror of server state, rebuilt from the bootstrap baseline
//! and incremental notifications.
//!
//! The mirror never talks to the network: it is a pure state machine fed by
//! [`apply`](DashboardMirror::apply), and every presented view (leaderboard,
//! podium, roster grid, death feed) is re-derived from it. Deriving twice
//! from an unchanged mirror always yields identical output.

use log::debug;
use shared::{DeathEvent, Notification, RosterEntry, DEATH_LOG_CAP};
use std::collections::VecDeque;

/// How many leaderboard rows are highlighted as the podium.
pub const PODIUM_SIZE: usize = 3;

/// How many leaderboard rows follow the podium in the ranks table (4..=10).
pub const RUNNERS_UP_SIZE: usize = 7;

#[derive(Debug, Default, Clone)]
pub struct DashboardMirror {
    /// Current roster in server order; wholesale-replaced on every push.
    roster: Vec<RosterEntry>,
    /// Recent deaths, newest first, bounded at [`DEATH_LOG_CAP`].
    deaths: VecDeque<DeathEvent>,
}

impl DashboardMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the mirror from the bootstrap responses, discarding anything
    /// applied before. Used on first connect and after every reconnect.
    pub fn bootstrap(&mut self, roster: Vec<RosterEntry>, deaths: Vec<DeathEvent>) {
        self.roster = roster;
        self.deaths = deaths.into_iter().take(DEATH_LOG_CAP).collect();
    }

    /// Applies one incremental notification.
    pub fn apply(&mut self, notification: Notification) {
        match notification {
            Notification::RosterChanged(roster) => {
                self.roster = roster;
            }
            Notification::StatsChanged {
                name,
                kills,
                deaths,
            } => {
                // Resolve by name: session ids regenerate every poll. An
                // unknown name is dropped; the next full roster push heals it.
                match self.roster.iter_mut().find(|entry| entry.name == name) {
                    Some(entry) => {
                        entry.kills = kills;
                        entry.deaths = deaths;
                    }
                    None => debug!("Dropping stats delta for unknown player {}", name),
                }
            }
            Notification::DeathOccurred(event) => {
                self.deaths.push_front(event);
                self.deaths.truncate(DEATH_LOG_CAP);
            }
            Notification::DeathLogReset => {
                self.deaths.clear();
            }
        }
    }

    pub fn player_count(&self) -> usize {
        self.roster.len()
    }

    /// The roster grid in server order.
    pub fn roster(&self) -> &[RosterEntry] {
        &self.roster
    }

    /// The death feed, newest first.
    pub fn death_feed(&self) -> impl Iterator<Item = &DeathEvent> {
        self.deaths.iter()
    }

    pub fn death_count(&self) -> usize {
        self.deaths.len()
    }

    /// Roster ranked by kills descending. The sort is stable, so equal-kill
    /// entries keep their roster order across recomputations.
    pub fn leaderboard(&self) -> Vec<RosterEntry> {
        let mut ranked = self.roster.clone();
        ranked.sort_by(|a, b| b.kills.cmp(&a.kills));
        ranked
    }

    /// Top three of the leaderboard.
    pub fn podium(&self) -> Vec<RosterEntry> {
        self.leaderboard().into_iter().take(PODIUM_SIZE).collect()
    }

    /// Leaderboard ranks 4 through 10.
    pub fn runners_up(&self) -> Vec<RosterEntry> {
        self.leaderboard()
            .into_iter()
            .skip(PODIUM_SIZE)
            .take(RUNNERS_UP_SIZE)
            .collect()
    }
}
