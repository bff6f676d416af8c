//! Authoritative per-player counters, owned exclusively by the server loop.
//!
//! All mutation goes through [`StatsStore`] methods on the single server
//! task, so no locking is needed; every kill updates both parties in one
//! call and can never interleave with an independent death for the same
//! identity.

use log::debug;
use shared::PlayerStats;
use std::collections::HashMap;

/// In-memory ledger of every identity ever sighted.
///
/// First-sighting order is preserved so leaderboard ties stay stable across
/// recomputations.
#[derive(Debug, Default)]
pub struct StatsStore {
    players: Vec<PlayerStats>,
    index: HashMap<String, usize>,
}

impl StatsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a player's stats, creating a zeroed entry if absent.
    /// Never fails; unknown identities are silently created.
    pub fn get_or_create(&mut self, name: &str) -> &PlayerStats {
        let idx = self.index_of(name);
        &self.players[idx]
    }

    pub fn get(&self, name: &str) -> Option<&PlayerStats> {
        self.index.get(name).map(|&idx| &self.players[idx])
    }

    /// Credits `killer` with a kill and `victim` with a death as one logical
    /// unit. Caller is responsible for rejecting self-kills beforehand.
    pub fn record_kill(&mut self, killer: &str, victim: &str) {
        let killer_idx = self.index_of(killer);
        let victim_idx = self.index_of(victim);

        self.players[killer_idx].kills += 1;
        self.players[victim_idx].deaths += 1;

        debug!(
            "Recorded kill: {} ({} kills) -> {} ({} deaths)",
            killer, self.players[killer_idx].kills, victim, self.players[victim_idx].deaths
        );
    }

    /// Credits `victim` with a death and nobody with a kill.
    pub fn record_death(&mut self, victim: &str) {
        let idx = self.index_of(victim);
        self.players[idx].deaths += 1;
    }

    /// All tracked stats sorted by kills descending. The sort is stable, so
    /// equal-kill entries keep first-sighting order.
    pub fn leaderboard(&self) -> Vec<PlayerStats> {
        let mut sorted = self.players.clone();
        sorted.sort_by(|a, b| b.kills.cmp(&a.kills));
        sorted
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    fn index_of(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.players.len();
        self.players.push(PlayerStats::new(name));
        self.index.insert(name.to_string(), idx);
        idx
    }
}
