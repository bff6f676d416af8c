//! Kill/death event generation and the bounded death log.
//!
//! Real game events and the demo simulation both enter through
//! [`EventGenerator::trigger_kill`] and
//! [`EventGenerator::trigger_environmental_death`]; the generator applies the
//! stats mutation and appends to the log as one unit on the server loop.

use crate::stats::StatsStore;
use log::info;
use rand::Rng;
use shared::{unix_millis, DeathEvent, RosterEntry, DEATH_LOG_CAP};
use std::collections::VecDeque;
use std::fmt;

/// Environmental death causes used by the demo simulation.
pub const DEATH_CAUSES: &[&str] = &[
    "was blown up by Creeper",
    "fell from a high place",
    "tried to swim in lava",
    "was shot by Skeleton",
    "starved to death",
    "suffocated in a wall",
    "drowned",
    "experienced kinetic energy",
    "was slain by Zombie",
    "hit the ground too hard",
];

/// Invalid event request, surfaced to the immediate caller only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// Killer and victim are the same identity.
    SelfKill,
    /// Fewer than two distinct identities are currently online.
    NotEnoughPlayers,
}

impl fmt::Display for EventError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventError::SelfKill => write!(f, "self-kill is not permitted"),
            EventError::NotEnoughPlayers => {
                write!(f, "need at least two distinct online players")
            }
        }
    }
}

impl std::error::Error for EventError {}

/// Per-tick probabilities for the demo simulation.
///
/// The two chances partition a single random draw, so at most one event
/// fires per tick.
#[derive(Debug, Clone, Copy)]
pub struct SimulationConfig {
    pub kill_chance: f64,
    pub death_chance: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            kill_chance: 0.4,
            death_chance: 0.15,
        }
    }
}

/// Produces death events and retains the most recent [`DEATH_LOG_CAP`] of
/// them, newest first.
#[derive(Debug, Default)]
pub struct EventGenerator {
    log: VecDeque<DeathEvent>,
    next_event_id: u64,
}

impl EventGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a kill: killer gains a kill, victim gains a death, and a
    /// death event with the killer set is appended.
    ///
    /// Rejected without touching any state when killer equals victim or when
    /// the roster holds fewer than two distinct identities.
    pub fn trigger_kill(
        &mut self,
        stats: &mut StatsStore,
        roster: &[RosterEntry],
        killer: &str,
        victim: &str,
    ) -> Result<DeathEvent, EventError> {
        if killer == victim {
            return Err(EventError::SelfKill);
        }
        if roster.len() < 2 {
            return Err(EventError::NotEnoughPlayers);
        }

        stats.record_kill(killer, victim);

        let event = self.append(victim, Some(killer.to_string()), None);
        info!("Kill: {}", event.describe());
        Ok(event)
    }

    /// Records an environmental death: only the victim's death count moves
    /// and the event carries a cause instead of a killer.
    pub fn trigger_environmental_death(
        &mut self,
        stats: &mut StatsStore,
        victim: &str,
        cause: &str,
    ) -> DeathEvent {
        stats.record_death(victim);

        let event = self.append(victim, None, Some(cause.to_string()));
        info!("Death: {}", event.describe());
        event
    }

    /// Runs one demo-simulation tick. A single draw selects kill,
    /// environmental death or nothing, so at most one event fires.
    pub fn simulate_tick<R: Rng>(
        &mut self,
        stats: &mut StatsStore,
        roster: &[RosterEntry],
        rng: &mut R,
        config: &SimulationConfig,
    ) -> Option<DeathEvent> {
        if roster.is_empty() {
            return None;
        }

        let draw = rng.gen::<f64>();
        if draw < config.kill_chance {
            if roster.len() < 2 {
                return None;
            }
            let killer_idx = rng.gen_range(0..roster.len());
            // Offset guarantees a distinct victim without rerolling.
            let victim_idx = (killer_idx + 1 + rng.gen_range(0..roster.len() - 1)) % roster.len();
            let killer = roster[killer_idx].name.clone();
            let victim = roster[victim_idx].name.clone();
            self.trigger_kill(stats, roster, &killer, &victim).ok()
        } else if draw < config.kill_chance + config.death_chance {
            let victim = roster[rng.gen_range(0..roster.len())].name.clone();
            let cause = DEATH_CAUSES[rng.gen_range(0..DEATH_CAUSES.len())];
            Some(self.trigger_environmental_death(stats, &victim, cause))
        } else {
            None
        }
    }

    /// The retained log, newest first.
    pub fn recent(&self) -> Vec<DeathEvent> {
        self.log.iter().cloned().collect()
    }

    /// Daily truncation: drops every retained event.
    pub fn reset(&mut self) {
        info!("Resetting death log ({} entries dropped)", self.log.len());
        self.log.clear();
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    fn append(
        &mut self,
        victim: &str,
        killer: Option<String>,
        cause: Option<String>,
    ) -> DeathEvent {
        self.next_event_id += 1;
        let event = DeathEvent {
            id: self.next_event_id,
            victim: victim.to_string(),
            killer,
            cause,
            timestamp_ms: unix_millis(),
        };

        self.log.push_front(event.clone());
        if self.log.len() > DEATH_LOG_CAP {
            self.log.pop_back();
        }

        event
    }
}
