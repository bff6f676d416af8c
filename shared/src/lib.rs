//! Wire protocol and data model shared by the dashboard server and viewers.
//!
//! The server is authoritative: viewers bootstrap a baseline through the
//! request/response packets, then subscribe and apply incremental
//! [`Notification`]s to a local mirror. All packets travel as bincode
//! datagrams.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Protocol version carried in `Subscribe`, bumped on incompatible changes.
pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum number of death events retained by the server and mirrored by
/// viewers. Oldest entries are evicted first.
pub const DEATH_LOG_CAP: usize = 100;

/// Cumulative per-player counters, keyed by display name.
///
/// Entries are created zeroed on first sighting and survive roster churn for
/// the life of the server process.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PlayerStats {
    pub name: String,
    pub kills: u32,
    pub deaths: u32,
}

impl PlayerStats {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kills: 0,
            deaths: 0,
        }
    }
}

/// One row of the current online roster.
///
/// `session_id` is regenerated on every roster poll and must never be used as
/// a stable key; correlate entries by `name` instead.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub name: String,
    pub session_id: u64,
    pub kills: u32,
    pub deaths: u32,
    pub joined_at_ms: u64,
}

/// A single kill or environmental death, immutable once broadcast.
///
/// `killer` is absent for environmental causes; `cause` is only set when
/// there is no killer. The display message is derived by
/// [`describe`](DeathEvent::describe), never stored pre-rendered.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DeathEvent {
    pub id: u64,
    pub victim: String,
    pub killer: Option<String>,
    pub cause: Option<String>,
    pub timestamp_ms: u64,
}

impl DeathEvent {
    /// Renders the human-readable summary from the structured fields.
    pub fn describe(&self) -> String {
        match (&self.killer, &self.cause) {
            (Some(killer), _) => format!("{} was slain by {}", self.victim, killer),
            (None, Some(cause)) => format!("{} {}", self.victim, cause),
            (None, None) => format!("{} died", self.victim),
        }
    }
}

/// Incremental state change pushed to every live subscriber.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Full roster replacement. Also sent once on subscribe as the handshake.
    RosterChanged(Vec<RosterEntry>),
    /// Counter-only delta for a single identity, resolved by name.
    StatsChanged {
        name: String,
        kills: u32,
        deaths: u32,
    },
    /// A new death event, already appended to the server's log.
    DeathOccurred(DeathEvent),
    /// The daily truncation fired; mirrors must clear, not merge.
    DeathLogReset,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    // Client -> server
    Subscribe {
        client_version: u32,
    },
    FetchRoster,
    FetchLeaderboard,
    FetchDeathLog,
    TriggerTestEvent,
    Heartbeat,
    Unsubscribe,

    // Server -> client
    Subscribed {
        subscriber_id: u32,
    },
    Roster(Vec<RosterEntry>),
    Leaderboard(Vec<PlayerStats>),
    DeathLog(Vec<DeathEvent>),
    TestEventResult(DeathEvent),
    RequestFailed {
        reason: String,
    },
    Notify(Notification),
    Unsubscribed {
        reason: String,
    },
}

/// Wall-clock milliseconds since the Unix epoch, clamped into `u64`.
pub fn unix_millis() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis();
    millis.min(u64::MAX as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_stats_start_zeroed() {
        let stats = PlayerStats::new("Alice");
        assert_eq!(stats.name, "Alice");
        assert_eq!(stats.kills, 0);
        assert_eq!(stats.deaths, 0);
    }

    #[test]
    fn test_describe_kill() {
        let event = DeathEvent {
            id: 1,
            victim: "Bob".to_string(),
            killer: Some("Alice".to_string()),
            cause: None,
            timestamp_ms: 0,
        };
        assert_eq!(event.describe(), "Bob was slain by Alice");
    }

    #[test]
    fn test_describe_environmental() {
        let event = DeathEvent {
            id: 2,
            victim: "Bob".to_string(),
            killer: None,
            cause: Some("fell from a high place".to_string()),
            timestamp_ms: 0,
        };
        assert_eq!(event.describe(), "Bob fell from a high place");
    }

    #[test]
    fn test_describe_without_cause() {
        let event = DeathEvent {
            id: 3,
            victim: "Bob".to_string(),
            killer: None,
            cause: None,
            timestamp_ms: 0,
        };
        assert_eq!(event.describe(), "Bob died");
    }

    #[test]
    fn test_describe_substring_names() {
        // Names that contain each other must not corrupt the message.
        let event = DeathEvent {
            id: 4,
            victim: "Al".to_string(),
            killer: Some("Alice".to_string()),
            cause: None,
            timestamp_ms: 0,
        };
        assert_eq!(event.describe(), "Al was slain by Alice");
    }

    #[test]
    fn test_notification_serialization() {
        let notification = Notification::StatsChanged {
            name: "Alice".to_string(),
            kills: 5,
            deaths: 2,
        };
        let packet = Packet::Notify(notification);

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Notify(Notification::StatsChanged {
                name,
                kills,
                deaths,
            }) => {
                assert_eq!(name, "Alice");
                assert_eq!(kills, 5);
                assert_eq!(deaths, 2);
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_roster_serialization() {
        let roster = vec![RosterEntry {
            name: "Alice".to_string(),
            session_id: 7,
            kills: 1,
            deaths: 0,
            joined_at_ms: 1000,
        }];

        let serialized = bincode::serialize(&Packet::Roster(roster)).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Roster(entries) => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].name, "Alice");
                assert_eq!(entries[0].session_id, 7);
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_unix_millis_plausible() {
        let a = unix_millis();
        let b = unix_millis();
        assert!(b >= a);
        assert!(a > 1_600_000_000_000); // past 2020
    }
}
