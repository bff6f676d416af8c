//! Terminal presentation of the dashboard.
//!
//! Pure functions from mirror state to text, recomputed wholesale after
//! every mutation. Rendering the same mirror twice yields the same text.

use crate::mirror::DashboardMirror;
use shared::DeathEvent;
use std::fmt::Write;

const RANK_MEDALS: [&str; 3] = ["#1", "#2", "#3"];

/// Renders the full dashboard: player count, podium, ranks 4-10, roster
/// grid and the death feed, with the overlay banner on top when present.
pub fn render_dashboard(mirror: &DashboardMirror, overlay: Option<&DeathEvent>) -> String {
    let mut out = String::new();

    if let Some(event) = overlay {
        let _ = writeln!(out, "{}", render_overlay(event));
    }

    let _ = writeln!(out, "=== {} players online ===", mirror.player_count());

    let podium = mirror.podium();
    if !podium.is_empty() {
        let _ = writeln!(out, "--- Top killers ---");
        for (rank, entry) in podium.iter().enumerate() {
            let _ = writeln!(
                out,
                "{} {} - {} kills",
                RANK_MEDALS[rank], entry.name, entry.kills
            );
        }
    }

    let runners = mirror.runners_up();
    if !runners.is_empty() {
        let _ = writeln!(out, "--- Ranks 4-10 ---");
        for (offset, entry) in runners.iter().enumerate() {
            let _ = writeln!(
                out,
                "#{:<2} {:<20} {:>4} kills {:>4} deaths",
                offset + 4,
                entry.name,
                entry.kills,
                entry.deaths
            );
        }
    }

    if mirror.player_count() > 0 {
        let _ = writeln!(out, "--- Online now ---");
        for entry in mirror.roster() {
            let _ = writeln!(
                out,
                "{:<20} K {:<4} D {:<4}",
                entry.name, entry.kills, entry.deaths
            );
        }
    }

    let _ = writeln!(out, "--- Recent deaths ---");
    if mirror.death_count() == 0 {
        let _ = writeln!(out, "(no deaths yet today)");
    } else {
        for event in mirror.death_feed() {
            let _ = writeln!(out, "[{}] {}", format_clock(event.timestamp_ms), event.describe());
        }
    }

    out
}

/// The transient death banner.
pub fn render_overlay(event: &DeathEvent) -> String {
    format!("*** {} ***", event.describe())
}

/// hh:mm:ss of a wall-clock millisecond timestamp, UTC.
fn format_clock(timestamp_ms: u64) -> String {
    let secs = timestamp_ms / 1000;
    format!(
        "{:02}:{:02}:{:02}",
        (secs / 3600) % 24,
        (secs / 60) % 60,
        secs % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Notification, RosterEntry};

    fn entry(name: &str, kills: u32) -> RosterEntry {
        RosterEntry {
            name: name.to_string(),
            session_id: 0,
            kills,
            deaths: 0,
            joined_at_ms: 0,
        }
    }

    fn mirror_with(roster: Vec<RosterEntry>) -> DashboardMirror {
        let mut mirror = DashboardMirror::new();
        mirror.apply(Notification::RosterChanged(roster));
        mirror
    }

    #[test]
    fn test_podium_rendered_in_rank_order() {
        let mirror = mirror_with(vec![entry("Alice", 2), entry("Bob", 9), entry("Carol", 5)]);

        let text = render_dashboard(&mirror, None);

        let bob = text.find("#1 Bob").unwrap();
        let carol = text.find("#2 Carol").unwrap();
        let alice = text.find("#3 Alice").unwrap();
        assert!(bob < carol && carol < alice);
    }

    #[test]
    fn test_empty_feed_placeholder() {
        let mirror = mirror_with(vec![entry("Alice", 0)]);
        let text = render_dashboard(&mirror, None);
        assert!(text.contains("(no deaths yet today)"));
    }

    #[test]
    fn test_overlay_banner_on_top() {
        let mirror = DashboardMirror::new();
        let event = DeathEvent {
            id: 1,
            victim: "Bob".to_string(),
            killer: Some("Alice".to_string()),
            cause: None,
            timestamp_ms: 0,
        };

        let text = render_dashboard(&mirror, Some(&event));
        assert!(text.starts_with("*** Bob was slain by Alice ***"));
    }

    #[test]
    fn test_rendering_is_idempotent() {
        let mut mirror = mirror_with(vec![entry("Alice", 3), entry("Bob", 3)]);
        mirror.apply(Notification::DeathOccurred(DeathEvent {
            id: 1,
            victim: "Bob".to_string(),
            killer: None,
            cause: Some("drowned".to_string()),
            timestamp_ms: 45_296_000, // 12:34:56 UTC
        }));

        let first = render_dashboard(&mirror, None);
        let second = render_dashboard(&mirror, None);

        assert_eq!(first, second);
        assert!(first.contains("[12:34:56] Bob drowned"));
    }
}
