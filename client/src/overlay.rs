//! Transient "death screen" overlay shown for the latest death event.
//!
//! Explicit state machine: `Idle -> Showing` on event arrival, `Showing ->
//! Idle` after the dwell elapses. A new event arriving while one is showing
//! supersedes it and restarts the dwell; a generation counter makes the
//! stale scheduled hide a no-op instead of cutting the new overlay short.
//! There is no queueing, the newest event always wins.

use shared::DeathEvent;
use std::time::{Duration, Instant};

/// How long an overlay stays up before auto-hiding.
pub const OVERLAY_DWELL: Duration = Duration::from_secs(4);

#[derive(Debug, Default)]
pub struct DeathOverlay {
    showing: Option<(DeathEvent, Instant)>,
    generation: u64,
}

impl DeathOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shows `event`, superseding any current overlay, and returns the
    /// generation to pass to [`hide`](DeathOverlay::hide) when the dwell
    /// timer fires.
    pub fn show(&mut self, event: DeathEvent, now: Instant) -> u64 {
        self.generation += 1;
        self.showing = Some((event, now));
        self.generation
    }

    /// Scheduled transition back to idle. Does nothing when `generation` is
    /// stale, i.e. another event superseded the one this hide was armed for.
    pub fn hide(&mut self, generation: u64) {
        if generation == self.generation {
            self.showing = None;
        }
    }

    /// The event currently on screen, expiring it first if the dwell has
    /// elapsed. Usable instead of [`hide`](DeathOverlay::hide) by callers
    /// that poll on a render tick.
    pub fn current(&mut self, now: Instant) -> Option<&DeathEvent> {
        if let Some((_, shown_at)) = self.showing {
            if now.duration_since(shown_at) >= OVERLAY_DWELL {
                self.showing = None;
            }
        }
        self.showing.as_ref().map(|(event, _)| event)
    }

    pub fn is_showing(&self) -> bool {
        self.showing.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: u64) -> DeathEvent {
        DeathEvent {
            id,
            victim: "Bob".to_string(),
            killer: Some("Alice".to_string()),
            cause: None,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn test_idle_until_event() {
        let mut overlay = DeathOverlay::new();
        assert!(!overlay.is_showing());
        assert!(overlay.current(Instant::now()).is_none());
    }

    #[test]
    fn test_shows_then_expires_after_dwell() {
        let mut overlay = DeathOverlay::new();
        let start = Instant::now();

        overlay.show(event(1), start);
        assert_eq!(overlay.current(start).map(|e| e.id), Some(1));
        assert_eq!(
            overlay
                .current(start + OVERLAY_DWELL - Duration::from_millis(1))
                .map(|e| e.id),
            Some(1)
        );

        assert!(overlay.current(start + OVERLAY_DWELL).is_none());
        assert!(!overlay.is_showing());
    }

    #[test]
    fn test_new_event_supersedes_and_restarts_dwell() {
        let mut overlay = DeathOverlay::new();
        let start = Instant::now();

        overlay.show(event(1), start);
        let midway = start + Duration::from_secs(2);
        overlay.show(event(2), midway);

        // Past the first event's deadline the second is still showing.
        assert_eq!(
            overlay.current(start + OVERLAY_DWELL).map(|e| e.id),
            Some(2)
        );
        // The restarted dwell expires relative to the second event.
        assert!(overlay.current(midway + OVERLAY_DWELL).is_none());
    }

    #[test]
    fn test_stale_hide_is_a_no_op() {
        let mut overlay = DeathOverlay::new();
        let start = Instant::now();

        let first_generation = overlay.show(event(1), start);
        overlay.show(event(2), start + Duration::from_secs(1));

        overlay.hide(first_generation);
        assert!(overlay.is_showing());

        let current = overlay.show(event(3), start + Duration::from_secs(2));
        overlay.hide(current);
        assert!(!overlay.is_showing());
    }
}
