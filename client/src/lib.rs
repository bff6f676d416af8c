//! Dashboard viewer for the killboard server.
//!
//! Connects over UDP, fetches a baseline snapshot of the roster and the
//! recent-death log, then subscribes for incremental pushes and keeps a
//! local mirror in sync. The mirror is rendered as a text dashboard with
//! a leaderboard, the online roster, the death feed, and a transient
//! death-screen overlay.

pub mod mirror;
pub mod network;
pub mod overlay;
pub mod view;
