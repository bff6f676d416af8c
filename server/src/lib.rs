//! # Dashboard Server Library
//!
//! Authoritative process behind the live player-stats dashboard. The server
//! owns the cumulative kill/death ledger, polls the game server for the
//! online roster, generates (or, in demo mode, simulates) death events, and
//! pushes incremental notifications to every subscribed viewer.
//!
//! ## Module Organization
//!
//! - [`stats`]: the per-player counter ledger, single-writer on the server
//!   loop
//! - [`roster`]: the external roster source abstraction and the poll
//!   reconciliation that rebuilds the roster of record
//! - [`events`]: kill/environmental-death entry points, the bounded death
//!   log and the demo simulation
//! - [`subscribers`]: the per-viewer bounded fan-out queues
//! - [`network`]: the UDP packet surface and the single coordinating
//!   select loop

pub mod events;
pub mod network;
pub mod roster;
pub mod stats;
pub mod subscribers;
