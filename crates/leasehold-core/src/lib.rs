//! Leasehold Core — event-sourced persistence abstractions.
//!
//! Events are stored per aggregate under optimistic concurrency, replayed to
//! rebuild aggregate state, and exposed as a single globally ordered
//! notification log for projections. This crate holds the model, the
//! recorder contract and an in-memory recorder; `PostgreSQL` lives in
//! `leasehold-event-store`.

pub mod aggregate;
pub mod clock;
pub mod command;
pub mod error;
pub mod event;
pub mod memory;
pub mod notification;
pub mod projection;
pub mod recorder;
pub mod repository;
pub mod snapshot;
pub mod store;
