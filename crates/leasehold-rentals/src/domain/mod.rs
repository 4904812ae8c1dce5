//! Domain layer for the rental management context.

pub mod aggregates;
pub mod commands;
pub mod events;
