//! Application layer for the rental management context.

pub mod command_handlers;
pub mod directory;
pub mod query_handlers;
