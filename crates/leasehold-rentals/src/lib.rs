//! Leasehold — rental management bounded context.
//!
//! Units, tenants and leases as event-sourced aggregates, the commands that
//! change them, and the directory read model that answers list queries.

pub mod application;
pub mod domain;
