//! Application-facing contracts shared by the pools, caches and adapters.

pub mod error;
pub mod repos;
