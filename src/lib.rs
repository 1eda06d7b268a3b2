//! Serving-path caches for templated page generation.
//!
//! [`pool`] keeps reusable keyword and image pools per group, [`templates`]
//! caches page templates with a default-group fallback, [`batcher`] coalesces
//! status write-backs into transactional flushes and [`classify`] answers
//! rule-based request classification from a bounded TTL cache.

pub mod application;
pub mod batcher;
pub mod classify;
pub mod config;
pub mod domain;
pub mod infra;
pub mod pool;
pub mod templates;

mod util;
