//! Request-admission firewall.
//!
//! Decides for each incoming request whether it may reach the protected
//! upstream, using access lists, a sliding-window rate limiter, DDoS
//! detection, pattern-based threat rules and temporary bans.

pub mod api;
pub mod config;
pub mod core;
pub mod models;
pub mod proxy;
pub mod utils;
