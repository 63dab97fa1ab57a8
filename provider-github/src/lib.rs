//! # GitHub Provider
//!
//! Implements the `GitDataProvider` trait on top of the GitHub Git Data REST API.
//!
//! ## Overview
//!
//! This module provides:
//! - Typed wrappers for blob, tree, commit and ref creation
//! - A rate-limit governor that consults cached primary/secondary quota before
//!   every call and records what each response says about it
//! - Bounded exponential retry of 5xx, throttled and transient network
//!   failures, with the governor consulted between attempts
//! - Conditional GETs (`If-None-Match`) replayed from a short-TTL cache on 304
//! - Automatic fallback between `Bearer` and `token` authorization schemes

pub mod cache;
pub mod connector;
pub mod error;
pub mod rate_limit;
mod retry;
pub mod types;

pub use cache::TtlCache;
pub use connector::{GitHubConfig, GitHubConnector};
pub use error::{GitHubError, Result};
pub use rate_limit::{GovernorDecision, RateLimitGovernor, RateLimitRecord};
