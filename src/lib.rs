//! Data collection pipeline for the Queensland Youth Justice Tracker.
//!
//! Targets (government web pages, PDFs and JSON endpoints) are fetched,
//! turned into typed facts by declarative extraction rules, and upserted
//! into a SQLite store keyed by natural key. Every run updates a health row
//! per target so failing sources are visible and alerted on.

pub mod alerts;
pub mod analysis;
pub mod config;
pub mod extract;
pub mod fetch;
pub mod http_client;
pub mod models;
pub mod pipeline;
pub mod rate_limit;
pub mod repository;
pub mod resolve;
pub mod schema;
pub mod seed;
pub mod store;
