//! seoscout library
//!
//! Exposes the response cache, the multi-source aggregator and the SEO data
//! clients built on them, for the binary and for integration tests.

pub mod aggregator;
pub mod analysis;
pub mod cache;
pub mod cli;
pub mod config;
pub mod recommendations;
pub mod report;
pub mod sources;
