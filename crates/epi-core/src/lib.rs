//! Core types and trait definitions for the epidemiological metrics service.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! Every other crate in the workspace depends on it: the SQLite store
//! implements [`store::MetricsStore`], the ingestion worker writes through it,
//! and the chart engine consumes [`plots::PlotGenerationData`].

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod alerts;
pub mod app_mode;
pub mod dimension;
pub mod error;
pub mod plots;
pub mod rbac;
pub mod record;
pub mod store;
pub mod trends;

pub use error::{Error, Result};
