//! Ingestion of inbound metric payloads.
//!
//! A [`worker::Worker`] long-polls a [`queue::MessageQueue`] for
//! notifications, fetches the referenced payload from an
//! [`storage::ObjectStore`], writes it through an [`ingester::Ingester`] and
//! files the payload under `processed/` or `failed/`.

pub mod error;
pub mod ingester;
pub mod payload;
pub mod queue;
pub mod storage;
pub mod worker;

pub use error::{Error, Result, ValidationError};

#[cfg(test)]
mod tests;
