//! # document-worker
//!
//! Batching and change-tracking core for queue-driven document processing.
//!
//! Tasks are pulled from a [`source::TaskSource`] into size- and
//! time-bounded batches, handed to processing code as [`document::Document`]s
//! whose field edits are tracked against the original snapshot, and answered
//! with only the changes. Large values are offloaded to a
//! [`store::ValueStore`].

pub mod codec;
pub mod config;
pub mod context;
pub mod db;
pub mod document;
pub mod engine;
pub mod error;
pub mod model;
pub mod source;
pub mod store;
pub mod telemetry;
pub mod worker;
