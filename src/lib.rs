//! Organizer Store - embedded persistence core
//!
//! This crate provides the storage layer behind the `ostore` CLI: an
//! in-memory SQLite engine persisted as byte snapshots, with a validated
//! query builder, savepoint transactions, schema migrations and a TTL cache.
//!
//! # Architecture
//!
//! - [`storage`] - Engine, query builder, transactions, schema, lifecycle
//! - [`cache`] - TTL + approximate-LRU read cache
//! - [`config`] - Data directory and cache tier configuration
//! - [`cli`] - Command-line interface using clap
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod storage;

pub use error::{Error, Result};
pub use storage::Database;
