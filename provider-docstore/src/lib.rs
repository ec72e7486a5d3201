//! # Document Store Provider
//!
//! Implements `RemoteContentGateway` for a Firestore-style REST document store.
//!
//! ## Overview
//!
//! This module provides:
//! - Collection listing with `nextPageToken` pagination
//! - Optional API key authentication
//! - Exponential backoff on throttling, server and transport errors
//! - Fail-closed typed decoding of content, translation and audio-locale documents

pub mod connector;
pub mod decode;
pub mod error;
pub mod types;

pub use connector::DocStoreConnector;
pub use error::{DocStoreError, Result};
