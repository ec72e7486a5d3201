//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by the content core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus for sync, library and download notifications
//!
//! ## Overview
//!
//! This crate contains the runtime utilities the other crates depend on. It
//! establishes the logging conventions, the configuration builder hosts use to
//! assemble the core, and the event broadcasting every long-running operation
//! reports through.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CoreConfig, CoreConfigBuilder, RemoteStoreConfig, SyncSettings};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus, EventStream};
