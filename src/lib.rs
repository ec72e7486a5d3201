//! Workspace facade crate.
//!
//! Host applications depend on `nightlight-workspace` and get the composed
//! content core (`core-service`) with desktop defaults when the
//! `desktop-shims` feature is enabled.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;
