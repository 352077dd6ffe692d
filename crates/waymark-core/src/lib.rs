//! waymark-core: Core library for waymark
//!
//! An operator scans a code to anchor a shared coordinate frame to a physical
//! location, places markers relative to that frame, and viewers later rebuild
//! the same markers from their own scan of the same code.
//!
//! # Architecture
//!
//! ```text
//! Code scan → Calibration Manager → Anchor
//!                    ↓
//!   tracking session ready → bind origin → Reconstruction → Scene renderer
//!                                              ↑
//! placement → Coordinate Translator → Reference Store (per-event, append-only)
//! ```
//!
//! # Modules
//!
//! - `geometry`: Persisted `{x,y,z}` triples and `glam` conversions
//! - `marker`: Marker records, ids, and creator roles
//! - `store`: Durable marker storage (JSON document per storage key)
//! - `calibration`: Anchor lifecycle (establish, bind origin, clear)
//! - `translator`: Absolute ↔ anchor-relative conversion
//! - `reconstruction`: Rebuilding placements for the current event
//! - `session`: Session lifecycle state machine
//! - `scanner`: Cancellable code-scanning task
//! - `collaborators`: Tracking, camera, decoder, and renderer contracts
//! - `config`: Configuration management
//! - `logging`: Structured logging
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod calibration;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod geometry;
pub mod logging;
pub mod marker;
pub mod reconstruction;
pub mod scanner;
pub mod session;
pub mod store;
pub mod translator;

pub use error::{Error, Result, StorageError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
