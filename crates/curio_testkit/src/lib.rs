//! # Curio Testkit
//!
//! Test utilities for the Curio sync engine.
//!
//! This crate provides:
//! - Temporary data directories and in-memory stores
//! - Sample catalog items, locations and photos
//! - Property-based test generators for every document domain
//!
//! ## Usage
//!
//! ```rust,ignore
//! use curio_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_data_dir() {
//!     let dir = TestDataDir::new();
//!     let store = dir.store();
//!     // ... start an engine over `store`
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
