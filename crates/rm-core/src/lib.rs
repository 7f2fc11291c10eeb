//! rusty-market/crates/rm-core/src/lib.rs
//!
//! The domain model, port definitions and shared rules for Rusty-Market.
//! Nothing in here performs I/O; plugins implement the ports.

pub mod clock;
pub mod error;
pub mod models;
pub mod policy;
pub mod traits;
pub mod validation;

// Re-exporting for easier access in other crates
pub use clock::*;
pub use error::*;
pub use models::*;
pub use traits::*;
