//! kestrel Core Library
//!
//! Shared identifier types for kestrel.
//!
//! # Modules
//!
//! - [`ids`] - Strongly typed identifiers (UserId, ResourceId)
//!
//! # Example
//!
//! ```
//! use kestrel_core::{ResourceId, UserId};
//!
//! let user_id = UserId::new();
//! let resource_id = ResourceId::new();
//! ```

pub mod ids;

pub use ids::{ParseIdError, ResourceId, UserId};
