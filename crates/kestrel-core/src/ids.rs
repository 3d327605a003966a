//! Strongly Typed Identifiers
//!
//! This module provides type-safe identifier types for kestrel.
//! Using the newtype pattern, these types prevent accidental misuse of
//! different ID types at compile time.
//!
//! # Example
//!
//! ```
//! use kestrel_core::{ResourceId, UserId};
//!
//! let user = UserId::new();
//! let resource = ResourceId::new();
//!
//! // Type safety: cannot pass UserId where ResourceId is expected
//! fn requires_resource(id: ResourceId) -> String {
//!     id.to_string()
//! }
//!
//! let result = requires_resource(resource);
//! // requires_resource(user); // This would not compile!
//! ```

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// Error type for ID parsing failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse
    pub id_type: &'static str,
    /// The underlying UUID parse error message
    pub message: String,
}

impl Display for ParseIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to parse {}: {}", self.id_type, self.message)
    }
}

impl std::error::Error for ParseIdError {}

/// Macro to define a strongly-typed ID type
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random ID using UUID v4.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an ID from an existing UUID.
            #[must_use]
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns a reference to the underlying UUID.
            #[must_use]
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|e| ParseIdError {
                        id_type: stringify!($name),
                        message: e.to_string(),
                    })
            }
        }
    };
}

define_id!(
    /// Strongly typed identifier for users.
    ///
    /// Users are owned by the identity subsystem; kestrel references them
    /// by this opaque id. Provides compile-time type safety to prevent
    /// confusion with other ID types.
    ///
    /// # Example
    ///
    /// ```
    /// use kestrel_core::UserId;
    ///
    /// let user_id = UserId::new();
    /// println!("User: {}", user_id);
    /// ```
    UserId
);

define_id!(
    /// Strongly typed identifier for managed resources.
    ///
    /// A resource is the external entity (e.g. an analytics property) to
    /// which access is granted.
    ///
    /// # Example
    ///
    /// ```
    /// use kestrel_core::ResourceId;
    /// use uuid::Uuid;
    ///
    /// let resource_id = ResourceId::new();
    ///
    /// // Create from existing UUID
    /// let uuid = Uuid::new_v4();
    /// let resource_id = ResourceId::from_uuid(uuid);
    /// assert_eq!(resource_id.as_uuid(), &uuid);
    /// ```
    ResourceId
);
