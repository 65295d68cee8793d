//! Type-safe string identifiers.
//!
//! Achievement and group identifiers are authored by hand in configuration
//! files, so they wrap a [`String`] rather than a generated UUID. Kinds are
//! the stable discriminants used for capability matching: a handler or a
//! reward dispenser declares the kind it serves, and a configuration carries
//! the kind it belongs to.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Generates a newtype wrapper around [`String`] with standard derives.
macro_rules! define_key {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[serde(transparent)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub String);

        impl $name {
            /// Create a new key from anything convertible into a [`String`].
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the key as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Return the inner [`String`] value.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl core::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

define_key! {
    /// Identifier of an achievement, unique within its declaring scope.
    AchievementId
}

define_key! {
    /// Identifier of an achievement group.
    GroupId
}

define_key! {
    /// Discriminant of an achievement configuration's shape.
    ///
    /// Handlers declare the kind they apply progress to (for example
    /// `"kills"` or `"distance"`).
    ConfigKind
}

define_key! {
    /// Discriminant of a reward descriptor's shape.
    ///
    /// Reward dispensers declare the kind they deliver (for example
    /// `"coins"` or `"item"`).
    RewardKind
}
