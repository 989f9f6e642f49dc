//! Strongly-typed bundle identifiers
//!
//! Downloaded bundles get a short random token; the bundle shipped with the
//! native package uses the reserved `builtin` sentinel.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved identifier of the bundle shipped inside the native package.
pub const BUILTIN_ID: &str = "builtin";

/// Length of generated bundle identifiers.
pub const GENERATED_ID_LEN: usize = 10;

/// Unique identifier for a bundle
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BundleId(String);

impl BundleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn builtin() -> Self {
        Self(BUILTIN_ID.to_string())
    }

    /// Generate a random 10-character alphanumeric identifier.
    ///
    /// Collisions are checked by the store, not here.
    pub fn generate() -> Self {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(GENERATED_ID_LEN)
            .map(char::from)
            .collect();
        Self(token)
    }

    pub fn is_builtin(&self) -> bool {
        self.0 == BUILTIN_ID
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BundleId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
