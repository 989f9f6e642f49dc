//! Integrity verifier.
//!
//! A bundle is eligible for activation only if its (already normalized)
//! root holds the entry-point file. Verification never promotes a bundle to
//! `success`; only a post-activation health confirmation does that.

use ota_types::Bundle;

use crate::error::VerifyError;

pub const DEFAULT_ENTRY_POINT: &str = "index.html";

#[derive(Debug, Clone)]
pub struct Verifier {
    entry_point: String,
}

impl Verifier {
    pub fn new(entry_point: impl Into<String>) -> Self {
        Self {
            entry_point: entry_point.into(),
        }
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn verify(&self, bundle: &Bundle) -> Result<(), VerifyError> {
        if !bundle.storage.is_dir() {
            return Err(VerifyError::StorageMissing(bundle.id.clone()));
        }
        if !bundle.storage.join(&self.entry_point).is_file() {
            return Err(VerifyError::MissingEntryPoint {
                bundle: bundle.id.clone(),
                entry_point: self.entry_point.clone(),
            });
        }
        Ok(())
    }
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new(DEFAULT_ENTRY_POINT)
    }
}
