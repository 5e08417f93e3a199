//! Operating-system entropy for credential generation.

use crate::instance::domain::{CredentialError, EntropySource};
use rand::RngCore;
use rand::rngs::OsRng;

/// Entropy source backed by the operating system generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, destination: &mut [u8]) -> Result<(), CredentialError> {
        OsRng
            .try_fill_bytes(destination)
            .map_err(|err| CredentialError::Entropy(err.to_string()))
    }
}
