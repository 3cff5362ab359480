use std::{
    fmt::Display,
    hash::{Hash, Hasher},
    sync::Arc,
};

use sha2::{Digest, Sha256, Sha512};

use super::descriptor::ModuleDescriptor;

/// A module descriptor together with where it was found.
///
/// Equality and hashing consider the descriptor and the location only, the content is
/// carried solely to compute hashes.
#[derive(Debug, Clone)]
pub struct ModuleReference {
    descriptor: Arc<ModuleDescriptor>,
    location: Option<String>,
    content: Option<Arc<[u8]>>,
}

impl ModuleReference {
    pub fn new(descriptor: ModuleDescriptor, location: Option<String>) -> Self {
        ModuleReference {
            descriptor: Arc::new(descriptor),
            location,
            content: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<Arc<[u8]>>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn content(&self) -> Option<&[u8]> {
        self.content.as_deref()
    }

    /// Computes the digest of the module content with the given algorithm.
    ///
    /// Without content, a precomputed hash on the descriptor is used when its algorithm
    /// matches. Returns `None` when no digest can be produced.
    pub fn compute_hash(&self, algorithm: &str) -> Option<Vec<u8>> {
        match &self.content {
            Some(content) => digest(algorithm, content),
            None => self
                .descriptor
                .content_hash()
                .filter(|hash| hash.algorithm.eq_ignore_ascii_case(algorithm))
                .map(|hash| hash.digest.clone()),
        }
    }
}

fn digest(algorithm: &str, content: &[u8]) -> Option<Vec<u8>> {
    match algorithm.to_ascii_uppercase().as_str() {
        "SHA-256" | "SHA256" => Some(Sha256::digest(content).to_vec()),
        "SHA-512" | "SHA512" => Some(Sha512::digest(content).to_vec()),
        _ => None,
    }
}

impl PartialEq for ModuleReference {
    fn eq(&self, other: &Self) -> bool {
        self.location == other.location && self.descriptor == other.descriptor
    }
}

impl Eq for ModuleReference {}

impl Hash for ModuleReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.descriptor.hash(state);
        self.location.hash(state);
    }
}

impl Display for ModuleReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{} ({})", self.name(), location),
            None => f.write_str(self.name()),
        }
    }
}
