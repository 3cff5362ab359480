use std::{
    cmp::Ordering,
    collections::BTreeSet,
    fmt::{Debug, Display},
    hash::{Hash, Hasher},
    sync::atomic::{AtomicU64, Ordering as AtomicOrdering},
};

use crate::model::{descriptor::ModuleDescriptor, reference::ModuleReference};

use super::Configuration;

/// Identifies one configuration for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(u64);

impl LayerId {
    pub(crate) const EMPTY: LayerId = LayerId(0);

    pub(crate) fn next() -> LayerId {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        LayerId(NEXT.fetch_add(1, AtomicOrdering::Relaxed))
    }
}

impl Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of a module within a specific layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct ModuleId {
    layer: LayerId,
    index: usize,
}

impl ModuleId {
    pub(crate) fn new(layer: LayerId, index: usize) -> Self {
        ModuleId { layer, index }
    }

    pub(crate) fn layer(&self) -> LayerId {
        self.layer
    }

    pub(crate) fn index(&self) -> usize {
        self.index
    }
}

/// A module of a [`Configuration`].
///
/// Two resolved modules are equal when they belong to the same configuration and have the
/// same reference, so a module resolved into two sibling configurations yields two distinct
/// values.
#[derive(Clone)]
pub struct ResolvedModule {
    configuration: Configuration,
    index: usize,
    reference: ModuleReference,
}

impl ResolvedModule {
    pub(crate) fn new(configuration: Configuration, index: usize, reference: ModuleReference) -> Self {
        ResolvedModule {
            configuration,
            index,
            reference,
        }
    }

    pub(crate) fn id(&self) -> ModuleId {
        ModuleId::new(self.configuration.id(), self.index)
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn reference(&self) -> &ModuleReference {
        &self.reference
    }

    pub fn descriptor(&self) -> &ModuleDescriptor {
        self.reference().descriptor()
    }

    pub fn name(&self) -> &str {
        self.descriptor().name()
    }

    /// The modules this module reads, as recorded by its configuration.
    pub fn reads(&self) -> BTreeSet<ResolvedModule> {
        self.configuration.reads(self)
    }
}

impl PartialEq for ResolvedModule {
    fn eq(&self, other: &Self) -> bool {
        self.configuration.id() == other.configuration.id() && self.reference() == other.reference()
    }
}

impl Eq for ResolvedModule {}

impl Hash for ResolvedModule {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.configuration.id().hash(state);
        self.reference().hash(state);
    }
}

impl PartialOrd for ResolvedModule {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ResolvedModule {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name()
            .cmp(other.name())
            .then_with(|| self.configuration.id().cmp(&other.configuration.id()))
    }
}

impl Display for ResolvedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.configuration.id(), self.name())
    }
}

impl Debug for ResolvedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedModule")
            .field("layer", &self.configuration.id())
            .field("reference", self.reference())
            .finish()
    }
}
