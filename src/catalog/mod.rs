mod compose;
mod directory;

use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use thiserror::Error;

use crate::model::{descriptor::ModuleDescriptor, reference::ModuleReference, ParseError};

pub use compose::ComposedCatalog;
pub use directory::DirectoryCatalog;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("IO error while scanning {path}: {source}")]
    IO {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid module descriptor {path}: {source}")]
    Parse { path: PathBuf, source: ParseError },
    #[error("Two versions of module {name} found in {location}")]
    Duplicate { name: String, location: String },
}

/// A source of module definitions.
///
/// Implementations may cache lookups internally, but must then be safe to query from
/// several independent resolutions at once.
pub trait ModuleCatalog {
    fn find(&self, name: &str) -> Result<Option<ModuleReference>, CatalogError>;

    fn find_all(&self) -> Result<Vec<ModuleReference>, CatalogError>;
}

impl<T: ModuleCatalog + ?Sized> ModuleCatalog for &T {
    fn find(&self, name: &str) -> Result<Option<ModuleReference>, CatalogError> {
        (**self).find(name)
    }

    fn find_all(&self) -> Result<Vec<ModuleReference>, CatalogError> {
        (**self).find_all()
    }
}

impl<T: ModuleCatalog + ?Sized> ModuleCatalog for Box<T> {
    fn find(&self, name: &str) -> Result<Option<ModuleReference>, CatalogError> {
        (**self).find(name)
    }

    fn find_all(&self) -> Result<Vec<ModuleReference>, CatalogError> {
        (**self).find_all()
    }
}

impl<T: ModuleCatalog + ?Sized> ModuleCatalog for Arc<T> {
    fn find(&self, name: &str) -> Result<Option<ModuleReference>, CatalogError> {
        (**self).find(name)
    }

    fn find_all(&self) -> Result<Vec<ModuleReference>, CatalogError> {
        (**self).find_all()
    }
}

/// A fixed set of modules held in memory, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    modules: BTreeMap<String, ModuleReference>,
}

impl InMemoryCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(references: impl IntoIterator<Item = ModuleReference>) -> Self {
        let mut catalog = Self::default();
        for reference in references {
            catalog.insert(reference);
        }
        catalog
    }

    /// Builds a catalog from bare descriptors, located at `memory:///<name>`.
    pub fn of(descriptors: impl IntoIterator<Item = ModuleDescriptor>) -> Self {
        Self::new(descriptors.into_iter().map(|descriptor| {
            let location = format!("memory:///{}", descriptor.name());
            ModuleReference::new(descriptor, Some(location))
        }))
    }

    /// Adds a module, replacing any module already registered under the same name.
    pub fn insert(&mut self, reference: ModuleReference) -> Option<ModuleReference> {
        self.modules.insert(reference.name().to_owned(), reference)
    }
}

impl ModuleCatalog for InMemoryCatalog {
    fn find(&self, name: &str) -> Result<Option<ModuleReference>, CatalogError> {
        Ok(self.modules.get(name).cloned())
    }

    fn find_all(&self) -> Result<Vec<ModuleReference>, CatalogError> {
        Ok(self.modules.values().cloned().collect())
    }
}
