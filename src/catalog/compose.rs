use std::{collections::BTreeSet, sync::OnceLock};

use dashmap::DashMap;
use log::trace;

use crate::model::reference::ModuleReference;

use super::{CatalogError, ModuleCatalog};

/// Searches a sequence of catalogs in order, the first catalog to know a module wins.
///
/// Lookups are memoized. Once every module has been enumerated with `find_all`, names
/// missing from the memo are known to be absent and the inner catalogs are not queried
/// again.
pub struct ComposedCatalog {
    catalogs: Vec<Box<dyn ModuleCatalog + Send + Sync>>,
    found: DashMap<String, ModuleReference>,
    all: OnceLock<Vec<ModuleReference>>,
}

impl ComposedCatalog {
    pub fn new(catalogs: Vec<Box<dyn ModuleCatalog + Send + Sync>>) -> Self {
        ComposedCatalog {
            catalogs,
            found: DashMap::new(),
            all: OnceLock::new(),
        }
    }

    pub fn of<C>(catalogs: impl IntoIterator<Item = C>) -> Self
    where
        C: ModuleCatalog + Send + Sync + 'static,
    {
        Self::new(
            catalogs
                .into_iter()
                .map(|catalog| Box::new(catalog) as Box<dyn ModuleCatalog + Send + Sync>)
                .collect(),
        )
    }

    fn remember(&self, reference: ModuleReference) -> ModuleReference {
        self.found
            .entry(reference.name().to_owned())
            .or_insert(reference)
            .clone()
    }
}

impl ModuleCatalog for ComposedCatalog {
    fn find(&self, name: &str) -> Result<Option<ModuleReference>, CatalogError> {
        if let Some(reference) = self.found.get(name) {
            return Ok(Some(reference.clone()));
        }
        if self.all.get().is_some() {
            return Ok(None);
        }
        for catalog in &self.catalogs {
            if let Some(reference) = catalog.find(name)? {
                trace!("Cached {}", reference);
                return Ok(Some(self.remember(reference)));
            }
        }
        Ok(None)
    }

    fn find_all(&self) -> Result<Vec<ModuleReference>, CatalogError> {
        if let Some(all) = self.all.get() {
            return Ok(all.clone());
        }
        let mut seen = BTreeSet::new();
        let mut all = Vec::new();
        for catalog in &self.catalogs {
            for reference in catalog.find_all()? {
                if seen.insert(reference.name().to_owned()) {
                    all.push(self.remember(reference));
                }
            }
        }
        Ok(self.all.get_or_init(|| all).clone())
    }
}
