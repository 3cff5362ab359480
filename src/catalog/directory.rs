use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use log::{debug, trace};

use crate::model::{descriptor::ModuleDescriptor, reference::ModuleReference, ParseError};

use super::{CatalogError, ModuleCatalog};

const DESCRIPTOR_EXTENSION: &str = "toml";

/// Module descriptors stored as `*.toml` files in a single directory.
///
/// The directory is scanned once, on first lookup. The raw bytes of each descriptor file
/// are the content its hash is computed from.
pub struct DirectoryCatalog {
    location: PathBuf,
    modules: OnceLock<BTreeMap<String, ModuleReference>>,
}

impl DirectoryCatalog {
    pub fn new(location: impl Into<PathBuf>) -> Self {
        DirectoryCatalog {
            location: location.into(),
            modules: OnceLock::new(),
        }
    }

    fn modules(&self) -> Result<&BTreeMap<String, ModuleReference>, CatalogError> {
        if let Some(modules) = self.modules.get() {
            return Ok(modules);
        }
        let scanned = self.scan()?;
        // A concurrent scan may have won the race, both results are identical.
        Ok(self.modules.get_or_init(|| scanned))
    }

    fn scan(&self) -> Result<BTreeMap<String, ModuleReference>, CatalogError> {
        debug!("Scanning module directory {}", self.location.display());
        let io_error = |source| CatalogError::IO {
            path: self.location.clone(),
            source,
        };

        let mut modules = BTreeMap::new();
        if !self.location.is_dir() {
            debug!(
                "Module directory {} does not exist, treating it as empty",
                self.location.display()
            );
            return Ok(modules);
        }

        let mut paths = Vec::new();
        for entry in self.location.read_dir().map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();
            if path.is_file()
                && path.extension().and_then(|e| e.to_str()) == Some(DESCRIPTOR_EXTENSION)
            {
                paths.push(path);
            }
        }
        paths.sort();

        for path in paths {
            let reference = load_reference(&path)?;
            trace!("Found module {} in {}", reference.name(), path.display());
            if modules.contains_key(reference.name()) {
                return Err(CatalogError::Duplicate {
                    name: reference.name().to_owned(),
                    location: self.location.display().to_string(),
                });
            }
            modules.insert(reference.name().to_owned(), reference);
        }
        Ok(modules)
    }
}

fn load_reference(path: &Path) -> Result<ModuleReference, CatalogError> {
    let content = std::fs::read(path).map_err(|source| CatalogError::IO {
        path: path.to_path_buf(),
        source,
    })?;
    let descriptor = std::str::from_utf8(&content)
        .map_err(ParseError::from)
        .and_then(ModuleDescriptor::from_toml_str)
        .map_err(|source| CatalogError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    let location = format!("file://{}", path.display());
    Ok(ModuleReference::new(descriptor, Some(location)).with_content(content))
}

impl ModuleCatalog for DirectoryCatalog {
    fn find(&self, name: &str) -> Result<Option<ModuleReference>, CatalogError> {
        Ok(self.modules()?.get(name).cloned())
    }

    fn find_all(&self) -> Result<Vec<ModuleReference>, CatalogError> {
        Ok(self.modules()?.values().cloned().collect())
    }
}
