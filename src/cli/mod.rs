use std::path::PathBuf;

use crate::catalog::{ComposedCatalog, DirectoryCatalog};

pub mod args;
pub mod command_handlers;

/// One catalog searching the descriptor directories in order.
pub fn directory_catalogs(directories: impl IntoIterator<Item = PathBuf>) -> ComposedCatalog {
    ComposedCatalog::of(directories.into_iter().map(DirectoryCatalog::new))
}
