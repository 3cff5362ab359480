pub mod catalog;
pub mod cli;
pub mod config;
pub mod graph;
pub mod model;
pub mod resolver;

pub use catalog::{ComposedCatalog, DirectoryCatalog, InMemoryCatalog, ModuleCatalog};
pub use graph::{Configuration, LayerId, ResolvedModule};
pub use model::{descriptor::ModuleDescriptor, reference::ModuleReference};
pub use resolver::{ResolveError, Resolver};

/// Resolves `roots` with the empty configuration as the only parent.
pub fn resolve<R: AsRef<str>>(
    before: &dyn ModuleCatalog,
    after: &dyn ModuleCatalog,
    roots: impl IntoIterator<Item = R>,
) -> Result<Configuration, ResolveError> {
    Configuration::empty().resolve(before, after, roots)
}

/// Resolves `roots` with the empty configuration as the only parent, then binds services.
pub fn resolve_and_bind<R: AsRef<str>>(
    before: &dyn ModuleCatalog,
    after: &dyn ModuleCatalog,
    roots: impl IntoIterator<Item = R>,
) -> Result<Configuration, ResolveError> {
    Configuration::empty().resolve_and_bind(before, after, roots)
}
