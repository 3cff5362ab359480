mod module;

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    fmt::{Debug, Display},
    hash::{Hash, Hasher},
    sync::{Arc, OnceLock},
};

use log::debug;

use crate::{
    catalog::ModuleCatalog,
    model::reference::ModuleReference,
    resolver::{Resolution, ResolutionError, ResolveError, Resolver},
};

pub(crate) use module::ModuleId;
pub use module::{LayerId, ResolvedModule};

/// An immutable graph of resolved modules and their readability, built on top of zero or
/// more parent configurations. Cloning is cheap and shares the graph.
#[derive(Clone)]
pub struct Configuration {
    layer: Arc<Layer>,
}

struct Layer {
    id: LayerId,
    parents: Vec<Configuration>,
    // sorted by name, a module's index is its position
    modules: Vec<ModuleReference>,
    name_index: HashMap<String, usize>,
    reads: Vec<BTreeSet<ModuleId>>,
    target_platform: Option<String>,
    ancestors: OnceLock<Vec<Configuration>>,
}

impl Configuration {
    /// The configuration with no parents and no modules that every other one builds on.
    pub fn empty() -> Configuration {
        static EMPTY: OnceLock<Configuration> = OnceLock::new();
        EMPTY
            .get_or_init(|| {
                Configuration::from_resolution(
                    LayerId::EMPTY,
                    Vec::new(),
                    Resolution {
                        modules: Vec::new(),
                        reads: Vec::new(),
                        target_platform: None,
                    },
                )
            })
            .clone()
    }

    /// Freezes the modules selected by `resolver`, checking the result for consistency when
    /// `check` is set.
    pub fn new(resolver: Resolver<'_>, check: bool) -> Result<Configuration, ResolutionError> {
        let id = LayerId::next();
        let parents = resolver.parents().to_vec();
        let resolution = resolver.finish(id, check)?;
        let configuration = Configuration::from_resolution(id, parents, resolution);
        debug!(
            "Resolved configuration {} with {} modules",
            id,
            configuration.layer.modules.len()
        );
        Ok(configuration)
    }

    fn from_resolution(
        id: LayerId,
        parents: Vec<Configuration>,
        resolution: Resolution,
    ) -> Configuration {
        let Resolution {
            modules,
            reads,
            target_platform,
        } = resolution;
        let name_index = modules
            .iter()
            .enumerate()
            .map(|(index, reference)| (reference.name().to_owned(), index))
            .collect();
        Configuration {
            layer: Arc::new(Layer {
                id,
                parents,
                modules,
                name_index,
                reads,
                target_platform,
                ancestors: OnceLock::new(),
            }),
        }
    }

    /// Resolves `roots` against the `before` catalog, the `parents` and the `after`
    /// catalog, in that order.
    pub fn resolve_with_parents<R: AsRef<str>>(
        before: &dyn ModuleCatalog,
        parents: &[Configuration],
        after: &dyn ModuleCatalog,
        roots: impl IntoIterator<Item = R>,
    ) -> Result<Configuration, ResolveError> {
        let mut resolver = Resolver::new(before, parents, after)?;
        resolver.resolve(roots)?;
        Ok(Configuration::new(resolver, true)?)
    }

    /// Like [`Configuration::resolve_with_parents`], additionally selecting every module
    /// providing a service that a selected module uses.
    pub fn resolve_and_bind_with_parents<R: AsRef<str>>(
        before: &dyn ModuleCatalog,
        parents: &[Configuration],
        after: &dyn ModuleCatalog,
        roots: impl IntoIterator<Item = R>,
    ) -> Result<Configuration, ResolveError> {
        let mut resolver = Resolver::new(before, parents, after)?;
        resolver.resolve(roots)?;
        resolver.bind()?;
        Ok(Configuration::new(resolver, true)?)
    }

    /// Resolves a child of this configuration.
    pub fn resolve<R: AsRef<str>>(
        &self,
        before: &dyn ModuleCatalog,
        after: &dyn ModuleCatalog,
        roots: impl IntoIterator<Item = R>,
    ) -> Result<Configuration, ResolveError> {
        Self::resolve_with_parents(before, std::slice::from_ref(self), after, roots)
    }

    pub fn resolve_and_bind<R: AsRef<str>>(
        &self,
        before: &dyn ModuleCatalog,
        after: &dyn ModuleCatalog,
        roots: impl IntoIterator<Item = R>,
    ) -> Result<Configuration, ResolveError> {
        Self::resolve_and_bind_with_parents(before, std::slice::from_ref(self), after, roots)
    }

    pub fn id(&self) -> LayerId {
        self.layer.id
    }

    pub fn parents(&self) -> &[Configuration] {
        &self.layer.parents
    }

    /// The modules of this configuration only, sorted by name.
    pub fn modules(&self) -> Vec<ResolvedModule> {
        (0..self.layer.modules.len())
            .filter_map(|index| self.module_at(index))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.layer.modules.is_empty()
    }

    pub fn target_platform(&self) -> Option<&str> {
        self.layer.target_platform.as_deref()
    }

    /// Finds a module in this configuration, then in the ancestors in depth-first order.
    pub fn find_module(&self, name: &str) -> Option<ResolvedModule> {
        if let Some(&index) = self.layer.name_index.get(name) {
            return self.module_at(index);
        }
        if self.layer.parents.is_empty() {
            return None;
        }
        self.ancestors().iter().find_map(|ancestor| {
            ancestor
                .layer
                .name_index
                .get(name)
                .and_then(|&index| ancestor.module_at(index))
        })
    }

    /// The modules read by `module`. Empty when `module` is not part of this configuration.
    pub fn reads(&self, module: &ResolvedModule) -> BTreeSet<ResolvedModule> {
        let id = module.id();
        if id.layer() != self.id() {
            return BTreeSet::new();
        }
        self.layer
            .reads
            .get(id.index())
            .into_iter()
            .flatten()
            .filter_map(|&other| self.module_by_id(other))
            .collect()
    }

    /// Every configuration reachable through the parents, excluding this one, each listed
    /// once in depth-first order.
    pub fn ancestors(&self) -> &[Configuration] {
        self.layer.ancestors.get_or_init(|| self.compute_ancestors())
    }

    fn compute_ancestors(&self) -> Vec<Configuration> {
        let mut ancestors = Vec::new();
        let mut visited = HashSet::from([self.id()]);
        let mut stack: Vec<&Configuration> = Vec::new();
        for parent in self.parents().iter().rev() {
            if visited.insert(parent.id()) {
                stack.push(parent);
            }
        }
        while let Some(configuration) = stack.pop() {
            ancestors.push(configuration.clone());
            for parent in configuration.parents().iter().rev() {
                if visited.insert(parent.id()) {
                    stack.push(parent);
                }
            }
        }
        ancestors
    }

    pub(crate) fn reference_at(&self, index: usize) -> Option<&ModuleReference> {
        self.layer.modules.get(index)
    }

    fn module_at(&self, index: usize) -> Option<ResolvedModule> {
        self.reference_at(index)
            .map(|reference| ResolvedModule::new(self.clone(), index, reference.clone()))
    }

    fn module_by_id(&self, id: ModuleId) -> Option<ResolvedModule> {
        if id.layer() == self.id() {
            return self.module_at(id.index());
        }
        self.ancestors()
            .iter()
            .find(|ancestor| ancestor.id() == id.layer())
            .and_then(|ancestor| ancestor.module_at(id.index()))
    }
}

impl PartialEq for Configuration {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Configuration {}

impl Hash for Configuration {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl Display for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = self
            .layer
            .modules
            .iter()
            .map(ModuleReference::name)
            .collect::<Vec<_>>();
        f.write_str(&names.join(", "))
    }
}

impl Debug for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Configuration")
            .field("id", &self.id())
            .field(
                "parents",
                &self.parents().iter().map(Configuration::id).collect::<Vec<_>>(),
            )
            .field(
                "modules",
                &self
                    .layer
                    .modules
                    .iter()
                    .map(ModuleReference::name)
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}
