mod checks;
mod readability;

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use log::{debug, log_enabled, trace, Level};
use thiserror::Error;

use crate::{
    catalog::{CatalogError, ModuleCatalog},
    graph::{Configuration, LayerId, ModuleId, ResolvedModule},
    model::reference::ModuleReference,
};

/// A module could not be located.
#[derive(Error, Debug)]
pub enum FindError {
    #[error("Module {0} not found")]
    NotFound(String),
    #[error("Module {name} not found, required by {required_by}")]
    NotFoundRequiredBy { name: String, required_by: String },
    #[error(
        "Module {module} has constraints on target platform ({platform}) that conflict with other modules: {other}"
    )]
    TargetPlatform {
        module: String,
        platform: String,
        other: String,
    },
    #[error("Error while searching for module {name}: {source}")]
    Catalog { name: String, source: CatalogError },
    #[error("Error while enumerating modules: {0}")]
    CatalogScan(#[source] CatalogError),
}

/// The located modules cannot be combined into a consistent graph.
#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("Cycle detected: {0}")]
    Cycle(String),
    #[error("Unable to compute the hash of module {0}")]
    HashUnavailable(String),
    #[error("Hash of {dependency} ({actual}) differs to expected hash ({expected}) recorded in {module}")]
    HashMismatch {
        dependency: String,
        actual: String,
        expected: String,
        module: String,
    },
    #[error("Module {0} reads another module named {0}")]
    ReadsSameName(String),
    #[error("Module {module} reads more than one module named {other}")]
    ReadsDuplicateName { module: String, other: String },
    #[error("Module {module} contains package {package}, module {supplier} exports package {package} to {module}")]
    PackageConflict {
        module: String,
        package: String,
        supplier: String,
    },
    #[error("Modules {first} and {second} export package {package} to module {module}")]
    TwoSuppliers {
        first: String,
        second: String,
        package: String,
        module: String,
    },
    #[error("Module {module} does not read a module that exports {package}")]
    ServiceNotReadable { module: String, package: String },
}

/// The resolution request itself is malformed.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("List of parents is empty")]
    EmptyParents,
    #[error("Parents have conflicting constraints on target platform: {first}, {second}")]
    ConflictingParentPlatforms { first: String, second: String },
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error(transparent)]
    Find(#[from] FindError),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

/// The outcome of a finished resolution, ready to be frozen into a [`Configuration`].
pub(crate) struct Resolution {
    pub(crate) modules: Vec<ModuleReference>,
    pub(crate) reads: Vec<BTreeSet<ModuleId>>,
    pub(crate) target_platform: Option<String>,
}

pub type TraceSink<'a> = Box<dyn FnMut(&str) + 'a>;

/// Working state of a single resolution.
///
/// Modules are searched in the `before` catalog first, then in the parent configurations,
/// then in the `after` catalog.
pub struct Resolver<'a> {
    before: &'a dyn ModuleCatalog,
    after: &'a dyn ModuleCatalog,
    parents: Vec<Configuration>,
    // Every configuration reachable from the parents, each listed once.
    ancestry: Vec<Configuration>,
    trace: Option<TraceSink<'a>>,
    selected: BTreeMap<String, ModuleReference>,
    target_platform: Option<String>,
    have_all_automatic: bool,
}

impl<'a> Resolver<'a> {
    pub fn new(
        before: &'a dyn ModuleCatalog,
        parents: &[Configuration],
        after: &'a dyn ModuleCatalog,
    ) -> Result<Self, ConfigurationError> {
        if parents.is_empty() {
            return Err(ConfigurationError::EmptyParents);
        }

        let mut target_platform: Option<String> = None;
        for parent in parents {
            if let Some(value) = parent.target_platform() {
                match &target_platform {
                    None => target_platform = Some(value.to_owned()),
                    Some(first) if first != value => {
                        return Err(ConfigurationError::ConflictingParentPlatforms {
                            first: first.clone(),
                            second: value.to_owned(),
                        })
                    }
                    Some(_) => {}
                }
            }
        }

        let mut seen = HashSet::new();
        let mut ancestry = Vec::new();
        for parent in parents {
            for configuration in std::iter::once(parent).chain(parent.ancestors()) {
                if seen.insert(configuration.id()) {
                    ancestry.push(configuration.clone());
                }
            }
        }

        Ok(Resolver {
            before,
            after,
            parents: parents.to_vec(),
            ancestry,
            trace: None,
            selected: BTreeMap::new(),
            target_platform,
            have_all_automatic: false,
        })
    }

    /// Receives a line for every root, dependence and service binding followed.
    pub fn with_trace(mut self, sink: impl FnMut(&str) + 'a) -> Self {
        self.trace = Some(Box::new(sink));
        self
    }

    pub fn parents(&self) -> &[Configuration] {
        &self.parents
    }

    /// Modules selected so far, keyed by name.
    pub fn selected(&self) -> impl Iterator<Item = &ModuleReference> {
        self.selected.values()
    }

    /// Selects the root modules and, transitively, every module they require.
    pub fn resolve<R: AsRef<str>>(
        &mut self,
        roots: impl IntoIterator<Item = R>,
    ) -> Result<(), FindError> {
        let mut queue = VecDeque::new();
        for root in roots {
            let root = root.as_ref();
            let reference = match self.find_with_before(root)? {
                Some(reference) => reference,
                None => {
                    if self.find_in_parent(root).is_some() {
                        debug!("Root {} is already resolved in a parent configuration", root);
                        continue;
                    }
                    self.find_with_after(root)?
                        .ok_or_else(|| FindError::NotFound(root.to_owned()))?
                }
            };
            self.trace_with(|| format!("root {}", reference));
            self.add_found_module(reference.clone())?;
            queue.push_back(reference);
        }
        self.resolve_queue(queue)?;
        Ok(())
    }

    /// Adds every catalog module providing a service used by a selected module, or by a
    /// module of a parent configuration, until no new consumer is selected.
    pub fn bind(&mut self) -> Result<(), FindError> {
        let mut available: BTreeMap<String, Vec<ModuleReference>> = BTreeMap::new();
        for reference in self.find_all()? {
            for provides in reference.descriptor().provides() {
                available
                    .entry(provides.service().to_owned())
                    .or_default()
                    .push(reference.clone());
            }
        }

        let mut candidates: Vec<ModuleReference> = self
            .ancestry
            .iter()
            .flat_map(|configuration| configuration.modules())
            .map(|module| module.reference().clone())
            .chain(self.selected.values().cloned())
            .collect();

        loop {
            let mut queue = VecDeque::new();
            for consumer in &candidates {
                let descriptor = consumer.descriptor();
                let mut bound = BTreeSet::new();
                for service in descriptor.uses() {
                    let Some(providers) = available.get(service) else {
                        continue;
                    };
                    for provider in providers {
                        if provider.descriptor() == descriptor {
                            continue;
                        }
                        if bound.insert(provider.name()) {
                            self.trace_with(|| format!("{} binds {}", consumer.name(), provider));
                        }
                        if !self.selected.contains_key(provider.name()) {
                            self.add_found_module(provider.clone())?;
                            queue.push_back(provider.clone());
                        }
                    }
                }
            }
            candidates = self.resolve_queue(queue)?;
            if candidates.is_empty() {
                return Ok(());
            }
        }
    }

    /// Runs the consistency checks when `check` is set and computes the readability graph.
    pub(crate) fn finish(self, layer: LayerId, check: bool) -> Result<Resolution, ResolutionError> {
        debug!(
            "Finishing resolution of {} modules into layer {}",
            self.selected.len(),
            layer
        );
        if check {
            self.detect_cycles()?;
            self.check_hashes()?;
        }

        let modules: Vec<ModuleReference> = self.selected.values().cloned().collect();
        let reads = self.make_graph(layer);

        if check {
            self.check_export_suppliers(layer, &modules, &reads)?;
        }

        Ok(Resolution {
            modules,
            reads,
            target_platform: self.target_platform,
        })
    }

    /// Processes the queue until every required module is selected, returning the modules
    /// taken from the queue.
    fn resolve_queue(
        &mut self,
        mut queue: VecDeque<ModuleReference>,
    ) -> Result<Vec<ModuleReference>, FindError> {
        let mut resolved = Vec::new();
        while let Some(reference) = queue.pop_front() {
            let descriptor = reference.descriptor();

            if descriptor.is_automatic() && !self.have_all_automatic {
                for other in self.add_found_automatic_modules()? {
                    self.trace_with(|| format!("{} requires {}", descriptor.name(), other));
                    queue.push_back(other);
                }
                self.have_all_automatic = true;
            }

            for requires in descriptor.requires() {
                if requires.is_static() {
                    continue;
                }
                let name = requires.name();
                let found = match self.find_with_before(name)? {
                    Some(found) => found,
                    None => {
                        if self.find_in_parent(name).is_some() {
                            continue;
                        }
                        self.find_with_after(name)?.ok_or_else(|| {
                            FindError::NotFoundRequiredBy {
                                name: name.to_owned(),
                                required_by: descriptor.name().to_owned(),
                            }
                        })?
                    }
                };
                self.trace_with(|| format!("{} requires {}", descriptor.name(), found));
                if !self.selected.contains_key(name) {
                    self.add_found_module(found.clone())?;
                    queue.push_back(found);
                }
            }
            resolved.push(reference);
        }
        Ok(resolved)
    }

    fn add_found_module(&mut self, reference: ModuleReference) -> Result<(), FindError> {
        if let Some(value) = reference.descriptor().target_platform() {
            match &self.target_platform {
                None => self.target_platform = Some(value.to_owned()),
                Some(other) if other != value => {
                    return Err(FindError::TargetPlatform {
                        module: reference.name().to_owned(),
                        platform: value.to_owned(),
                        other: other.clone(),
                    })
                }
                Some(_) => {}
            }
        }
        self.selected.insert(reference.name().to_owned(), reference);
        Ok(())
    }

    fn add_found_automatic_modules(&mut self) -> Result<Vec<ModuleReference>, FindError> {
        let mut added = Vec::new();
        for reference in self.find_all()? {
            if reference.descriptor().is_automatic() && !self.selected.contains_key(reference.name())
            {
                self.add_found_module(reference.clone())?;
                added.push(reference);
            }
        }
        Ok(added)
    }

    fn find_with_before(&self, name: &str) -> Result<Option<ModuleReference>, FindError> {
        self.before.find(name).map_err(|source| FindError::Catalog {
            name: name.to_owned(),
            source,
        })
    }

    fn find_with_after(&self, name: &str) -> Result<Option<ModuleReference>, FindError> {
        self.after.find(name).map_err(|source| FindError::Catalog {
            name: name.to_owned(),
            source,
        })
    }

    fn find_in_parent(&self, name: &str) -> Option<ResolvedModule> {
        self.parents
            .iter()
            .find_map(|parent| parent.find_module(name))
    }

    /// Every module visible through the catalogs. A module of the `after` catalog is hidden
    /// by a module of the same name in the `before` catalog or in a parent.
    fn find_all(&self) -> Result<Vec<ModuleReference>, FindError> {
        let before = self.before.find_all().map_err(FindError::CatalogScan)?;
        let after = self.after.find_all().map_err(FindError::CatalogScan)?;
        if after.is_empty() {
            return Ok(before);
        }

        let names: HashSet<String> = before
            .iter()
            .map(|reference| reference.name().to_owned())
            .collect();
        let mut result = before;
        for reference in after {
            let name = reference.name();
            if !names.contains(name) && self.find_in_parent(name).is_none() {
                result.push(reference);
            }
        }
        Ok(result)
    }

    fn trace_with(&mut self, line: impl FnOnce() -> String) {
        if self.trace.is_none() && !log_enabled!(Level::Trace) {
            return;
        }
        let line = line();
        trace!("{}", line);
        if let Some(sink) = &mut self.trace {
            sink(&line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::{cell::RefCell, rc::Rc};

    use pretty_assertions::assert_eq;

    use crate::{catalog::InMemoryCatalog, model::descriptor::ModuleDescriptor};

    fn names(resolver: &Resolver) -> Vec<String> {
        resolver
            .selected()
            .map(|reference| reference.name().to_owned())
            .collect()
    }

    #[test]
    fn empty_parents_rejected() {
        let catalog = InMemoryCatalog::empty();
        assert!(matches!(
            Resolver::new(&catalog, &[], &catalog),
            Err(ConfigurationError::EmptyParents)
        ));
    }

    #[test]
    fn transitive_dependencies_selected() {
        let catalog = InMemoryCatalog::of([
            ModuleDescriptor::builder("a").requires("b").build().unwrap(),
            ModuleDescriptor::builder("b").requires("c").build().unwrap(),
            ModuleDescriptor::builder("c").build().unwrap(),
            ModuleDescriptor::builder("unused").build().unwrap(),
        ]);
        let empty = InMemoryCatalog::empty();
        let mut resolver = Resolver::new(&catalog, &[Configuration::empty()], &empty).unwrap();
        resolver.resolve(["a"]).unwrap();
        assert_eq!(names(&resolver), vec!["a", "b", "c"]);
    }

    #[test]
    fn static_dependencies_not_followed() {
        let catalog = InMemoryCatalog::of([
            ModuleDescriptor::builder("a")
                .requires_static("missing")
                .build()
                .unwrap(),
        ]);
        let empty = InMemoryCatalog::empty();
        let mut resolver = Resolver::new(&catalog, &[Configuration::empty()], &empty).unwrap();
        resolver.resolve(["a"]).unwrap();
        assert_eq!(names(&resolver), vec!["a"]);
    }

    #[test]
    fn missing_root() {
        let empty = InMemoryCatalog::empty();
        let mut resolver = Resolver::new(&empty, &[Configuration::empty()], &empty).unwrap();
        let err = resolver.resolve(["nowhere"]).unwrap_err();
        assert_eq!(err.to_string(), "Module nowhere not found");
    }

    #[test]
    fn missing_dependency_names_requirer() {
        let catalog =
            InMemoryCatalog::of([ModuleDescriptor::builder("a").requires("b").build().unwrap()]);
        let empty = InMemoryCatalog::empty();
        let mut resolver = Resolver::new(&catalog, &[Configuration::empty()], &empty).unwrap();
        let err = resolver.resolve(["a"]).unwrap_err();
        assert_eq!(err.to_string(), "Module b not found, required by a");
    }

    #[test]
    fn before_catalog_preferred_over_after() {
        let before = InMemoryCatalog::new([ModuleReference::new(
            ModuleDescriptor::builder("a").build().unwrap(),
            Some("before".to_owned()),
        )]);
        let after = InMemoryCatalog::new([ModuleReference::new(
            ModuleDescriptor::builder("a").build().unwrap(),
            Some("after".to_owned()),
        )]);
        let mut resolver = Resolver::new(&before, &[Configuration::empty()], &after).unwrap();
        resolver.resolve(["a"]).unwrap();
        assert_eq!(
            resolver.selected().next().unwrap().location(),
            Some("before")
        );
    }

    #[test]
    fn after_catalog_used_as_fallback() {
        let before = InMemoryCatalog::of([ModuleDescriptor::builder("a")
            .requires("b")
            .build()
            .unwrap()]);
        let after = InMemoryCatalog::of([ModuleDescriptor::builder("b").build().unwrap()]);
        let mut resolver = Resolver::new(&before, &[Configuration::empty()], &after).unwrap();
        resolver.resolve(["a"]).unwrap();
        assert_eq!(names(&resolver), vec!["a", "b"]);
    }

    #[test]
    fn automatic_modules_all_selected() {
        let catalog = InMemoryCatalog::of([
            ModuleDescriptor::builder("r").requires("x").build().unwrap(),
            ModuleDescriptor::automatic("x").build().unwrap(),
            ModuleDescriptor::automatic("y").build().unwrap(),
            ModuleDescriptor::builder("explicit").build().unwrap(),
        ]);
        let empty = InMemoryCatalog::empty();
        let mut resolver = Resolver::new(&catalog, &[Configuration::empty()], &empty).unwrap();
        resolver.resolve(["r"]).unwrap();
        assert_eq!(names(&resolver), vec!["r", "x", "y"]);
    }

    #[test]
    fn conflicting_target_platforms() {
        let catalog = InMemoryCatalog::of([
            ModuleDescriptor::builder("a")
                .requires("b")
                .target_platform("linux-amd64")
                .build()
                .unwrap(),
            ModuleDescriptor::builder("b")
                .target_platform("windows-amd64")
                .build()
                .unwrap(),
        ]);
        let empty = InMemoryCatalog::empty();
        let mut resolver = Resolver::new(&catalog, &[Configuration::empty()], &empty).unwrap();
        assert!(matches!(
            resolver.resolve(["a"]),
            Err(FindError::TargetPlatform { module, .. }) if module == "b"
        ));
    }

    #[test]
    fn bind_reaches_fixed_point() {
        let catalog = InMemoryCatalog::of([
            ModuleDescriptor::builder("app")
                .requires("api")
                .uses("api.Codec")
                .build()
                .unwrap(),
            ModuleDescriptor::builder("api")
                .exports("api")
                .build()
                .unwrap(),
            ModuleDescriptor::builder("zstd")
                .requires("api")
                .provides("api.Codec", ["zstd.ZstdCodec"])
                .uses("api.Dictionary")
                .build()
                .unwrap(),
            ModuleDescriptor::builder("dict")
                .requires("api")
                .provides("api.Dictionary", ["dict.Builtin"])
                .build()
                .unwrap(),
        ]);
        let empty = InMemoryCatalog::empty();
        let mut resolver = Resolver::new(&catalog, &[Configuration::empty()], &empty).unwrap();
        resolver.resolve(["app"]).unwrap();
        assert_eq!(names(&resolver), vec!["api", "app"]);
        resolver.bind().unwrap();
        assert_eq!(names(&resolver), vec!["api", "app", "dict", "zstd"]);
    }

    #[test]
    fn trace_lines() {
        let lines = Rc::new(RefCell::new(Vec::new()));
        let sink = lines.clone();
        let catalog = InMemoryCatalog::of([
            ModuleDescriptor::builder("a").requires("b").build().unwrap(),
            ModuleDescriptor::builder("b").build().unwrap(),
        ]);
        let empty = InMemoryCatalog::empty();
        let mut resolver = Resolver::new(&catalog, &[Configuration::empty()], &empty)
            .unwrap()
            .with_trace(move |line| sink.borrow_mut().push(line.to_owned()));
        resolver.resolve(["a"]).unwrap();
        assert_eq!(
            *lines.borrow(),
            vec![
                "root a (memory:///a)".to_owned(),
                "a requires b (memory:///b)".to_owned(),
            ]
        );
    }

    #[test]
    fn trace_binding_lines() {
        let lines = Rc::new(RefCell::new(Vec::new()));
        let sink = lines.clone();
        let catalog = InMemoryCatalog::of([
            ModuleDescriptor::builder("app")
                .requires("api")
                .uses("api.Codec")
                .build()
                .unwrap(),
            ModuleDescriptor::builder("api").exports("api").build().unwrap(),
            ModuleDescriptor::builder("gz")
                .requires("api")
                .provides("api.Codec", ["gz.GzipCodec"])
                .build()
                .unwrap(),
        ]);
        let empty = InMemoryCatalog::empty();
        let mut resolver = Resolver::new(&catalog, &[Configuration::empty()], &empty)
            .unwrap()
            .with_trace(move |line| sink.borrow_mut().push(line.to_owned()));
        resolver.resolve(["app"]).unwrap();
        resolver.bind().unwrap();
        assert_eq!(
            *lines.borrow(),
            vec![
                "root app (memory:///app)".to_owned(),
                "app requires api (memory:///api)".to_owned(),
                "app binds gz (memory:///gz)".to_owned(),
                "gz requires api (memory:///api)".to_owned(),
            ]
        );
    }
}
