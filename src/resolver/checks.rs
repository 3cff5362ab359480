use std::collections::{hash_map::Entry, BTreeSet, HashMap, HashSet};

use log::debug;

use crate::{
    graph::{LayerId, ModuleId},
    model::{descriptor::package_name, reference::ModuleReference},
};

use super::{ResolutionError, Resolver};

impl Resolver<'_> {
    /// Walks the dependences between the selected modules. Parents are never walked, they
    /// were checked when they were resolved.
    pub(super) fn detect_cycles(&self) -> Result<(), ResolutionError> {
        let mut visited: HashSet<&str> = HashSet::new();

        for start in self.selected.keys() {
            if visited.contains(start.as_str()) {
                continue;
            }
            // (module, index of the next dependence to follow)
            let mut stack: Vec<(&str, usize)> = vec![(start.as_str(), 0)];
            let mut on_path: HashSet<&str> = HashSet::from([start.as_str()]);

            while let Some(&(name, next)) = stack.last() {
                let requires = self.selected[name].descriptor().requires();
                match requires.get(next) {
                    Some(dependence) => {
                        if let Some(top) = stack.last_mut() {
                            top.1 += 1;
                        }
                        let other = dependence.name();
                        if other == name
                            || visited.contains(other)
                            || !self.selected.contains_key(other)
                        {
                            continue;
                        }
                        if on_path.contains(other) {
                            return Err(ResolutionError::Cycle(cycle_as_string(&stack, other)));
                        }
                        on_path.insert(other);
                        stack.push((other, 0));
                    }
                    None => {
                        stack.pop();
                        on_path.remove(name);
                        visited.insert(name);
                    }
                }
            }
        }
        Ok(())
    }

    /// Recomputes the hash of every dependence a selected module recorded a hash for.
    pub(super) fn check_hashes(&self) -> Result<(), ResolutionError> {
        for reference in self.selected.values() {
            let Some(hashes) = reference.descriptor().hashes() else {
                continue;
            };
            let algorithm = hashes.algorithm();
            for name in hashes.names() {
                let other = match self.selected.get(name) {
                    Some(other) => other.clone(),
                    None => match self.find_in_parent(name) {
                        Some(module) => module.reference().clone(),
                        None => {
                            debug!(
                                "{} records a hash for {} which is not resolved",
                                reference.name(),
                                name
                            );
                            continue;
                        }
                    },
                };
                let recorded = hashes.hash_for(name).unwrap_or_default();
                let actual = other
                    .compute_hash(algorithm)
                    .ok_or_else(|| ResolutionError::HashUnavailable(name.to_owned()))?;
                if recorded != actual.as_slice() {
                    return Err(ResolutionError::HashMismatch {
                        dependency: name.to_owned(),
                        actual: hex::encode(&actual),
                        expected: hex::encode(recorded),
                        module: reference.name().to_owned(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Checks that no module is offered the same package by two modules it reads, and that
    /// every service a module uses or provides is in a package it can access.
    pub(super) fn check_export_suppliers(
        &self,
        layer: LayerId,
        modules: &[ModuleReference],
        reads: &[BTreeSet<ModuleId>],
    ) -> Result<(), ResolutionError> {
        for (index, (reference, module_reads)) in modules.iter().zip(reads).enumerate() {
            let own = ModuleId::new(layer, index);
            let descriptor1 = reference.descriptor();
            let name1 = descriptor1.name();

            let mut names: HashSet<&str> = HashSet::from([name1]);
            let mut package_to_exporter: HashMap<&str, ModuleId> = descriptor1
                .packages()
                .iter()
                .map(|package| (package.as_str(), own))
                .collect();

            for &id in module_reads {
                let Some(other) = self.endpoint(layer, modules, id) else {
                    continue;
                };
                let descriptor2 = other.descriptor();
                let name2 = descriptor2.name();
                if id != own && !names.insert(name2) {
                    return Err(if name2 == name1 {
                        ResolutionError::ReadsSameName(name1.to_owned())
                    } else {
                        ResolutionError::ReadsDuplicateName {
                            module: name1.to_owned(),
                            other: name2.to_owned(),
                        }
                    });
                }

                let offered: Vec<&str> = if descriptor2.is_automatic() {
                    if id == own {
                        Vec::new()
                    } else {
                        descriptor2.packages().iter().map(String::as_str).collect()
                    }
                } else {
                    descriptor2
                        .exports()
                        .iter()
                        .filter(|export| export.is_exported_to(name1))
                        .map(|export| export.source())
                        .collect()
                };
                for package in offered {
                    match package_to_exporter.entry(package) {
                        Entry::Occupied(existing) => {
                            return Err(self.two_suppliers(
                                layer,
                                modules,
                                own,
                                package,
                                id,
                                *existing.get(),
                            ))
                        }
                        Entry::Vacant(vacant) => {
                            vacant.insert(id);
                        }
                    }
                }
            }

            if descriptor1.is_automatic() {
                continue;
            }
            let services = descriptor1
                .uses()
                .iter()
                .map(String::as_str)
                .chain(descriptor1.provides().iter().map(|provides| provides.service()));
            for service in services {
                let package = package_name(service);
                if !package_to_exporter.contains_key(package) {
                    return Err(ResolutionError::ServiceNotReadable {
                        module: name1.to_owned(),
                        package: package.to_owned(),
                    });
                }
            }
        }
        Ok(())
    }

    fn endpoint<'s>(
        &'s self,
        layer: LayerId,
        modules: &'s [ModuleReference],
        id: ModuleId,
    ) -> Option<&'s ModuleReference> {
        if id.layer() == layer {
            modules.get(id.index())
        } else {
            self.reference_in_ancestry(id)
        }
    }

    fn two_suppliers(
        &self,
        layer: LayerId,
        modules: &[ModuleReference],
        module: ModuleId,
        package: &str,
        first: ModuleId,
        second: ModuleId,
    ) -> ResolutionError {
        let name_of = |id: ModuleId| {
            self.endpoint(layer, modules, id)
                .map(|reference| reference.name().to_owned())
                .unwrap_or_default()
        };
        let (first, second) = if second == module {
            (second, first)
        } else {
            (first, second)
        };
        if first == module {
            ResolutionError::PackageConflict {
                module: name_of(module),
                package: package.to_owned(),
                supplier: name_of(second),
            }
        } else {
            ResolutionError::TwoSuppliers {
                first: name_of(first),
                second: name_of(second),
                package: package.to_owned(),
                module: name_of(module),
            }
        }
    }

    pub(super) fn reference_in_ancestry(&self, id: ModuleId) -> Option<&ModuleReference> {
        self.ancestry
            .iter()
            .find(|configuration| configuration.id() == id.layer())
            .and_then(|configuration| configuration.reference_at(id.index()))
    }
}

fn cycle_as_string(stack: &[(&str, usize)], repeated: &str) -> String {
    let start = stack
        .iter()
        .position(|(name, _)| *name == repeated)
        .unwrap_or(0);
    stack[start..]
        .iter()
        .map(|(name, _)| *name)
        .chain(std::iter::once(repeated))
        .collect::<Vec<_>>()
        .join(" -> ")
}
