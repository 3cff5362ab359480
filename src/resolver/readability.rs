use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::debug;

use crate::graph::{LayerId, ModuleId};

use super::Resolver;

pub(crate) type Edges = BTreeMap<ModuleId, BTreeSet<ModuleId>>;

impl Resolver<'_> {
    /// Computes the readability graph of the selected modules.
    ///
    /// The graph starts as the module dependence graph and is updated until every module
    /// reads the modules that its own reads require transitively.
    pub(super) fn make_graph(&self, layer: LayerId) -> Vec<BTreeSet<ModuleId>> {
        let ids: HashMap<&str, ModuleId> = self
            .selected
            .keys()
            .enumerate()
            .map(|(index, name)| (name.as_str(), ModuleId::new(layer, index)))
            .collect();

        let mut reads = Edges::new();
        let mut requires_transitive = self.parent_requires_transitive();

        for (name, reference) in &self.selected {
            let descriptor = reference.descriptor();
            let m1 = ids[name.as_str()];
            let mut m1_reads = BTreeSet::new();
            let mut m1_transitive = BTreeSet::new();

            if descriptor.is_automatic() {
                // reads every other selected module, requires transitive the automatic ones
                for (other_name, other) in &self.selected {
                    if other_name != name {
                        let m2 = ids[other_name.as_str()];
                        m1_reads.insert(m2);
                        if other.descriptor().is_automatic() {
                            m1_transitive.insert(m2);
                        }
                    }
                }
                for configuration in &self.ancestry {
                    for module in configuration.modules() {
                        m1_reads.insert(module.id());
                        if module.descriptor().is_automatic() {
                            m1_transitive.insert(module.id());
                        }
                    }
                }
            } else {
                for requires in descriptor.requires() {
                    let m2 = match ids.get(requires.name()) {
                        Some(&m2) => m2,
                        None => match self.find_in_parent(requires.name()) {
                            Some(module) => module.id(),
                            // static dependence that was not selected
                            None => continue,
                        },
                    };
                    m1_reads.insert(m2);
                    if requires.is_transitive() {
                        m1_transitive.insert(m2);
                    }
                }
            }

            reads.insert(m1, m1_reads);
            requires_transitive.insert(m1, m1_transitive);
        }

        let mut rounds = 0;
        while propagate_transitive(&mut reads, &requires_transitive) {
            rounds += 1;
        }
        debug!("Readability graph of layer {} closed after {} rounds", layer, rounds);

        reads.into_values().collect()
    }

    /// The requires transitive edges of every module in the parent configurations. An
    /// automatic module requires transitive every automatic module it reads.
    fn parent_requires_transitive(&self) -> Edges {
        let mut edges = Edges::new();
        for configuration in &self.ancestry {
            for module in configuration.modules() {
                let targets: BTreeSet<ModuleId> = if module.descriptor().is_automatic() {
                    module
                        .reads()
                        .into_iter()
                        .filter(|target| target.descriptor().is_automatic())
                        .map(|target| target.id())
                        .collect()
                } else {
                    module
                        .descriptor()
                        .requires()
                        .iter()
                        .filter(|requires| requires.is_transitive())
                        .filter_map(|requires| configuration.find_module(requires.name()))
                        .map(|target| target.id())
                        .collect()
                };
                if !targets.is_empty() {
                    edges.insert(module.id(), targets);
                }
            }
        }
        edges
    }
}

/// One pass of "m1 reads m2 and m2 requires transitive m3, so m1 reads m3".
///
/// Returns whether any edge was added. Readability of a module by itself is implicit and is
/// never recorded.
pub(crate) fn propagate_transitive(reads: &mut Edges, requires_transitive: &Edges) -> bool {
    let mut changed = false;
    for (m1, m1_reads) in reads.iter_mut() {
        let additions: Vec<ModuleId> = m1_reads
            .iter()
            .filter_map(|m2| requires_transitive.get(m2))
            .flatten()
            .filter(|m3| *m3 != m1 && !m1_reads.contains(*m3))
            .copied()
            .collect();
        if !additions.is_empty() {
            m1_reads.extend(additions);
            changed = true;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn id(index: usize) -> ModuleId {
        ModuleId::new(LayerId::EMPTY, index)
    }

    fn edges(pairs: Vec<(usize, Vec<usize>)>) -> Edges {
        pairs
            .into_iter()
            .map(|(from, to)| (id(from), to.into_iter().map(id).collect()))
            .collect()
    }

    fn close(reads: &mut Edges, requires_transitive: &Edges) {
        while propagate_transitive(reads, requires_transitive) {}
    }

    #[test]
    fn chain_of_transitive_requires() {
        // 0 -> 1, 1 transitive 2, 2 transitive 3
        let mut reads = edges(vec![(0, vec![1]), (1, vec![2]), (2, vec![3]), (3, vec![])]);
        let transitive = edges(vec![(1, vec![2]), (2, vec![3])]);
        close(&mut reads, &transitive);
        assert_eq!(reads, edges(vec![(0, vec![1, 2, 3]), (1, vec![2, 3]), (2, vec![3]), (3, vec![])]));
    }

    #[test]
    fn closure_is_idempotent() {
        let mut reads = edges(vec![(0, vec![1]), (1, vec![2]), (2, vec![0])]);
        let transitive = edges(vec![(1, vec![2]), (2, vec![0])]);
        close(&mut reads, &transitive);
        let closed = reads.clone();
        assert!(!propagate_transitive(&mut reads, &transitive));
        assert_eq!(reads, closed);
    }

    #[test]
    fn self_reads_not_recorded() {
        let mut reads = edges(vec![(0, vec![1]), (1, vec![0])]);
        let transitive = edges(vec![(0, vec![1]), (1, vec![0])]);
        close(&mut reads, &transitive);
        assert_eq!(reads, edges(vec![(0, vec![1]), (1, vec![0])]));
    }
}
