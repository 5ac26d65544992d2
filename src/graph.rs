//! Project reference graph: adjacency map, layered build queue, and
//! the discovery traversal that populates both from a set of roots.

use anyhow::{Result, bail};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::config::ConfigCache;
use crate::paths::ProjectId;

/// Bidirectional adjacency over project identifiers.
///
/// `add_reference` is the only mutator and always records both
/// directions, so the two maps cannot drift apart.
#[derive(Debug, Default, Clone)]
pub struct ReferenceMap {
    /// child → projects that reference it.
    parents: FxHashMap<ProjectId, FxHashSet<ProjectId>>,
    /// parent → projects it references.
    children: FxHashMap<ProjectId, FxHashSet<ProjectId>>,
    keys: FxHashSet<ProjectId>,
}

impl ReferenceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `parent` references `child`. Idempotent.
    pub fn add_reference(&mut self, child: &ProjectId, parent: &ProjectId) {
        self.parents
            .entry(child.clone())
            .or_default()
            .insert(parent.clone());
        self.children
            .entry(parent.clone())
            .or_default()
            .insert(child.clone());
        self.keys.insert(child.clone());
        self.keys.insert(parent.clone());
    }

    /// Projects that reference `child`.
    pub fn parents_of(&self, child: &ProjectId) -> impl Iterator<Item = &ProjectId> {
        self.parents.get(child).into_iter().flatten()
    }

    /// Projects that `parent` references.
    pub fn children_of(&self, parent: &ProjectId) -> impl Iterator<Item = &ProjectId> {
        self.children.get(parent).into_iter().flatten()
    }

    /// Every project that appears on either side of an edge.
    pub fn keys(&self) -> impl Iterator<Item = &ProjectId> {
        self.keys.iter()
    }
}

/// Layered build order. The last layer holds the deepest dependencies;
/// walking layers from last to first yields a valid topological order.
#[derive(Debug, Default, Clone)]
pub struct BuildQueue {
    layers: Vec<Vec<ProjectId>>,
}

impl BuildQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `id` to the layer at `depth`, creating layers on demand.
    /// No-op when the layer already holds it.
    pub fn insert(&mut self, depth: usize, id: &ProjectId) {
        while self.layers.len() <= depth {
            self.layers.push(Vec::new());
        }
        let layer = &mut self.layers[depth];
        if !layer.contains(id) {
            layer.push(id.clone());
        }
    }

    /// Drop every occurrence of a project except its rightmost
    /// (deepest) one.
    pub fn remove_duplicates(&mut self) {
        let mut seen: FxHashSet<ProjectId> = FxHashSet::default();
        for layer in self.layers.iter_mut().rev() {
            layer.retain(|id| seen.insert(id.clone()));
        }
        self.layers.retain(|layer| !layer.is_empty());
    }

    pub fn layers(&self) -> &[Vec<ProjectId>] {
        &self.layers
    }

    /// Projects in build order: deepest layer first.
    pub fn build_order(&self) -> impl Iterator<Item = &ProjectId> {
        self.layers.iter().rev().flatten()
    }

    pub fn project_count(&self) -> usize {
        self.layers.iter().map(Vec::len).sum()
    }

    pub fn contains(&self, id: &ProjectId) -> bool {
        self.layers.iter().any(|layer| layer.contains(id))
    }
}

/// The discovered graph: build queue plus reference adjacency.
#[derive(Debug, Default, Clone)]
pub struct ProjectGraph {
    pub queue: BuildQueue,
    pub references: ReferenceMap,
}

/// Discover every project transitively referenced by `roots` and
/// compute the layered build order.
///
/// Fails fast on unparsable configurations and on circular references,
/// naming the cycle path.
pub fn build_graph(roots: &[ProjectId], configs: &mut ConfigCache) -> Result<ProjectGraph> {
    let mut graph = ProjectGraph::default();
    let mut stack: Vec<ProjectId> = Vec::new();

    for root in roots {
        enumerate(root, 0, &mut graph, &mut stack, configs)?;
    }

    graph.queue.remove_duplicates();
    Ok(graph)
}

fn enumerate(
    id: &ProjectId,
    depth: usize,
    graph: &mut ProjectGraph,
    stack: &mut Vec<ProjectId>,
    configs: &mut ConfigCache,
) -> Result<()> {
    if let Some(start) = stack.iter().position(|entry| entry == id) {
        let mut cycle: Vec<String> = stack[start..].iter().map(|p| p.to_string()).collect();
        cycle.push(id.to_string());
        bail!("circular project reference: {}", cycle.join(" -> "));
    }

    let config = configs.load(id)?;
    graph.queue.insert(depth, id);

    stack.push(id.clone());
    for reference in &config.references {
        graph.references.add_reference(&reference.target, id);
        enumerate(&reference.target, depth + 1, graph, stack, configs)?;
    }
    stack.pop();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn pid(name: &str) -> ProjectId {
        ProjectId::new(Path::new("/repo"), Path::new(name))
    }

    #[test]
    fn reference_map_records_both_directions() {
        let mut map = ReferenceMap::new();
        let child = pid("core/tsconfig.json");
        let parent = pid("app/tsconfig.json");

        map.add_reference(&child, &parent);

        assert!(map.parents_of(&child).any(|p| *p == parent));
        assert!(map.children_of(&parent).any(|c| *c == child));
        assert_eq!(map.keys().count(), 2);
    }

    #[test]
    fn reference_map_is_idempotent() {
        let mut map = ReferenceMap::new();
        let child = pid("core/tsconfig.json");
        let parent = pid("app/tsconfig.json");

        map.add_reference(&child, &parent);
        map.add_reference(&child, &parent);

        assert_eq!(map.parents_of(&child).count(), 1);
        assert_eq!(map.children_of(&parent).count(), 1);
    }

    #[test]
    fn queue_dedupes_rightward() {
        let mut queue = BuildQueue::new();
        let a = pid("a/tsconfig.json");
        let b = pid("b/tsconfig.json");

        // a referenced both as a root (layer 0) and through b (layer 1).
        queue.insert(0, &a);
        queue.insert(0, &b);
        queue.insert(1, &a);
        queue.remove_duplicates();

        let layers = queue.layers();
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[0], vec![b.clone()]);
        assert_eq!(layers[1], vec![a.clone()]);

        // Build order: deepest first.
        let order: Vec<_> = queue.build_order().cloned().collect();
        assert_eq!(order, vec![a, b]);
    }

    #[test]
    fn queue_insert_into_same_layer_is_noop() {
        let mut queue = BuildQueue::new();
        let a = pid("a/tsconfig.json");
        queue.insert(0, &a);
        queue.insert(0, &a);
        assert_eq!(queue.project_count(), 1);
    }

    #[test]
    fn every_project_lands_in_exactly_one_layer() {
        let mut queue = BuildQueue::new();
        let ids: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|n| pid(&format!("{n}/tsconfig.json")))
            .collect();

        queue.insert(0, &ids[0]);
        queue.insert(1, &ids[1]);
        queue.insert(2, &ids[2]);
        queue.insert(1, &ids[2]);
        queue.insert(0, &ids[1]);
        queue.remove_duplicates();

        for id in &ids {
            let occurrences: usize = queue
                .layers()
                .iter()
                .map(|layer| layer.iter().filter(|p| *p == id).count())
                .sum();
            assert_eq!(occurrences, 1, "{id} should appear exactly once");
        }
    }
}
