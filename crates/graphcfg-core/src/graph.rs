//! The dependency graph: a mapping from vertex id to vertex value plus
//! outgoing dependency edges.

use crate::vertex::VertexId;
use std::collections::HashMap;

/// Per-vertex metadata: its value plus its outgoing dependency edges.
#[derive(Debug, Clone)]
pub struct VertexMeta<V> {
    pub value: V,
    children: Vec<VertexId>,
}

/// A directed graph of named vertices with hierarchical ID semantics.
///
/// Generic over the vertex payload `V` so graph mechanics (e.g. "graph with
/// vertices `{a, a.b, a.b.c}`") can be tested without pulling in the
/// resource-record machinery; the pipeline crates use
/// `Graph<Arc<dyn graphcfg_core::record::Record>>`.
#[derive(Debug, Clone)]
pub struct Graph<V> {
    vertices: HashMap<VertexId, VertexMeta<V>>,
}

/// Failure raised by the graph's mutators.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("duplicate vertex id: {0}")]
    Duplicate(VertexId),
    #[error("edge references missing vertex: {0}")]
    MissingEndpoint(VertexId),
}

impl<V> Graph<V> {
    pub fn new() -> Self {
        Self {
            vertices: HashMap::new(),
        }
    }

    /// O(1) existence check.
    pub fn contains(&self, id: &VertexId) -> bool {
        self.vertices.contains_key(id)
    }

    /// Iterate vertex ids; order is unspecified.
    pub fn vertices(&self) -> impl Iterator<Item = &VertexId> {
        self.vertices.keys()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.vertices.values().map(|m| m.children.len()).sum()
    }

    /// Outgoing dependency edges — not structural children.
    pub fn children(&self, id: &VertexId) -> &[VertexId] {
        self.vertices
            .get(id)
            .map(|m| m.children.as_slice())
            .unwrap_or(&[])
    }

    /// The structural parent implied by the ID, if the vertex exists and
    /// isn't `root`.
    pub fn parent(&self, id: &VertexId) -> Option<VertexId> {
        id.parent()
    }

    /// Lookups on missing IDs return `None`; they never fail.
    pub fn get(&self, id: &VertexId) -> Option<&V> {
        self.vertices.get(id).map(|m| &m.value)
    }

    pub fn get_mut(&mut self, id: &VertexId) -> Option<&mut V> {
        self.vertices.get_mut(id).map(|m| &mut m.value)
    }

    /// Add a new vertex. Fails with `Duplicate` if the id already exists.
    ///
    /// Does not require the structural parent to already be present —
    /// builders typically add a module and its children in the same batch,
    /// in either order; the "structural parent exists" invariant is a
    /// property of the fully-assembled graph, checked by `is_well_formed`,
    /// not enforced per-insert.
    pub fn add(&mut self, id: VertexId, value: V) -> Result<(), GraphError> {
        if self.vertices.contains_key(&id) {
            return Err(GraphError::Duplicate(id));
        }
        self.vertices.insert(
            id,
            VertexMeta {
                value,
                children: Vec::new(),
            },
        );
        Ok(())
    }

    /// Add a dependency edge `from -> to`. Both endpoints must already
    /// exist.
    pub fn connect(&mut self, from: &VertexId, to: VertexId) -> Result<(), GraphError> {
        if !self.vertices.contains_key(&to) {
            return Err(GraphError::MissingEndpoint(to));
        }
        let meta = self
            .vertices
            .get_mut(from)
            .ok_or_else(|| GraphError::MissingEndpoint(from.clone()))?;
        if !meta.children.contains(&to) {
            meta.children.push(to);
        }
        Ok(())
    }

    /// `true` iff every edge references an existing vertex and every
    /// non-root vertex's structural parent exists. Acyclicity is checked
    /// separately, by the pipeline's topological sort.
    pub fn is_well_formed(&self) -> bool {
        self.vertices.iter().all(|(id, meta)| {
            meta.children.iter().all(|c| self.vertices.contains_key(c))
                && (id.is_root() || id.parent().is_some_and(|p| self.vertices.contains_key(&p)))
        })
    }
}

impl<V> Default for Graph<V> {
    fn default() -> Self {
        Self::new()
    }
}
