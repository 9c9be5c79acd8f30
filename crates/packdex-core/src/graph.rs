//! File dependency graph using petgraph::StableDiGraph
//!
//! Out-edges of a node are the files it links to; in-edges are the
//! reverse adjacency petgraph keeps per node, so a child never owns its
//! parents. The graph may contain cycles.

use crate::file_types::{ConnectionRules, FileTypeRegistry};
use crate::fs::FileSystem;
use crate::model::{UNKNOWN_IDENTIFIER, join_path};
use crate::store::Store;
use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Stable identifier of a node within one [`DependencyGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    fn index(self) -> NodeIndex {
        NodeIndex::new(self.0 as usize)
    }

    fn from_index(idx: NodeIndex) -> Self {
        NodeId(idx.index() as u32)
    }
}

/// A file's representation in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    pub file_path: String,
    pub file_type: String,
    /// Display/grouping label, not unique.
    pub identifier: String,
}

/// Read access the graph needs while linking.
#[derive(Clone, Copy)]
pub struct GraphContext<'a> {
    pub store: &'a dyn Store,
    pub file_types: &'a FileTypeRegistry,
}

/// Directed graph of files, one node per `(file type, file path)`.
pub struct DependencyGraph {
    inner: StableDiGraph<FileNode, ()>,
    registry: HashMap<(String, String), NodeIndex>,
    rules: HashMap<String, ConnectionRules>,
}

impl std::fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("node_count", &self.inner.node_count())
            .field("edge_count", &self.inner.edge_count())
            .finish()
    }
}

impl DependencyGraph {
    pub fn new() -> Self {
        DependencyGraph {
            inner: StableDiGraph::new(),
            registry: HashMap::new(),
            rules: HashMap::new(),
        }
    }

    /// Load connection rules for every file type and create a node per seed.
    pub fn setup(&mut self, ctx: GraphContext<'_>, seed_paths: &[String]) -> Vec<NodeId> {
        self.rules = ctx
            .file_types
            .definitions()
            .iter()
            .map(|d| (d.id.clone(), d.connections.clone()))
            .collect();

        let nodes: Vec<NodeId> = seed_paths
            .iter()
            .map(|path| self.create(ctx, path, false))
            .collect();
        tracing::debug!(
            "Graph seeded with {} paths: {} nodes, {} edges",
            seed_paths.len(),
            self.inner.node_count(),
            self.inner.edge_count()
        );
        nodes
    }

    /// Memoized node lookup; `force` rebuilds the node's out-edges from scratch.
    pub fn create(&mut self, ctx: GraphContext<'_>, path: &str, force: bool) -> NodeId {
        let file_type = ctx.file_types.id_for(path).to_string();
        let key = (file_type.clone(), path.to_string());

        if let Some(&idx) = self.registry.get(&key) {
            if !force {
                return NodeId::from_index(idx);
            }
            // Detach from every child's in-edge set; in-edges are carried over.
            let out_edges: Vec<_> = self
                .inner
                .edges_directed(idx, Direction::Outgoing)
                .map(|e| e.id())
                .collect();
            for edge in out_edges {
                self.inner.remove_edge(edge);
            }
            self.inner[idx].identifier = identifier_of(ctx, path, &file_type);
            self.link(ctx, idx);
            return NodeId::from_index(idx);
        }

        let node = FileNode {
            file_path: path.to_string(),
            identifier: identifier_of(ctx, path, &file_type),
            file_type,
        };
        let idx = self.inner.add_node(node);
        // Registered before linking so cyclic references resolve to this node.
        self.registry.insert(key, idx);
        self.link(ctx, idx);
        NodeId::from_index(idx)
    }

    /// Forced rebuild for changed paths that already have nodes.
    pub fn refresh(&mut self, ctx: GraphContext<'_>, changed: &[String]) -> usize {
        let mut rebuilt = 0;
        for path in changed {
            if self.lookup(ctx.file_types.id_for(path), path).is_some() {
                self.create(ctx, path, true);
                rebuilt += 1;
            }
        }
        rebuilt
    }

    fn link(&mut self, ctx: GraphContext<'_>, idx: NodeIndex) {
        let FileNode {
            file_path,
            file_type,
            ..
        } = self.inner[idx].clone();
        let Some(rules) = self.rules.get(&file_type).cloned() else {
            return;
        };
        let record = ctx.store.get(&file_path, &file_type);
        let root = file_path.split('/').next().unwrap_or_default();

        for key in &rules.include_files {
            let Some(record) = record else { break };
            for value in record.values(key) {
                if value.is_empty() {
                    continue;
                }
                let child = self.create(ctx, &join_path(root, value), false);
                self.inner.update_edge(idx, child.index(), ());
            }
        }

        for rule in &rules.connect {
            let Some(record) = record else { break };
            let accepted = record.values(&rule.matches);
            if accepted.is_empty() {
                continue;
            }
            for found in ctx.store.find_multiple(&rule.find, &rule.where_key, accepted) {
                if found == file_path {
                    continue;
                }
                let child = self.create(ctx, &found, false);
                self.inner.update_edge(idx, child.index(), ());
            }
        }

        for shared in &rules.shared_files {
            let child = self.create(ctx, shared, false);
            self.inner.update_edge(idx, child.index(), ());
        }
    }

    pub fn lookup(&self, file_type: &str, path: &str) -> Option<NodeId> {
        self.registry
            .get(&(file_type.to_string(), path.to_string()))
            .copied()
            .map(NodeId::from_index)
    }

    pub fn node(&self, id: NodeId) -> Option<&FileNode> {
        self.inner.node_weight(id.index())
    }

    /// Files this node links to.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Files linking to this node.
    pub fn parents(&self, id: NodeId) -> Vec<NodeId> {
        self.neighbors(id, Direction::Incoming)
    }

    fn neighbors(&self, id: NodeId, direction: Direction) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .inner
            .neighbors_directed(id.index(), direction)
            .map(NodeId::from_index)
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// The node and its full transitive closure of out-edges, each once.
    pub fn to_directory(&self, id: NodeId) -> Vec<NodeId> {
        let mut visited = HashSet::new();
        let mut directory = Vec::new();
        let mut to_visit = vec![id];

        while let Some(current) = to_visit.pop() {
            if !visited.insert(current) {
                continue;
            }
            directory.push(current);
            let mut children = self.children(current);
            children.reverse();
            to_visit.extend(children.into_iter().filter(|c| !visited.contains(c)));
        }
        directory
    }

    /// True iff no known file links to this node.
    pub fn is_feature_folder(&self, id: NodeId) -> bool {
        self.inner
            .neighbors_directed(id.index(), Direction::Incoming)
            .next()
            .is_none()
    }

    pub fn feature_folders(&self) -> Vec<NodeId> {
        let mut roots: Vec<NodeId> = self
            .inner
            .node_indices()
            .map(NodeId::from_index)
            .filter(|&id| self.is_feature_folder(id))
            .collect();
        roots.sort();
        roots
    }

    /// Nodes grouped by identifier, for navigation.
    pub fn by_identifier(&self) -> HashMap<&str, Vec<NodeId>> {
        let mut groups: HashMap<&str, Vec<NodeId>> = HashMap::new();
        for idx in self.inner.node_indices() {
            groups
                .entry(self.inner[idx].identifier.as_str())
                .or_default()
                .push(NodeId::from_index(idx));
        }
        groups
    }

    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

fn identifier_of(ctx: GraphContext<'_>, path: &str, file_type: &str) -> String {
    ctx.store
        .get(path, file_type)
        .and_then(|record| record.values("identifier").first().cloned())
        .unwrap_or_else(|| UNKNOWN_IDENTIFIER.to_string())
}

/// Every file below `dir`; a missing directory yields no seeds.
pub fn seed_paths_in(fs: &dyn FileSystem, dir: &str) -> Vec<String> {
    match fs.walk(dir) {
        Ok(paths) => paths,
        Err(e) if e.is_not_found() => Vec::new(),
        Err(e) => {
            tracing::warn!("Cannot seed graph from {}: {}", dir, e);
            Vec::new()
        }
    }
}
