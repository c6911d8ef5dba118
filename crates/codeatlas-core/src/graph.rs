//! Graph Builder (C4) — projects Symbols and Edges into the property-graph
//! store. An in-process `petgraph::StableGraph` wrapper, identity-keyed by
//! `symbol_id` the way the teacher's `PetCodeGraph` is keyed by node id, so
//! re-projecting an existing node/relationship is a no-op for identity and
//! an update for properties (spec §4.4 "Idempotence").
//!
//! The projection is derived, never authoritative (spec §3 "Graph
//! projection"): it always rebuilds from Symbol + Edge state handed to it by
//! the orchestrator, never the other way around.

use crate::model::{Edge, EdgeType, Symbol, SymbolKind};
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableGraph};
use petgraph::visit::EdgeRef;
use std::collections::HashMap;
use uuid::Uuid;

/// Node label, derived from `SymbolKind` per spec §4.4's kind→label table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeLabel {
    Function,
    Class,
    Interface,
    Variable,
    Module,
    Symbol,
}

impl NodeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeLabel::Function => "Function",
            NodeLabel::Class => "Class",
            NodeLabel::Interface => "Interface",
            NodeLabel::Variable => "Variable",
            NodeLabel::Module => "Module",
            NodeLabel::Symbol => "Symbol",
        }
    }
}

/// function/method -> Function; class/struct -> Class; interface ->
/// Interface; variable -> Variable; module -> Module; other -> Symbol.
pub fn label_for_kind(kind: SymbolKind) -> NodeLabel {
    match kind {
        SymbolKind::Function | SymbolKind::Method => NodeLabel::Function,
        SymbolKind::Class | SymbolKind::Struct => NodeLabel::Class,
        SymbolKind::Interface => NodeLabel::Interface,
        SymbolKind::Variable => NodeLabel::Variable,
        SymbolKind::Module => NodeLabel::Module,
        SymbolKind::Type | SymbolKind::Other => NodeLabel::Symbol,
    }
}

/// A projected graph node: one per Symbol.
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub symbol_id: Uuid,
    pub label: NodeLabel,
    pub name: String,
}

/// A projected relationship: one per Edge with a resolved `target_id`.
/// Edges with a null `target_id` are never projected (spec §4.4
/// "Unresolved edges").
#[derive(Debug, Clone)]
pub struct GraphRelationship {
    pub edge_type: EdgeType,
    pub line_number: Option<u32>,
}

/// Relationship key per spec §4.4: `(source_id, target_id, edge_type)`.
type RelKey = (Uuid, Uuid, EdgeType);

/// The in-process property-graph projection.
pub struct PetCodeGraph {
    graph: StableGraph<GraphNode, GraphRelationship>,
    node_index: HashMap<Uuid, NodeIndex>,
    rel_index: HashMap<RelKey, EdgeIndex>,
    /// Edges that could not be projected because `target_id` is null.
    /// Re-examined on a later `project` call that introduces the missing
    /// target (spec §4.4 "On a later index... a post-write pass").
    pending_unresolved: Vec<Edge>,
}

impl Default for PetCodeGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl PetCodeGraph {
    pub fn new() -> Self {
        Self {
            graph: StableGraph::new(),
            node_index: HashMap::new(),
            rel_index: HashMap::new(),
            pending_unresolved: Vec::new(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn relationship_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn get_node(&self, symbol_id: Uuid) -> Option<&GraphNode> {
        self.node_index
            .get(&symbol_id)
            .and_then(|idx| self.graph.node_weight(*idx))
    }

    pub fn has_relationship(&self, source_id: Uuid, target_id: Uuid, edge_type: EdgeType) -> bool {
        self.rel_index.contains_key(&(source_id, target_id, edge_type))
    }

    /// Upsert a node for a Symbol. Identity is matched by `symbol_id`;
    /// re-upserting an existing node updates its properties in place rather
    /// than inserting a duplicate.
    pub fn upsert_node(&mut self, symbol: &Symbol) -> NodeIndex {
        let label = label_for_kind(symbol.kind);
        if let Some(&idx) = self.node_index.get(&symbol.symbol_id) {
            if let Some(node) = self.graph.node_weight_mut(idx) {
                node.label = label;
                node.name = symbol.name.clone();
            }
            idx
        } else {
            let idx = self.graph.add_node(GraphNode {
                symbol_id: symbol.symbol_id,
                label,
                name: symbol.name.clone(),
            });
            self.node_index.insert(symbol.symbol_id, idx);
            idx
        }
    }

    pub fn remove_node(&mut self, symbol_id: Uuid) {
        if let Some(idx) = self.node_index.remove(&symbol_id) {
            self.graph.remove_node(idx);
            self.rel_index.retain(|(s, t, _), _| *s != symbol_id && *t != symbol_id);
        }
    }

    /// Upsert a relationship for an Edge with a resolved target. Defers
    /// edges with a null target to `pending_unresolved` instead.
    pub fn upsert_edge(&mut self, edge: &Edge) {
        let Some(target_id) = edge.target_id else {
            self.pending_unresolved.push(edge.clone());
            return;
        };
        let key = (edge.source_id, target_id, edge.edge_type);
        if self.rel_index.contains_key(&key) {
            // Idempotent: identity already present, update properties only.
            if let Some(&eidx) = self.rel_index.get(&key) {
                if let Some(weight) = self.graph.edge_weight_mut(eidx) {
                    weight.line_number = edge.line_number;
                }
            }
            return;
        }
        let (Some(&src), Some(&dst)) = (
            self.node_index.get(&edge.source_id),
            self.node_index.get(&target_id),
        ) else {
            // Nodes not yet projected; defer like an unresolved edge so a
            // later call (once both symbols exist) can complete it.
            self.pending_unresolved.push(edge.clone());
            return;
        };
        let eidx = self.graph.add_edge(
            src,
            dst,
            GraphRelationship {
                edge_type: edge.edge_type,
                line_number: edge.line_number,
            },
        );
        self.rel_index.insert(key, eidx);
    }

    /// Project a batch of symbols and edges: nodes first (so same-batch
    /// edges can resolve against them), then edges.
    pub fn project(&mut self, symbols: &[Symbol], edges: &[Edge]) {
        for s in symbols {
            self.upsert_node(s);
        }
        for e in edges {
            self.upsert_edge(e);
        }
    }

    /// Re-examine previously unresolved edges now that new symbols may have
    /// supplied the missing target. Returns how many were newly projected.
    pub fn resolve_pending(&mut self) -> usize {
        let pending = std::mem::take(&mut self.pending_unresolved);
        let mut resolved = 0;
        for edge in pending {
            if edge.target_id.is_some() && self.node_index.contains_key(&edge.source_id) {
                let before = self.graph.edge_count();
                self.upsert_edge(&edge);
                if self.graph.edge_count() > before {
                    resolved += 1;
                    continue;
                }
            }
            self.pending_unresolved.push(edge);
        }
        resolved
    }

    pub fn pending_unresolved_count(&self) -> usize {
        self.pending_unresolved.len()
    }

    pub fn iter_relationships(&self) -> impl Iterator<Item = (Uuid, Uuid, EdgeType)> + '_ {
        self.graph.edge_references().map(|e| {
            let src = self.graph.node_weight(e.source()).unwrap().symbol_id;
            let dst = self.graph.node_weight(e.target()).unwrap().symbol_id;
            (src, dst, e.weight().edge_type)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(id: Uuid, kind: SymbolKind, name: &str) -> Symbol {
        Symbol {
            symbol_id: id,
            file_id: Uuid::new_v4(),
            name: name.to_string(),
            kind,
            signature: None,
            start_line: 1,
            end_line: 1,
            start_byte: 0,
            end_byte: 1,
            docstring: None,
            semantic_summary: None,
        }
    }

    #[test]
    fn kind_to_label_mapping_matches_spec_table() {
        assert!(matches!(label_for_kind(SymbolKind::Function), NodeLabel::Function));
        assert!(matches!(label_for_kind(SymbolKind::Method), NodeLabel::Function));
        assert!(matches!(label_for_kind(SymbolKind::Class), NodeLabel::Class));
        assert!(matches!(label_for_kind(SymbolKind::Struct), NodeLabel::Class));
        assert!(matches!(label_for_kind(SymbolKind::Interface), NodeLabel::Interface));
        assert!(matches!(label_for_kind(SymbolKind::Variable), NodeLabel::Variable));
        assert!(matches!(label_for_kind(SymbolKind::Module), NodeLabel::Module));
        assert!(matches!(label_for_kind(SymbolKind::Other), NodeLabel::Symbol));
        assert!(matches!(label_for_kind(SymbolKind::Type), NodeLabel::Symbol));
    }

    #[test]
    fn calls_edge_projects_as_relationship_between_function_nodes() {
        let mut g = PetCodeGraph::new();
        let foo_id = Uuid::new_v4();
        let bar_id = Uuid::new_v4();
        let foo = symbol(foo_id, SymbolKind::Function, "foo");
        let bar = symbol(bar_id, SymbolKind::Function, "bar");
        let edge = Edge {
            edge_id: Uuid::new_v4(),
            source_id: foo_id,
            target_id: Some(bar_id),
            edge_type: EdgeType::Calls,
            source_file: "a.go".into(),
            target_file: None,
            target_module: None,
            line_number: Some(10),
        };

        g.project(&[foo, bar], &[edge]);

        assert_eq!(g.node_count(), 2);
        assert_eq!(g.relationship_count(), 1);
        assert!(g.has_relationship(foo_id, bar_id, EdgeType::Calls));
    }

    #[test]
    fn unresolved_edge_is_not_projected_as_relationship() {
        let mut g = PetCodeGraph::new();
        let foo_id = Uuid::new_v4();
        let foo = symbol(foo_id, SymbolKind::Function, "foo");
        let edge = Edge {
            edge_id: Uuid::new_v4(),
            source_id: foo_id,
            target_id: None,
            edge_type: EdgeType::Imports,
            source_file: "a.go".into(),
            target_file: None,
            target_module: Some("external/x".into()),
            line_number: None,
        };

        g.project(&[foo], &[edge]);

        assert_eq!(g.node_count(), 1);
        assert_eq!(g.relationship_count(), 0);
        assert_eq!(g.pending_unresolved_count(), 1);
    }

    #[test]
    fn resolve_pending_projects_edge_once_target_symbol_exists() {
        let mut g = PetCodeGraph::new();
        let foo_id = Uuid::new_v4();
        let bar_id = Uuid::new_v4();
        let foo = symbol(foo_id, SymbolKind::Function, "foo");
        let edge = Edge {
            edge_id: Uuid::new_v4(),
            source_id: foo_id,
            target_id: Some(bar_id),
            edge_type: EdgeType::Calls,
            source_file: "a.go".into(),
            target_file: None,
            target_module: None,
            line_number: None,
        };

        // bar doesn't exist yet: edge defers.
        g.project(&[foo], &[edge]);
        assert_eq!(g.relationship_count(), 0);

        // bar arrives on a later index.
        let bar = symbol(bar_id, SymbolKind::Function, "bar");
        g.project(&[bar], &[]);
        let resolved = g.resolve_pending();
        assert_eq!(resolved, 1);
        assert!(g.has_relationship(foo_id, bar_id, EdgeType::Calls));
    }

    #[test]
    fn reprojecting_same_node_is_idempotent_for_identity() {
        let mut g = PetCodeGraph::new();
        let id = Uuid::new_v4();
        let s1 = symbol(id, SymbolKind::Function, "foo");
        let mut s2 = symbol(id, SymbolKind::Function, "foo_renamed");
        s2.symbol_id = id;

        g.project(&[s1], &[]);
        assert_eq!(g.node_count(), 1);
        g.project(&[s2], &[]);
        assert_eq!(g.node_count(), 1);
        assert_eq!(g.get_node(id).unwrap().name, "foo_renamed");
    }

    #[test]
    fn remove_node_drops_its_relationships() {
        let mut g = PetCodeGraph::new();
        let foo_id = Uuid::new_v4();
        let bar_id = Uuid::new_v4();
        g.project(
            &[
                symbol(foo_id, SymbolKind::Function, "foo"),
                symbol(bar_id, SymbolKind::Function, "bar"),
            ],
            &[Edge {
                edge_id: Uuid::new_v4(),
                source_id: foo_id,
                target_id: Some(bar_id),
                edge_type: EdgeType::Calls,
                source_file: "a.go".into(),
                target_file: None,
                target_module: None,
                line_number: None,
            }],
        );
        assert_eq!(g.relationship_count(), 1);
        g.remove_node(foo_id);
        assert_eq!(g.node_count(), 1);
        assert_eq!(g.relationship_count(), 0);
    }
}
