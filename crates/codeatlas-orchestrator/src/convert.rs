//! Maps the wire bundle shapes (`codeatlas_core::bundle`) onto the
//! persisted entity model (`codeatlas_core::model`), assigning stable ids
//! where the bundle omits them.

use chrono::Utc;
use codeatlas_core::{
    AstNode, BundleAstNode, BundleEdge, BundleFile, BundleSymbol, Edge, EdgeType, File, Repository,
    Symbol, SymbolKind,
};
use std::collections::HashMap;
use uuid::Uuid;

/// Namespace for deterministic edge-id derivation, so the same logical edge
/// always maps to the same row instead of minting a new primary key (and a
/// new duplicate row) on every resubmission of an unchanged bundle.
const EDGE_ID_NAMESPACE: Uuid = Uuid::from_bytes([
    0xe6, 0x7e, 0x3d, 0x01, 0xaf, 0x44, 0x4b, 0x9c, 0x8e, 0x12, 0x5b, 0xc0, 0x1d, 0x9e, 0x77, 0x02,
]);

/// Derive a stable `edge_id` from the edge's identity: `(source_id,
/// target_id, edge_type)` per spec §4.4's relationship key, plus
/// `target_module`/`target_file` so two distinct unresolved edges from the
/// same symbol (e.g. two different external imports) don't collapse into
/// one row.
pub fn derive_edge_id(
    source_id: Uuid,
    target_id: Option<Uuid>,
    edge_type: EdgeType,
    target_module: Option<&str>,
    target_file: Option<&str>,
) -> Uuid {
    let name = format!(
        "{source_id}:{target_id:?}:{}:{}:{}",
        edge_type.as_str(),
        target_module.unwrap_or(""),
        target_file.unwrap_or(""),
    );
    Uuid::new_v5(&EDGE_ID_NAMESPACE, name.as_bytes())
}

/// Resolve a File's id: reuse the stored id for this path if one exists, so
/// a bundle that omits stable ids doesn't mint a fresh primary key (and
/// thereby orphan the previous row's children) on every resubmission.
pub fn resolve_file_id(bundle_file: &BundleFile, existing_ids: &HashMap<String, Uuid>) -> Uuid {
    bundle_file
        .file_id
        .or_else(|| existing_ids.get(&bundle_file.path).copied())
        .unwrap_or_else(Uuid::new_v4)
}

pub fn to_repository(
    repo_id: Uuid,
    name: &str,
    url: Option<String>,
    branch: &str,
    commit_hash: Option<String>,
    created_at: chrono::DateTime<Utc>,
) -> Repository {
    Repository {
        repo_id,
        name: name.to_string(),
        url,
        branch: branch.to_string(),
        commit_hash,
        metadata: HashMap::new(),
        created_at,
        updated_at: Utc::now(),
    }
}

pub fn to_file(bundle_file: &BundleFile, file_id: Uuid, repo_id: Uuid, created_at: chrono::DateTime<Utc>) -> File {
    File {
        file_id,
        repo_id,
        path: bundle_file.path.clone(),
        language: bundle_file.language.clone(),
        size: bundle_file.size.max(0) as u64,
        checksum: bundle_file.checksum.clone(),
        created_at,
        updated_at: Utc::now(),
    }
}

/// Symbols owned by one file. The bundle's `kind` string has already been
/// validated against the enumerated set (C1); `parse` is infallible here.
pub fn to_symbols(bundle_symbols: &[BundleSymbol], file_id: Uuid) -> Vec<Symbol> {
    bundle_symbols
        .iter()
        .map(|sym| Symbol {
            symbol_id: sym.symbol_id.unwrap_or_else(Uuid::new_v4),
            file_id,
            name: sym.name.clone(),
            kind: SymbolKind::parse(&sym.kind).unwrap_or(SymbolKind::Other),
            signature: sym.signature.clone(),
            start_line: sym.start_line.max(0) as u32,
            end_line: sym.end_line.max(0) as u32,
            start_byte: sym.start_byte.max(0) as u32,
            end_byte: sym.end_byte.max(0) as u32,
            docstring: sym.docstring.clone(),
            semantic_summary: sym.semantic_summary.clone(),
        })
        .collect()
}

/// AST nodes owned by one file, capped at `max_nodes` (spec §9 Open
/// Questions). Returns the retained nodes and how many were dropped.
pub fn to_ast_nodes(bundle_nodes: &[BundleAstNode], file_id: Uuid, max_nodes: usize) -> (Vec<AstNode>, usize) {
    let dropped = bundle_nodes.len().saturating_sub(max_nodes);
    let nodes = bundle_nodes
        .iter()
        .take(max_nodes)
        .map(|node| AstNode {
            node_id: node.node_id.unwrap_or_else(Uuid::new_v4),
            file_id: node.file_id.unwrap_or(file_id),
            node_type: node.node_type.clone(),
            parent_id: node.parent_id,
            start_line: node.start_line.max(0) as u32,
            end_line: node.end_line.max(0) as u32,
            start_byte: node.start_byte.max(0) as u32,
            end_byte: node.end_byte.max(0) as u32,
            text: node.text.clone(),
            attributes: node.attributes.clone(),
        })
        .collect();
    (nodes, dropped)
}

pub fn to_edge(bundle_edge: &BundleEdge) -> Edge {
    let edge_type = EdgeType::parse(&bundle_edge.edge_type).unwrap_or(EdgeType::References);
    Edge {
        edge_id: derive_edge_id(
            bundle_edge.source_id,
            bundle_edge.target_id,
            edge_type,
            bundle_edge.target_module.as_deref(),
            bundle_edge.target_file.as_deref(),
        ),
        source_id: bundle_edge.source_id,
        target_id: bundle_edge.target_id,
        edge_type,
        source_file: bundle_edge.source_file.clone(),
        target_file: bundle_edge.target_file.clone(),
        target_module: bundle_edge.target_module.clone(),
        line_number: bundle_edge.line_number.map(|n| n.max(0) as u32),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_file_id_reuses_stored_id_when_bundle_omits_one() {
        let mut existing = HashMap::new();
        let stored_id = Uuid::new_v4();
        existing.insert("a.go".to_string(), stored_id);

        let bundle_file = BundleFile {
            file_id: None,
            path: "a.go".to_string(),
            language: "go".to_string(),
            size: 10,
            checksum: "H1".to_string(),
            symbols: vec![],
            ast_nodes: vec![],
        };

        assert_eq!(resolve_file_id(&bundle_file, &existing), stored_id);
    }

    #[test]
    fn to_edge_assigns_the_same_id_on_resubmission() {
        let edge = BundleEdge {
            source_id: Uuid::new_v4(),
            target_id: Some(Uuid::new_v4()),
            edge_type: "CALLS".to_string(),
            source_file: "a.go".to_string(),
            target_file: Some("b.go".to_string()),
            target_module: None,
            line_number: Some(10),
        };

        let first = to_edge(&edge);
        let second = to_edge(&edge);
        assert_eq!(first.edge_id, second.edge_id);
    }

    #[test]
    fn to_edge_distinguishes_unresolved_edges_by_target_module() {
        let source_id = Uuid::new_v4();
        let import_a = BundleEdge {
            source_id,
            target_id: None,
            edge_type: "IMPORTS".to_string(),
            source_file: "a.go".to_string(),
            target_file: None,
            target_module: Some("external/a".to_string()),
            line_number: None,
        };
        let import_b = BundleEdge {
            target_module: Some("external/b".to_string()),
            ..import_a.clone()
        };

        assert_ne!(to_edge(&import_a).edge_id, to_edge(&import_b).edge_id);
    }

    #[test]
    fn ast_node_cap_drops_the_overflow() {
        let nodes: Vec<BundleAstNode> = (0..10)
            .map(|i| BundleAstNode {
                node_id: None,
                file_id: None,
                node_type: "block".to_string(),
                parent_id: None,
                start_line: i,
                end_line: i,
                start_byte: 0,
                end_byte: 1,
                text: None,
                attributes: HashMap::new(),
            })
            .collect();

        let (retained, dropped) = to_ast_nodes(&nodes, Uuid::new_v4(), 3);
        assert_eq!(retained.len(), 3);
        assert_eq!(dropped, 7);
    }
}
