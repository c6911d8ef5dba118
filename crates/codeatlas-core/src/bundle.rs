//! Parse-output bundle — the wire shape a client submits for one indexing
//! pass (spec §6.1). The core treats the `parse_output` section as opaque
//! input produced by an external parser; it only imposes the structural
//! shape needed to validate, diff, and write it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Top-level request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRequestBundle {
    pub repo_id: Option<Uuid>,
    pub repo_name: String,
    pub repo_url: Option<String>,
    #[serde(default = "default_branch")]
    pub branch: String,
    pub commit_hash: Option<String>,
    pub parse_output: ParseOutput,
    #[serde(default)]
    pub options: IndexOptions,
}

fn default_branch() -> String {
    "main".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseOutput {
    pub files: Vec<BundleFile>,
    #[serde(default)]
    pub relationships: Vec<BundleEdge>,
    #[serde(default)]
    pub metadata: ParseMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParseMetadata {
    pub version: Option<String>,
    pub timestamp: Option<String>,
    #[serde(default)]
    pub total_files: u64,
    #[serde(default)]
    pub success_count: u64,
    #[serde(default)]
    pub failure_count: u64,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleFile {
    pub file_id: Option<Uuid>,
    pub path: String,
    pub language: String,
    pub size: i64,
    pub checksum: String,
    #[serde(default)]
    pub symbols: Vec<BundleSymbol>,
    #[serde(default)]
    pub ast_nodes: Vec<BundleAstNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleSymbol {
    pub symbol_id: Option<Uuid>,
    /// Present in a symbol emitted standalone; absent when nested under a
    /// `BundleFile` (the file is the implicit owner in that position).
    pub file_id: Option<Uuid>,
    pub name: String,
    pub kind: String,
    pub signature: Option<String>,
    pub start_line: i64,
    pub end_line: i64,
    pub start_byte: i64,
    pub end_byte: i64,
    pub docstring: Option<String>,
    pub semantic_summary: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleAstNode {
    pub node_id: Option<Uuid>,
    pub file_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub node_type: String,
    pub parent_id: Option<Uuid>,
    pub start_line: i64,
    pub end_line: i64,
    pub start_byte: i64,
    pub end_byte: i64,
    pub text: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleEdge {
    pub source_id: Uuid,
    pub target_id: Option<Uuid>,
    pub edge_type: String,
    pub source_file: String,
    pub target_file: Option<String>,
    pub target_module: Option<String>,
    pub line_number: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexOptions {
    #[serde(default)]
    pub incremental: bool,
    #[serde(default)]
    pub skip_vectors: bool,
    pub batch_size: Option<usize>,
    pub worker_count: Option<usize>,
    pub embedding_model: Option<String>,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            incremental: false,
            skip_vectors: false,
            batch_size: None,
            worker_count: None,
            embedding_model: None,
        }
    }
}
