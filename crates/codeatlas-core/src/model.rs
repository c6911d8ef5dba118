//! Domain model for the CodeAtlas knowledge graph.
//!
//! Mirrors the entity set of the persisted schema: Repository, File, Symbol,
//! AstNode, Edge, and Vector. Every identifier is a 128-bit opaque value
//! (`Uuid`). Kind/type enums are closed tagged sets — unknown tags are
//! rejected at deserialization, not silently accepted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A logical codebase being indexed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub repo_id: Uuid,
    pub name: String,
    pub url: Option<String>,
    pub branch: String,
    pub commit_hash: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A source file within a repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    pub file_id: Uuid,
    pub repo_id: Uuid,
    pub path: String,
    pub language: String,
    pub size: u64,
    pub checksum: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The closed set of named-entity kinds a Symbol may represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Struct,
    Interface,
    Variable,
    Module,
    Type,
    Other,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Class => "class",
            SymbolKind::Struct => "struct",
            SymbolKind::Interface => "interface",
            SymbolKind::Variable => "variable",
            SymbolKind::Module => "module",
            SymbolKind::Type => "type",
            SymbolKind::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "function" => SymbolKind::Function,
            "method" => SymbolKind::Method,
            "class" => SymbolKind::Class,
            "struct" => SymbolKind::Struct,
            "interface" => SymbolKind::Interface,
            "variable" => SymbolKind::Variable,
            "module" => SymbolKind::Module,
            "type" => SymbolKind::Type,
            "other" => SymbolKind::Other,
            _ => return None,
        })
    }
}

/// Custom deserializer rejects unknown kinds at validation time rather than
/// letting them reach a store write.
impl<'de> Deserialize<'de> for SymbolKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        SymbolKind::parse(&s).ok_or_else(|| {
            serde::de::Error::unknown_variant(
                &s,
                &[
                    "function", "method", "class", "struct", "interface", "variable", "module",
                    "type", "other",
                ],
            )
        })
    }
}

/// A named program entity extracted from a File.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub symbol_id: Uuid,
    pub file_id: Uuid,
    pub name: String,
    pub kind: SymbolKind,
    pub signature: Option<String>,
    pub start_line: u32,
    pub end_line: u32,
    pub start_byte: u32,
    pub end_byte: u32,
    pub docstring: Option<String>,
    pub semantic_summary: Option<String>,
}

impl Symbol {
    /// Well-formed span per §4.1: start must not exceed end, on both axes.
    pub fn has_well_formed_span(&self) -> bool {
        self.start_line <= self.end_line && self.start_byte <= self.end_byte
    }
}

/// An AST node retained for later structural queries. Forms a forest rooted
/// at nodes with `parent_id = None`, one tree per file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AstNode {
    pub node_id: Uuid,
    pub file_id: Uuid,
    #[serde(rename = "type")]
    pub node_type: String,
    pub parent_id: Option<Uuid>,
    pub start_line: u32,
    pub end_line: u32,
    pub start_byte: u32,
    pub end_byte: u32,
    pub text: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

/// The closed set of dependency relationships between symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeType {
    Calls,
    Imports,
    Extends,
    Implements,
    References,
    Contains,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Calls => "CALLS",
            EdgeType::Imports => "IMPORTS",
            EdgeType::Extends => "EXTENDS",
            EdgeType::Implements => "IMPLEMENTS",
            EdgeType::References => "REFERENCES",
            EdgeType::Contains => "CONTAINS",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "CALLS" => EdgeType::Calls,
            "IMPORTS" => EdgeType::Imports,
            "EXTENDS" => EdgeType::Extends,
            "IMPLEMENTS" => EdgeType::Implements,
            "REFERENCES" => EdgeType::References,
            "CONTAINS" => EdgeType::Contains,
            _ => return None,
        })
    }
}

impl<'de> Deserialize<'de> for EdgeType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        EdgeType::parse(&s).ok_or_else(|| {
            serde::de::Error::unknown_variant(
                &s,
                &[
                    "CALLS",
                    "IMPORTS",
                    "EXTENDS",
                    "IMPLEMENTS",
                    "REFERENCES",
                    "CONTAINS",
                ],
            )
        })
    }
}

/// A dependency relationship between two symbols.
///
/// Invariant: if `target_id` is `None`, either `target_module` or
/// `target_file` must be present so the reference can be resolved later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub edge_id: Uuid,
    pub source_id: Uuid,
    pub target_id: Option<Uuid>,
    pub edge_type: EdgeType,
    pub source_file: String,
    pub target_file: Option<String>,
    pub target_module: Option<String>,
    pub line_number: Option<u32>,
}

impl Edge {
    /// An edge is resolvable now if it already has a target, or unresolved
    /// but carrying enough information to be resolved on a later index.
    pub fn is_well_formed(&self) -> bool {
        self.target_id.is_some() || self.target_module.is_some() || self.target_file.is_some()
    }

    pub fn is_unresolved(&self) -> bool {
        self.target_id.is_none()
    }
}

/// The closed set of entity kinds a Vector may embed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Symbol,
    File,
    Docstring,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Symbol => "symbol",
            EntityType::File => "file",
            EntityType::Docstring => "docstring",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "symbol" => EntityType::Symbol,
            "file" => EntityType::File,
            "docstring" => EntityType::Docstring,
            _ => return None,
        })
    }
}

impl<'de> Deserialize<'de> for EntityType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        EntityType::parse(&s)
            .ok_or_else(|| serde::de::Error::unknown_variant(&s, &["symbol", "file", "docstring"]))
    }
}

/// An embedding of entity text, persisted in the vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vector {
    pub vector_id: Uuid,
    pub entity_id: Uuid,
    pub entity_type: EntityType,
    pub embedding: Vec<f32>,
    pub content: String,
    pub model: String,
    pub chunk_index: u32,
}
