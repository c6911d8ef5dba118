//! CodeAtlas Core — domain model, schema validation, change detection, and
//! graph projection for the indexer orchestrator's write path.
//!
//! This crate provides:
//! - The entity model (Repository, File, Symbol, AstNode, Edge, Vector)
//! - Schema Validator (C1): structural + referential checks on a parse bundle
//! - Change Detector (C2): checksum diffing for incremental indexing
//! - Graph Builder (C4): projection of Symbols/Edges into a property graph
//!
//! What this crate does not do: parse source code (an external parser
//! produces the bundle this crate ingests), execute graph queries, serve
//! search queries, or write to the relational/vector stores (those live in
//! `codeatlas-store` and `codeatlas-vector`).

pub mod bundle;
pub mod diff;
pub mod graph;
pub mod model;
pub mod validate;

pub use bundle::{BundleAstNode, BundleEdge, BundleFile, BundleSymbol, IndexOptions, IndexRequestBundle, ParseMetadata, ParseOutput};
pub use diff::{diff as diff_files, ChangeSet, IndexMode};
pub use graph::{label_for_kind, GraphNode, GraphRelationship, NodeLabel, PetCodeGraph};
pub use model::{AstNode, Edge, EdgeType, EntityType, File, Repository, Symbol, SymbolKind, Vector};
pub use validate::{validate, ValidationFailure, Violation, MAX_VIOLATIONS};
