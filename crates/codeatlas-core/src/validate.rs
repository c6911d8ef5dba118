//! Schema Validator (C1) — structural and referential checks on a parse
//! bundle before any write. Violations do not abort enumeration; the
//! validator reports as many as it can find up to `MAX_VIOLATIONS`.

use crate::bundle::{BundleAstNode, BundleEdge, BundleFile, BundleSymbol, IndexRequestBundle};
use crate::model::{EdgeType, SymbolKind};
use std::collections::HashSet;
use uuid::Uuid;

/// Cap on enumerated violations, per spec §4.1.
pub const MAX_VIOLATIONS: usize = 100;

/// A single structural or referential violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub field_path: String,
    pub constraint: &'static str,
    pub preview: String,
}

impl Violation {
    fn new(field_path: impl Into<String>, constraint: &'static str, preview: impl Into<String>) -> Self {
        let mut preview = preview.into();
        const MAX_PREVIEW: usize = 120;
        if preview.len() > MAX_PREVIEW {
            preview.truncate(MAX_PREVIEW);
            preview.push('…');
        }
        Self {
            field_path: field_path.into(),
            constraint,
            preview,
        }
    }
}

/// Rejection: the bundle violates structural or referential constraints.
/// The orchestrator rejects the entire bundle with no writes when this is
/// returned.
#[derive(Debug, Clone, thiserror::Error)]
#[error("bundle failed validation with {} violation(s)", .violations.len())]
pub struct ValidationFailure {
    pub violations: Vec<Violation>,
}

/// Accumulates violations up to the cap, then stops recording (but callers
/// keep scanning so later, independent checks still run).
struct Collector {
    violations: Vec<Violation>,
}

impl Collector {
    fn new() -> Self {
        Self {
            violations: Vec::new(),
        }
    }

    fn push(&mut self, v: Violation) {
        if self.violations.len() < MAX_VIOLATIONS {
            self.violations.push(v);
        }
    }

    fn is_full(&self) -> bool {
        self.violations.len() >= MAX_VIOLATIONS
    }
}

/// Validate a bundle against spec §4.1. Returns `Ok(())` when clean, or a
/// `ValidationFailure` carrying every violation found (capped).
pub fn validate(bundle: &IndexRequestBundle) -> Result<(), ValidationFailure> {
    let mut c = Collector::new();

    if bundle.repo_name.trim().is_empty() {
        c.push(Violation::new(
            "repo_name",
            "non_empty",
            bundle.repo_name.clone(),
        ));
    }

    let files = &bundle.parse_output.files;
    let mut seen_paths: HashSet<&str> = HashSet::new();
    let mut file_ids: HashSet<Uuid> = HashSet::new();
    let mut symbol_ids: HashSet<Uuid> = HashSet::new();

    for file in files {
        if let Some(id) = file.file_id {
            file_ids.insert(id);
        }
    }
    for file in files {
        for sym in &file.symbols {
            if let Some(id) = sym.symbol_id {
                symbol_ids.insert(id);
            }
        }
    }

    for (fi, file) in files.iter().enumerate() {
        if c.is_full() {
            break;
        }
        check_file(&mut c, fi, file);

        if !seen_paths.insert(file.path.as_str()) {
            c.push(Violation::new(
                format!("parse_output.files[{fi}].path"),
                "unique_path",
                file.path.clone(),
            ));
        }

        let mut seen_symbol_keys: HashSet<(String, i64, i64)> = HashSet::new();
        for (si, sym) in file.symbols.iter().enumerate() {
            if c.is_full() {
                break;
            }
            check_symbol(&mut c, fi, si, sym);

            let key = (sym.name.clone(), sym.start_line, sym.start_byte);
            if !seen_symbol_keys.insert(key) {
                c.push(Violation::new(
                    format!("parse_output.files[{fi}].symbols[{si}]"),
                    "unique_symbol_key",
                    sym.name.clone(),
                ));
            }
        }

        for (ai, node) in file.ast_nodes.iter().enumerate() {
            if c.is_full() {
                break;
            }
            check_ast_node(&mut c, fi, ai, node, &file_ids, file.file_id);
        }
    }

    for (ei, edge) in bundle.parse_output.relationships.iter().enumerate() {
        if c.is_full() {
            break;
        }
        check_edge(&mut c, ei, edge, &symbol_ids);
    }

    if c.violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationFailure {
            violations: c.violations,
        })
    }
}

fn check_file(c: &mut Collector, fi: usize, file: &BundleFile) {
    if file.path.trim().is_empty() {
        c.push(Violation::new(
            format!("parse_output.files[{fi}].path"),
            "non_empty",
            "",
        ));
    }
    if file.language.trim().is_empty() {
        c.push(Violation::new(
            format!("parse_output.files[{fi}].language"),
            "non_empty",
            "",
        ));
    }
    if file.checksum.trim().is_empty() {
        c.push(Violation::new(
            format!("parse_output.files[{fi}].checksum"),
            "non_empty",
            "",
        ));
    }
    if file.size < 0 {
        c.push(Violation::new(
            format!("parse_output.files[{fi}].size"),
            "size_ge_zero",
            file.size.to_string(),
        ));
    }
}

fn check_symbol(c: &mut Collector, fi: usize, si: usize, sym: &BundleSymbol) {
    let path = format!("parse_output.files[{fi}].symbols[{si}]");
    if sym.name.trim().is_empty() {
        c.push(Violation::new(format!("{path}.name"), "non_empty", ""));
    }
    if SymbolKind::parse(&sym.kind).is_none() {
        c.push(Violation::new(
            format!("{path}.kind"),
            "enumerated_kind",
            sym.kind.clone(),
        ));
    }
    if sym.start_line > sym.end_line {
        c.push(Violation::new(
            format!("{path}.start_line"),
            "start_line_le_end_line",
            format!("{}..{}", sym.start_line, sym.end_line),
        ));
    }
    if sym.start_byte > sym.end_byte {
        c.push(Violation::new(
            format!("{path}.start_byte"),
            "start_byte_le_end_byte",
            format!("{}..{}", sym.start_byte, sym.end_byte),
        ));
    }
}

fn check_ast_node(
    c: &mut Collector,
    fi: usize,
    ai: usize,
    node: &BundleAstNode,
    file_ids: &HashSet<Uuid>,
    owning_file_id: Option<Uuid>,
) {
    let path = format!("parse_output.files[{fi}].ast_nodes[{ai}]");
    let resolved_file_id = node.file_id.or(owning_file_id);
    if let Some(declared) = node.file_id {
        if !file_ids.contains(&declared) {
            c.push(Violation::new(
                format!("{path}.file_id"),
                "references_bundle_file",
                declared.to_string(),
            ));
        }
    } else if resolved_file_id.is_none() {
        c.push(Violation::new(format!("{path}.file_id"), "required", ""));
    }
    if node.start_line > node.end_line || node.start_byte > node.end_byte {
        c.push(Violation::new(
            format!("{path}.span"),
            "well_formed_span",
            format!("{}..{} / {}..{}", node.start_line, node.end_line, node.start_byte, node.end_byte),
        ));
    }
}

fn check_edge(c: &mut Collector, ei: usize, edge: &BundleEdge, symbol_ids: &HashSet<Uuid>) {
    let path = format!("parse_output.relationships[{ei}]");
    if EdgeType::parse(&edge.edge_type).is_none() {
        c.push(Violation::new(
            format!("{path}.edge_type"),
            "enumerated_edge_type",
            edge.edge_type.clone(),
        ));
    }
    if !symbol_ids.contains(&edge.source_id) {
        c.push(Violation::new(
            format!("{path}.source_id"),
            "references_bundle_symbol",
            edge.source_id.to_string(),
        ));
    }
    if let Some(target) = edge.target_id {
        if !symbol_ids.contains(&target) {
            c.push(Violation::new(
                format!("{path}.target_id"),
                "references_bundle_symbol_or_cross_repo_hint",
                target.to_string(),
            ));
        }
    } else if edge.target_module.is_none() && edge.target_file.is_none() {
        c.push(Violation::new(
            format!("{path}.target_id"),
            "target_or_cross_repo_hint_required",
            "",
        ));
    }
}
