//! Change Detector (C2) — diffs incoming file checksums against stored
//! state. Pure set-difference over two `path -> checksum` maps, generalized
//! from the teacher's Merkle-tree file-hash comparison to a checksum
//! comparison against whatever the relational store currently holds for a
//! repository.

use std::collections::{HashMap, HashSet};

/// Indexing mode, switches how `added`/`modified`/`unchanged` are
/// interpreted downstream (spec §4.2 "Mode switch").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    /// Write every incoming file; nothing is considered unchanged.
    Full,
    /// Skip files whose checksum matches stored state.
    Incremental,
}

/// Result of diffing one repository's incoming files against stored state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub unchanged: Vec<String>,
    pub deleted: Vec<String>,
}

impl ChangeSet {
    /// Paths that require a relational/graph/vector write this run.
    pub fn to_write(&self) -> impl Iterator<Item = &str> {
        self.added.iter().chain(self.modified.iter()).map(|s| s.as_str())
    }
}

/// Diff incoming files against the stored `(path, checksum)` state of a
/// repository.
///
/// `stored` is empty when the repository does not yet exist (spec §4.2 edge
/// case): every incoming file becomes `added` and `deleted` is empty.
pub fn diff(
    stored: &HashMap<String, String>,
    incoming: &[(String, String)],
    mode: IndexMode,
) -> ChangeSet {
    let incoming_paths: HashSet<&str> = incoming.iter().map(|(p, _)| p.as_str()).collect();

    let mut added = Vec::new();
    let mut modified = Vec::new();
    let mut unchanged = Vec::new();

    for (path, checksum) in incoming {
        match stored.get(path) {
            None => added.push(path.clone()),
            Some(stored_checksum) if stored_checksum != checksum => modified.push(path.clone()),
            Some(_) => unchanged.push(path.clone()),
        }
    }

    let deleted: Vec<String> = stored
        .keys()
        .filter(|p| !incoming_paths.contains(p.as_str()))
        .cloned()
        .collect();

    match mode {
        IndexMode::Full => {
            let mut all: Vec<String> = added;
            all.extend(modified);
            all.extend(unchanged);
            ChangeSet {
                added: all,
                modified: Vec::new(),
                unchanged: Vec::new(),
                deleted,
            }
        }
        IndexMode::Incremental => ChangeSet {
            added,
            modified,
            unchanged,
            deleted,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(p, c)| (p.to_string(), c.to_string())).collect()
    }

    #[test]
    fn new_repository_has_everything_added_nothing_deleted() {
        let stored = HashMap::new();
        let incoming = vec![("a.rs".to_string(), "h1".to_string())];
        let cs = diff(&stored, &incoming, IndexMode::Incremental);
        assert_eq!(cs.added, vec!["a.rs"]);
        assert!(cs.deleted.is_empty());
    }

    #[test]
    fn incremental_classifies_each_bucket() {
        let stored = map(&[("a.rs", "h1"), ("b.rs", "h2"), ("c.rs", "h3")]);
        let incoming = vec![
            ("a.rs".to_string(), "h1".to_string()),       // unchanged
            ("b.rs".to_string(), "h2-modified".to_string()), // modified
            ("d.rs".to_string(), "h4".to_string()),       // added
        ];
        let cs = diff(&stored, &incoming, IndexMode::Incremental);
        assert_eq!(cs.unchanged, vec!["a.rs"]);
        assert_eq!(cs.modified, vec!["b.rs"]);
        assert_eq!(cs.added, vec!["d.rs"]);
        assert_eq!(cs.deleted, vec!["c.rs"]);
    }

    #[test]
    fn full_mode_writes_everything_and_empties_unchanged() {
        let stored = map(&[("a.rs", "h1"), ("c.rs", "h3")]);
        let incoming = vec![("a.rs".to_string(), "h1".to_string())];
        let cs = diff(&stored, &incoming, IndexMode::Full);
        assert_eq!(cs.added, vec!["a.rs"]);
        assert!(cs.unchanged.is_empty());
        assert!(cs.modified.is_empty());
        // Deletion still happens regardless of mode.
        assert_eq!(cs.deleted, vec!["c.rs"]);
    }

    #[test]
    fn to_write_chains_added_and_modified_only() {
        let cs = ChangeSet {
            added: vec!["a".into()],
            modified: vec!["b".into()],
            unchanged: vec!["c".into()],
            deleted: vec![],
        };
        let list: Vec<&str> = cs.to_write().collect();
        assert_eq!(list, vec!["a", "b"]);
    }
}
