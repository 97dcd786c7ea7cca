//! In-memory filesystem double for engine and classifier tests.
//!
//! Stores nodes in a `BTreeMap` keyed by long canonical path and records
//! every native call (with its transacted flag) so tests can assert call
//! ordering and counts, not just end state.

use crate::error::NativeStatus;
use crate::path::{CanonicalPath, PathFormatOptions, normalize};
use crate::platform::traits::{
    ATTRIBUTE_DIRECTORY, ATTRIBUTE_READONLY, ATTRIBUTE_REPARSE_POINT, NativeFilesystem, RawEntry,
    RawMetadata, REPARSE_TAG_MOUNT_POINT, REPARSE_TAG_SYMLINK, TransactionHandle,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// ERROR_NOT_A_REPARSE_POINT
const NOT_A_REPARSE_POINT: NativeStatus = NativeStatus(4390);

/// 2020-01-01T00:00:00Z in FILETIME ticks
pub const FIXED_FILETIME: u64 = 132_223_104_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Query { path: String, transacted: bool },
    RemoveDirectory { path: String, transacted: bool },
    RemoveFile { path: String, transacted: bool },
    SetAttributes { path: String, attributes: u32, transacted: bool },
    DeleteReparsePoint { path: String },
}

impl Op {
    pub fn path(&self) -> &str {
        match self {
            Op::Query { path, .. }
            | Op::RemoveDirectory { path, .. }
            | Op::RemoveFile { path, .. }
            | Op::SetAttributes { path, .. }
            | Op::DeleteReparsePoint { path } => path,
        }
    }

    pub fn is_removal(&self) -> bool {
        matches!(self, Op::RemoveDirectory { .. } | Op::RemoveFile { .. })
    }

    pub fn transacted(&self) -> Option<bool> {
        match self {
            Op::Query { transacted, .. }
            | Op::RemoveDirectory { transacted, .. }
            | Op::RemoveFile { transacted, .. }
            | Op::SetAttributes { transacted, .. } => Some(*transacted),
            Op::DeleteReparsePoint { .. } => None,
        }
    }
}

#[derive(Default)]
struct State {
    nodes: BTreeMap<String, RawMetadata>,
    removal_failures: HashMap<String, NativeStatus>,
    ops: Vec<Op>,
}

#[derive(Default)]
pub struct FakeFilesystem {
    state: Mutex<State>,
}

impl FakeFilesystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, path: &str, attributes: u32, reparse_tag: u32) {
        let metadata = RawMetadata {
            attributes,
            reparse_tag,
            created: FIXED_FILETIME,
            accessed: FIXED_FILETIME,
            modified: FIXED_FILETIME,
        };
        self.state
            .lock()
            .unwrap()
            .nodes
            .insert(path.to_string(), metadata);
    }

    pub fn add_dir(&self, path: &str) {
        self.insert(path, ATTRIBUTE_DIRECTORY, 0);
    }

    pub fn add_file(&self, path: &str) {
        self.insert(path, 0x80, 0); // FILE_ATTRIBUTE_NORMAL
    }

    pub fn add_readonly_file(&self, path: &str) {
        self.insert(path, 0x80 | ATTRIBUTE_READONLY, 0);
    }

    pub fn add_readonly_dir(&self, path: &str) {
        self.insert(path, ATTRIBUTE_DIRECTORY | ATTRIBUTE_READONLY, 0);
    }

    pub fn add_symlink_dir(&self, path: &str) {
        self.insert(
            path,
            ATTRIBUTE_DIRECTORY | ATTRIBUTE_REPARSE_POINT,
            REPARSE_TAG_SYMLINK,
        );
    }

    pub fn add_junction(&self, path: &str) {
        self.insert(
            path,
            ATTRIBUTE_DIRECTORY | ATTRIBUTE_REPARSE_POINT,
            REPARSE_TAG_MOUNT_POINT,
        );
    }

    /// Every removal attempt on `path` fails with `status` until cleared.
    pub fn fail_removal_with(&self, path: &str, status: NativeStatus) {
        self.state
            .lock()
            .unwrap()
            .removal_failures
            .insert(path.to_string(), status);
    }

    pub fn contains(&self, path: &str) -> bool {
        self.state.lock().unwrap().nodes.contains_key(path)
    }

    pub fn node_count(&self) -> usize {
        self.state.lock().unwrap().nodes.len()
    }

    pub fn ops(&self) -> Vec<Op> {
        self.state.lock().unwrap().ops.clone()
    }

    pub fn canonical(path: &str) -> CanonicalPath {
        normalize(path, PathFormatOptions::trusted()).unwrap()
    }

    fn direct_children(nodes: &BTreeMap<String, RawMetadata>, parent: &str) -> Vec<String> {
        let prefix = format!("{}\\", parent);
        nodes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter(|(key, _)| !key[prefix.len()..].contains('\\'))
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn has_children(nodes: &BTreeMap<String, RawMetadata>, parent: &str) -> bool {
        let prefix = format!("{}\\", parent);
        nodes
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(key, _)| key.starts_with(&prefix))
    }

    fn collect_depth_first(
        nodes: &BTreeMap<String, RawMetadata>,
        parent: &str,
        recursive: bool,
        out: &mut Vec<(String, RawMetadata)>,
    ) {
        for child in Self::direct_children(nodes, parent) {
            let metadata = nodes[&child];
            out.push((child.clone(), metadata));
            // Never walk through a reparse point.
            if recursive && metadata.is_directory() && !metadata.is_reparse_point() {
                Self::collect_depth_first(nodes, &child, recursive, out);
            }
        }
    }
}

impl NativeFilesystem for FakeFilesystem {
    fn query_metadata(
        &self,
        path: &CanonicalPath,
        tx: Option<&TransactionHandle>,
    ) -> Result<Option<RawMetadata>, NativeStatus> {
        let mut state = self.state.lock().unwrap();
        state.ops.push(Op::Query {
            path: path.as_str().to_string(),
            transacted: tx.is_some(),
        });
        Ok(state.nodes.get(path.as_str()).copied())
    }

    fn remove_directory(
        &self,
        path: &CanonicalPath,
        tx: Option<&TransactionHandle>,
    ) -> Result<(), NativeStatus> {
        let mut state = self.state.lock().unwrap();
        state.ops.push(Op::RemoveDirectory {
            path: path.as_str().to_string(),
            transacted: tx.is_some(),
        });

        if let Some(status) = state.removal_failures.get(path.as_str()) {
            return Err(*status);
        }

        let key = path.as_str().to_string();
        let metadata = match state.nodes.get(&key) {
            Some(m) => *m,
            None => return Err(NativeStatus::PATH_NOT_FOUND),
        };
        if !metadata.is_directory() {
            return Err(NativeStatus::NOT_A_DIRECTORY);
        }
        if metadata.is_read_only() {
            return Err(NativeStatus::ACCESS_DENIED);
        }
        if Self::has_children(&state.nodes, &key) {
            return Err(NativeStatus::DIR_NOT_EMPTY);
        }
        state.nodes.remove(&key);
        Ok(())
    }

    fn remove_file(
        &self,
        path: &CanonicalPath,
        tx: Option<&TransactionHandle>,
    ) -> Result<(), NativeStatus> {
        let mut state = self.state.lock().unwrap();
        state.ops.push(Op::RemoveFile {
            path: path.as_str().to_string(),
            transacted: tx.is_some(),
        });

        if let Some(status) = state.removal_failures.get(path.as_str()) {
            return Err(*status);
        }

        let key = path.as_str().to_string();
        let metadata = match state.nodes.get(&key) {
            Some(m) => *m,
            None => return Err(NativeStatus::FILE_NOT_FOUND),
        };
        if metadata.is_directory() {
            return Err(NativeStatus::ACCESS_DENIED);
        }
        if metadata.is_read_only() {
            return Err(NativeStatus::ACCESS_DENIED);
        }
        state.nodes.remove(&key);
        Ok(())
    }

    fn set_attributes(
        &self,
        path: &CanonicalPath,
        attributes: u32,
        tx: Option<&TransactionHandle>,
    ) -> Result<(), NativeStatus> {
        let mut state = self.state.lock().unwrap();
        state.ops.push(Op::SetAttributes {
            path: path.as_str().to_string(),
            attributes,
            transacted: tx.is_some(),
        });

        match state.nodes.get_mut(path.as_str()) {
            Some(metadata) => {
                // The directory and reparse bits are not settable this way.
                let sticky =
                    metadata.attributes & (ATTRIBUTE_DIRECTORY | ATTRIBUTE_REPARSE_POINT);
                metadata.attributes = attributes | sticky;
                Ok(())
            }
            None => Err(NativeStatus::FILE_NOT_FOUND),
        }
    }

    fn delete_reparse_point(&self, path: &CanonicalPath) -> Result<(), NativeStatus> {
        let mut state = self.state.lock().unwrap();
        state.ops.push(Op::DeleteReparsePoint {
            path: path.as_str().to_string(),
        });

        let key = path.as_str().to_string();
        let metadata = match state.nodes.get(&key) {
            Some(m) => *m,
            None => return Err(NativeStatus::FILE_NOT_FOUND),
        };
        if !metadata.is_reparse_point() {
            return Err(NOT_A_REPARSE_POINT);
        }

        // Severing the link leaves an ordinary empty directory behind; the
        // content that was visible through it is no longer reachable here.
        let prefix = format!("{}\\", key);
        let orphaned: Vec<String> = state
            .nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, _)| k.clone())
            .collect();
        for orphan in orphaned {
            state.nodes.remove(&orphan);
        }

        let node = state.nodes.get_mut(&key).unwrap();
        node.attributes &= !ATTRIBUTE_REPARSE_POINT;
        node.reparse_tag = 0;
        Ok(())
    }

    fn enumerate<'a>(
        &'a self,
        path: &CanonicalPath,
        filter: &str,
        recursive: bool,
        _tx: Option<&'a TransactionHandle>,
    ) -> Result<impl Iterator<Item = Result<RawEntry, NativeStatus>> + 'a, NativeStatus> {
        assert_eq!(filter, "*", "the fake only models the match-all filter");

        let state = self.state.lock().unwrap();
        if !state.nodes.contains_key(path.as_str()) {
            return Err(NativeStatus::PATH_NOT_FOUND);
        }

        let mut flat = Vec::new();
        Self::collect_depth_first(&state.nodes, path.as_str(), recursive, &mut flat);

        Ok(flat.into_iter().map(|(key, metadata)| {
            Ok(RawEntry {
                path: Self::canonical(&key),
                metadata,
            })
        }))
    }
}
