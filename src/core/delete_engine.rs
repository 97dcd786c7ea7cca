use crate::core::classifier::{EntryClassifier, EntryInfo};
use crate::error::{NativeStatus, PathError, Result, translate};
use crate::path::CanonicalPath;
use crate::path::constants::MATCH_ALL;
use crate::platform::traits::{ATTRIBUTE_READONLY, NativeFilesystem, TransactionHandle};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Caller-facing switches for a deletion pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeleteOptions {
    /// Descend into real subdirectories. Reparse points are never descended
    /// into regardless of this flag.
    pub recursive: bool,

    /// Clear the read-only attribute and retry once instead of failing.
    pub ignore_read_only: bool,

    /// Treat an already-absent target as success.
    pub continue_on_not_found: bool,
}

#[derive(Debug, Clone, Copy)]
enum ObjectKind {
    File,
    Directory,
}

/// Recursive deletion state machine: resolve the root, plan the subtree in
/// one top-down depth-first pass, unwind the planned directories bottom-up,
/// then remove the root itself.
///
/// Holds no state between calls; the plan stack is call-local. Callers may
/// run disjoint subtrees concurrently on separate threads.
pub struct DeletionEngine<'a, F> {
    fs: &'a F,
    classifier: EntryClassifier<'a, F>,
}

impl<'a, F: NativeFilesystem> DeletionEngine<'a, F> {
    pub fn new(fs: &'a F) -> Self {
        Self {
            fs,
            classifier: EntryClassifier::new(fs),
        }
    }

    /// Delete the tree rooted at `root`.
    ///
    /// When a transaction handle is supplied every query and removal in
    /// this pass runs through its transacted variant; the handle itself
    /// stays owned by the caller.
    pub fn delete_tree(
        &self,
        root: &CanonicalPath,
        options: &DeleteOptions,
        tx: Option<&TransactionHandle>,
    ) -> Result<()> {
        let entry = match self.classifier.classify(root, tx)? {
            Some(entry) => entry,
            None => {
                if options.continue_on_not_found {
                    debug!(path = %root, "delete target already absent");
                    return Ok(());
                }
                return Err(PathError::NotFound {
                    path: root.as_str().to_string(),
                });
            }
        };
        self.delete_tree_entry(&entry, options, tx)
    }

    /// Delete starting from an already-classified entry. The snapshot must
    /// be fresh; it goes stale the moment the object changes.
    pub fn delete_tree_entry(
        &self,
        entry: &EntryInfo,
        options: &DeleteOptions,
        tx: Option<&TransactionHandle>,
    ) -> Result<()> {
        if !entry.is_directory {
            return Err(PathError::NotADirectory {
                path: entry.path.as_str().to_string(),
            });
        }

        // Links are removed as single objects; `recursive` only controls
        // descending into real subdirectories.
        if entry.is_reparse_point {
            if entry.is_mount_point {
                self.unmount(&entry.path)?;
            }
            return self.remove_single(&entry.path, ObjectKind::Directory, options, tx);
        }

        if options.recursive {
            self.remove_children(&entry.path, options, tx)?;
        }

        self.remove_single(&entry.path, ObjectKind::Directory, options, tx)
    }

    /// One top-down depth-first pass: files go immediately, mount points
    /// are severed in place, directories are pushed onto a stack that is
    /// then popped for strict bottom-up removal.
    fn remove_children(
        &self,
        root: &CanonicalPath,
        options: &DeleteOptions,
        tx: Option<&TransactionHandle>,
    ) -> Result<()> {
        let mut pending: Vec<CanonicalPath> = Vec::new();
        let mut files = 0u64;

        let entries = self
            .fs
            .enumerate(root, MATCH_ALL, true, tx)
            .map_err(|status| translate(status, root.as_str()))?;

        for item in entries {
            let item = item.map_err(|status| translate(status, root.as_str()))?;
            if item.metadata.is_directory() {
                if item.metadata.is_mount_point() {
                    self.unmount(&item.path)?;
                }
                pending.push(item.path);
            } else {
                self.remove_single(&item.path, ObjectKind::File, options, tx)?;
                files += 1;
            }
        }

        debug!(
            path = %root,
            files,
            directories = pending.len(),
            "planned subtree removal"
        );

        while let Some(dir) = pending.pop() {
            self.remove_single(&dir, ObjectKind::Directory, options, tx)?;
        }

        Ok(())
    }

    /// Sever a mount link in place. The detached directory is removed later
    /// like any other, without ever walking what was mounted there.
    fn unmount(&self, path: &CanonicalPath) -> Result<()> {
        debug!(path = %path, "severing mount link");
        self.fs
            .delete_reparse_point(path)
            .map_err(|status| translate(status, path.as_str()))
    }

    /// Remove one object, with the single bounded retry for the
    /// read-only/access-denied combination.
    fn remove_single(
        &self,
        path: &CanonicalPath,
        kind: ObjectKind,
        options: &DeleteOptions,
        tx: Option<&TransactionHandle>,
    ) -> Result<()> {
        let mut cleared_read_only = false;

        loop {
            let attempt = match kind {
                ObjectKind::Directory => self.fs.remove_directory(path, tx),
                ObjectKind::File => self.fs.remove_file(path, tx),
            };
            let status = match attempt {
                Ok(()) => {
                    trace!(path = %path, "removed");
                    return Ok(());
                }
                Err(status) => status,
            };

            match status {
                // Something appeared under this directory after planning;
                // not retriable.
                NativeStatus::DIR_NOT_EMPTY => {
                    return Err(PathError::DirectoryNotEmpty {
                        path: path.as_str().to_string(),
                    });
                }

                NativeStatus::NOT_A_DIRECTORY => {
                    // Re-query to confirm before reporting a type mismatch.
                    return match self.classifier.classify(path, tx)? {
                        Some(entry) if !entry.is_directory => Err(PathError::NotADirectory {
                            path: path.as_str().to_string(),
                        }),
                        _ => Err(translate(status, path.as_str())),
                    };
                }

                status if status.is_not_found() => {
                    if options.continue_on_not_found {
                        trace!(path = %path, "already absent, continuing");
                        return Ok(());
                    }
                    return Err(PathError::NotFound {
                        path: path.as_str().to_string(),
                    });
                }

                // Another process holds the object open; retrying blindly
                // is not safe.
                NativeStatus::SHARING_VIOLATION => {
                    return Err(PathError::Busy {
                        path: path.as_str().to_string(),
                    });
                }

                NativeStatus::ACCESS_DENIED => {
                    let entry = match self.classifier.classify(path, tx)? {
                        Some(entry) => entry,
                        None => return Err(translate(status, path.as_str())),
                    };

                    if entry.attributes & ATTRIBUTE_READONLY == 0 {
                        return Err(PathError::Unauthorized {
                            path: path.as_str().to_string(),
                        });
                    }
                    if !options.ignore_read_only {
                        return Err(PathError::ReadOnly {
                            path: path.as_str().to_string(),
                        });
                    }
                    if cleared_read_only {
                        // The one permitted retry already happened.
                        return Err(PathError::Unauthorized {
                            path: path.as_str().to_string(),
                        });
                    }

                    debug!(path = %path, "clearing read-only attribute and retrying once");
                    self.fs
                        .set_attributes(path, entry.attributes & !ATTRIBUTE_READONLY, tx)
                        .map_err(|status| translate(status, path.as_str()))?;
                    cleared_read_only = true;
                }

                other => return Err(translate(other, path.as_str())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::fake::{FakeFilesystem, Op};

    fn canonical(path: &str) -> CanonicalPath {
        FakeFilesystem::canonical(path)
    }

    fn recursive() -> DeleteOptions {
        DeleteOptions {
            recursive: true,
            ..DeleteOptions::default()
        }
    }

    fn removal_index(ops: &[Op], path: &str) -> usize {
        ops.iter()
            .position(|op| op.is_removal() && op.path() == path)
            .unwrap_or_else(|| panic!("no removal recorded for {}", path))
    }

    #[test]
    fn test_recursive_delete_is_bottom_up() {
        let fs = FakeFilesystem::new();
        fs.add_dir(r"\\?\C:\root");
        fs.add_dir(r"\\?\C:\root\a");
        fs.add_file(r"\\?\C:\root\a\x");
        fs.add_dir(r"\\?\C:\root\b");

        let engine = DeletionEngine::new(&fs);
        engine
            .delete_tree(&canonical(r"\\?\C:\root"), &recursive(), None)
            .unwrap();

        assert_eq!(fs.node_count(), 0);

        let ops = fs.ops();
        let x = removal_index(&ops, r"\\?\C:\root\a\x");
        let a = removal_index(&ops, r"\\?\C:\root\a");
        let b = removal_index(&ops, r"\\?\C:\root\b");
        let root = removal_index(&ops, r"\\?\C:\root");
        assert!(x < a, "child must be removed before its directory");
        assert!(a < root && b < root, "subdirectories before the root");
    }

    #[test]
    fn test_deep_chain_unwinds_in_reverse_discovery_order() {
        let fs = FakeFilesystem::new();
        fs.add_dir(r"\\?\C:\r");
        fs.add_dir(r"\\?\C:\r\a");
        fs.add_dir(r"\\?\C:\r\a\b");
        fs.add_dir(r"\\?\C:\r\a\b\c");

        let engine = DeletionEngine::new(&fs);
        engine
            .delete_tree(&canonical(r"\\?\C:\r"), &recursive(), None)
            .unwrap();

        let ops = fs.ops();
        let c = removal_index(&ops, r"\\?\C:\r\a\b\c");
        let b = removal_index(&ops, r"\\?\C:\r\a\b");
        let a = removal_index(&ops, r"\\?\C:\r\a");
        let r = removal_index(&ops, r"\\?\C:\r");
        assert!(c < b && b < a && a < r);
        assert_eq!(fs.node_count(), 0);
    }

    #[test]
    fn test_non_recursive_delete_requires_an_empty_directory() {
        let fs = FakeFilesystem::new();
        fs.add_dir(r"\\?\C:\empty");

        let engine = DeletionEngine::new(&fs);
        engine
            .delete_tree(&canonical(r"\\?\C:\empty"), &DeleteOptions::default(), None)
            .unwrap();
        assert!(!fs.contains(r"\\?\C:\empty"));

        fs.add_dir(r"\\?\C:\full");
        fs.add_file(r"\\?\C:\full\f");
        let result = engine.delete_tree(&canonical(r"\\?\C:\full"), &DeleteOptions::default(), None);
        assert!(matches!(result, Err(PathError::DirectoryNotEmpty { .. })));
    }

    #[test]
    fn test_mount_point_is_severed_not_walked() {
        let fs = FakeFilesystem::new();
        fs.add_dir(r"\\?\C:\root");
        fs.add_junction(r"\\?\C:\root\mnt");
        fs.add_file(r"\\?\C:\root\mnt\through\data.bin");
        fs.add_file(r"\\?\C:\root\plain.txt");

        let engine = DeletionEngine::new(&fs);
        engine
            .delete_tree(&canonical(r"\\?\C:\root"), &recursive(), None)
            .unwrap();

        let ops = fs.ops();

        // Nothing visible through the mount is ever removed directly.
        assert!(
            !ops.iter()
                .any(|op| op.is_removal() && op.path().starts_with(r"\\?\C:\root\mnt\")),
            "removal issued through the mount boundary: {:?}",
            ops
        );

        // Sever first, then remove the detached directory object.
        let sever = ops
            .iter()
            .position(|op| matches!(op, Op::DeleteReparsePoint { path } if path == r"\\?\C:\root\mnt"))
            .expect("mount link was not severed");
        let removed = removal_index(&ops, r"\\?\C:\root\mnt");
        assert!(sever < removed);

        assert_eq!(fs.node_count(), 0);
    }

    #[test]
    fn test_root_mount_point_is_unmounted_then_removed_without_descent() {
        let fs = FakeFilesystem::new();
        fs.add_junction(r"\\?\C:\mnt");
        fs.add_file(r"\\?\C:\mnt\inside.txt");

        let engine = DeletionEngine::new(&fs);
        engine
            .delete_tree(&canonical(r"\\?\C:\mnt"), &recursive(), None)
            .unwrap();

        let ops = fs.ops();
        assert!(
            ops.iter()
                .all(|op| !op.is_removal() || op.path() == r"\\?\C:\mnt"),
            "only the mount point itself may be removed: {:?}",
            ops
        );
        assert!(!fs.contains(r"\\?\C:\mnt"));
    }

    #[test]
    fn test_symlink_root_is_removed_as_a_single_object() {
        let fs = FakeFilesystem::new();
        fs.add_symlink_dir(r"\\?\C:\link");

        let engine = DeletionEngine::new(&fs);
        engine
            .delete_tree(&canonical(r"\\?\C:\link"), &recursive(), None)
            .unwrap();

        let ops = fs.ops();
        assert!(
            !ops.iter()
                .any(|op| matches!(op, Op::DeleteReparsePoint { .. })),
            "plain symlinks are not unmounted"
        );
        assert_eq!(ops.iter().filter(|op| op.is_removal()).count(), 1);
    }

    #[test]
    fn test_read_only_retry_is_bounded_to_one_clear_and_one_retry() {
        let fs = FakeFilesystem::new();
        fs.add_dir(r"\\?\C:\root");
        fs.add_readonly_file(r"\\?\C:\root\locked.txt");

        let options = DeleteOptions {
            recursive: true,
            ignore_read_only: true,
            ..DeleteOptions::default()
        };

        let engine = DeletionEngine::new(&fs);
        engine
            .delete_tree(&canonical(r"\\?\C:\root"), &options, None)
            .unwrap();

        let ops = fs.ops();
        let clears = ops
            .iter()
            .filter(|op| matches!(op, Op::SetAttributes { path, .. } if path == r"\\?\C:\root\locked.txt"))
            .count();
        let attempts = ops
            .iter()
            .filter(|op| matches!(op, Op::RemoveFile { path, .. } if path == r"\\?\C:\root\locked.txt"))
            .count();
        assert_eq!(clears, 1);
        assert_eq!(attempts, 2);
        assert_eq!(fs.node_count(), 0);
    }

    #[test]
    fn test_read_only_without_override_fails_with_zero_clears() {
        let fs = FakeFilesystem::new();
        fs.add_dir(r"\\?\C:\root");
        fs.add_readonly_file(r"\\?\C:\root\locked.txt");

        let engine = DeletionEngine::new(&fs);
        let result = engine.delete_tree(&canonical(r"\\?\C:\root"), &recursive(), None);
        assert!(matches!(result, Err(PathError::ReadOnly { .. })));

        let clears = fs
            .ops()
            .iter()
            .filter(|op| matches!(op, Op::SetAttributes { .. }))
            .count();
        assert_eq!(clears, 0);
        assert!(fs.contains(r"\\?\C:\root\locked.txt"));
    }

    #[test]
    fn test_read_only_directory_gets_the_same_treatment() {
        let fs = FakeFilesystem::new();
        fs.add_dir(r"\\?\C:\root");
        fs.add_readonly_dir(r"\\?\C:\root\stubborn");

        let options = DeleteOptions {
            recursive: true,
            ignore_read_only: true,
            ..DeleteOptions::default()
        };

        let engine = DeletionEngine::new(&fs);
        engine
            .delete_tree(&canonical(r"\\?\C:\root"), &options, None)
            .unwrap();
        assert_eq!(fs.node_count(), 0);
    }

    #[test]
    fn test_sharing_violation_surfaces_immediately_without_retry() {
        let fs = FakeFilesystem::new();
        fs.add_dir(r"\\?\C:\root");
        fs.add_file(r"\\?\C:\root\open.log");
        fs.fail_removal_with(r"\\?\C:\root\open.log", NativeStatus::SHARING_VIOLATION);

        let engine = DeletionEngine::new(&fs);
        let result = engine.delete_tree(&canonical(r"\\?\C:\root"), &recursive(), None);
        assert!(matches!(result, Err(PathError::Busy { .. })));

        let attempts = fs
            .ops()
            .iter()
            .filter(|op| matches!(op, Op::RemoveFile { path, .. } if path == r"\\?\C:\root\open.log"))
            .count();
        assert_eq!(attempts, 1, "sharing violations are never retried");
    }

    #[test]
    fn test_access_denied_without_read_only_is_unauthorized() {
        let fs = FakeFilesystem::new();
        fs.add_dir(r"\\?\C:\root");
        fs.add_file(r"\\?\C:\root\protected");
        fs.fail_removal_with(r"\\?\C:\root\protected", NativeStatus::ACCESS_DENIED);

        let options = DeleteOptions {
            recursive: true,
            ignore_read_only: true,
            ..DeleteOptions::default()
        };

        let engine = DeletionEngine::new(&fs);
        let result = engine.delete_tree(&canonical(r"\\?\C:\root"), &options, None);
        assert!(matches!(result, Err(PathError::Unauthorized { .. })));
    }

    #[test]
    fn test_not_found_with_continue_is_success_with_no_removals() {
        let fs = FakeFilesystem::new();
        let options = DeleteOptions {
            continue_on_not_found: true,
            ..DeleteOptions::default()
        };

        let engine = DeletionEngine::new(&fs);
        engine
            .delete_tree(&canonical(r"\\?\C:\gone"), &options, None)
            .unwrap();

        let ops = fs.ops();
        assert!(ops.iter().all(|op| matches!(op, Op::Query { .. })));
    }

    #[test]
    fn test_not_found_without_continue_is_an_error() {
        let fs = FakeFilesystem::new();
        let engine = DeletionEngine::new(&fs);
        let result = engine.delete_tree(&canonical(r"\\?\C:\gone"), &recursive(), None);
        assert!(matches!(result, Err(PathError::NotFound { .. })));
    }

    #[test]
    fn test_file_root_is_not_a_directory() {
        let fs = FakeFilesystem::new();
        fs.add_file(r"\\?\C:\just-a-file");

        let engine = DeletionEngine::new(&fs);
        let result = engine.delete_tree(&canonical(r"\\?\C:\just-a-file"), &recursive(), None);
        assert!(matches!(result, Err(PathError::NotADirectory { .. })));
    }

    #[test]
    fn test_late_directory_not_empty_surfaces_as_planning_violation() {
        let fs = FakeFilesystem::new();
        fs.add_dir(r"\\?\C:\root");
        fs.add_dir(r"\\?\C:\root\sub");
        fs.fail_removal_with(r"\\?\C:\root\sub", NativeStatus::DIR_NOT_EMPTY);

        let engine = DeletionEngine::new(&fs);
        let result = engine.delete_tree(&canonical(r"\\?\C:\root"), &recursive(), None);
        assert!(matches!(result, Err(PathError::DirectoryNotEmpty { .. })));
    }

    #[test]
    fn test_transacted_pass_routes_every_call_through_the_transaction() {
        let fs = FakeFilesystem::new();
        fs.add_dir(r"\\?\C:\root");
        fs.add_dir(r"\\?\C:\root\a");
        fs.add_file(r"\\?\C:\root\a\x");

        let tx = TransactionHandle::from_raw(42);
        let engine = DeletionEngine::new(&fs);
        engine
            .delete_tree(&canonical(r"\\?\C:\root"), &recursive(), Some(&tx))
            .unwrap();

        let ops = fs.ops();
        assert!(!ops.is_empty());
        assert!(
            ops.iter()
                .all(|op| op.transacted().unwrap_or(true)),
            "a transacted pass must not mix in plain calls: {:?}",
            ops
        );
    }

    #[test]
    fn test_untransacted_pass_never_touches_a_transaction() {
        let fs = FakeFilesystem::new();
        fs.add_dir(r"\\?\C:\root");
        fs.add_file(r"\\?\C:\root\x");

        let engine = DeletionEngine::new(&fs);
        engine
            .delete_tree(&canonical(r"\\?\C:\root"), &recursive(), None)
            .unwrap();

        assert!(
            fs.ops()
                .iter()
                .all(|op| !op.transacted().unwrap_or(false))
        );
    }

    #[test]
    fn test_delete_options_deserialize_with_defaults() {
        let options: DeleteOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, DeleteOptions::default());

        let options: DeleteOptions =
            serde_json::from_str(r#"{"recursive": true, "ignore_read_only": true}"#).unwrap();
        assert!(options.recursive);
        assert!(options.ignore_read_only);
        assert!(!options.continue_on_not_found);
    }
}
