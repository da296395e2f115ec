//! Generic directory recursion: fan-out over subfolders, fail-fast join,
//! flattened file list.
//!
//! Adapters that support directories implement [`FolderSource`] for their
//! own paginated listing call; the walker owns the traversal policy. Sibling
//! subfolders at one level are fetched concurrently and joined fail-fast:
//! the first failure cancels the remaining branches and propagates, partial
//! results are discarded.

use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, try_join_all};
use tracing::debug;

use super::error::ResolveError;
use crate::model::FileDescriptor;

/// Default recursion ceiling. Real share trees are shallow; anything deeper
/// is either pathological or a listing loop on the provider side.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// One page-merged folder listing: the folder's direct files plus
/// references to its subfolders.
#[derive(Debug, Default)]
pub struct FolderPage {
    pub files: Vec<FileDescriptor>,
    pub folders: Vec<FolderRef>,
}

/// A subfolder to recurse into.
#[derive(Debug, Clone)]
pub struct FolderRef {
    pub folder_id: String,
    pub folder_name: String,
}

/// Adapter-supplied listing call for one folder (all pages merged).
#[async_trait]
pub trait FolderSource: Sync {
    async fn fetch_folder(&self, folder_id: &str) -> Result<FolderPage, ResolveError>;

    /// Context prefix for depth-ceiling errors.
    fn context(&self) -> String {
        "directory".to_string()
    }
}

/// Recursive traversal engine turning a nested folder tree into a flat
/// file list. Folders contribute no descriptors of their own.
#[derive(Debug, Clone, Copy)]
pub struct DirectoryWalker {
    max_depth: usize,
}

impl Default for DirectoryWalker {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl DirectoryWalker {
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Collects every file under `root_folder_id`, depth-first declaration,
    /// breadth-concurrent execution.
    ///
    /// # Errors
    ///
    /// Propagates the first listing failure, or `DirectoryTooDeep` when the
    /// tree exceeds the configured ceiling.
    pub async fn collect<S: FolderSource>(
        &self,
        source: &S,
        root_folder_id: &str,
    ) -> Result<Vec<FileDescriptor>, ResolveError> {
        self.walk(source, root_folder_id.to_string(), 0).await
    }

    fn walk<'a, S: FolderSource>(
        &'a self,
        source: &'a S,
        folder_id: String,
        depth: usize,
    ) -> BoxFuture<'a, Result<Vec<FileDescriptor>, ResolveError>> {
        async move {
            if depth >= self.max_depth {
                return Err(ResolveError::DirectoryTooDeep {
                    context: source.context(),
                    max_depth: self.max_depth,
                });
            }
            let FolderPage { mut files, folders } = source.fetch_folder(&folder_id).await?;
            if !folders.is_empty() {
                debug!(
                    folder_id,
                    depth,
                    subfolders = folders.len(),
                    "recursing into subfolders"
                );
                let branches = folders
                    .into_iter()
                    .map(|sub| self.walk(source, sub.folder_id, depth + 1));
                for branch in try_join_all(branches).await? {
                    files.extend(branch);
                }
            }
            Ok(files)
        }
        .boxed()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// In-memory tree: folder id -> (file names, subfolder ids).
    struct TreeSource {
        tree: HashMap<&'static str, (Vec<&'static str>, Vec<&'static str>)>,
        fetches: AtomicUsize,
    }

    impl TreeSource {
        fn new(
            entries: &[(&'static str, (Vec<&'static str>, Vec<&'static str>))],
        ) -> Self {
            Self {
                tree: entries.iter().cloned().collect(),
                fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl FolderSource for TreeSource {
        async fn fetch_folder(&self, folder_id: &str) -> Result<FolderPage, ResolveError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let (files, folders) = self
                .tree
                .get(folder_id)
                .ok_or_else(|| ResolveError::provider("test", format!("missing {folder_id}")))?;
            Ok(FolderPage {
                files: files
                    .iter()
                    .map(|name| FileDescriptor::file(*name, *name, 1))
                    .collect(),
                folders: folders
                    .iter()
                    .map(|id| FolderRef {
                        folder_id: (*id).to_string(),
                        folder_name: (*id).to_string(),
                    })
                    .collect(),
            })
        }
    }

    #[tokio::test]
    async fn test_two_level_tree_flattens_to_four_files() {
        // Root: 2 files + 2 subfolders, each subfolder 1 file.
        let source = TreeSource::new(&[
            ("root", (vec!["a", "b"], vec!["d1", "d2"])),
            ("d1", (vec!["c"], vec![])),
            ("d2", (vec!["d"], vec![])),
        ]);
        let files = DirectoryWalker::default()
            .collect(&source, "root")
            .await
            .unwrap();
        assert_eq!(files.len(), 4);
        let names: Vec<&str> = files.iter().map(|f| f.file_name.as_str()).collect();
        assert!(["a", "b", "c", "d"].iter().all(|n| names.contains(n)));
        // Folders contribute no descriptors directly.
        assert!(files.iter().all(|f| !f.is_folder()));
    }

    #[tokio::test]
    async fn test_failure_in_subfolder_propagates() {
        let source = TreeSource::new(&[("root", (vec!["a"], vec!["gone"]))]);
        let result = DirectoryWalker::default().collect(&source, "root").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_depth_ceiling_yields_directory_too_deep() {
        // Self-referential folder simulates unbounded nesting.
        let source = TreeSource::new(&[("loop", (vec![], vec!["loop"]))]);
        let result = DirectoryWalker::new(4).collect(&source, "loop").await;
        assert!(matches!(
            result,
            Err(ResolveError::DirectoryTooDeep { max_depth: 4, .. })
        ));
        // The ceiling bounds fetch count as well.
        assert_eq!(source.fetches.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_empty_folder_yields_empty_list() {
        let source = TreeSource::new(&[("root", (vec![], vec![]))]);
        let files = DirectoryWalker::default()
            .collect(&source, "root")
            .await
            .unwrap();
        assert!(files.is_empty());
    }
}
