//! The resolution engine: completion channel, error taxonomy, credential
//! cache, directory walker, and the dispatch/fallback router.

pub mod channel;
pub mod credentials;
pub mod error;
pub mod router;
pub mod walker;

pub use channel::{Resolved, ResolvedLink, ResolutionCell, ResolutionFuture, resolution_channel};
pub use credentials::{CredentialCache, CredentialEntry};
pub use error::ResolveError;
pub use router::{Router, build_default_router};
pub use walker::{DirectoryWalker, FolderPage, FolderRef, FolderSource};
