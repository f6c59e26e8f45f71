//! Cache-invalidation seam. Mutations report which logical page path they
//! made stale; a deployment that fronts the API with a caching renderer maps
//! this onto its purge API, everything else runs the no-op provider.

use std::fmt::Debug;
use tracing::debug;

pub trait PathCache: Send + Sync + Debug {
    /// Marks any cached rendering of `path` as stale. Fire and forget;
    /// failures to purge must not fail the mutation that triggered them.
    fn invalidate(&self, path: &str);
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct NoopPathCache;

impl PathCache for NoopPathCache {
    fn invalidate(&self, path: &str) {
        debug!(%path, "No cache provider configured, invalidation dropped");
    }
}
