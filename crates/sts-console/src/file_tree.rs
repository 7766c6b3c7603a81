//! Lazily loaded, memoized directory tree of a server's file system.
//!
//! [`FileTreeCache`] fetches one directory at a time through a
//! [`DirectorySource`]. Successful listings are memoized by path, concurrent
//! requests for the same path share a single fetch, and failures are never
//! cached. [`FileTreeBrowser`] layers expansion and cursor state on top for
//! the files view.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};

use futures::FutureExt;
use futures::future::WeakShared;
use parking_lot::Mutex;
use sts_client::{ApiClient, ClientError, FileTreeEntry, FileTreeListing, ServerType};
use tracing::debug;

/// Future returned by [`DirectorySource::list`].
pub type ListingFuture = Pin<Box<dyn Future<Output = Result<FileTreeListing, ClientError>> + Send>>;

/// Future returned by the cache operations.
pub type Fetch = Pin<Box<dyn Future<Output = Result<Arc<FileTreeListing>, ClientError>> + Send>>;

/// Joinable handle to a deduplicated fetch. Holding it does not keep the
/// fetch alive; the fetch is dropped with its last awaiting caller.
struct InFlight {
    ticket: u64,
    fetch: WeakShared<Fetch>,
}

/// Where directory listings come from.
pub trait DirectorySource: Send + Sync {
    /// List one directory. `None` is the root.
    fn list(&self, path: Option<String>) -> ListingFuture;
}

/// Directory source backed by the file-tree endpoint of one server.
#[derive(Debug, Clone)]
pub struct RemoteDirectory {
    client: ApiClient,
    server_type: ServerType,
    server_id: String,
}

impl RemoteDirectory {
    /// Source for the server `server_id` of kind `server_type`.
    pub fn new(client: ApiClient, server_type: ServerType, server_id: impl Into<String>) -> Self {
        Self {
            client,
            server_type,
            server_id: server_id.into(),
        }
    }
}

impl DirectorySource for RemoteDirectory {
    fn list(&self, path: Option<String>) -> ListingFuture {
        let client = self.client.clone();
        let server_type = self.server_type;
        let server_id = self.server_id.clone();
        Box::pin(async move { client.file_tree(server_type, &server_id, path.as_deref()).await })
    }
}

#[derive(Default)]
struct CacheState {
    listings: HashMap<String, Arc<FileTreeListing>>,
    in_flight: HashMap<String, InFlight>,
    next_ticket: u64,
    /// Outstanding fetches per path (a refresh can overlap a regular load).
    loading: HashMap<String, usize>,
}

/// Memoizing, request-deduplicating directory cache.
///
/// The lock is never held across an await point.
#[derive(Clone)]
pub struct FileTreeCache {
    source: Arc<dyn DirectorySource>,
    state: Arc<Mutex<CacheState>>,
}

impl std::fmt::Debug for FileTreeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FileTreeCache")
            .field("cached", &state.listings.len())
            .field("in_flight", &state.in_flight.len())
            .finish_non_exhaustive()
    }
}

fn cache_key(path: Option<&str>) -> String {
    path.unwrap_or_default().to_string()
}

impl FileTreeCache {
    /// Empty cache over `source`.
    pub fn new(source: Arc<dyn DirectorySource>) -> Self {
        Self {
            source,
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    /// Children of `path` (`None` or `""` is the root).
    ///
    /// A memoized listing resolves immediately. Otherwise the path is marked
    /// loading before this returns, and callers that ask while a fetch is in
    /// flight all receive that fetch's outcome.
    pub fn get_children(&self, path: Option<&str>) -> Fetch {
        let key = cache_key(path);
        let mut state = self.state.lock();
        if let Some(hit) = state.listings.get(&key) {
            return futures::future::ready(Ok(Arc::clone(hit))).boxed();
        }
        if let Some(pending) = state.in_flight.get(&key).and_then(|f| f.fetch.upgrade()) {
            debug!(path = %key, "Joining in-flight directory fetch");
            return pending.boxed();
        }

        *state.loading.entry(key.clone()).or_default() += 1;
        state.next_ticket += 1;
        let ticket = state.next_ticket;
        let fetch = self.fetch(key.clone(), Some(ticket)).shared();
        if let Some(weak) = fetch.downgrade() {
            state.in_flight.insert(key, InFlight { ticket, fetch: weak });
        }
        fetch.boxed()
    }

    /// Fetch `path` again, bypassing memoization and deduplication. The result
    /// replaces any memoized listing; the last fetch to finish wins.
    pub fn refresh(&self, path: Option<&str>) -> Fetch {
        let key = cache_key(path);
        *self.state.lock().loading.entry(key.clone()).or_default() += 1;
        self.fetch(key, None)
    }

    /// Memoized listing, if any.
    pub fn get_cached(&self, path: Option<&str>) -> Option<Arc<FileTreeListing>> {
        self.state.lock().listings.get(&cache_key(path)).cloned()
    }

    /// Whether a fetch for `path` is outstanding.
    pub fn is_loading(&self, path: Option<&str>) -> bool {
        self.state.lock().loading.contains_key(&cache_key(path))
    }

    /// Paths with an outstanding fetch, sorted.
    pub fn loading_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.state.lock().loading.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Build the fetch future. The caller has already counted it as loading.
    fn fetch(&self, key: String, ticket: Option<u64>) -> Fetch {
        let source = Arc::clone(&self.source);
        let state = Arc::downgrade(&self.state);
        let guard = LoadingGuard {
            state: state.clone(),
            key: key.clone(),
            ticket,
        };

        async move {
            let _guard = guard;
            let path = (!key.is_empty()).then(|| key.clone());
            debug!(path = %key, "Fetching directory");
            let result = source.list(path).await.map(Arc::new);
            match (&result, state.upgrade()) {
                (Ok(listing), Some(state)) => {
                    state.lock().listings.insert(key, Arc::clone(listing));
                }
                (Err(e), _) => debug!(path = %key, error = %e, "Directory fetch failed"),
                (Ok(_), None) => {}
            }
            result
        }
        .boxed()
    }
}

/// Clears the loading mark when a fetch settles or is dropped.
struct LoadingGuard {
    state: Weak<Mutex<CacheState>>,
    key: String,
    ticket: Option<u64>,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        let mut state = state.lock();
        if let Some(count) = state.loading.get_mut(&self.key) {
            *count -= 1;
            if *count == 0 {
                state.loading.remove(&self.key);
            }
        }
        let ours = state
            .in_flight
            .get(&self.key)
            .is_some_and(|entry| Some(entry.ticket) == self.ticket);
        if ours {
            state.in_flight.remove(&self.key);
        }
    }
}

// ============================================================================
// Browser state
// ============================================================================

/// A visible row of the file tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserRow {
    /// A file or directory.
    Entry {
        /// Nesting depth, root entries at 0.
        depth: usize,
        /// The entry.
        entry: FileTreeEntry,
        /// Whether a directory's children are shown.
        expanded: bool,
    },
    /// A directory whose listing is still loading.
    Loading {
        /// Depth of the placeholder.
        depth: usize,
    },
    /// A directory with no entries (or whose listing failed).
    Empty {
        /// Depth of the placeholder.
        depth: usize,
    },
    /// The backend capped the listing above this row.
    Truncated {
        /// Depth of the marker.
        depth: usize,
    },
}

impl BrowserRow {
    /// Nesting depth of the row.
    pub const fn depth(&self) -> usize {
        match self {
            Self::Entry { depth, .. }
            | Self::Loading { depth }
            | Self::Empty { depth }
            | Self::Truncated { depth } => *depth,
        }
    }
}

/// Expansion and cursor state over a [`FileTreeCache`].
#[derive(Debug)]
pub struct FileTreeBrowser {
    cache: FileTreeCache,
    expanded: HashSet<String>,
    cursor: usize,
    base_url: Option<String>,
}

impl FileTreeBrowser {
    /// Browser with everything collapsed.
    pub fn new(cache: FileTreeCache) -> Self {
        Self {
            cache,
            expanded: HashSet::new(),
            cursor: 0,
            base_url: None,
        }
    }

    /// The underlying cache.
    pub const fn cache(&self) -> &FileTreeCache {
        &self.cache
    }

    /// Base URL under which files are served, if any.
    pub fn set_base_url(&mut self, base_url: Option<String>) {
        self.base_url = base_url;
    }

    /// Base URL under which files are served.
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Flattened visible rows.
    pub fn rows(&self) -> Vec<BrowserRow> {
        let mut rows = Vec::new();
        self.push_listing(None, 0, &mut rows);
        rows
    }

    fn push_listing(&self, path: Option<&str>, depth: usize, rows: &mut Vec<BrowserRow>) {
        let Some(listing) = self.cache.get_cached(path) else {
            if self.cache.is_loading(path) {
                rows.push(BrowserRow::Loading { depth });
            } else {
                rows.push(BrowserRow::Empty { depth });
            }
            return;
        };

        if listing.entries.is_empty() {
            rows.push(BrowserRow::Empty { depth });
        }
        for entry in &listing.entries {
            let expanded = entry.is_dir() && self.expanded.contains(&entry.path);
            rows.push(BrowserRow::Entry {
                depth,
                entry: entry.clone(),
                expanded,
            });
            if expanded {
                self.push_listing(Some(&entry.path), depth + 1, rows);
            }
        }
        if listing.truncated {
            rows.push(BrowserRow::Truncated { depth });
        }
    }

    /// Cursor position within [`Self::rows`].
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    /// Move the cursor up.
    pub fn select_prev(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    /// Move the cursor down.
    pub fn select_next(&mut self) {
        if self.cursor + 1 < self.rows().len() {
            self.cursor += 1;
        }
    }

    /// Entry under the cursor.
    pub fn selected_entry(&self) -> Option<FileTreeEntry> {
        match self.rows().into_iter().nth(self.cursor) {
            Some(BrowserRow::Entry { entry, .. }) => Some(entry),
            _ => None,
        }
    }

    /// Expand or collapse the directory under the cursor. Returns the path
    /// when it was expanded and still needs loading.
    pub fn toggle_selected(&mut self) -> Option<String> {
        let entry = self.selected_entry().filter(FileTreeEntry::is_dir)?;
        if self.expanded.remove(&entry.path) {
            let len = self.rows().len();
            self.cursor = self.cursor.min(len.saturating_sub(1));
            return None;
        }
        self.expanded.insert(entry.path.clone());
        let loaded = self.cache.get_cached(Some(&entry.path)).is_some();
        (!loaded && !self.cache.is_loading(Some(&entry.path))).then_some(entry.path)
    }

    /// Whether `path` is expanded.
    pub fn is_expanded(&self, path: &str) -> bool {
        self.expanded.contains(path)
    }

    /// URL under which a file is served.
    pub fn open_url(&self, entry: &FileTreeEntry) -> Option<String> {
        if entry.is_dir() {
            return None;
        }
        let base = self.base_url.as_deref()?.trim_end_matches('/');
        Some(format!("{base}/{}", entry.path.trim_start_matches('/')))
    }
}
