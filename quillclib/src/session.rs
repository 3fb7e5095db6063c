use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    path::PathBuf,
    rc::Rc,
};

use quill_syntax::ast::NodeId;

/// Hands out ids for synthetic names. Clones share one counter, so every
/// pass holding a copy draws from the same sequence.
#[derive(Clone)]
pub struct SharedIdProvider {
    next: Rc<Cell<usize>>,
}

impl SharedIdProvider {
    /// Private on purpose. Only Session creates instances of this struct.
    fn new() -> Self {
        Self {
            next: Rc::new(Cell::new(1)),
        }
    }

    pub fn next(&self) -> usize {
        let id = self.next.get();
        self.next.set(id + 1);
        id
    }
}

/// State of a module in the import cache. A module is `InProgress` from the
/// moment it parses until its whole recursive front-end run (imports
/// included) finishes; hitting an `InProgress` entry again means a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEntry {
    InProgress(NodeId),
    Ready(NodeId),
}

impl CacheEntry {
    pub fn module(self) -> NodeId {
        match self {
            CacheEntry::InProgress(module) | CacheEntry::Ready(module) => module,
        }
    }
}

/// Per-compilation context threaded through every pass: the shared id
/// provider for synthetic names and the import cache keyed by canonical
/// path. Interior mutability because passes only ever see `&Session`.
pub struct Session {
    id_provider: SharedIdProvider,
    module_cache: RefCell<HashMap<PathBuf, CacheEntry>>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id_provider: SharedIdProvider::new(),
            module_cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn id_provider(&self) -> SharedIdProvider {
        self.id_provider.clone()
    }

    pub fn fresh_name(&self, prefix: &str) -> String {
        format!("{}@{}", prefix, self.id_provider.next())
    }

    pub fn cached_module(&self, path: &PathBuf) -> Option<CacheEntry> {
        self.module_cache.borrow().get(path).copied()
    }

    pub fn cache_module(&self, path: PathBuf, entry: CacheEntry) {
        self.module_cache.borrow_mut().insert(path, entry);
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_names_never_repeat() {
        let session = Session::new();
        let first = session.fresh_name("tmp");
        let second = session.fresh_name("tmp");
        assert_eq!(first, "tmp@1");
        assert_eq!(second, "tmp@2");
    }

    #[test]
    fn clones_of_the_id_provider_share_the_counter() {
        let session = Session::new();
        let a = session.id_provider();
        let b = session.id_provider();
        assert_eq!(a.next(), 1);
        assert_eq!(b.next(), 2);
    }

    #[test]
    fn cache_entries_can_flip_from_in_progress_to_ready() {
        let session = Session::new();
        let path = PathBuf::from("/src/util.ql.ast");
        let module = NodeId(7);
        session.cache_module(path.clone(), CacheEntry::InProgress(module));
        assert_eq!(
            session.cached_module(&path),
            Some(CacheEntry::InProgress(module))
        );
        session.cache_module(path.clone(), CacheEntry::Ready(module));
        assert_eq!(session.cached_module(&path), Some(CacheEntry::Ready(module)));
        assert_eq!(session.cached_module(&path).unwrap().module(), module);
    }
}
