use std::collections::HashMap;

use quill_syntax::ast::NodeId;
use thiserror::Error;

/// Handle into the [`ScopeArena`]. Scopes are created on entering a
/// scope-introducing node and never destroyed; later passes keep reading
/// them for the whole compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub usize);

/// A name registered in a scope: the node that declared it, every
/// definition site attached to it (out-of-line impls) and every use site.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub decl: NodeId,
    pub defns: Vec<NodeId>,
    pub uses: Vec<NodeId>,
}

#[derive(Debug)]
pub struct Scope {
    symbols: HashMap<String, Symbol>,
    parent: Option<ScopeId>,
    children: Vec<ScopeId>,
    /// The node that introduced this scope.
    owner: NodeId,
}

impl Scope {
    pub fn parent(&self) -> Option<ScopeId> {
        self.parent
    }

    pub fn children(&self) -> &[ScopeId] {
        &self.children
    }

    pub fn owner(&self) -> NodeId {
        self.owner
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("name already declared in this scope")]
pub struct DuplicateName {
    /// The node that registered the name first; first writer wins.
    pub previous: NodeId,
}

/// The scope tree of one compilation plus the two node→scope side tables:
/// the scope *active at* a node, and the scope a node *introduced*.
#[derive(Debug, Default)]
pub struct ScopeArena {
    scopes: Vec<Scope>,
    active: HashMap<NodeId, ScopeId>,
    owners: HashMap<NodeId, ScopeId>,
    /// Definition node → the declaration it was spliced onto.
    links: HashMap<NodeId, NodeId>,
}

impl ScopeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_scope(&mut self, parent: Option<ScopeId>, owner: NodeId) -> ScopeId {
        let id = ScopeId(self.scopes.len());
        self.scopes.push(Scope {
            symbols: HashMap::new(),
            parent,
            children: Vec::new(),
            owner,
        });
        if let Some(parent) = parent {
            self.scopes[parent.0].children.push(id);
        }
        self.owners.insert(owner, id);
        id
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0]
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ScopeId, &Scope)> {
        self.scopes.iter().enumerate().map(|(i, s)| (ScopeId(i), s))
    }

    /// Insert-if-absent registration. A collision leaves the first entry in
    /// place and reports the original declaration site.
    pub fn declare(
        &mut self,
        scope: ScopeId,
        name: &str,
        decl: NodeId,
    ) -> Result<(), DuplicateName> {
        match self.scopes[scope.0].symbols.get(name) {
            Some(previous) => Err(DuplicateName {
                previous: previous.decl,
            }),
            None => {
                self.scopes[scope.0].symbols.insert(
                    name.to_string(),
                    Symbol {
                        name: name.to_string(),
                        decl,
                        defns: Vec::new(),
                        uses: Vec::new(),
                    },
                );
                Ok(())
            }
        }
    }

    /// Local lookup, walking up through parents when `deep` is set.
    /// Deep is the default for ordinary name resolution; non-deep serves
    /// scope-qualified member resolution.
    pub fn lookup(&self, scope: ScopeId, name: &str, deep: bool) -> Option<(ScopeId, &Symbol)> {
        let mut cursor = Some(scope);
        while let Some(current) = cursor {
            if let Some(symbol) = self.scopes[current.0].symbols.get(name) {
                return Some((current, symbol));
            }
            if !deep {
                return None;
            }
            cursor = self.scopes[current.0].parent;
        }
        None
    }

    pub fn record_use(&mut self, scope: ScopeId, name: &str, site: NodeId) {
        if let Some(symbol) = self.scopes[scope.0].symbols.get_mut(name) {
            symbol.uses.push(site);
        }
    }

    pub fn record_defn(&mut self, scope: ScopeId, name: &str, site: NodeId) {
        if let Some(symbol) = self.scopes[scope.0].symbols.get_mut(name) {
            symbol.defns.push(site);
        }
    }

    pub fn set_active(&mut self, node: NodeId, scope: ScopeId) {
        self.active.insert(node, scope);
    }

    /// The scope enclosing `node`. For a scope-introducing node this is the
    /// scope it sits in, not the one it pushed; a module has none.
    pub fn active_at(&self, node: NodeId) -> Option<ScopeId> {
        self.active.get(&node).copied()
    }

    /// The scope `node` introduced, if it is a scope-introducing node.
    pub fn introduced_by(&self, node: NodeId) -> Option<ScopeId> {
        self.owners.get(&node).copied()
    }

    /// Every scope of the tree rooted at `scope`, depth first. The arena
    /// holds one scope tree per module, so this bounds a walk to a single
    /// module's scopes.
    pub fn scopes_under(&self, scope: ScopeId) -> Vec<ScopeId> {
        let mut found = Vec::new();
        let mut stack = vec![scope];
        while let Some(current) = stack.pop() {
            found.push(current);
            stack.extend(self.scopes[current.0].children.iter().rev());
        }
        found
    }

    pub fn root_of(&self, scope: ScopeId) -> ScopeId {
        let mut current = scope;
        while let Some(parent) = self.scopes[current.0].parent {
            current = parent;
        }
        current
    }

    /// After decl/def linking both nodes answer with one scope: the
    /// definition's. The declaration's previous scope (parameters of the
    /// forward signature) is drained into it first, then the shared scope
    /// is re-hung under the declaration's surrounding scope.
    pub fn share_scope(&mut self, decl: NodeId, scope: ScopeId) {
        if let Some(old) = self.owners.get(&decl).copied() {
            if old != scope {
                let symbols = std::mem::take(&mut self.scopes[old.0].symbols);
                for (name, symbol) in symbols {
                    self.scopes[scope.0].symbols.entry(name).or_insert(symbol);
                }
            }
        }
        if let Some(enclosing) = self.active.get(&decl).copied() {
            self.reparent(scope, enclosing);
        }
        self.owners.insert(decl, scope);
    }

    fn reparent(&mut self, scope: ScopeId, new_parent: ScopeId) {
        if scope == new_parent {
            return;
        }
        if let Some(old_parent) = self.scopes[scope.0].parent {
            self.scopes[old_parent.0].children.retain(|&c| c != scope);
        }
        self.scopes[scope.0].parent = Some(new_parent);
        self.scopes[new_parent.0].children.push(scope);
    }

    pub fn link_defn(&mut self, defn: NodeId, decl: NodeId) {
        self.links.insert(defn, decl);
    }

    pub fn linked_decl(&self, defn: NodeId) -> Option<NodeId> {
        self.links.get(&defn).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(n: usize) -> NodeId {
        NodeId(n)
    }

    #[test]
    fn duplicate_registration_keeps_the_first_entry() {
        let mut scopes = ScopeArena::new();
        let root = scopes.new_scope(None, node(0));
        scopes.declare(root, "x", node(1)).unwrap();
        let err = scopes.declare(root, "x", node(2)).unwrap_err();
        assert_eq!(err.previous, node(1));
        assert_eq!(scopes.scope(root).get("x").unwrap().decl, node(1));
    }

    #[test]
    fn deep_lookup_walks_ancestors_and_shallow_does_not() {
        let mut scopes = ScopeArena::new();
        let root = scopes.new_scope(None, node(0));
        let inner = scopes.new_scope(Some(root), node(1));
        scopes.declare(root, "outer", node(2)).unwrap();

        let (found_in, symbol) = scopes.lookup(inner, "outer", true).unwrap();
        assert_eq!(found_in, root);
        assert_eq!(symbol.decl, node(2));
        assert!(scopes.lookup(inner, "outer", false).is_none());
    }

    #[test]
    fn scopes_under_stays_within_one_scope_tree() {
        let mut scopes = ScopeArena::new();
        let root_a = scopes.new_scope(None, node(0));
        let inner = scopes.new_scope(Some(root_a), node(1));
        let leaf = scopes.new_scope(Some(inner), node(2));
        let root_b = scopes.new_scope(None, node(3));
        let other = scopes.new_scope(Some(root_b), node(4));

        assert_eq!(scopes.scopes_under(root_a), vec![root_a, inner, leaf]);
        assert_eq!(scopes.scopes_under(root_b), vec![root_b, other]);
    }

    #[test]
    fn inner_declaration_shadows_the_outer_one() {
        let mut scopes = ScopeArena::new();
        let root = scopes.new_scope(None, node(0));
        let inner = scopes.new_scope(Some(root), node(1));
        scopes.declare(root, "x", node(2)).unwrap();
        scopes.declare(inner, "x", node(3)).unwrap();

        let (found_in, symbol) = scopes.lookup(inner, "x", true).unwrap();
        assert_eq!(found_in, inner);
        assert_eq!(symbol.decl, node(3));
    }

    #[test]
    fn share_scope_merges_the_declarations_old_symbols() {
        let mut scopes = ScopeArena::new();
        let root = scopes.new_scope(None, node(0));
        let decl = node(1);
        let decl_scope = scopes.new_scope(Some(root), decl);
        scopes.set_active(decl, root);
        scopes.declare(decl_scope, "param", node(2)).unwrap();

        let impl_scope = scopes.new_scope(Some(root), node(3));
        scopes.declare(impl_scope, "local", node(4)).unwrap();

        scopes.share_scope(decl, impl_scope);
        assert_eq!(scopes.introduced_by(decl), Some(impl_scope));
        assert!(scopes.scope(impl_scope).get("param").is_some());
        assert!(scopes.scope(impl_scope).get("local").is_some());
        assert_eq!(scopes.scope(impl_scope).parent(), Some(root));
    }
}
