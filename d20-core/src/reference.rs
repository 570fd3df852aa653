//! Lazy, by-name references between chains.
//!
//! A [`Reference`] names another chain and resolves it against a [`Scope`]
//! (a non-owning view of a character's chains) each time it is evaluated
//! until the lookup succeeds. This is what lets a link name a chain that
//! does not exist yet, and what makes deserialization order-independent:
//! nothing is linked eagerly, so chains may arrive in any order.
//!
//! Once resolved, the handle is cached weakly. A reference never keeps its
//! target alive; if the target goes away the reference drops back to lookup.

use crate::chain::{ChainHandle, WeakChainHandle};
use crate::link::Value;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

/// Shared table of a character's chains.
pub(crate) type ChainTable = Rc<RefCell<Vec<ChainHandle>>>;

/// Non-owning view of a character's chains, used for name lookups.
#[derive(Clone, Default)]
pub struct Scope {
    table: Weak<RefCell<Vec<ChainHandle>>>,
}

impl Scope {
    pub(crate) fn new(table: &ChainTable) -> Self {
        Self {
            table: Rc::downgrade(table),
        }
    }

    /// A scope that never resolves anything.
    pub fn detached() -> Self {
        Self::default()
    }

    /// Whether the owning character still exists.
    pub fn is_live(&self) -> bool {
        self.table.strong_count() > 0
    }

    /// Find a chain by exact name.
    pub fn resolve(&self, name: &str) -> Option<ChainHandle> {
        let table = self.table.upgrade()?;
        let chains = table.try_borrow().ok()?;
        chains
            .iter()
            .find(|handle| handle.has_name(name))
            .cloned()
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("live", &self.is_live())
            .finish()
    }
}

/// Per-read evaluation context.
///
/// Carries the scope used to resolve references that were built without
/// one of their own.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    scope: Option<Scope>,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scope(scope: Scope) -> Self {
        Self { scope: Some(scope) }
    }

    pub fn scope(&self) -> Option<&Scope> {
        self.scope.as_ref()
    }
}

/// Resolution state of a [`Reference`].
#[derive(Debug, Clone, Default)]
pub enum Resolution {
    #[default]
    Unresolved,
    Resolved(WeakChainHandle),
}

/// Outcome of reading a referenced chain's value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lookup {
    Found(Value),
    /// No chain with that name exists (yet).
    Unresolved,
    /// The chain is already being evaluated further up the stack.
    Cycle,
    /// The chain is mutably borrowed by a caller and cannot be read.
    Busy,
}

/// A relation to another chain by name.
#[derive(Debug, Clone)]
pub struct Reference {
    name: String,
    fallback: Value,
    scope: Option<Scope>,
    resolution: RefCell<Resolution>,
}

impl Reference {
    /// Reference a chain by name, looked up in `scope` when evaluated.
    pub fn named(name: impl Into<String>, scope: Scope) -> Self {
        Self {
            name: name.into(),
            fallback: 0.0,
            scope: Some(scope),
            resolution: RefCell::new(Resolution::Unresolved),
        }
    }

    /// Reference a chain by name, looked up in the evaluation context's scope.
    pub fn unscoped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fallback: 0.0,
            scope: None,
            resolution: RefCell::new(Resolution::Unresolved),
        }
    }

    /// Reference a chain handed in directly.
    pub fn to_chain(chain: &ChainHandle) -> Self {
        Self {
            name: chain.name(),
            fallback: 0.0,
            scope: None,
            resolution: RefCell::new(Resolution::Resolved(chain.downgrade())),
        }
    }

    /// Value used while the target cannot be read.
    pub fn with_fallback(mut self, fallback: Value) -> Self {
        self.fallback = fallback;
        self
    }

    /// The name this reference was created with.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fallback(&self) -> Value {
        self.fallback
    }

    pub fn is_resolved(&self) -> bool {
        match &*self.resolution.borrow() {
            Resolution::Resolved(weak) => weak.is_live(),
            Resolution::Unresolved => false,
        }
    }

    /// Name of the target as it stands now.
    ///
    /// Reads through the cached handle so a renamed target serializes under
    /// its new name.
    pub fn current_name(&self) -> String {
        match &*self.resolution.borrow() {
            Resolution::Resolved(weak) => weak
                .upgrade()
                .map(|handle| handle.name())
                .unwrap_or_else(|| self.name.clone()),
            Resolution::Unresolved => self.name.clone(),
        }
    }

    /// Resolve the target, retrying the lookup while unresolved.
    pub fn resolve(&self, ctx: &EvalContext) -> Option<ChainHandle> {
        if let Resolution::Resolved(weak) = &*self.resolution.borrow() {
            if let Some(handle) = weak.upgrade() {
                return Some(handle);
            }
        }

        let found = self
            .scope
            .as_ref()
            .and_then(|scope| scope.resolve(&self.name))
            .or_else(|| ctx.scope().and_then(|scope| scope.resolve(&self.name)));

        match found {
            Some(handle) => {
                tracing::trace!(name = %self.name, "reference resolved");
                *self.resolution.borrow_mut() = Resolution::Resolved(handle.downgrade());
                Some(handle)
            }
            None => {
                tracing::trace!(name = %self.name, "reference unresolved");
                *self.resolution.borrow_mut() = Resolution::Unresolved;
                None
            }
        }
    }

    /// Read the target's final value.
    pub fn lookup(&self, ctx: &EvalContext) -> Lookup {
        let Some(handle) = self.resolve(ctx) else {
            return Lookup::Unresolved;
        };
        let lookup = handle.try_final(ctx);
        match lookup {
            Lookup::Cycle => {
                tracing::warn!(name = %self.name, "reference cycle, using fallback");
            }
            Lookup::Busy => {
                tracing::warn!(
                    name = %self.name,
                    "referenced chain is borrowed for mutation, using fallback"
                );
            }
            Lookup::Found(_) | Lookup::Unresolved => {}
        }
        lookup
    }

    /// The target's final value, or `None` if it cannot be read right now.
    pub fn try_value(&self, ctx: &EvalContext) -> Option<Value> {
        match self.lookup(ctx) {
            Lookup::Found(value) => Some(value),
            Lookup::Unresolved | Lookup::Cycle | Lookup::Busy => None,
        }
    }

    /// The target's final value, or the fallback.
    pub fn value(&self, ctx: &EvalContext) -> Value {
        self.try_value(ctx).unwrap_or(self.fallback)
    }
}
