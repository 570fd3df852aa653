//! Chains: named, priority-ordered sequences of links.
//!
//! A chain's value is computed by folding its seed through every link in
//! ascending priority order. Priorities are fixed at insertion time and are
//! the only ordering authority; evaluation never skips or reorders entries.
//!
//! Automatically assigned priorities are spaced by a rank band (100 by
//! default) so there is room to slot links in between by hand.

use crate::config::EngineConfig;
use crate::link::{Link, Value};
use crate::reference::{EvalContext, Lookup, Reference};
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::ops::{Deref, DerefMut};
use std::rc::{Rc, Weak};
use thiserror::Error;

/// Ordering key of a link within its chain. Lower evaluates first.
pub type Priority = i64;

/// Default spacing between automatically assigned priorities.
pub const DEFAULT_RANK_BAND: Priority = 100;

/// Errors from positional chain operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("Link index {index} out of range for chain '{chain}' with {len} links")]
    IndexOutOfRange {
        chain: String,
        index: usize,
        len: usize,
    },

    #[error("No priority left after {priority} in chain '{chain}'")]
    PriorityOverflow { chain: String, priority: Priority },
}

/// One slot of a chain.
#[derive(Debug, Clone)]
pub struct ChainEntry {
    link: Link,
    priority: Priority,
    /// Output of this link on the most recent evaluation that reached it.
    partial: Cell<Option<Value>>,
}

impl ChainEntry {
    pub fn link(&self) -> &Link {
        &self.link
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn partial(&self) -> Option<Value> {
        self.partial.get()
    }
}

/// A named attribute computed from a seed and a sequence of links.
#[derive(Debug, Clone)]
pub struct Chain {
    name: String,
    initial: Value,
    /// Another chain whose final value replaces `initial` as the seed.
    start: Option<Reference>,
    rank_band: Priority,
    entries: Vec<ChainEntry>,
    evaluating: Cell<bool>,
}

impl Chain {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            initial: 0.0,
            start: None,
            rank_band: DEFAULT_RANK_BAND,
            entries: Vec::new(),
            evaluating: Cell::new(false),
        }
    }

    pub fn with_initial(name: impl Into<String>, initial: Value) -> Self {
        let mut chain = Self::new(name);
        chain.initial = initial;
        chain
    }

    /// Create a chain using the config's rank band.
    pub fn with_config(name: impl Into<String>, config: &EngineConfig) -> Self {
        let mut chain = Self::new(name);
        if config.rank_band > 0 {
            chain.rank_band = config.rank_band;
        }
        chain
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn initial(&self) -> Value {
        self.initial
    }

    pub fn set_initial(&mut self, initial: Value) {
        self.initial = initial;
    }

    /// Seed this chain from another chain's final value.
    ///
    /// While the reference cannot be read the chain seeds from `initial`.
    pub fn start_with(&mut self, reference: Reference) {
        self.start = Some(reference);
    }

    pub fn start_reference(&self) -> Option<&Reference> {
        self.start.as_ref()
    }

    pub fn clear_start(&mut self) -> Option<Reference> {
        self.start.take()
    }

    pub fn rank_band(&self) -> Priority {
        self.rank_band
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ChainEntry] {
        &self.entries
    }

    pub fn link(&self, index: usize) -> Option<&Link> {
        self.entries.get(index).map(|entry| &entry.link)
    }

    pub fn link_mut(&mut self, index: usize) -> Option<&mut Link> {
        self.entries.get_mut(index).map(|entry| &mut entry.link)
    }

    pub fn priorities(&self) -> Vec<Priority> {
        self.entries.iter().map(|entry| entry.priority).collect()
    }

    /// Cached output of the link at `index` from the last evaluation.
    pub fn partial(&self, index: usize) -> Option<Value> {
        self.entries.get(index).and_then(ChainEntry::partial)
    }

    /// Priority an insertion without an explicit priority would receive.
    pub fn next_band_priority(&self) -> Result<Priority, ChainError> {
        let Some(last) = self.entries.last() else {
            return Ok(self.rank_band);
        };
        last.priority
            .div_euclid(self.rank_band)
            .checked_add(1)
            .and_then(|band| band.checked_mul(self.rank_band))
            .ok_or_else(|| self.overflow(last.priority))
    }

    /// Insert a link.
    ///
    /// Without a priority the link goes at the next whole rank band past the
    /// last entry. An explicit priority that collides with an existing entry
    /// pushes that entry, and every entry it would in turn collide with, down
    /// by one. Fails without changing the chain when that run of entries
    /// would be pushed past the largest priority.
    pub fn add_link(
        &mut self,
        link: Link,
        priority: Option<Priority>,
    ) -> Result<&Link, ChainError> {
        let priority = match priority {
            Some(priority) => priority,
            None => self.next_band_priority()?,
        };
        let index = self
            .entries
            .partition_point(|entry| entry.priority < priority);

        let mut occupied = priority;
        let mut shifted = 0;
        for entry in &self.entries[index..] {
            if entry.priority != occupied {
                break;
            }
            occupied = occupied
                .checked_add(1)
                .ok_or_else(|| self.overflow(entry.priority))?;
            shifted += 1;
        }
        for entry in &mut self.entries[index..index + shifted] {
            entry.priority += 1;
        }

        tracing::debug!(
            chain = %self.name,
            link = %link.name(),
            priority,
            shifted,
            "link added"
        );

        self.entries.insert(
            index,
            ChainEntry {
                link,
                priority,
                partial: Cell::new(None),
            },
        );
        Ok(&self.entries[index].link)
    }

    /// Remove the link at `index`. Remaining priorities are untouched.
    pub fn remove_link(&mut self, index: usize) -> Result<Link, ChainError> {
        self.check_index(index)?;
        let entry = self.entries.remove(index);
        tracing::debug!(chain = %self.name, link = %entry.link.name(), "link removed");
        Ok(entry.link)
    }

    /// Exchange the links in two slots. Priorities stay with their slots.
    pub fn swap_priorities(&mut self, i: usize, j: usize) -> Result<(), ChainError> {
        self.check_index(i)?;
        self.check_index(j)?;
        if i == j {
            return Ok(());
        }

        let (low, high) = (i.min(j), i.max(j));
        let (head, tail) = self.entries.split_at_mut(high);
        std::mem::swap(&mut head[low].link, &mut tail[0].link);
        head[low].partial.set(None);
        tail[0].partial.set(None);
        Ok(())
    }

    /// Replay from the seed through the first `index` links.
    ///
    /// `eval_at(0, ..)` is the seed itself; an index past the end is
    /// treated as the full length.
    pub fn eval_at(&self, index: usize, ctx: &EvalContext) -> Value {
        self.try_eval_at(index, ctx).unwrap_or(self.initial)
    }

    pub fn get_final(&self, ctx: &EvalContext) -> Value {
        self.eval_at(self.entries.len(), ctx)
    }

    /// Evaluate unless this chain is already being evaluated further up the
    /// stack, in which case `None` is returned.
    pub(crate) fn try_eval_at(&self, index: usize, ctx: &EvalContext) -> Option<Value> {
        let _guard = EvalGuard::enter(&self.evaluating)?;

        let mut value = match &self.start {
            Some(reference) => reference.try_value(ctx).unwrap_or(self.initial),
            None => self.initial,
        };

        let end = index.min(self.entries.len());
        for entry in &self.entries[..end] {
            value = entry.link.evaluate(value, ctx);
            entry.partial.set(Some(value));
        }

        Some(value)
    }

    fn overflow(&self, priority: Priority) -> ChainError {
        ChainError::PriorityOverflow {
            chain: self.name.clone(),
            priority,
        }
    }

    fn check_index(&self, index: usize) -> Result<(), ChainError> {
        if index >= self.entries.len() {
            return Err(ChainError::IndexOutOfRange {
                chain: self.name.clone(),
                index,
                len: self.entries.len(),
            });
        }
        Ok(())
    }
}

/// Marks a chain as mid-evaluation for as long as it lives.
struct EvalGuard<'a>(&'a Cell<bool>);

impl<'a> EvalGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Option<Self> {
        if flag.replace(true) {
            return None;
        }
        Some(Self(flag))
    }
}

impl Drop for EvalGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Shared handle to a chain owned by a character.
///
/// Handles are single-threaded; links read other chains through them
/// without owning them. The handle keeps its own copy of the chain's name
/// so name lookups still work while the chain is borrowed. A rename made
/// through [`ChainHandle::borrow_mut`] reaches that copy when the borrow
/// ends.
#[derive(Debug, Clone)]
pub struct ChainHandle {
    chain: Rc<RefCell<Chain>>,
    name: Rc<RefCell<String>>,
}

impl ChainHandle {
    pub fn new(chain: Chain) -> Self {
        let name = Rc::new(RefCell::new(chain.name().to_string()));
        Self {
            chain: Rc::new(RefCell::new(chain)),
            name,
        }
    }

    /// Panics if the chain is currently borrowed mutably.
    pub fn borrow(&self) -> Ref<'_, Chain> {
        self.chain.borrow()
    }

    /// Panics if the chain is currently borrowed.
    pub fn borrow_mut(&self) -> ChainMut<'_> {
        ChainMut {
            chain: self.chain.borrow_mut(),
            name: &self.name,
        }
    }

    pub fn name(&self) -> String {
        self.name.borrow().clone()
    }

    pub(crate) fn has_name(&self, name: &str) -> bool {
        *self.name.borrow() == name
    }

    pub fn get_final(&self, ctx: &EvalContext) -> Value {
        self.chain.borrow().get_final(ctx)
    }

    pub fn eval_at(&self, index: usize, ctx: &EvalContext) -> Value {
        self.chain.borrow().eval_at(index, ctx)
    }

    /// Final value, unless the chain is mid-evaluation or being mutated.
    pub(crate) fn try_final(&self, ctx: &EvalContext) -> Lookup {
        let Ok(chain) = self.chain.try_borrow() else {
            return Lookup::Busy;
        };
        match chain.try_eval_at(chain.len(), ctx) {
            Some(value) => Lookup::Found(value),
            None => Lookup::Cycle,
        }
    }

    pub fn downgrade(&self) -> WeakChainHandle {
        WeakChainHandle {
            chain: Rc::downgrade(&self.chain),
            name: Rc::downgrade(&self.name),
        }
    }

    pub fn ptr_eq(&self, other: &ChainHandle) -> bool {
        Rc::ptr_eq(&self.chain, &other.chain)
    }
}

/// Non-owning [`ChainHandle`].
#[derive(Debug, Clone, Default)]
pub struct WeakChainHandle {
    chain: Weak<RefCell<Chain>>,
    name: Weak<RefCell<String>>,
}

impl WeakChainHandle {
    pub fn upgrade(&self) -> Option<ChainHandle> {
        Some(ChainHandle {
            chain: self.chain.upgrade()?,
            name: self.name.upgrade()?,
        })
    }

    pub fn is_live(&self) -> bool {
        self.chain.strong_count() > 0
    }
}

/// Mutable borrow of a chain that syncs its name back to the handle on drop.
pub struct ChainMut<'a> {
    chain: RefMut<'a, Chain>,
    name: &'a RefCell<String>,
}

impl Deref for ChainMut<'_> {
    type Target = Chain;

    fn deref(&self) -> &Chain {
        &self.chain
    }
}

impl DerefMut for ChainMut<'_> {
    fn deref_mut(&mut self) -> &mut Chain {
        &mut self.chain
    }
}

impl Drop for ChainMut<'_> {
    fn drop(&mut self) {
        if *self.name.borrow() != self.chain.name() {
            *self.name.borrow_mut() = self.chain.name().to_string();
        }
    }
}
