//! Characters: named, tagged owners of uniquely-named chains.

use crate::chain::{Chain, ChainHandle};
use crate::codec::{self, CodecError};
use crate::link::Value;
use crate::reference::{ChainTable, EvalContext, Scope};
use crate::tags::{Taggable, Tags};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use thiserror::Error;

/// Errors from character operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CharacterError {
    #[error("Character '{character}' already has a chain named '{chain}'")]
    DuplicateChainName { character: String, chain: String },
}

/// A character and the chains that describe it.
///
/// Chain names are unique within a character. Adding a chain under a name
/// that is already taken is rejected rather than replacing or merging.
pub struct Character {
    name: String,
    tags: Tags,
    chains: ChainTable,
}

impl Character {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: Tags::new(),
            chains: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Non-owning lookup view for references into this character.
    pub fn scope(&self) -> Scope {
        Scope::new(&self.chains)
    }

    /// Evaluation context resolving names against this character.
    pub fn context(&self) -> EvalContext {
        EvalContext::with_scope(self.scope())
    }

    /// Add a chain, returning its shared handle.
    pub fn add_chain(&self, chain: Chain) -> Result<ChainHandle, CharacterError> {
        if self.contains_chain(chain.name()) {
            tracing::warn!(
                character = %self.name,
                chain = %chain.name(),
                "duplicate chain name rejected"
            );
            return Err(CharacterError::DuplicateChainName {
                character: self.name.clone(),
                chain: chain.name().to_string(),
            });
        }

        tracing::debug!(character = %self.name, chain = %chain.name(), "chain added");
        let handle = ChainHandle::new(chain);
        self.chains.borrow_mut().push(handle.clone());
        Ok(handle)
    }

    pub fn get_chain_by_name(&self, name: &str) -> Option<ChainHandle> {
        self.chains
            .borrow()
            .iter()
            .find(|handle| handle.has_name(name))
            .cloned()
    }

    pub fn contains_chain(&self, name: &str) -> bool {
        self.get_chain_by_name(name).is_some()
    }

    /// Snapshot of the chains in insertion order.
    pub fn chains(&self) -> Vec<ChainHandle> {
        self.chains.borrow().clone()
    }

    pub fn chain_names(&self) -> Vec<String> {
        self.chains.borrow().iter().map(ChainHandle::name).collect()
    }

    pub fn len(&self) -> usize {
        self.chains.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.borrow().is_empty()
    }

    /// Final value of the named chain, evaluated in this character's context.
    pub fn final_value(&self, name: &str) -> Option<Value> {
        let handle = self.get_chain_by_name(name)?;
        let value = handle.get_final(&self.context());
        Some(value)
    }

    /// Serialize with the built-in link registry.
    pub fn serialize(&self) -> Result<String, CodecError> {
        codec::default_codec().encode(self)
    }

    /// Rebuild a character serialized with the built-in link registry.
    pub fn from_string(text: &str) -> Result<Character, CodecError> {
        codec::default_codec().decode(text)
    }
}

impl FromStr for Character {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Character::from_string(s)
    }
}

impl Taggable for Character {
    fn tags(&self) -> &Tags {
        &self.tags
    }

    fn tags_mut(&mut self) -> &mut Tags {
        &mut self.tags
    }
}

impl fmt::Debug for Character {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Character")
            .field("name", &self.name)
            .field("tags", &self.tags)
            .field("chains", &self.chain_names())
            .finish()
    }
}
