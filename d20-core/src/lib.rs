//! Chain-and-link attribute engine for d20 characters.
//!
//! This crate provides:
//! - Chains: named attributes folded from a seed through prioritized links
//! - Links: static values, multipliers, adders, ability modifiers and BAB
//!   progressions
//! - Lazy by-name references between chains, so chains can be wired up in
//!   any order
//! - A registry-driven text codec for persisting whole characters
//!
//! # Quick Start
//!
//! ```
//! use d20_core::{Chain, Character, Link};
//!
//! let character = Character::new("Joe");
//!
//! // `strMod` reads `strength` before it exists.
//! let mut str_mod = Chain::new("strMod");
//! str_mod.add_link(Link::dynamic_adder("strength", character.scope()), None).unwrap();
//! str_mod.add_link(Link::ability_modifier(), None).unwrap();
//! character.add_chain(str_mod).unwrap();
//!
//! let mut strength = Chain::new("strength");
//! strength.add_link(Link::static_value("base", 16.0), None).unwrap();
//! character.add_chain(strength).unwrap();
//!
//! assert_eq!(character.final_value("strMod"), Some(3.0));
//!
//! let text = character.serialize().unwrap();
//! let copy = Character::from_string(&text).unwrap();
//! assert_eq!(copy.final_value("strMod"), Some(3.0));
//! ```

pub mod chain;
pub mod character;
pub mod codec;
pub mod config;
pub mod dice;
pub mod link;
pub mod reference;
pub mod registry;
pub mod tags;
pub mod testing;

// Primary public API
pub use chain::{
    Chain, ChainError, ChainHandle, ChainMut, Priority, WeakChainHandle, DEFAULT_RANK_BAND,
};
pub use character::{Character, CharacterError};
pub use codec::{default_codec, Codec, CodecError};
pub use config::{ConfigError, EngineConfig};
pub use dice::{DiceError, DiceExpression};
pub use link::{Addend, Link, LinkError, LinkKind, Value};
pub use reference::{EvalContext, Lookup, Reference, Scope};
pub use registry::{LinkFields, LinkRegistry, BUILTIN_REGISTRY};
pub use tags::{Taggable, Tags};
