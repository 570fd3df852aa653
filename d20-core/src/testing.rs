//! Testing utilities for chain graphs.
//!
//! This module provides tools for integration testing:
//! - `sample_fighter` a small character with forward references
//! - `TestHarness` for mutating a character and re-reading it
//! - Assertion helpers for final values and serialization round trips

use crate::chain::Chain;
use crate::character::Character;
use crate::codec::{Codec, CodecError};
use crate::link::{Link, Value};
use crate::reference::Reference;
use crate::tags::Taggable;
use std::collections::BTreeMap;

/// A level 5 fighter with 16 strength.
///
/// `attack` is added first and reads `bab` and `strMod` before either
/// exists, so every read goes through a lazily resolved reference.
///
/// | chain      | final |
/// |------------|-------|
/// | `attack`   | 8     |
/// | `strength` | 16    |
/// | `strMod`   | 3     |
/// | `level`    | 5     |
/// | `bab`      | 5     |
pub fn sample_fighter(name: &str) -> Character {
    match build_fighter(name) {
        Ok(character) => character,
        Err(err) => panic!("Sample fighter failed to build: {err}"),
    }
}

fn build_fighter(name: &str) -> Result<Character, Box<dyn std::error::Error>> {
    let mut character = Character::new(name);
    character.tag(["fighter", "pc"]);
    let scope = character.scope();

    let mut attack = Chain::new("attack");
    attack.add_link(Link::dynamic_adder("bab", scope.clone()), None)?;
    attack.add_link(Link::dynamic_adder("strMod", scope.clone()), None)?;

    let mut strength = Chain::new("strength");
    strength.add_link(Link::static_value("base", 16.0), None)?;

    let mut str_mod = Chain::new("strMod");
    str_mod.add_link(Link::dynamic_adder("strength", scope.clone()), None)?;
    str_mod.add_link(Link::ability_modifier(), None)?;

    let mut level = Chain::new("level");
    level.add_link(Link::static_value("base", 5.0), None)?;

    let mut bab = Chain::new("bab");
    bab.start_with(Reference::named("level", scope));
    bab.add_link(Link::good_bab(), None)?;

    for chain in [attack, strength, str_mod, level, bab] {
        character.add_chain(chain)?;
    }
    Ok(character)
}

/// Final value of every chain, keyed by name.
pub fn finals(character: &Character) -> BTreeMap<String, Value> {
    let ctx = character.context();
    character
        .chains()
        .iter()
        .map(|handle| (handle.name(), handle.get_final(&ctx)))
        .collect()
}

/// Serialize with `codec` and read the text straight back.
pub fn round_trip(codec: &Codec, character: &Character) -> Result<Character, CodecError> {
    let text = codec.encode(character)?;
    codec.decode(&text)
}

/// Test harness holding one character.
pub struct TestHarness {
    pub character: Character,
    pub codec: Codec,
}

impl TestHarness {
    /// Create a new test harness around the sample fighter.
    pub fn new() -> Self {
        Self::with_character(sample_fighter("Test Hero"))
    }

    pub fn with_character(character: Character) -> Self {
        Self {
            character,
            codec: Codec::default(),
        }
    }

    /// Use a different codec for round trips.
    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    /// Add a chain seeded with a single static link.
    pub fn add_static(&mut self, chain: &str, value: Value) -> &mut Self {
        let mut new_chain = Chain::new(chain);
        if let Err(err) = new_chain.add_link(Link::static_value("base", value), None) {
            panic!("{err}");
        }
        if let Err(err) = self.character.add_chain(new_chain) {
            panic!("{err}");
        }
        self
    }

    /// Overwrite the value of the first static link in `chain`.
    pub fn set_static(&mut self, chain: &str, value: Value) -> &mut Self {
        let Some(handle) = self.character.get_chain_by_name(chain) else {
            panic!("No chain named '{chain}'");
        };
        let mut chain_ref = handle.borrow_mut();
        let index = (0..chain_ref.len())
            .find(|&i| chain_ref.link(i).and_then(Link::value).is_some());
        let Some(index) = index else {
            panic!("Chain '{chain}' has no static link");
        };
        if let Some(link) = chain_ref.link_mut(index) {
            if let Err(err) = link.set_value(value) {
                panic!("{err}");
            }
        }
        self
    }

    pub fn final_value(&self, chain: &str) -> Option<Value> {
        self.character.final_value(chain)
    }

    pub fn finals(&self) -> BTreeMap<String, Value> {
        finals(&self.character)
    }

    /// Round-trip the character through the harness codec.
    pub fn reload(&self) -> Character {
        match round_trip(&self.codec, &self.character) {
            Ok(character) => character,
            Err(err) => panic!("Round trip failed: {err}"),
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert a chain's final value.
#[track_caller]
pub fn assert_final(character: &Character, chain: &str, expected: Value) {
    match character.final_value(chain) {
        Some(actual) => assert_eq!(
            actual, expected,
            "Expected '{chain}' to be {expected}, got {actual}"
        ),
        None => panic!("Expected chain '{chain}' to exist"),
    }
}

/// Assert a serialization round trip preserves every final value.
#[track_caller]
pub fn assert_round_trip(codec: &Codec, character: &Character) -> Character {
    let reloaded = match round_trip(codec, character) {
        Ok(reloaded) => reloaded,
        Err(err) => panic!("Round trip failed: {err}"),
    };
    assert_eq!(reloaded.name(), character.name());
    assert_eq!(
        finals(&reloaded),
        finals(character),
        "Final values changed across a round trip"
    );
    reloaded
}
