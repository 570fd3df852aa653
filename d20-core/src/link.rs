//! Chain links: single transformation steps in a chain's fold.
//!
//! A [`Link`] pairs a name and a set of tags with a [`LinkKind`], the closed
//! set of transformations the engine knows how to evaluate and serialize.
//! Every kind is a pure function of the previous value and the evaluation
//! context.

use crate::chain::ChainHandle;
use crate::reference::{EvalContext, Reference, Scope};
use crate::tags::{Taggable, Tags};
use d20_macros::LinkKind;
use std::fmt;
use thiserror::Error;

/// The value type flowing through chains.
pub type Value = f64;

/// Errors from kind-specific link accessors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("Link '{name}' is a {found} link, not a {expected} link")]
    WrongKind {
        name: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Static description of a link kind, for pickers and registries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindDescriptor {
    pub tag: &'static str,
    pub properties: &'static [&'static str],
    pub description: &'static str,
}

/// A declared property value as it appears in a serialized record.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Number(Value),
    /// The name of a referenced chain.
    Chain(String),
}

impl From<&Value> for PropertyValue {
    fn from(value: &Value) -> Self {
        PropertyValue::Number(*value)
    }
}

impl From<&Addend> for PropertyValue {
    fn from(addend: &Addend) -> Self {
        match addend {
            Addend::Literal(value) => PropertyValue::Number(*value),
            Addend::Chain(reference) => PropertyValue::Chain(reference.current_name()),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Number(value) => write!(f, "{value}"),
            PropertyValue::Chain(name) => write!(f, "{name}"),
        }
    }
}

/// What an adder adds.
#[derive(Debug, Clone)]
pub enum Addend {
    Literal(Value),
    /// Another chain's final value, held by reference.
    Chain(Reference),
}

impl Addend {
    /// Resolve to a number. Unresolved references yield their fallback.
    pub fn value(&self, ctx: &EvalContext) -> Value {
        match self {
            Addend::Literal(value) => *value,
            Addend::Chain(reference) => reference.value(ctx),
        }
    }

    /// Name of the referenced chain, if this addend is dynamic.
    pub fn name(&self) -> Option<String> {
        match self {
            Addend::Literal(_) => None,
            Addend::Chain(reference) => Some(reference.current_name()),
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Addend::Chain(_))
    }
}

impl From<Value> for Addend {
    fn from(value: Value) -> Self {
        Addend::Literal(value)
    }
}

impl From<Reference> for Addend {
    fn from(reference: Reference) -> Self {
        Addend::Chain(reference)
    }
}

/// The built-in transformations.
#[derive(Debug, Clone, LinkKind)]
pub enum LinkKind {
    /// Replaces the running value with a fixed constant.
    Static { value: Value },
    /// Scales the running value.
    Multiplier { multiplier: Value },
    /// Adds a literal or another chain's final value.
    Adder { addend: Addend },
    /// Turns an ability score into its modifier.
    AbilityModifier,
    /// Base attack bonus that grows one per level.
    GoodBab,
    /// Base attack bonus that grows three per four levels.
    AverageBab,
    /// Base attack bonus that grows one per two levels.
    PoorBab,
    /// Passes the running value through unchanged.
    Identity,
}

impl LinkKind {
    /// Apply this transformation to the running value.
    pub fn apply(&self, previous: Value, ctx: &EvalContext) -> Value {
        match self {
            LinkKind::Static { value } => *value,
            LinkKind::Multiplier { multiplier } => previous * multiplier,
            LinkKind::Adder { addend } => previous + addend.value(ctx),
            LinkKind::AbilityModifier => ability_modifier(previous),
            LinkKind::GoodBab => good_bab(previous),
            LinkKind::AverageBab => average_bab(previous),
            LinkKind::PoorBab => poor_bab(previous),
            LinkKind::Identity => previous,
        }
    }
}

/// `floor(score / 2) - 5`.
pub fn ability_modifier(score: Value) -> Value {
    (score / 2.0).floor() - 5.0
}

pub fn good_bab(level: Value) -> Value {
    level
}

/// Stair-step progression: one flat step every four levels after the first.
pub fn average_bab(level: Value) -> Value {
    if level == 1.0 {
        return 0.0;
    }
    let past_first = level - 1.0;
    past_first - (past_first / 4.0).floor()
}

pub fn poor_bab(level: Value) -> Value {
    (level / 2.0).floor()
}

/// A named transformation step.
#[derive(Debug, Clone)]
pub struct Link {
    name: String,
    kind: LinkKind,
    tags: Tags,
    /// Registry tag this link serializes under, when it differs from the kind's own.
    type_tag: Option<String>,
}

impl Link {
    pub fn new(name: impl Into<String>, kind: LinkKind) -> Self {
        Self {
            name: name.into(),
            kind,
            tags: Tags::new(),
            type_tag: None,
        }
    }

    /// A link that always yields `value`.
    pub fn static_value(name: impl Into<String>, value: Value) -> Self {
        Self::new(name, LinkKind::Static { value })
    }

    pub fn multiplier(name: impl Into<String>, multiplier: Value) -> Self {
        Self::new(name, LinkKind::Multiplier { multiplier })
    }

    pub fn adder(name: impl Into<String>, addend: impl Into<Addend>) -> Self {
        Self::new(
            name,
            LinkKind::Adder {
                addend: addend.into(),
            },
        )
    }

    /// An adder named after the chain it reads, looked up lazily in `scope`.
    pub fn dynamic_adder(chain_name: impl Into<String>, scope: Scope) -> Self {
        let chain_name = chain_name.into();
        let reference = Reference::named(chain_name.clone(), scope);
        Self::adder(chain_name, reference)
    }

    /// An adder reading a chain handed in directly.
    pub fn chain_adder(chain: &ChainHandle) -> Self {
        let reference = Reference::to_chain(chain);
        Self::adder(reference.name().to_string(), reference)
    }

    pub fn ability_modifier() -> Self {
        Self::new("abilityModifier", LinkKind::AbilityModifier)
    }

    pub fn good_bab() -> Self {
        Self::new("goodBab", LinkKind::GoodBab)
    }

    pub fn average_bab() -> Self {
        Self::new("averageBab", LinkKind::AverageBab)
    }

    pub fn poor_bab() -> Self {
        Self::new("poorBab", LinkKind::PoorBab)
    }

    pub fn identity(name: impl Into<String>) -> Self {
        Self::new(name, LinkKind::Identity)
    }

    /// Serialize under a registry tag other than the kind's default.
    pub fn with_type_tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        self.type_tag = (tag != self.kind.type_tag()).then_some(tag);
        self
    }

    pub fn type_tag(&self) -> &str {
        self.type_tag
            .as_deref()
            .unwrap_or_else(|| self.kind.type_tag())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn kind(&self) -> &LinkKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut LinkKind {
        &mut self.kind
    }

    pub fn evaluate(&self, previous: Value, ctx: &EvalContext) -> Value {
        self.kind.apply(previous, ctx)
    }

    pub fn value(&self) -> Option<Value> {
        match &self.kind {
            LinkKind::Static { value } => Some(*value),
            _ => None,
        }
    }

    pub fn set_value(&mut self, new_value: Value) -> Result<(), LinkError> {
        match &mut self.kind {
            LinkKind::Static { value } => {
                *value = new_value;
                Ok(())
            }
            _ => Err(self.wrong_kind("static")),
        }
    }

    pub fn multiplier_value(&self) -> Option<Value> {
        match &self.kind {
            LinkKind::Multiplier { multiplier } => Some(*multiplier),
            _ => None,
        }
    }

    pub fn set_multiplier(&mut self, new_multiplier: Value) -> Result<(), LinkError> {
        match &mut self.kind {
            LinkKind::Multiplier { multiplier } => {
                *multiplier = new_multiplier;
                Ok(())
            }
            _ => Err(self.wrong_kind("multiplier")),
        }
    }

    pub fn addend(&self) -> Option<&Addend> {
        match &self.kind {
            LinkKind::Adder { addend } => Some(addend),
            _ => None,
        }
    }

    pub fn set_addend(&mut self, new_addend: impl Into<Addend>) -> Result<(), LinkError> {
        match &mut self.kind {
            LinkKind::Adder { addend } => {
                *addend = new_addend.into();
                Ok(())
            }
            _ => Err(self.wrong_kind("adder")),
        }
    }

    /// Name of the chain a dynamic adder reads.
    pub fn addend_name(&self) -> Option<String> {
        self.addend().and_then(Addend::name)
    }

    /// Look up a declared property by its serialized name.
    pub fn property(&self, key: &str) -> Option<PropertyValue> {
        self.kind.property(key)
    }

    fn wrong_kind(&self, expected: &'static str) -> LinkError {
        LinkError::WrongKind {
            name: self.name.clone(),
            expected,
            found: self.kind.type_tag(),
        }
    }
}

impl Taggable for Link {
    fn tags(&self) -> &Tags {
        &self.tags
    }

    fn tags_mut(&mut self) -> &mut Tags {
        &mut self.tags
    }
}
