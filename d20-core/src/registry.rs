//! Link registry: maps serialized type tags to link constructors.
//!
//! The codec looks up a record's tag here to rebuild the link, and to learn
//! which properties to write when serializing. Registration is explicit:
//! build a registry (usually starting from [`LinkRegistry::builtin`]),
//! register any extra tags, and hand it to a [`Codec`](crate::codec::Codec).

use crate::character::Character;
use crate::codec::{self, CodecError};
use crate::link::{Addend, KindDescriptor, Link, LinkKind, Value};
use crate::reference::Reference;
use crate::tags::Taggable;
use std::collections::BTreeMap;

lazy_static::lazy_static! {
    /// The registry holding every built-in link kind.
    pub static ref BUILTIN_REGISTRY: LinkRegistry = LinkRegistry::builtin();
}

/// Builds a link from its parsed record.
pub type LinkConstructor = fn(&LinkFields, &Character) -> Result<Link, CodecError>;

/// A registered link type.
#[derive(Debug, Clone)]
pub struct LinkType {
    pub constructor: LinkConstructor,
    /// Properties written to, and expected in, serialized records.
    pub properties: Vec<String>,
}

/// The parsed `key=value` pairs of one link record.
///
/// Values are kept in their escaped form so a number can be told apart from
/// a chain name that merely looks like one.
#[derive(Debug, Clone, Default)]
pub struct LinkFields {
    tag: String,
    name: Option<String>,
    pairs: Vec<(String, String)>,
}

impl LinkFields {
    pub(crate) fn new(tag: String, pairs: Vec<(String, String)>) -> Self {
        Self {
            tag,
            name: None,
            pairs,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The link's name: explicit, inferred from an elided property, or the tag.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.tag)
    }

    fn raw(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.raw(key).is_some()
    }

    /// Unescaped text of a field.
    pub fn text(&self, key: &str) -> Result<Option<String>, CodecError> {
        self.raw(key).map(codec::unescape).transpose()
    }

    /// A required numeric field.
    pub fn number(&self, key: &str) -> Result<Value, CodecError> {
        let raw = self.require(key)?;
        codec::parse_number(raw).ok_or_else(|| {
            CodecError::malformed(format!("{}: '{key}' is not a number: {raw}", self.tag))
        })
    }

    /// A required addend: a literal number, or a chain name resolved lazily
    /// against `character`.
    pub fn addend(&self, key: &str, character: &Character) -> Result<Addend, CodecError> {
        let raw = self.require(key)?;
        match codec::parse_number(raw) {
            Some(value) => Ok(Addend::Literal(value)),
            None => {
                let name = codec::unescape(raw)?;
                Ok(Addend::Chain(Reference::named(name, character.scope())))
            }
        }
    }

    /// Comma-separated tags, if any.
    pub fn tags(&self) -> Result<Vec<String>, CodecError> {
        match self.raw("tags") {
            Some(raw) if !raw.is_empty() => raw.split(',').map(codec::unescape).collect(),
            _ => Ok(Vec::new()),
        }
    }

    fn require(&self, key: &str) -> Result<&str, CodecError> {
        self.raw(key).ok_or_else(|| {
            CodecError::malformed(format!("{}: missing property '{key}'", self.tag))
        })
    }

    /// Settle the link name: an explicit `name` wins, otherwise the first
    /// declared property holding a chain name (the elided case).
    fn infer_name(&mut self, properties: &[String]) -> Result<(), CodecError> {
        if let Some(name) = self.text("name")? {
            self.name = Some(name);
            return Ok(());
        }

        for property in properties {
            if let Some(raw) = self.raw(property) {
                if codec::parse_number(raw).is_none() {
                    self.name = Some(codec::unescape(raw)?);
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

/// Table of link types keyed by tag.
#[derive(Debug, Clone, Default)]
pub struct LinkRegistry {
    types: BTreeMap<String, LinkType>,
}

impl LinkRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in link kind.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for descriptor in LinkKind::catalog() {
            if let Some(constructor) = builtin_constructor(descriptor.tag) {
                registry.register(descriptor.tag, constructor, descriptor.properties);
            }
        }
        registry
    }

    /// Register a tag, replacing any earlier registration of the same tag.
    pub fn register(
        &mut self,
        tag: impl Into<String>,
        constructor: LinkConstructor,
        properties: &[&str],
    ) {
        let tag = tag.into();
        let replaced = self
            .types
            .insert(
                tag.clone(),
                LinkType {
                    constructor,
                    properties: properties.iter().map(|p| p.to_string()).collect(),
                },
            )
            .is_some();
        tracing::debug!(tag = %tag, replaced, "link type registered");
    }

    pub fn get(&self, tag: &str) -> Option<&LinkType> {
        self.types.get(tag)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.types.contains_key(tag)
    }

    pub fn properties(&self, tag: &str) -> Option<&[String]> {
        self.types.get(tag).map(|t| t.properties.as_slice())
    }

    /// Registered tags in sorted order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Descriptions of the built-in kinds.
    pub fn catalog(&self) -> &'static [KindDescriptor] {
        LinkKind::catalog()
    }

    /// Rebuild a link from its parsed record.
    ///
    /// Fails with [`CodecError::UnknownLinkType`] when the tag is not
    /// registered; the caller decides whether that is fatal.
    pub fn from_representation(
        &self,
        mut fields: LinkFields,
        character: &Character,
    ) -> Result<Link, CodecError> {
        let link_type = self
            .types
            .get(fields.tag())
            .ok_or_else(|| CodecError::UnknownLinkType(fields.tag().to_string()))?;

        fields.infer_name(&link_type.properties)?;
        let mut link = (link_type.constructor)(&fields, character)?.with_type_tag(fields.tag());
        link.tag(fields.tags()?);
        Ok(link)
    }
}

fn builtin_constructor(tag: &str) -> Option<LinkConstructor> {
    let constructor: LinkConstructor = match tag {
        "static" => construct_static,
        "multiplier" => construct_multiplier,
        "adder" => construct_adder,
        "abilityModifier" => |fields, _| Ok(Link::new(fields.name(), LinkKind::AbilityModifier)),
        "goodBab" => |fields, _| Ok(Link::new(fields.name(), LinkKind::GoodBab)),
        "averageBab" => |fields, _| Ok(Link::new(fields.name(), LinkKind::AverageBab)),
        "poorBab" => |fields, _| Ok(Link::new(fields.name(), LinkKind::PoorBab)),
        "identity" => |fields, _| Ok(Link::identity(fields.name())),
        _ => return None,
    };
    Some(constructor)
}

fn construct_static(fields: &LinkFields, _: &Character) -> Result<Link, CodecError> {
    Ok(Link::static_value(fields.name(), fields.number("value")?))
}

fn construct_multiplier(fields: &LinkFields, _: &Character) -> Result<Link, CodecError> {
    Ok(Link::multiplier(fields.name(), fields.number("multiplier")?))
}

fn construct_adder(fields: &LinkFields, character: &Character) -> Result<Link, CodecError> {
    Ok(Link::adder(
        fields.name(),
        fields.addend("addend", character)?,
    ))
}
