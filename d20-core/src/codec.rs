//! Text serialization of characters, chains and links.
//!
//! A link serializes to a tagged record:
//!
//! ```text
//! type:key1=val1;key2=val2;...
//! ```
//!
//! where `type` is its registry tag and the keys are the properties the
//! registry declares for that tag. Numbers are written bare; chain-valued
//! properties are written as the referenced chain's name. A `name` pair is
//! written first unless the first chain-valued property already equals the
//! link's name, and a `tags` pair holds comma-joined tags when there are any.
//! The characters `% : ; = ,` are percent-escaped, and a chain name that
//! would read back as a number has its first character escaped too.
//!
//! Chains and characters wrap those records in JSON:
//!
//! ```text
//! {"name": "Joe", "tags": [], "chainables": [
//!     {"name": "strMod", "chainTuples": [["adder:addend=strength", 100], ...]}
//! ]}
//! ```
//!
//! Cached partial values are never written.

use crate::chain::{Chain, Priority};
use crate::character::Character;
use crate::config::{ConfigError, EngineConfig};
use crate::link::{Link, PropertyValue, Value};
use crate::reference::Reference;
use crate::registry::{LinkFields, LinkRegistry, BUILTIN_REGISTRY};
use crate::tags::Taggable;
use serde::{Deserialize, Serialize};
use thiserror::Error;

lazy_static::lazy_static! {
    static ref DEFAULT_CODEC: Codec = Codec::default();
}

/// Tag added to identity links that stand in for unknown record types.
pub const UNKNOWN_TYPE_TAG: &str = "unknownType";

const RESERVED: &[char] = &['%', ':', ';', '=', ','];

/// Errors from encoding and decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown link type: {0}")]
    UnknownLinkType(String),
}

impl CodecError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        CodecError::MalformedRecord(message.into())
    }
}

/// Codec using the built-in registry and default config.
pub fn default_codec() -> &'static Codec {
    &DEFAULT_CODEC
}

/// Serialized form of a character.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterRecord {
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub chainables: Vec<ChainRecord>,
}

/// Serialized form of a chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub initial: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_with: Option<String>,
    pub chain_tuples: Vec<(String, Priority)>,
}

fn is_zero(value: &Value) -> bool {
    *value == 0.0
}

/// Encoder/decoder bound to a link registry.
#[derive(Debug, Clone)]
pub struct Codec {
    registry: LinkRegistry,
    config: EngineConfig,
}

impl Default for Codec {
    fn default() -> Self {
        Self {
            registry: BUILTIN_REGISTRY.clone(),
            config: EngineConfig::default(),
        }
    }
}

impl Codec {
    pub fn new(registry: LinkRegistry, config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { registry, config })
    }

    /// A codec over `registry` with the default config.
    pub fn with_registry(registry: LinkRegistry) -> Self {
        Self {
            registry,
            config: EngineConfig::default(),
        }
    }

    pub fn registry(&self) -> &LinkRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn encode(&self, character: &Character) -> Result<String, CodecError> {
        let record = self.to_record(character);
        let text = if self.config.pretty {
            serde_json::to_string_pretty(&record)?
        } else {
            serde_json::to_string(&record)?
        };
        Ok(text)
    }

    pub fn to_record(&self, character: &Character) -> CharacterRecord {
        CharacterRecord {
            name: character.name().to_string(),
            tags: character.tags().iter().map(str::to_string).collect(),
            chainables: character
                .chains()
                .iter()
                .map(|handle| self.chain_record(&handle.borrow()))
                .collect(),
        }
    }

    pub fn chain_record(&self, chain: &Chain) -> ChainRecord {
        ChainRecord {
            name: chain.name().to_string(),
            initial: chain.initial(),
            starts_with: chain.start_reference().map(Reference::current_name),
            chain_tuples: chain
                .entries()
                .iter()
                .map(|entry| (self.encode_link(entry.link()), entry.priority()))
                .collect(),
        }
    }

    pub fn encode_link(&self, link: &Link) -> String {
        let properties: Vec<&str> = match self.registry.properties(link.type_tag()) {
            Some(properties) => properties.iter().map(String::as_str).collect(),
            None => link.kind().declared_properties().to_vec(),
        };

        let values: Vec<(&str, PropertyValue)> = properties
            .into_iter()
            .filter_map(|key| link.property(key).map(|value| (key, value)))
            .collect();

        // The decoder infers a missing name from the first chain-valued property.
        let name_elided = values
            .iter()
            .find_map(|(_, value)| match value {
                PropertyValue::Chain(name) => Some(name.as_str()),
                PropertyValue::Number(_) => None,
            })
            .is_some_and(|name| name == link.name());

        let mut pairs = Vec::new();
        if !name_elided {
            pairs.push(format!("name={}", escape(link.name())));
        }
        for (key, value) in &values {
            pairs.push(format!("{}={}", escape(key), encode_value(value)));
        }
        if !link.tags().is_empty() {
            let tags: Vec<String> = link.tags().iter().map(escape).collect();
            pairs.push(format!("tags={}", tags.join(",")));
        }

        format!("{}:{}", escape(link.type_tag()), pairs.join(";"))
    }

    /// Rebuild a character. Any malformed part fails the whole import.
    pub fn decode(&self, text: &str) -> Result<Character, CodecError> {
        let record: CharacterRecord = serde_json::from_str(text)?;
        self.decode_record(record)
    }

    pub fn decode_record(&self, record: CharacterRecord) -> Result<Character, CodecError> {
        let mut character = Character::new(record.name);
        character.tag(record.tags);

        for chain_record in record.chainables {
            let mut chain = Chain::with_config(chain_record.name, &self.config);
            chain.set_initial(chain_record.initial);
            if let Some(start) = chain_record.starts_with {
                chain.start_with(Reference::named(start, character.scope()));
            }

            for (link_record, priority) in &chain_record.chain_tuples {
                let link = self.decode_link(link_record, &character)?;
                chain
                    .add_link(link, Some(*priority))
                    .map_err(|err| CodecError::malformed(err.to_string()))?;
            }

            character
                .add_chain(chain)
                .map_err(|err| CodecError::malformed(err.to_string()))?;
        }

        tracing::debug!(
            character = %character.name(),
            chains = character.len(),
            "character decoded"
        );
        Ok(character)
    }

    /// Rebuild one link, substituting an identity link for an unknown type
    /// unless the config is strict.
    pub fn decode_link(&self, record: &str, character: &Character) -> Result<Link, CodecError> {
        let fields = parse_record(record)?;

        match self.registry.from_representation(fields.clone(), character) {
            Err(CodecError::UnknownLinkType(tag)) if !self.config.strict_link_types => {
                tracing::warn!(tag = %tag, "unknown link type, substituting identity link");
                let name = fields.text("name")?.unwrap_or(tag);
                let mut link = Link::identity(name);
                link.tag(fields.tags()?);
                link.tag([UNKNOWN_TYPE_TAG]);
                Ok(link)
            }
            result => result,
        }
    }
}

/// Split a `type:key=value;...` record into its tag and raw pairs.
pub fn parse_record(record: &str) -> Result<LinkFields, CodecError> {
    let (tag, body) = record.split_once(':').unwrap_or((record, ""));
    let tag = unescape(tag)?;
    if tag.is_empty() {
        return Err(CodecError::malformed(format!("missing type in '{record}'")));
    }

    let mut pairs: Vec<(String, String)> = Vec::new();
    for segment in body.split(';').filter(|s| !s.is_empty()) {
        let (key, value) = segment.split_once('=').ok_or_else(|| {
            CodecError::malformed(format!("expected key=value in '{record}', found '{segment}'"))
        })?;
        let key = unescape(key)?;
        if pairs.iter().any(|(k, _)| *k == key) {
            return Err(CodecError::malformed(format!(
                "duplicate key '{key}' in '{record}'"
            )));
        }
        pairs.push((key, value.to_string()));
    }

    Ok(LinkFields::new(tag, pairs))
}

/// A bare number, as written for numeric properties.
pub fn parse_number(raw: &str) -> Option<Value> {
    raw.parse::<Value>().ok()
}

fn encode_value(value: &PropertyValue) -> String {
    match value {
        PropertyValue::Number(number) => number.to_string(),
        PropertyValue::Chain(name) => encode_name(name),
    }
}

/// Escape a chain name so it can never be read back as a number.
fn encode_name(name: &str) -> String {
    let escaped = escape(name);
    if parse_number(&escaped).is_none() {
        return escaped;
    }
    let mut chars = escaped.chars();
    match chars.next() {
        Some(first) => format!("%{:02X}{}", first as u32, chars.as_str()),
        None => escaped,
    }
}

/// Percent-escape the record delimiters.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if RESERVED.contains(&ch) {
            out.push_str(&format!("%{:02X}", ch as u32));
        } else {
            out.push(ch);
        }
    }
    out
}

pub fn unescape(text: &str) -> Result<String, CodecError> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let byte = text
                .get(i + 1..i + 3)
                .filter(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit()))
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                .ok_or_else(|| CodecError::malformed(format!("bad escape in '{text}'")))?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| CodecError::malformed(format!("bad escape in '{text}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::LinkKind;
    use crate::reference::EvalContext;

    #[test]
    fn test_static_record() {
        let codec = Codec::default();
        let link = Link::static_value("base", 10.0);
        assert_eq!(codec.encode_link(&link), "static:name=base;value=10");
    }

    #[test]
    fn test_fractional_and_negative_numbers() {
        let codec = Codec::default();
        assert_eq!(
            codec.encode_link(&Link::multiplier("half", 0.5)),
            "multiplier:name=half;multiplier=0.5"
        );
        assert_eq!(
            codec.encode_link(&Link::adder("penalty", -2.0)),
            "adder:name=penalty;addend=-2"
        );
    }

    #[test]
    fn test_dynamic_adder_elides_name() {
        let codec = Codec::default();
        let character = Character::new("Joe");
        let link = Link::dynamic_adder("strMod", character.scope());
        assert_eq!(codec.encode_link(&link), "adder:addend=strMod");

        let mut renamed = Link::dynamic_adder("strMod", character.scope());
        renamed.set_name("melee");
        assert_eq!(codec.encode_link(&renamed), "adder:name=melee;addend=strMod");
    }

    #[test]
    fn test_tags_are_joined() {
        let codec = Codec::default();
        let mut link = Link::ability_modifier();
        link.tag(["derived", "a,b"]);
        assert_eq!(
            codec.encode_link(&link),
            "abilityModifier:name=abilityModifier;tags=derived,a%2Cb"
        );
    }

    #[test]
    fn test_link_record_decodes() {
        let codec = Codec::default();
        let character = Character::new("Joe");

        let link = codec
            .decode_link("multiplier:name=half;multiplier=0.5;tags=x", &character)
            .unwrap();
        assert_eq!(link.name(), "half");
        assert_eq!(link.multiplier_value(), Some(0.5));
        assert!(link.is_tagged(["x"]));

        let link = codec.decode_link("goodBab", &character).unwrap();
        assert!(matches!(link.kind(), LinkKind::GoodBab));
        assert_eq!(link.name(), "goodBab");
    }

    #[test]
    fn test_reserved_characters_round_trip() {
        let codec = Codec::default();
        let character = Character::new("Joe");
        let link = Link::static_value("a=b;c:d,e%f", 3.0);

        let record = codec.encode_link(&link);
        let decoded = codec.decode_link(&record, &character).unwrap();
        assert_eq!(decoded.name(), "a=b;c:d,e%f");
        assert_eq!(decoded.value(), Some(3.0));
    }

    #[test]
    fn test_numeric_chain_name_stays_a_name() {
        let codec = Codec::default();
        let character = Character::new("Joe");
        let mut five = Chain::new("5");
        five.add_link(Link::static_value("base", 7.0), None).unwrap();
        character.add_chain(five).unwrap();

        let link = Link::dynamic_adder("5", character.scope());
        let record = codec.encode_link(&link);
        assert_eq!(record, "adder:addend=%35");

        let decoded = codec.decode_link(&record, &character).unwrap();
        assert_eq!(decoded.addend_name().as_deref(), Some("5"));
        assert_eq!(decoded.evaluate(1.0, &EvalContext::new()), 8.0);
    }

    #[test]
    fn test_unknown_type_becomes_identity() {
        let codec = Codec::default();
        let character = Character::new("Joe");

        let link = codec
            .decode_link("nonexistent:name=mystery;power=9000", &character)
            .unwrap();

        assert!(matches!(link.kind(), LinkKind::Identity));
        assert_eq!(link.name(), "mystery");
        assert!(link.is_tagged([UNKNOWN_TYPE_TAG]));
        assert_eq!(link.evaluate(12.0, &EvalContext::new()), 12.0);
    }

    #[test]
    fn test_strict_config_rejects_unknown_type() {
        let codec = Codec::new(
            LinkRegistry::builtin(),
            EngineConfig::new().with_strict_link_types(true),
        )
        .unwrap();
        let character = Character::new("Joe");

        let err = codec.decode_link("nonexistent:", &character).unwrap_err();
        assert!(matches!(err, CodecError::UnknownLinkType(_)));
    }

    #[test]
    fn test_malformed_records() {
        let codec = Codec::default();
        let character = Character::new("Joe");

        for record in [
            ":value=1",
            "static:value",
            "static:name=a;name=b;value=1",
            "static:name=a;value=ten",
            "static:name=bad%2;value=1",
        ] {
            let err = codec.decode_link(record, &character).unwrap_err();
            assert!(
                matches!(err, CodecError::MalformedRecord(_)),
                "{record}: {err:?}"
            );
        }
    }

    #[test]
    fn test_chain_record_shape() {
        let codec = Codec::default();
        let character = Character::new("Joe");
        let mut chain = Chain::with_initial("hp", 4.0);
        chain.start_with(Reference::named("con", character.scope()));
        chain.add_link(Link::adder("toughness", 3.0), None).unwrap();

        let json = serde_json::to_value(codec.chain_record(&chain)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "hp",
                "initial": 4.0,
                "startsWith": "con",
                "chainTuples": [["adder:name=toughness;addend=3", 100]],
            })
        );
    }

    #[test]
    fn test_character_shape() {
        let mut character = Character::new("Joe");
        character.tag(["pc"]);
        let mut strength = Chain::new("strength");
        strength.add_link(Link::static_value("base", 16.0), None).unwrap();
        character.add_chain(strength).unwrap();

        let text = Codec::default().encode(&character).unwrap();
        assert_eq!(
            text,
            r#"{"name":"Joe","tags":["pc"],"chainables":[{"name":"strength","chainTuples":[["static:name=base;value=16",100]]}]}"#
        );
    }

    #[test]
    fn test_decode_rejects_bad_json() {
        let err = Codec::default().decode("{\"name\": \"Joe\"").unwrap_err();
        assert!(matches!(err, CodecError::Json(_)));

        let err = Codec::default()
            .decode(r#"{"name": "Joe", "chainables": [{"name": "x"}]}"#)
            .unwrap_err();
        assert!(matches!(err, CodecError::Json(_)));
    }

    #[test]
    fn test_decode_rejects_duplicate_chain_names() {
        let text = r#"{"name": "Joe", "chainables": [
            {"name": "hp", "chainTuples": []},
            {"name": "hp", "chainTuples": []}
        ]}"#;
        let err = Codec::default().decode(text).unwrap_err();
        assert!(matches!(err, CodecError::MalformedRecord(_)));
    }

    #[test]
    fn test_decode_rejects_priority_overflow() {
        let text = r#"{"name": "Joe", "chainables": [{"name": "hp", "chainTuples": [
            ["static:name=a;value=1", 9223372036854775807],
            ["static:name=b;value=2", 9223372036854775807]
        ]}]}"#;
        let err = Codec::default().decode(text).unwrap_err();
        assert!(matches!(err, CodecError::MalformedRecord(message) if message.contains("hp")));
    }

    #[test]
    fn test_escape_needs_two_hex_digits() {
        for text in ["%+1", "%-1", "% 1", "%4", "%zz"] {
            assert!(
                matches!(unescape(text), Err(CodecError::MalformedRecord(_))),
                "{text} should be rejected"
            );
        }
        assert_eq!(unescape("%2b%2B").unwrap(), "++");
    }

    #[test]
    fn test_escape_round_trip() {
        for text in ["plain", "a%b", "x:y;z=w,v", "", "ünïcode"] {
            assert_eq!(unescape(&escape(text)).unwrap(), text);
        }
    }
}
