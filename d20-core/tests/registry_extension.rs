//! Registering extra link tags and persisting links under them.

mod common;

use common::setup;
use d20_core::codec::UNKNOWN_TYPE_TAG;
use d20_core::testing::{assert_final, assert_round_trip};
use d20_core::{
    Chain, Character, Codec, CodecError, EngineConfig, LinkFields, LinkKind, LinkRegistry, Link,
    Taggable,
};

fn construct_halve(fields: &LinkFields, _: &Character) -> Result<Link, CodecError> {
    Ok(Link::multiplier(fields.name(), 0.5))
}

fn construct_enhancement(fields: &LinkFields, character: &Character) -> Result<Link, CodecError> {
    Ok(Link::adder(fields.name(), fields.addend("addend", character)?))
}

fn extended_registry() -> LinkRegistry {
    let mut registry = LinkRegistry::builtin();
    registry.register("halve", construct_halve, &[]);
    registry.register("enhancement", construct_enhancement, &["addend"]);
    registry
}

fn character_with_custom_links() -> Character {
    let character = Character::new("Joe");

    let mut speed = Chain::new("speed");
    speed.add_link(Link::static_value("base", 30.0), None).unwrap();
    speed.add_link(Link::multiplier("encumbered", 0.5).with_type_tag("halve"), None).unwrap();
    character.add_chain(speed).unwrap();

    let mut sword = Chain::new("swordAttack");
    sword.add_link(
        Link::adder("enchant", 2.0).with_type_tag("enhancement"),
        None,
    ).unwrap();
    character.add_chain(sword).unwrap();

    character
}

#[test]
fn test_custom_tags_round_trip() {
    setup();

    let codec = Codec::with_registry(extended_registry());
    let character = character_with_custom_links();

    let text = codec.encode(&character).unwrap();
    assert!(text.contains("halve:name=encumbered"), "{text}");
    assert!(text.contains("enhancement:name=enchant;addend=2"), "{text}");

    let copy = assert_round_trip(&codec, &character);
    assert_final(&copy, "speed", 15.0);

    let speed = copy.get_chain_by_name("speed").unwrap();
    assert_eq!(speed.borrow().link(1).unwrap().type_tag(), "halve");
}

#[test]
fn test_builtin_codec_substitutes_identity() {
    setup();

    let text = Codec::with_registry(extended_registry())
        .encode(&character_with_custom_links())
        .unwrap();

    let copy = Character::from_string(&text).unwrap();
    assert_final(&copy, "speed", 30.0);
    assert_final(&copy, "swordAttack", 0.0);

    let speed = copy.get_chain_by_name("speed").unwrap();
    let chain = speed.borrow();
    let stand_in = chain.link(1).unwrap();
    assert!(matches!(stand_in.kind(), LinkKind::Identity));
    assert_eq!(stand_in.name(), "encumbered");
    assert!(stand_in.is_tagged([UNKNOWN_TYPE_TAG]));
}

#[test]
fn test_strict_codec_rejects_unknown_tag() {
    setup();

    let text = Codec::with_registry(extended_registry())
        .encode(&character_with_custom_links())
        .unwrap();

    let strict = Codec::new(
        LinkRegistry::builtin(),
        EngineConfig::new().with_strict_link_types(true),
    )
    .unwrap();
    let err = strict.decode(&text).unwrap_err();
    assert!(matches!(err, CodecError::UnknownLinkType(tag) if tag == "halve"));
}

#[test]
fn test_reregistering_replaces_constructor() {
    setup();

    let mut registry = extended_registry();
    registry.register(
        "halve",
        |fields, _| Ok(Link::multiplier(fields.name(), 0.25)),
        &[],
    );

    let codec = Codec::with_registry(registry);
    let text = codec.encode(&character_with_custom_links()).unwrap();
    let copy = codec.decode(&text).unwrap();
    assert_final(&copy, "speed", 7.5);
}

#[test]
fn test_invalid_config_rejected() {
    let err = Codec::new(LinkRegistry::builtin(), EngineConfig::new().with_rank_band(0))
        .unwrap_err();
    assert_eq!(err.to_string(), "Rank band must be positive, got 0");
}
