//! Serialization round trips through the public API.
//!
//! Covers the character JSON shell, link records, chain order independence
//! and rejection of malformed input.

mod common;

use common::setup;
use d20_core::codec::{CharacterRecord, UNKNOWN_TYPE_TAG};
use d20_core::testing::{assert_final, assert_round_trip, finals, sample_fighter};
use d20_core::{
    Chain, Character, Codec, CodecError, EngineConfig, LinkKind, LinkRegistry, Link, Reference,
    Taggable,
};

// =============================================================================
// BASIC ROUND TRIPS
// =============================================================================

#[test]
fn test_static_only_chain() {
    setup();

    let character = Character::new("Joe");
    let mut strength = Chain::new("strength");
    strength.add_link(Link::static_value("base", 100.0), None).unwrap();
    let handle = character.add_chain(strength).unwrap();

    let ctx = character.context();
    assert_eq!(handle.get_final(&ctx), 100.0);
    assert_eq!(handle.eval_at(0, &ctx), 0.0);

    let copy = Character::from_string(&character.serialize().unwrap()).unwrap();
    assert_final(&copy, "strength", 100.0);
    assert_eq!(copy.get_chain_by_name("strength").unwrap().borrow().priorities(), vec![100]);
}

#[test]
fn test_sample_fighter_round_trip() {
    setup();

    let fighter = sample_fighter("Valeros");
    let copy = assert_round_trip(&Codec::default(), &fighter);

    assert_eq!(copy.chain_names(), fighter.chain_names());
    assert!(copy.is_tagged(["fighter", "pc"]));
    assert_final(&copy, "attack", 8.0);
}

#[test]
fn test_round_trip_ignores_chain_order() {
    setup();

    let codec = Codec::default();
    let fighter = sample_fighter("Valeros");
    let mut record = codec.to_record(&fighter);

    for rotation in 0..record.chainables.len() {
        record.chainables.rotate_left(1);
        let text = serde_json::to_string(&record).unwrap();
        let copy = codec.decode(&text).unwrap();
        assert_eq!(finals(&copy), finals(&fighter), "rotation {rotation}");
    }

    record.chainables.reverse();
    let copy = codec.decode_record(record).unwrap();
    assert_eq!(finals(&copy), finals(&fighter));
}

#[test]
fn test_pretty_output_decodes() {
    setup();

    let codec = Codec::new(
        LinkRegistry::builtin(),
        EngineConfig::new().with_pretty(true),
    )
    .unwrap();
    let fighter = sample_fighter("Valeros");

    let text = codec.encode(&fighter).unwrap();
    assert!(text.contains('\n'));
    assert_round_trip(&codec, &fighter);
}

#[test]
fn test_partials_are_not_written() {
    setup();

    let fighter = sample_fighter("Valeros");
    // Evaluate so every partial is cached
    let before = finals(&fighter);
    let text = fighter.serialize().unwrap();

    let copy = Character::from_string(&text).unwrap();
    let handle = copy.get_chain_by_name("attack").unwrap();
    assert_eq!(handle.borrow().partial(0), None);

    assert_eq!(finals(&copy), before);
    assert_eq!(handle.borrow().partial(0), Some(5.0));
}

// =============================================================================
// SEEDS AND RENAMES
// =============================================================================

#[test]
fn test_initial_and_start_are_kept() {
    setup();

    let character = Character::new("Joe");
    let mut con = Chain::new("con");
    con.add_link(Link::static_value("base", 14.0), None).unwrap();
    character.add_chain(con).unwrap();

    let mut hp = Chain::with_initial("hp", 6.0);
    hp.add_link(Link::adder("toughness", 3.0), None).unwrap();
    character.add_chain(hp).unwrap();

    let mut grapple = Chain::with_initial("grapple", -1.0);
    grapple.start_with(Reference::named("con", character.scope()));
    grapple.add_link(Link::adder("bonus", 1.0), None).unwrap();
    character.add_chain(grapple).unwrap();

    let copy = assert_round_trip(&Codec::default(), &character);
    assert_final(&copy, "hp", 9.0);
    assert_final(&copy, "grapple", 15.0);

    let grapple = copy.get_chain_by_name("grapple").unwrap();
    assert_eq!(grapple.borrow().initial(), -1.0);
    assert_eq!(
        grapple.borrow().start_reference().map(Reference::name),
        Some("con")
    );
}

#[test]
fn test_renamed_target_serializes_new_name() {
    setup();

    let character = Character::new("Joe");
    let mut strength = Chain::new("str");
    strength.add_link(Link::static_value("base", 18.0), None).unwrap();
    let handle = character.add_chain(strength).unwrap();

    let mut damage = Chain::new("damage");
    damage.add_link(Link::chain_adder(&handle), None).unwrap();
    character.add_chain(damage).unwrap();

    handle.borrow_mut().set_name("strength");

    let text = character.serialize().unwrap();
    assert!(text.contains("adder:name=str;addend=strength"), "{text}");

    let copy = Character::from_string(&text).unwrap();
    assert_final(&copy, "damage", 18.0);
}

#[test]
fn test_rank_band_applies_after_decode() {
    setup();

    let codec = Codec::new(
        LinkRegistry::builtin(),
        EngineConfig::new().with_rank_band(10),
    )
    .unwrap();
    let copy = codec.decode(&sample_fighter("Valeros").serialize().unwrap()).unwrap();

    let handle = copy.get_chain_by_name("strength").unwrap();
    handle
        .borrow_mut()
        .add_link(Link::adder("belt", 2.0), None).unwrap();
    assert_eq!(handle.borrow().priorities(), vec![100, 110]);
    assert_final(&copy, "strMod", 4.0);
}

// =============================================================================
// UNKNOWN AND MALFORMED INPUT
// =============================================================================

#[test]
fn test_unknown_type_keeps_chain() {
    setup();

    let text = r#"{
        "name": "Joe",
        "chainables": [{
            "name": "dexterity",
            "chainTuples": [
                ["static:name=base;value=14", 100],
                ["nonexistent:name=mystery;power=9000", 200],
                ["adder:name=gloves;addend=2", 300]
            ]
        }]
    }"#;

    let character = Character::from_string(text).unwrap();
    assert_final(&character, "dexterity", 16.0);

    let handle = character.get_chain_by_name("dexterity").unwrap();
    let chain = handle.borrow();
    let stand_in = chain.link(1).unwrap();
    assert!(matches!(stand_in.kind(), LinkKind::Identity));
    assert_eq!(stand_in.name(), "mystery");
    assert!(stand_in.is_tagged([UNKNOWN_TYPE_TAG]));
}

#[test]
fn test_malformed_link_rejects_import() {
    setup();

    let text = r#"{
        "name": "Joe",
        "chainables": [
            {"name": "strength", "chainTuples": [["static:name=base;value=16", 100]]},
            {"name": "dexterity", "chainTuples": [["static:name=base;value=lots", 100]]}
        ]
    }"#;

    let err = Character::from_string(text).unwrap_err();
    assert!(matches!(err, CodecError::MalformedRecord(_)), "{err}");
}

#[test]
fn test_priorities_at_the_limit() {
    setup();

    let colliding = r#"{"name": "Joe", "chainables": [{"name": "hp", "chainTuples": [
        ["static:name=base;value=8", 9223372036854775807],
        ["adder:name=con;addend=2", 9223372036854775807]
    ]}]}"#;
    let err = Character::from_string(colliding).unwrap_err();
    assert!(matches!(err, CodecError::MalformedRecord(_)), "{err}");

    // A single link at the limit imports, but leaves no band for the next one
    let last = r#"{"name": "Joe", "chainables": [{"name": "hp", "chainTuples": [
        ["static:name=base;value=8", 9223372036854775807]
    ]}]}"#;
    let character = Character::from_string(last).unwrap();
    assert_final(&character, "hp", 8.0);

    let handle = character.get_chain_by_name("hp").unwrap();
    let added = handle
        .borrow_mut()
        .add_link(Link::adder("belt", 2.0), None)
        .is_ok();
    assert!(!added);
    assert_final(&character, "hp", 8.0);
}

#[test]
fn test_malformed_json_rejects_import() {
    setup();

    for text in ["", "[]", r#"{"chainables": []}"#, r#"{"name": "Joe", "chainables": 3}"#] {
        let err = text.parse::<Character>().unwrap_err();
        assert!(matches!(err, CodecError::Json(_)), "{text}: {err}");
    }
}

#[test]
fn test_record_fields_are_public() {
    setup();

    let record: CharacterRecord = serde_json::from_str(
        r#"{"name": "Joe", "tags": ["npc"], "chainables": [
            {"name": "ac", "initial": 10, "chainTuples": [["adder:name=shield;addend=2", 100]]}
        ]}"#,
    )
    .unwrap();

    assert_eq!(record.chainables[0].initial, 10.0);
    assert_eq!(record.chainables[0].starts_with, None);

    let character = Codec::default().decode_record(record).unwrap();
    assert!(character.is_tagged(["npc"]));
    assert_final(&character, "ac", 12.0);
}
