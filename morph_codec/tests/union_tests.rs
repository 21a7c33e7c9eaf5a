use morph_codec::{
    Codec, CodecConfig, EnumType, ErrorKind, FieldDescriptor, Instance, RecordType, RecordValue, Schema,
};
use serde_json::json;

fn field(name: &str, expr: &str) -> FieldDescriptor {
    FieldDescriptor::parsed(name, expr).expect("field type")
}

fn event_schema() -> Schema {
    Schema::new()
        .with_record(RecordType::new("Event").with_field(field("kind", "Union[Click, Scroll]")))
        .expect("Event")
        .with_record(
            RecordType::new("Click")
                .with_tag("click")
                .with_field(field("x", "int"))
                .with_field(field("y", "int")),
        )
        .expect("Click")
        .with_record(
            RecordType::new("Scroll")
                .with_tag("scroll")
                .with_field(field("delta", "int")),
        )
        .expect("Scroll")
}

#[test]
fn event_scroll_is_selected_by_tag() {
    let codec = Codec::new(event_schema());
    let event = codec
        .decode("Event", &json!({"kind": {"__tag__": "scroll", "delta": 5}}))
        .expect("decode Event");
    let expected = RecordValue::new("Event").with("kind", RecordValue::new("Scroll").with("delta", 5));
    assert_eq!(event, Instance::Record(expected));
}

#[test]
fn union_arms_write_their_tag() {
    let codec = Codec::new(event_schema());
    let event: Instance = RecordValue::new("Event")
        .with("kind", RecordValue::new("Click").with("x", 1).with("y", 2))
        .into();
    let encoded = codec.encode("Event", &event).expect("encode Event");
    assert_eq!(encoded, json!({"kind": {"__tag__": "click", "x": 1, "y": 2}}));
    assert_eq!(codec.decode("Event", &encoded).expect("decode again"), event);
}

#[test]
fn tag_wins_over_structural_match() {
    let schema = Schema::new()
        .with_record(RecordType::new("Holder").with_field(field("item", "A | B")))
        .expect("Holder")
        .with_record(RecordType::new("A").with_tag("A").with_field(field("val", "int")))
        .expect("A")
        .with_record(RecordType::new("B").with_tag("B").with_field(field("val", "int")))
        .expect("B");
    let codec = Codec::new(schema);
    for _ in 0..3 {
        let holder = codec
            .decode("Holder", &json!({"item": {"__tag__": "B", "val": 1}}))
            .expect("decode");
        let item = holder.as_record().and_then(|h| h.get("item")).expect("item");
        assert_eq!(item.kind_name(), "B");
    }
}

#[test]
fn unknown_tag_names_the_discriminator() {
    let codec = Codec::new(event_schema());
    let err = codec
        .decode("Event", &json!({"kind": {"__tag__": "drag", "delta": 5}}))
        .unwrap_err();
    match err.kind() {
        ErrorKind::UnionMatch { arms, tag_key, tag, .. } => {
            assert_eq!(arms, &vec!["Click".to_string(), "Scroll".to_string()]);
            assert_eq!(tag_key.as_deref(), Some("__tag__"));
            assert_eq!(tag.as_deref(), Some("drag"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(err.path().to_string(), "kind");
}

#[test]
fn untagged_input_tries_arms_in_order() {
    let codec = Codec::new(event_schema());
    let event = codec
        .decode("Event", &json!({"kind": {"delta": -2}}))
        .expect("structural match");
    let kind = event.as_record().and_then(|e| e.get("kind")).expect("kind");
    assert_eq!(kind.kind_name(), "Scroll");

    let err = codec.decode("Event", &json!({"kind": {"speed": 1}})).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::UnionMatch { tag: None, .. }));
}

#[test]
fn field_discriminator_override() {
    let schema = Schema::new()
        .with_record(
            RecordType::new("Envelope")
                .with_field(field("body", "Union[Click, Scroll]").with_discriminator("type")),
        )
        .expect("Envelope")
        .with_record(RecordType::new("Click").with_tag("click").with_field(field("x", "int")))
        .expect("Click")
        .with_record(RecordType::new("Scroll").with_tag("scroll").with_field(field("x", "int")))
        .expect("Scroll");
    let codec = Codec::new(schema);
    let envelope = codec
        .decode("Envelope", &json!({"body": {"type": "scroll", "x": 1}}))
        .expect("decode");
    let body = envelope.as_record().and_then(|e| e.get("body")).expect("body");
    assert_eq!(body.kind_name(), "Scroll");
    assert_eq!(
        codec.encode("Envelope", &envelope).expect("encode"),
        json!({"body": {"type": "scroll", "x": 1}})
    );
}

#[test]
fn untagged_record_arms_need_a_policy() {
    let schema = Schema::new()
        .with_record(RecordType::new("Shape").with_field(field("geometry", "Circle | Square")))
        .expect("Shape")
        .with_record(RecordType::new("Circle").with_field(field("radius", "float")))
        .expect("Circle")
        .with_record(RecordType::new("Square").with_field(field("side", "float")))
        .expect("Square");
    let codec = Codec::new(schema);

    let err = codec.decoder("Shape").unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::InvalidConfiguration { .. }));

    let auto = CodecConfig::new().with_auto_tag(true);
    let shape = codec
        .decode_with("Shape", &json!({"geometry": {"__tag__": "Square", "side": 2}}), &auto)
        .expect("auto tags");
    let geometry = shape.as_record().and_then(|s| s.get("geometry")).expect("geometry");
    assert_eq!(geometry.kind_name(), "Square");
    assert_eq!(
        codec.encode_with("Shape", &shape, &auto).expect("encode"),
        json!({"geometry": {"__tag__": "Square", "side": 2.0}})
    );

    let ambiguous = CodecConfig::new().with_ambiguous_unions(true);
    let shape = codec
        .decode_with("Shape", &json!({"geometry": {"side": 2}}), &ambiguous)
        .expect("tried in order");
    let geometry = shape.as_record().and_then(|s| s.get("geometry")).expect("geometry");
    assert_eq!(geometry.kind_name(), "Square");
}

#[test]
fn scalar_unions_prefer_the_exact_type() {
    let schema = Schema::new()
        .with_record(
            RecordType::new("Cell")
                .with_field(field("value", "int | str | None"))
                .with_field(field("color", "Color | list[int]")),
        )
        .expect("Cell")
        .with_enum(EnumType::new("Color").with_variant("RED", "red").with_variant("BLUE", "blue"))
        .expect("Color");
    let codec = Codec::new(schema);

    let cell = codec.decode("Cell", &json!({"value": "5", "color": "blue"})).expect("decode");
    let cell = cell.as_record().expect("record");
    assert_eq!(cell.get("value"), Some(&Instance::Str("5".into())));
    assert!(matches!(cell.get("color"), Some(Instance::Enum(e)) if e.variant == "BLUE"));

    let cell = codec.decode("Cell", &json!({"value": 5, "color": [1, 2]})).expect("decode");
    let cell = cell.as_record().expect("record");
    assert_eq!(cell.get("value"), Some(&Instance::Int(5)));

    let cell = codec.decode("Cell", &json!({"value": null, "color": "red"})).expect("decode");
    let encoded = codec.encode("Cell", &cell).expect("encode");
    assert_eq!(encoded, json!({"value": null, "color": "red"}));
}
