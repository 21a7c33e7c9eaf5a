use morph_codec::{
    Codec, CodecConfig, ErrorKind, FieldDescriptor, Instance, KeyCasing, RecordType, RecordValue, Schema,
};
use serde_json::json;

fn field(name: &str, expr: &str) -> FieldDescriptor {
    FieldDescriptor::parsed(name, expr).expect("field type")
}

#[test]
fn point_encodes_under_snake_case() {
    let schema = Schema::new()
        .with_record(
            RecordType::new("Point")
                .with_field(field("x", "int"))
                .with_field(field("y", "int")),
        )
        .expect("Point");
    let codec = Codec::new(schema);
    let decoded = codec
        .decode_with(
            "Point",
            &json!({"X": "3", "y": 4}),
            &CodecConfig::new().with_decode_casing(KeyCasing::CaseInsensitive),
        )
        .expect("decode");
    let encoded = codec
        .encode_with("Point", &decoded, &CodecConfig::new().with_encode_casing(KeyCasing::Snake))
        .expect("encode");
    assert_eq!(encoded, json!({"x": 3, "y": 4}));
}

fn defaults_schema() -> Schema {
    Schema::new()
        .with_record(
            RecordType::new("Options")
                .with_field(field("retries", "int").with_default(3))
                .with_field(field("verbose", "bool").with_default(false))
                .with_field(field("label", "Optional[str]").with_default(Instance::Null))
                .with_field(field("paths", "list[str]").with_factory(|| Instance::Seq(Vec::new())))
                .with_field(field("mode", "str").with_declared_default(json!("auto"))),
        )
        .expect("Options")
}

#[test]
fn defaults_are_elided_when_asked() {
    let codec = Codec::new(defaults_schema());
    let options = codec.decode("Options", &json!({})).expect("decode defaults");

    let all = codec.encode("Options", &options).expect("encode");
    assert_eq!(
        all,
        json!({"retries": 3, "verbose": false, "label": null, "paths": [], "mode": "auto"})
    );

    let elided = codec
        .encode_with("Options", &options, &CodecConfig::new().with_omit_default(true))
        .expect("encode without defaults");
    assert_eq!(elided, json!({}));

    let changed = RecordValue::new("Options")
        .with("retries", 5)
        .with("verbose", false)
        .with("label", Instance::Null)
        .with("paths", Instance::Seq(Vec::new()))
        .with("mode", "auto");
    let elided = codec
        .encode_with("Options", &changed.into(), &CodecConfig::new().with_omit_default(true))
        .expect("encode changed");
    assert_eq!(elided, json!({"retries": 5}));
}

#[test]
fn skip_rules_omit_fields() {
    let schema = Schema::new()
        .with_record(
            RecordType::new("User")
                .with_field(field("name", "str"))
                .with_field(field("password", "str").skip_always())
                .with_field(field("nickname", "Optional[str]").skip_if_none())
                .with_field(field("score", "int").skip_when(|v| v.as_i64() == Some(-1))),
        )
        .expect("User");
    let codec = Codec::new(schema);
    let user = RecordValue::new("User")
        .with("name", "ada")
        .with("password", "secret")
        .with("nickname", Instance::Null)
        .with("score", -1);
    assert_eq!(codec.encode("User", &user.into()).expect("encode"), json!({"name": "ada"}));

    let user = RecordValue::new("User")
        .with("name", "ada")
        .with("password", "secret")
        .with("nickname", "al")
        .with("score", 7);
    assert_eq!(
        codec.encode("User", &user.into()).expect("encode"),
        json!({"name": "ada", "nickname": "al", "score": 7})
    );
}

#[test]
fn default_and_predicate_skips_combine() {
    let schema = Schema::new()
        .with_record(
            RecordType::new("Job")
                .with_field(field("name", "str"))
                .with_field(
                    field("retries", "int")
                        .with_default(3)
                        .skip_if_default()
                        .skip_when(|v| v.as_i64().is_some_and(|n| n < 0)),
                ),
        )
        .expect("Job");
    let codec = Codec::new(schema);
    let job = |retries: i64| -> Instance { RecordValue::new("Job").with("name", "sync").with("retries", retries).into() };

    assert_eq!(codec.encode("Job", &job(3)).expect("default"), json!({"name": "sync"}));
    assert_eq!(codec.encode("Job", &job(-1)).expect("predicate"), json!({"name": "sync"}));
    assert_eq!(
        codec.encode("Job", &job(5)).expect("neither"),
        json!({"name": "sync", "retries": 5})
    );
}

#[test]
fn output_keys_follow_aliases_paths_and_casing() {
    let schema = Schema::new()
        .with_record(
            RecordType::new("Profile")
                .with_field(field("user_name", "str").with_alias("login"))
                .with_field(field("city", "str").with_path(["address", "city"]))
                .with_field(field("zip_code", "str")),
        )
        .expect("Profile");
    let codec = Codec::new(schema);
    let profile: Instance = RecordValue::new("Profile")
        .with("user_name", "ada")
        .with("city", "London")
        .with("zip_code", "N1")
        .into();

    let camel = CodecConfig::new().with_encode_casing(KeyCasing::Camel);
    assert_eq!(
        codec.encode_with("Profile", &profile, &camel).expect("camel"),
        json!({"userName": "ada", "address": {"city": "London"}, "zipCode": "N1"})
    );

    let by_alias = CodecConfig::new()
        .with_encode_by_alias(true)
        .with_encode_alias("zip_code", "postcode");
    assert_eq!(
        codec.encode_with("Profile", &profile, &by_alias).expect("aliases"),
        json!({"login": "ada", "address": {"city": "London"}, "postcode": "N1"})
    );
}

#[test]
fn catch_all_is_splatted_without_overriding_fields() {
    let schema = Schema::new()
        .with_record(
            RecordType::new("Tagged")
                .with_field(field("name", "str"))
                .with_field(field("extra", "dict[str, Any]").as_catch_all()),
        )
        .expect("Tagged");
    let codec = Codec::new(schema);
    let input = json!({"name": "n", "a": 1, "b": {"c": 2}});
    let decoded = codec.decode("Tagged", &input).expect("decode");
    assert_eq!(codec.encode("Tagged", &decoded).expect("encode"), input);

    let clashing = RecordValue::new("Tagged").with("name", "n").with(
        "extra",
        Instance::Map(vec![("name".into(), Instance::Dynamic(json!("other")))]),
    );
    assert_eq!(codec.encode("Tagged", &clashing.into()).expect("encode"), json!({"name": "n"}));
}

#[test]
fn positional_records_encode_as_arrays() {
    let schema = Schema::new()
        .with_record(
            RecordType::positional("Pair")
                .with_field(field("left", "str"))
                .with_field(field("right", "int").with_default(0)),
        )
        .expect("Pair");
    let codec = Codec::new(schema);
    let pair: Instance = RecordValue::new("Pair").with("left", "a").with("right", 2).into();
    assert_eq!(codec.encode("Pair", &pair).expect("array"), json!(["a", 2]));
    assert_eq!(
        codec
            .encode_with("Pair", &pair, &CodecConfig::new().with_positional_as_map(true))
            .expect("map"),
        json!({"left": "a", "right": 2})
    );
    let short: Instance = RecordValue::new("Pair").with("left", "a").into();
    assert_eq!(codec.encode("Pair", &short).expect("default filled"), json!(["a", 0]));
}

#[test]
fn wrong_or_incomplete_instances_are_rejected() {
    let schema = Schema::new()
        .with_record(
            RecordType::new("Point")
                .with_field(field("x", "int"))
                .with_field(field("y", "int")),
        )
        .expect("Point")
        .with_record(RecordType::new("Line").with_field(field("start", "Point")))
        .expect("Line");
    let codec = Codec::new(schema);

    let missing: Instance = RecordValue::new("Point").with("x", 1).into();
    let err = codec.encode("Point", &missing).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::MissingFields { fields, .. } if fields == &vec!["y".to_string()]));

    let wrong: Instance = RecordValue::new("Line")
        .with("start", RecordValue::new("Line"))
        .into();
    let err = codec.encode("Line", &wrong).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::FieldConversion { field, .. } if field == "start"));
    assert_eq!(err.path().to_string(), "start");

    let bad_value: Instance = RecordValue::new("Point").with("x", "one").with("y", 2).into();
    let err = codec.encode("Point", &bad_value).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::FieldConversion { field, .. } if field == "x"));
}

#[test]
fn encode_output_keeps_declaration_order() {
    let schema = Schema::new()
        .with_record(
            RecordType::new("Ordered")
                .with_field(field("zeta", "int"))
                .with_field(field("alpha", "int"))
                .with_field(field("mid", "int")),
        )
        .expect("Ordered");
    let codec = Codec::new(schema);
    let value: Instance = RecordValue::new("Ordered")
        .with("mid", 3)
        .with("alpha", 2)
        .with("zeta", 1)
        .into();
    let encoded = codec.encode("Ordered", &value).expect("encode");
    let keys: Vec<&str> = encoded
        .as_object()
        .expect("object")
        .keys()
        .map(String::as_str)
        .collect();
    assert_eq!(keys, ["zeta", "alpha", "mid"]);
}
