use morph_codec::{
    Codec, CodecConfig, ErrorKind, FieldDescriptor, Instance, KeyCasing, RecordType, RecordValue, Schema,
    UnknownKeyPolicy,
};
use serde_json::json;

fn field(name: &str, expr: &str) -> FieldDescriptor {
    FieldDescriptor::parsed(name, expr).expect("field type")
}

fn point_schema() -> Schema {
    Schema::new()
        .with_record(
            RecordType::new("Point")
                .with_field(field("x", "int"))
                .with_field(field("y", "int")),
        )
        .expect("Point")
}

#[test]
fn point_decodes_case_insensitively() {
    let codec = Codec::new(point_schema());
    let config = CodecConfig::new().with_decode_casing(KeyCasing::CaseInsensitive);
    let point = codec
        .decode_with("Point", &json!({"X": "3", "y": 4}), &config)
        .expect("decode Point");
    assert_eq!(
        point,
        Instance::Record(RecordValue::new("Point").with("x", 3).with("y", 4))
    );
}

#[test]
fn missing_fields_are_reported_together() {
    let schema = Schema::new()
        .with_record(
            RecordType::new("Account")
                .with_field(field("id", "int"))
                .with_field(field("owner", "str"))
                .with_field(field("email", "str"))
                .with_field(field("active", "bool").with_default(true)),
        )
        .expect("Account");
    let codec = Codec::new(schema);
    let err = codec.decode("Account", &json!({"owner": "ada"})).unwrap_err();
    match err.kind() {
        ErrorKind::MissingFields { record, fields } => {
            assert_eq!(record, "Account");
            assert_eq!(fields, &vec!["id".to_string(), "email".to_string()]);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn null_input_is_missing_data() {
    let codec = Codec::new(point_schema());
    let err = codec.decode("Point", &json!(null)).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::MissingData { record } if record == "Point"));
}

#[test]
fn defaults_fill_absent_fields_but_never_mask_bad_values() {
    let schema = Schema::new()
        .with_record(
            RecordType::new("Server")
                .with_field(field("host", "str").with_declared_default(json!("localhost")))
                .with_field(field("port", "int").with_default(8080))
                .with_field(field("tags", "list[str]").with_factory(|| Instance::Seq(Vec::new()))),
        )
        .expect("Server");
    let codec = Codec::new(schema);

    let server = codec.decode("Server", &json!({})).expect("all defaults");
    let server = server.as_record().expect("record");
    assert_eq!(server.get("host"), Some(&Instance::Str("localhost".into())));
    assert_eq!(server.get("port"), Some(&Instance::Int(8080)));
    assert_eq!(server.get("tags"), Some(&Instance::Seq(Vec::new())));

    let err = codec.decode("Server", &json!({"port": "eighty"})).unwrap_err();
    match err.kind() {
        ErrorKind::FieldConversion { record, field, value, .. } => {
            assert_eq!(record, "Server");
            assert_eq!(field, "port");
            assert_eq!(value, &Some(json!("eighty")));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(err.path().to_string(), "port");
}

#[test]
fn explicit_null_is_not_replaced_by_the_default() {
    let schema = Schema::new()
        .with_record(RecordType::new("Profile").with_field(field("nickname", "Optional[str]").with_default("anon")))
        .expect("Profile");
    let codec = Codec::new(schema);

    let absent = codec.decode("Profile", &json!({})).expect("absent");
    assert_eq!(absent.as_record().and_then(|r| r.get("nickname")), Some(&Instance::Str("anon".into())));

    let null = codec.decode("Profile", &json!({"nickname": null})).expect("null");
    assert_eq!(null.as_record().and_then(|r| r.get("nickname")), Some(&Instance::Null));
}

#[test]
fn nested_errors_carry_the_full_path() {
    let schema = Schema::new()
        .with_record(RecordType::new("Line").with_field(field("points", "list[Point]")))
        .expect("Line")
        .with_record(
            RecordType::new("Point")
                .with_field(field("x", "int"))
                .with_field(field("y", "int")),
        )
        .expect("Point");
    let codec = Codec::new(schema);
    let err = codec
        .decode("Line", &json!({"points": [{"x": 1, "y": 2}, {"x": 1, "y": [3]}]}))
        .unwrap_err();
    assert_eq!(err.path().to_string(), "points[1].y");
    assert!(matches!(err.kind(), ErrorKind::FieldConversion { record, .. } if record == "Point"));
    assert!(err.to_string().starts_with("at `points[1].y`"));
}

#[test]
fn aliases_paths_and_casing_locate_fields() {
    let schema = Schema::new()
        .with_record(
            RecordType::new("Profile")
                .with_field(field("user_name", "str").with_alias("login"))
                .with_field(field("city", "str").with_path(["address", "city"]))
                .with_field(field("zip_code", "str")),
        )
        .expect("Profile");
    let codec = Codec::new(schema);
    let config = CodecConfig::new().with_decode_casing(KeyCasing::Camel);
    let input = json!({
        "login": "ada",
        "address": {"city": "London"},
        "zipCode": "N1"
    });
    let profile = codec.decode_with("Profile", &input, &config).expect("decode");
    let profile = profile.as_record().expect("record");
    assert_eq!(profile.get("user_name").and_then(Instance::as_str), Some("ada"));
    assert_eq!(profile.get("city").and_then(Instance::as_str), Some("London"));
    assert_eq!(profile.get("zip_code").and_then(Instance::as_str), Some("N1"));

    let aliased = CodecConfig::new().with_decode_alias("zip_code", ["postcode", "zip"]);
    let profile = codec
        .decode_with("Profile", &json!({"login": "b", "address": {"city": "c"}, "zip": "z"}), &aliased)
        .expect("decode by configured alias");
    assert_eq!(
        profile.as_record().and_then(|p| p.get("zip_code")).and_then(Instance::as_str),
        Some("z")
    );
}

#[test]
fn unknown_keys_follow_the_policy() {
    let codec = Codec::new(point_schema());
    let input = json!({"x": 1, "y": 2, "z": 3});
    assert!(codec.decode("Point", &input).is_ok());
    assert!(codec
        .decode_with("Point", &input, &CodecConfig::new().with_unknown_keys(UnknownKeyPolicy::Warn))
        .is_ok());

    let err = codec
        .decode_with("Point", &input, &CodecConfig::new().with_unknown_keys(UnknownKeyPolicy::Raise))
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::UnknownKey { key, .. } if key == "z"));
}

#[test]
fn catch_all_collects_leftover_keys() {
    let schema = Schema::new()
        .with_record(
            RecordType::new("Tagged")
                .with_field(field("name", "str"))
                .with_field(field("extra", "dict[str, Any]").as_catch_all()),
        )
        .expect("Tagged");
    let codec = Codec::new(schema);
    let tagged = codec
        .decode("Tagged", &json!({"name": "n", "a": 1, "b": [true]}))
        .expect("decode");
    let extra = tagged.as_record().and_then(|r| r.get("extra")).expect("extra");
    assert_eq!(extra.map_get("a"), Some(&Instance::Dynamic(json!(1))));
    assert_eq!(extra.map_get("b"), Some(&Instance::Dynamic(json!([true]))));
    assert!(extra.map_get("name").is_none());

    let empty = codec.decode("Tagged", &json!({"name": "n"})).expect("nothing to collect");
    assert_eq!(
        empty.as_record().and_then(|r| r.get("extra")),
        Some(&Instance::Map(Vec::new()))
    );
}

#[test]
fn positional_records_accept_arrays_and_objects() {
    let schema = Schema::new()
        .with_record(
            RecordType::positional("Pair")
                .with_field(field("left", "str"))
                .with_field(field("right", "int").with_default(0)),
        )
        .expect("Pair");
    let codec = Codec::new(schema);
    let expected = Instance::Record(RecordValue::new("Pair").with("left", "a").with("right", 2));
    assert_eq!(codec.decode("Pair", &json!(["a", 2])).expect("array"), expected);
    assert_eq!(codec.decode("Pair", &json!({"left": "a", "right": 2})).expect("object"), expected);
    assert_eq!(
        codec.decode("Pair", &json!(["a"])).expect("short array"),
        Instance::Record(RecordValue::new("Pair").with("left", "a").with("right", 0))
    );
    assert!(codec.decode("Pair", &json!(["a", 2, 3])).is_err());
}

#[test]
fn keyed_records_omit_optional_keys() {
    let schema = Schema::new()
        .with_record(
            RecordType::keyed("Movie")
                .with_field(field("title", "str"))
                .with_field(field("year", "int").with_required(false)),
        )
        .expect("Movie");
    let codec = Codec::new(schema);
    let movie = codec.decode("Movie", &json!({"title": "Heat"})).expect("decode");
    let movie = movie.as_record().expect("record");
    assert!(movie.has("title"));
    assert!(!movie.has("year"));
    assert!(codec.decode("Movie", &json!({"year": 1995})).is_err());
}

#[test]
fn flat_string_maps_use_the_string_forms() {
    let schema = Schema::new()
        .with_record(
            RecordType::new("Settings")
                .with_field(field("debug", "bool"))
                .with_field(field("workers", "int"))
                .with_field(field("ratio", "float"))
                .with_field(field("hosts", "list[str]"))
                .with_field(field("limits", "dict[str, int]")),
        )
        .expect("Settings");
    let codec = Codec::new(schema);
    let settings = codec
        .decode_flat(
            "Settings",
            [
                ("debug", "yes"),
                ("workers", "4"),
                ("ratio", "0.5"),
                ("hosts", "a, b"),
                ("limits", "cpu=2,mem=512"),
            ],
        )
        .expect("decode flat");
    let settings = settings.as_record().expect("record");
    assert_eq!(settings.get("debug"), Some(&Instance::Bool(true)));
    assert_eq!(settings.get("workers"), Some(&Instance::Int(4)));
    assert_eq!(settings.get("ratio"), Some(&Instance::Float(0.5)));
    assert_eq!(
        settings.get("hosts"),
        Some(&Instance::Seq(vec!["a".into(), "b".into()]))
    );
    assert_eq!(
        settings.get("limits").and_then(|l| l.map_get("mem")),
        Some(&Instance::Int(512))
    );
}

#[test]
fn containers_and_temporal_fields() {
    let schema = Schema::new()
        .with_record(
            RecordType::new("Job")
                .with_field(field("ids", "set[int]"))
                .with_field(field("span", "tuple[int, str]"))
                .with_field(field("rest", "tuple[int, ...]"))
                .with_field(field("counts", "defaultdict[str, int]"))
                .with_field(field("mode", "Literal['fast', 'slow']"))
                .with_field(field("at", "datetime"))
                .with_field(field("timeout", "timedelta")),
        )
        .expect("Job");
    let codec = Codec::new(schema);
    let job = codec
        .decode(
            "Job",
            &json!({
                "ids": [1, 2, 1],
                "span": [1, "x"],
                "rest": [],
                "counts": {"a": 1},
                "mode": "slow",
                "at": "2024-01-02T03:04:05Z",
                "timeout": "PT1M"
            }),
        )
        .expect("decode");
    let job = job.as_record().expect("record");
    assert_eq!(job.get("ids"), Some(&Instance::Set(vec![1.into(), 2.into()])));
    assert_eq!(job.get("span"), Some(&Instance::Tuple(vec![1.into(), "x".into()])));
    assert_eq!(job.get("rest"), Some(&Instance::Tuple(Vec::new())));
    assert!(matches!(job.get("counts"), Some(Instance::DefaultMap { default, .. }) if **default == Instance::Int(0)));
    assert_eq!(job.get("mode"), Some(&Instance::Str("slow".into())));
    assert!(matches!(job.get("at"), Some(Instance::DateTime(_))));
    assert_eq!(job.get("timeout"), Some(&Instance::Duration(chrono::TimeDelta::seconds(60))));

    let err = codec
        .decode(
            "Job",
            &json!({
                "ids": [], "span": [1], "rest": [], "counts": {}, "mode": "slow",
                "at": 0, "timeout": 1
            }),
        )
        .unwrap_err();
    assert_eq!(err.path().to_string(), "span");
}
