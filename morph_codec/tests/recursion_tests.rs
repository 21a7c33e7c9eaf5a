/* Self- and mutually-recursive record types */

use morph_codec::{Codec, CodecConfig, FieldDescriptor, Instance, KeyCasing, RecordType, Schema};
use serde_json::json;

fn field(name: &str, expr: &str) -> FieldDescriptor {
    FieldDescriptor::parsed(name, expr).expect("field type")
}

fn tree_schema() -> Schema {
    Schema::new()
        .with_record(
            RecordType::new("Node")
                .with_field(field("value", "int"))
                .with_field(field("children", "list[Node]").with_factory(|| Instance::Seq(Vec::new()))),
        )
        .expect("Node")
}

fn depth(node: &Instance, children: &str) -> usize {
    match node.as_record().and_then(|r| r.get(children)) {
        Some(Instance::Seq(items)) => 1 + items.iter().map(|c| depth(c, children)).max().unwrap_or(0),
        _ => 1,
    }
}

#[test]
fn tree_round_trips_four_levels() {
    let codec = Codec::new(tree_schema());
    let input = json!({
        "value": 1,
        "children": [
            {"value": 2, "children": [
                {"value": 3, "children": [{"value": 4, "children": []}]}
            ]},
            {"value": 5, "children": []}
        ]
    });
    let tree = codec.decode("Node", &input).expect("decode tree");
    assert_eq!(depth(&tree, "children"), 4);
    assert_eq!(codec.encode("Node", &tree).expect("encode tree"), input);
}

#[test]
fn errors_deep_in_the_tree_keep_their_path() {
    let codec = Codec::new(tree_schema());
    let input = json!({
        "value": 1,
        "children": [{"value": 2, "children": [{"value": "three"}]}]
    });
    let err = codec.decode("Node", &input).unwrap_err();
    assert_eq!(err.path().to_string(), "children[0].children[0].value");
}

#[test]
fn recursive_routine_is_compiled_once_per_direction() {
    let codec = Codec::new(tree_schema());
    codec.decoder("Node").expect("decoder");
    codec.encoder("Node").expect("encoder");
    assert_eq!(codec.cached_routines(), 2);
}

#[test]
fn mutually_recursive_types_terminate() {
    let schema = Schema::new()
        .with_record(
            RecordType::new("Person")
                .with_field(field("name", "str"))
                .with_field(field("employer", "Optional[Company]").with_default(Instance::Null)),
        )
        .expect("Person")
        .with_record(
            RecordType::new("Company")
                .with_field(field("title", "str"))
                .with_field(field("staff", "list[Person]")),
        )
        .expect("Company");
    let codec = Codec::new(schema);
    let input = json!({
        "name": "ada",
        "employer": {
            "title": "Engines Ltd",
            "staff": [
                {"name": "charles", "employer": {"title": "Mill", "staff": [{"name": "x", "employer": null}]}}
            ]
        }
    });
    let person = codec.decode("Person", &input).expect("decode");
    assert_eq!(codec.encode("Person", &person).expect("encode"), input);
    assert_eq!(codec.cached_routines(), 4);
}

#[test]
fn recursive_config_reaches_every_level() {
    let schema = Schema::new()
        .with_record(
            RecordType::new("Dir")
                .with_field(field("dir_name", "str"))
                .with_field(field("sub_dirs", "list[Dir]").with_factory(|| Instance::Seq(Vec::new()))),
        )
        .expect("Dir");
    let dirs = Codec::new(schema);
    let config = CodecConfig::new()
        .with_decode_casing(KeyCasing::Camel)
        .with_encode_casing(KeyCasing::Camel)
        .with_recursive(true);
    let input = json!({
        "dirName": "/",
        "subDirs": [{"dirName": "usr", "subDirs": [{"dirName": "lib", "subDirs": []}]}]
    });
    let tree = dirs.decode_with("Dir", &input, &config).expect("decode camel tree");
    assert_eq!(depth(&tree, "sub_dirs"), 3);
    assert_eq!(dirs.encode_with("Dir", &tree, &config).expect("encode"), input);
}
