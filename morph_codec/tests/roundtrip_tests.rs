/* Round-trip law: decode(encode(r)) == r for lossless field types */

use morph_codec::{Codec, FieldDescriptor, Instance, RecordType, RecordValue, Schema};
use proptest::prelude::*;
use std::sync::OnceLock;

fn field(name: &str, expr: &str) -> FieldDescriptor {
    FieldDescriptor::parsed(name, expr).expect("field type")
}

fn codec() -> &'static Codec {
    static CODEC: OnceLock<Codec> = OnceLock::new();
    CODEC.get_or_init(|| {
        let schema = Schema::new()
            .with_record(
                RecordType::new("Sample")
                    .with_field(field("id", "int"))
                    .with_field(field("name", "str"))
                    .with_field(field("enabled", "bool"))
                    .with_field(field("ratio", "float"))
                    .with_field(field("scores", "list[int]"))
                    .with_field(field("note", "Optional[str]").with_default(Instance::Null))
                    .with_field(field("limits", "dict[str, int]"))
                    .with_field(field("child", "Optional[Leaf]").with_default(Instance::Null)),
            )
            .expect("Sample")
            .with_record(
                RecordType::positional("Leaf")
                    .with_field(field("label", "str"))
                    .with_field(field("weight", "int")),
            )
            .expect("Leaf");
        Codec::new(schema)
    })
}

fn leaf() -> impl Strategy<Value = Instance> {
    ("[a-z]{0,8}", any::<i64>()).prop_map(|(label, weight)| {
        RecordValue::new("Leaf").with("label", label).with("weight", weight).into()
    })
}

fn sample() -> impl Strategy<Value = Instance> {
    (
        any::<i64>(),
        "\\PC{0,16}",
        any::<bool>(),
        -1.0e9f64..1.0e9f64,
        prop::collection::vec(any::<i64>(), 0..6),
        prop::option::of("[a-z ]{0,10}"),
        prop::collection::btree_map("[a-z]{1,6}", any::<i64>(), 0..4),
        prop::option::of(leaf()),
    )
        .prop_map(|(id, name, enabled, ratio, scores, note, limits, child)| {
            let limits = limits
                .into_iter()
                .map(|(k, v)| (Instance::Str(k), Instance::Int(v)))
                .collect();
            RecordValue::new("Sample")
                .with("id", id)
                .with("name", name)
                .with("enabled", enabled)
                .with("ratio", ratio)
                .with("scores", Instance::Seq(scores.into_iter().map(Instance::Int).collect()))
                .with("note", note)
                .with("limits", Instance::Map(limits))
                .with("child", child.unwrap_or(Instance::Null))
                .into()
        })
}

proptest! {
    #[test]
    fn decode_inverts_encode(record in sample()) {
        let codec = codec();
        let encoded = codec.encode("Sample", &record).expect("encode");
        let decoded = codec.decode("Sample", &encoded).expect("decode");
        prop_assert_eq!(decoded, record);
    }

    #[test]
    fn encoding_is_stable(record in sample()) {
        let codec = codec();
        let first = codec.encode("Sample", &record).expect("encode");
        let second = codec.encode("Sample", &record).expect("encode again");
        prop_assert_eq!(first, second);
    }
}

#[test]
fn records_built_out_of_order_survive_a_round_trip() {
    let leaf: Instance = RecordValue::new("Leaf").with("weight", 4).with("label", "tip").into();
    let codec = codec();
    let encoded = codec.encode("Leaf", &leaf).expect("encode");
    assert_eq!(encoded, serde_json::json!(["tip", 4]));
    assert_eq!(codec.decode("Leaf", &encoded).expect("decode"), leaf);
}
