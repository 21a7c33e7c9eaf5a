use morph_cli::cmds::check::check_codec;
use morph_cli::cmds::common::parse_value;
use morph_codec::{Codec, ErrorKind};
use morph_types::SchemaFile;

const SCHEMA: &str = r#"
records:
  - name: Point
    fields:
      - name: x
        type: int
      - name: y
        type: int
  - name: Broken
    fields:
      - name: next
        type: Ghost
  - name: Path
    fields:
      - name: points
        type: list[Point]
"#;

#[test]
fn reports_each_record() {
    let file = SchemaFile::from_yaml_str(SCHEMA).expect("parse schema");
    let codec = Codec::from_file(&file).expect("codec");
    let checks = check_codec(&codec);

    let names: Vec<&str> = checks.iter().map(|c| c.record.as_str()).collect();
    assert_eq!(names, vec!["Broken", "Path", "Point"]);

    let broken = &checks[0];
    let err = broken.result.as_ref().expect_err("Ghost is undeclared");
    assert!(matches!(err.kind(), ErrorKind::UnknownType { name } if name == "Ghost"));
    assert!(checks[1].result.is_ok());
    assert!(checks[2].result.is_ok());
}

#[test]
fn inputs_parse_as_json_or_yaml() {
    let json = parse_value(r#"{"x": 1, "y": 2}"#, true).expect("json");
    let yaml = parse_value("x: 1\ny: 2\n", false).expect("yaml");
    assert_eq!(json, yaml);
    assert!(parse_value("x: [", false).is_err());
}
