/* Infer command - draft a schema document from a sample
 *
 * Inference only speaks the type vocabulary: every object becomes a record,
 * arrays become lists of the union of their item types, and keys missing
 * from some samples of the same record become optional with a `null`
 * default. Nothing here compiles or runs a codec.
 */

use super::common::{load_value, print_value};
use morph_codec::KeyCasing;
use morph_types::expr::union_of;
use morph_types::{FieldDecl, Primitive, RecordDecl, RecordKindDecl, SchemaFile, TypeDescriptor};
use serde_json::{Map, Value};
use std::path::Path;

#[derive(Debug, Default)]
struct Inference {
    records: Vec<RecordDecl>,
}

impl Inference {
    fn unique_name(&self, hint: &str) -> String {
        let mut base = KeyCasing::Pascal.apply(hint);
        if base.is_empty() || !base.starts_with(|c: char| c.is_ascii_alphabetic()) {
            base.insert_str(0, "Record");
        }
        let taken = |name: &str| self.records.iter().any(|r| r.name == name);
        if !taken(&base) {
            return base;
        }
        let mut n = 2;
        loop {
            let name = format!("{base}{n}");
            if !taken(&name) {
                return name;
            }
            n += 1;
        }
    }

    /// Declares one record covering every object in `samples` and returns
    /// its name. Parents are listed before the records they contain.
    fn record(&mut self, hint: &str, samples: &[&Map<String, Value>]) -> String {
        let name = self.unique_name(hint);
        let slot = self.records.len();
        self.records.push(RecordDecl {
            name: name.clone(),
            kind: RecordKindDecl::Record,
            fields: Vec::new(),
            tag: None,
            config: None,
        });

        let mut keys: Vec<&String> = Vec::new();
        for sample in samples {
            for key in sample.keys() {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }

        let mut fields = Vec::with_capacity(keys.len());
        for key in keys {
            let present: Vec<&Value> = samples.iter().filter_map(|s| s.get(key)).collect();
            let mut ty = self.infer(key, &present);
            if present.len() < samples.len() {
                ty = union_of(vec![ty, TypeDescriptor::primitive(Primitive::Null)]);
            }

            let field_name = field_name(key);
            let mut field = FieldDecl::new(field_name.clone(), ty.to_string());
            if field_name != *key {
                field.alias = Some(key.clone());
            }
            if ty.accepts_null() {
                field.default = Some(Value::Null);
            }
            fields.push(field);
        }
        self.records[slot].fields = fields;
        name
    }

    fn infer(&mut self, hint: &str, values: &[&Value]) -> TypeDescriptor {
        let mut members = Vec::new();
        let mut objects = Vec::new();
        let mut items = Vec::new();
        let mut saw_array = false;

        for value in values {
            match value {
                Value::Null => members.push(TypeDescriptor::primitive(Primitive::Null)),
                Value::Bool(_) => members.push(TypeDescriptor::primitive(Primitive::Bool)),
                Value::Number(n) if n.is_f64() => members.push(TypeDescriptor::primitive(Primitive::Float)),
                Value::Number(_) => members.push(TypeDescriptor::primitive(Primitive::Int)),
                Value::String(_) => members.push(TypeDescriptor::primitive(Primitive::Str)),
                Value::Array(elems) => {
                    saw_array = true;
                    items.extend(elems.iter());
                }
                Value::Object(map) => objects.push(map),
            }
        }

        let float = TypeDescriptor::primitive(Primitive::Float);
        if members.contains(&float) {
            members.retain(|m| *m != TypeDescriptor::primitive(Primitive::Int));
        }
        if saw_array {
            let item = if items.is_empty() {
                TypeDescriptor::any()
            } else {
                self.infer(&singular(hint), &items)
            };
            members.push(TypeDescriptor::sequence(item));
        }
        if !objects.is_empty() {
            let name = self.record(hint, &objects);
            members.push(TypeDescriptor::named(name));
        }

        match union_of(members) {
            ty if ty.is_null() => TypeDescriptor::optional(TypeDescriptor::any()),
            ty => ty,
        }
    }
}

fn field_name(key: &str) -> String {
    let valid = key.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        return key.to_string();
    }
    let snake = KeyCasing::Snake.apply(key);
    if snake.starts_with(|c: char| c.is_ascii_alphabetic()) {
        snake
    } else {
        format!("field_{snake}")
    }
}

fn singular(hint: &str) -> String {
    match hint.strip_suffix('s') {
        Some(stem) if stem.len() > 1 && !stem.ends_with('s') => stem.to_string(),
        _ => format!("{hint}_item"),
    }
}

/// Drafts a schema whose root record is `root`. The sample must be an
/// object, or an array of objects that are merged into one record.
pub fn infer_schema(root: &str, sample: &Value) -> anyhow::Result<SchemaFile> {
    let objects: Vec<&Map<String, Value>> = match sample {
        Value::Object(map) => vec![map],
        Value::Array(items) if !items.is_empty() => items
            .iter()
            .map(|item| item.as_object())
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| anyhow::anyhow!("every sample in the array must be an object"))?,
        _ => anyhow::bail!("sample must be an object or a non-empty array of objects"),
    };

    let mut inference = Inference::default();
    inference.record(root, &objects);
    Ok(SchemaFile {
        records: inference.records,
        ..SchemaFile::default()
    })
}

pub fn run(sample: &Path, root: &str, json: bool) -> anyhow::Result<()> {
    let value = load_value(sample)?;
    let schema = infer_schema(root, &value)?;
    if json {
        print_value(&serde_json::to_value(&schema)?, true)
    } else {
        print!("{}", schema.to_yaml_string()?);
        Ok(())
    }
}
