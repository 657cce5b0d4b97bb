//! Object documents - declared and observed state of one remote object
//!
//! A document is TOML or JSON (chosen by extension) holding a label, the
//! clone flag, the attribute-descriptor table (inline or in a separate
//! file) and the `[declared]` / `[observed]` trees. The trees are read as
//! `serde_json` values and converted to the engine's typed model with the
//! descriptor table as a guide.

use anyhow::{Context, Result};
use reconcile::{
    Declared, DeclaredFields, DeclaredObject, Fields, ObjectSchema, ObservedObject, Origin, Scalar,
    SlotKey, join_path,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Problems converting a document tree into the typed model
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DocumentError {
    #[error("{path}: unsupported value ({found})")]
    UnsupportedValue { path: String, found: &'static str },

    #[error("{path}: observed state cannot be unresolved")]
    UnresolvedObserved { path: String },

    #[error("{path}: expected a table")]
    ExpectedTable { path: String },

    #[error("document has neither `schema` nor `schema_file`")]
    MissingSchema,

    #[error("document has both `schema` and `schema_file`")]
    AmbiguousSchema,
}

type Conversion<T> = std::result::Result<T, DocumentError>;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDocument {
    name: Option<String>,
    #[serde(default)]
    clone: bool,
    schema_file: Option<PathBuf>,
    schema: Option<ObjectSchema>,
    #[serde(default)]
    declared: Map<String, Value>,
    #[serde(default)]
    observed: Map<String, Value>,
}

/// A loaded, converted document ready for planning
#[derive(Debug, Clone)]
pub struct Document {
    pub label: String,
    pub origin: Origin,
    pub schema: ObjectSchema,
    pub declared: DeclaredObject,
    pub observed: ObservedObject,
}

impl Document {
    /// Load and convert the document at `path`
    pub fn load(path: &Path, marker: &str) -> Result<Self> {
        let raw: RawDocument = read_file(path)?;

        let schema = match (raw.schema, raw.schema_file) {
            (Some(schema), None) => schema,
            (None, Some(file)) => {
                let file = crate::config::expand(&file);
                let file = match path.parent() {
                    Some(dir) if file.is_relative() => dir.join(file),
                    _ => file,
                };
                read_file(&file).with_context(|| format!("Failed to load schema for {}", path.display()))?
            }
            (None, None) => return Err(DocumentError::MissingSchema).context(path.display().to_string()),
            (Some(_), Some(_)) => {
                return Err(DocumentError::AmbiguousSchema).context(path.display().to_string());
            }
        };

        let declared = declared_object(&schema, &raw.declared, marker, "")
            .with_context(|| format!("Invalid [declared] in {}", path.display()))?;
        let observed = observed_object(&schema, &raw.observed, marker, "")
            .with_context(|| format!("Invalid [observed] in {}", path.display()))?;

        let label = raw.name.unwrap_or_else(|| {
            path.file_stem()
                .map_or_else(|| path.display().to_string(), |s| s.to_string_lossy().into_owned())
        });

        log::debug!(
            "Loaded {} from {} ({} declared, {} observed attribute(s))",
            label,
            path.display(),
            raw.declared.len(),
            raw.observed.len()
        );

        Ok(Self {
            label,
            origin: Origin::from_clone_flag(raw.clone),
            schema,
            declared,
            observed,
        })
    }
}

/// Parse a TOML or JSON file, picking the format by extension
fn read_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Could not read {}", path.display()))?;

    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON format in {}", path.display())),
        Some("toml") => {
            toml::from_str(&content).with_context(|| format!("Invalid TOML format in {}", path.display()))
        }
        _ => anyhow::bail!("Unknown document format (expected .toml or .json): {}", path.display()),
    }
}

// ============================================================================
// Conversion
// ============================================================================

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_u64() => "integer out of range",
        Value::Number(_) => "non-integer number",
        Value::String(_) => "string",
        Value::Array(_) => "array with non-string items",
        Value::Object(_) => "table",
    }
}

fn scalar(value: &Value, path: &str) -> Conversion<Scalar> {
    match value {
        Value::Bool(b) => Ok(Scalar::Bool(*b)),
        Value::Number(n) => n.as_i64().map(Scalar::Int).ok_or_else(|| DocumentError::UnsupportedValue {
            path: path.to_string(),
            found: value_kind(value),
        }),
        Value::String(s) => Ok(Scalar::Str(s.clone())),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect::<Option<BTreeSet<_>>>()
            .map(Scalar::Set)
            .ok_or_else(|| DocumentError::UnsupportedValue {
                path: path.to_string(),
                found: value_kind(value),
            }),
        Value::Null | Value::Object(_) => Err(DocumentError::UnsupportedValue {
            path: path.to_string(),
            found: value_kind(value),
        }),
    }
}

fn is_marker(value: &Value, marker: &str) -> bool {
    value.as_str() == Some(marker)
}

fn table<'a>(value: &'a Value, path: &str) -> Conversion<&'a Map<String, Value>> {
    value.as_object().ok_or_else(|| DocumentError::ExpectedTable { path: path.to_string() })
}

/// How a name found in a document tree is treated
enum Shape<'a> {
    Scalar,
    Composite,
    Collection(&'a ObjectSchema),
}

/// Names unknown to the schema still land somewhere so the engine can
/// report them; the shape is guessed from the value.
fn shape_of<'a>(schema: &'a ObjectSchema, name: &str, value: &Value) -> Shape<'a> {
    if schema.find_attribute(name).is_some() {
        return Shape::Scalar;
    }
    if schema.find_composite(name).is_some() {
        return Shape::Composite;
    }
    if let Some(spec) = schema.find_collection(name) {
        return Shape::Collection(&spec.slot);
    }
    static EMPTY: ObjectSchema = ObjectSchema {
        attributes: Vec::new(),
        composites: Vec::new(),
        collections: Vec::new(),
    };
    match value.as_object() {
        Some(map) if !map.is_empty() && map.values().all(Value::is_object) => Shape::Collection(&EMPTY),
        Some(_) => Shape::Composite,
        None => Shape::Scalar,
    }
}

fn declared_scalar(value: &Value, marker: &str, path: &str) -> Conversion<Declared<Scalar>> {
    if is_marker(value, marker) {
        return Ok(Declared::Unresolved);
    }
    scalar(value, path).map(Declared::Concrete)
}

/// Convert a `[declared]` tree; null and missing keys are both absent
pub fn declared_object(
    schema: &ObjectSchema,
    tree: &Map<String, Value>,
    marker: &str,
    path: &str,
) -> Conversion<DeclaredObject> {
    let mut object = DeclaredObject::new();

    for (name, value) in tree {
        if value.is_null() {
            continue;
        }
        let value_path = join_path(path, name);

        match shape_of(schema, name, value) {
            Shape::Scalar => {
                object.scalars.insert(name.clone(), declared_scalar(value, marker, &value_path)?);
            }
            Shape::Composite => {
                let declared = if is_marker(value, marker) {
                    Declared::Unresolved
                } else {
                    let mut fields = DeclaredFields::new();
                    for (field, v) in table(value, &value_path)? {
                        if v.is_null() {
                            continue;
                        }
                        fields.insert(field.clone(), declared_scalar(v, marker, &join_path(&value_path, field))?);
                    }
                    Declared::Concrete(fields)
                };
                object.composites.insert(name.clone(), declared);
            }
            Shape::Collection(slot_schema) => {
                let declared = if is_marker(value, marker) {
                    Declared::Unresolved
                } else {
                    let mut slots = BTreeMap::<SlotKey, DeclaredObject>::new();
                    for (key, slot) in table(value, &value_path)? {
                        let slot_path = join_path(&value_path, key);
                        let slot_tree = table(slot, &slot_path)?;
                        slots.insert(key.clone(), declared_object(slot_schema, slot_tree, marker, &slot_path)?);
                    }
                    Declared::Concrete(slots)
                };
                object.collections.insert(name.clone(), declared);
            }
        }
    }

    Ok(object)
}

fn observed_scalar(value: &Value, marker: &str, path: &str) -> Conversion<Scalar> {
    if is_marker(value, marker) {
        return Err(DocumentError::UnresolvedObserved { path: path.to_string() });
    }
    scalar(value, path)
}

/// Convert an `[observed]` tree; the unresolved marker is an input error
pub fn observed_object(
    schema: &ObjectSchema,
    tree: &Map<String, Value>,
    marker: &str,
    path: &str,
) -> Conversion<ObservedObject> {
    let mut object = ObservedObject::new();

    for (name, value) in tree {
        if value.is_null() {
            continue;
        }
        let value_path = join_path(path, name);

        match shape_of(schema, name, value) {
            Shape::Scalar => {
                object.scalars.insert(name.clone(), observed_scalar(value, marker, &value_path)?);
            }
            Shape::Composite => {
                let mut fields = Fields::new();
                for (field, v) in table(value, &value_path)? {
                    if v.is_null() {
                        continue;
                    }
                    fields.insert(field.clone(), observed_scalar(v, marker, &join_path(&value_path, field))?);
                }
                if !fields.is_empty() {
                    object.composites.insert(name.clone(), fields);
                }
            }
            Shape::Collection(slot_schema) => {
                let mut slots = BTreeMap::<SlotKey, ObservedObject>::new();
                for (key, slot) in table(value, &value_path)? {
                    let slot_path = join_path(&value_path, key);
                    let slot_tree = table(slot, &slot_path)?;
                    slots.insert(key.clone(), observed_object(slot_schema, slot_tree, marker, &slot_path)?);
                }
                if !slots.is_empty() {
                    object.collections.insert(name.clone(), slots);
                }
            }
        }
    }

    Ok(object)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile::{AttributeSpec, CollectionSpec, CompositeSpec, Granularity, ScalarKind};
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    const MARKER: &str = "<computed>";

    fn schema() -> ObjectSchema {
        ObjectSchema::new()
            .attribute(AttributeSpec::new("cores", ScalarKind::Int))
            .attribute(AttributeSpec::new("tags", ScalarKind::Set))
            .composite(CompositeSpec::new(
                "vga",
                "type",
                vec![
                    AttributeSpec::new("type", ScalarKind::String),
                    AttributeSpec::new("memory", ScalarKind::Int),
                ],
            ))
            .collection(CollectionSpec::new(
                "cdrom",
                Granularity::AtomicReplace,
                ObjectSchema::new().attribute(AttributeSpec::new("file_id", ScalarKind::String)),
            ))
    }

    fn tree(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_declared_tri_state() {
        let declared = declared_object(
            &schema(),
            &tree(json!({ "cores": "<computed>", "tags": ["b", "a"], "vga": null })),
            MARKER,
            "",
        )
        .unwrap();

        assert_eq!(declared.scalars["cores"], Declared::Unresolved);
        assert_eq!(declared.scalars["tags"], Declared::Concrete(Scalar::set(["a", "b"])));
        assert!(!declared.composites.contains_key("vga"));
    }

    #[test]
    fn test_declared_empty_collection_is_concrete() {
        let declared = declared_object(&schema(), &tree(json!({ "cdrom": {} })), MARKER, "").unwrap();
        assert_eq!(declared.collections["cdrom"], Declared::Concrete(BTreeMap::new()));
    }

    #[test]
    fn test_declared_slots() {
        let declared = declared_object(
            &schema(),
            &tree(json!({ "cdrom": { "ide2": { "file_id": "none" } } })),
            MARKER,
            "",
        )
        .unwrap();
        let Declared::Concrete(slots) = &declared.collections["cdrom"] else {
            panic!("expected concrete slots");
        };
        assert_eq!(
            slots["ide2"].scalars["file_id"],
            Declared::Concrete(Scalar::from("none"))
        );
    }

    #[test]
    fn test_observed_marker_rejected() {
        let err = observed_object(
            &schema(),
            &tree(json!({ "vga": { "type": "<computed>" } })),
            MARKER,
            "",
        )
        .unwrap_err();
        assert_eq!(err, DocumentError::UnresolvedObserved { path: "vga.type".into() });
    }

    #[test]
    fn test_unsupported_values() {
        let err = declared_object(&schema(), &tree(json!({ "cores": 1.5 })), MARKER, "").unwrap_err();
        assert!(matches!(err, DocumentError::UnsupportedValue { .. }));

        let err = declared_object(&schema(), &tree(json!({ "tags": [1, 2] })), MARKER, "").unwrap_err();
        assert!(matches!(err, DocumentError::UnsupportedValue { .. }));

        let err = declared_object(&schema(), &tree(json!({ "vga": "std" })), MARKER, "").unwrap_err();
        assert_eq!(err, DocumentError::ExpectedTable { path: "vga".into() });
    }

    #[test]
    fn test_integer_out_of_range() {
        let err = declared_object(&schema(), &tree(json!({ "cores": u64::MAX })), MARKER, "").unwrap_err();
        assert_eq!(
            err,
            DocumentError::UnsupportedValue {
                path: "cores".into(),
                found: "integer out of range",
            }
        );

        let err = declared_object(&schema(), &tree(json!({ "cores": 1.5 })), MARKER, "").unwrap_err();
        assert_eq!(
            err,
            DocumentError::UnsupportedValue {
                path: "cores".into(),
                found: "non-integer number",
            }
        );
    }

    #[test]
    fn test_unknown_names_are_kept_for_the_engine() {
        let declared = declared_object(
            &schema(),
            &tree(json!({ "bogus": 1, "extra": { "a": 1 }, "slots": { "x": { "a": 1 } } })),
            MARKER,
            "",
        )
        .unwrap();
        assert!(declared.scalars.contains_key("bogus"));
        assert!(declared.composites.contains_key("extra"));
        assert!(declared.collections.contains_key("slots"));
    }

    #[test]
    fn test_load_toml_with_schema_file() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("vm.schema.toml"),
            r#"
[[attributes]]
name = "cores"
kind = "int"
remote = "CPUCores"

[[collections]]
name = "cdrom"
granularity = "atomic-replace"

[[collections.slot.attributes]]
name = "file_id"
kind = "string"
"#,
        )
        .unwrap();
        let doc_path = dir.path().join("vm-100.toml");
        fs::write(
            &doc_path,
            r#"
clone = true
schema_file = "vm.schema.toml"

[declared]
cores = 4

[observed]
cores = 2

[observed.cdrom.ide2]
file_id = "none"
"#,
        )
        .unwrap();

        let doc = Document::load(&doc_path, MARKER).unwrap();
        assert_eq!(doc.label, "vm-100");
        assert_eq!(doc.origin, Origin::Cloned);
        assert_eq!(doc.schema.find_attribute("cores").unwrap().remote_name(), "CPUCores");
        assert_eq!(doc.declared.scalars["cores"], Declared::Concrete(Scalar::Int(4)));
        assert_eq!(doc.observed.collection("cdrom").len(), 1);
    }

    #[test]
    fn test_load_json_with_inline_schema() {
        let dir = TempDir::new().unwrap();
        let doc_path = dir.path().join("web.json");
        fs::write(
            &doc_path,
            json!({
                "name": "web",
                "schema": { "attributes": [{ "name": "cores", "kind": "int" }] },
                "declared": { "cores": 2 },
            })
            .to_string(),
        )
        .unwrap();

        let doc = Document::load(&doc_path, MARKER).unwrap();
        assert_eq!(doc.label, "web");
        assert_eq!(doc.origin, Origin::Created);
        assert!(doc.observed.scalars.is_empty());
    }

    #[test]
    fn test_demo_document_plans() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos").join("vm-100.toml");
        let doc = Document::load(&path, MARKER).unwrap();
        let op = reconcile::plan(&doc.schema, &doc.declared, &doc.observed, doc.origin).unwrap();

        assert_eq!(
            op.assignments().keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["CPUCores", "cpu", "vga"]
        );
        assert_eq!(op.delete_list(), vec!["CPUSockets", "ide3"]);
        assert!(op.restart_required());
    }

    #[test]
    fn test_demo_clone_keeps_inherited_attributes() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos").join("vm-101-clone.json");
        let doc = Document::load(&path, MARKER).unwrap();
        let op = reconcile::plan(&doc.schema, &doc.declared, &doc.observed, doc.origin).unwrap();

        assert_eq!(op.change_count(), 1);
        assert!(op.removals().is_empty());
    }

    #[test]
    fn test_load_requires_schema() {
        let dir = TempDir::new().unwrap();
        let doc_path = dir.path().join("empty.toml");
        fs::write(&doc_path, "[declared]\ncores = 1\n").unwrap();
        assert!(Document::load(&doc_path, MARKER).is_err());
    }

    #[test]
    fn test_load_rejects_unknown_extension() {
        let dir = TempDir::new().unwrap();
        let doc_path = dir.path().join("vm.yaml");
        fs::write(&doc_path, "cores: 1").unwrap();
        assert!(Document::load(&doc_path, MARKER).is_err());
    }
}
