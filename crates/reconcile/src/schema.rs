//! Attribute-descriptor tables
//!
//! An [`ObjectSchema`] describes one type of remote object: its scalar
//! attributes, the composites that bundle several sub-fields into one
//! remote value, and the keyed collections of slots. The engine walks the
//! table generically instead of each object type hand-writing its own
//! field lists.

use crate::error::{Diagnostic, Diagnostics, Error, Result, join_path};
use crate::value::{DeclaredFields, DeclaredObject, Fields, ObservedObject, ScalarKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Descriptor of one scalar attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSpec {
    /// Name in the declaration
    pub name: String,
    pub kind: ScalarKind,
    /// Field name on the remote side, when it differs from `name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
    /// Changing this attribute only takes effect after a restart
    #[serde(default)]
    pub restart: bool,
}

impl AttributeSpec {
    pub fn new(name: &str, kind: ScalarKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            remote: None,
            restart: false,
        }
    }

    pub fn with_remote(mut self, remote: &str) -> Self {
        self.remote = Some(remote.to_string());
        self
    }

    pub fn with_restart(mut self) -> Self {
        self.restart = true;
        self
    }

    pub fn remote_name(&self) -> &str {
        self.remote.as_deref().unwrap_or(&self.name)
    }
}

/// Descriptor of a composite field: several sub-fields stored as one value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeSpec {
    pub name: String,
    /// Sub-field the others are meaningless without
    pub anchor: String,
    pub fields: Vec<AttributeSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
    #[serde(default)]
    pub restart: bool,
}

impl CompositeSpec {
    pub fn new(name: &str, anchor: &str, fields: Vec<AttributeSpec>) -> Self {
        Self {
            name: name.to_string(),
            anchor: anchor.to_string(),
            fields,
            remote: None,
            restart: false,
        }
    }

    pub fn with_remote(mut self, remote: &str) -> Self {
        self.remote = Some(remote.to_string());
        self
    }

    pub fn with_restart(mut self) -> Self {
        self.restart = true;
        self
    }

    pub fn remote_name(&self) -> &str {
        self.remote.as_deref().unwrap_or(&self.name)
    }

    pub fn field(&self, name: &str) -> Option<&AttributeSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// How an existing slot of a keyed collection is updated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Granularity {
    /// The slot is one opaque descriptor; any change resends all of it
    AtomicReplace,
    /// Sub-fields are independently settable; only changes are sent
    FieldLevel,
}

/// Descriptor of a keyed collection of slots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSpec {
    pub name: String,
    pub granularity: Granularity,
    /// Shape of every slot
    #[serde(default)]
    pub slot: ObjectSchema,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
    #[serde(default)]
    pub restart: bool,
}

impl CollectionSpec {
    pub fn new(name: &str, granularity: Granularity, slot: ObjectSchema) -> Self {
        Self {
            name: name.to_string(),
            granularity,
            slot,
            remote: None,
            restart: false,
        }
    }

    pub fn with_remote(mut self, remote: &str) -> Self {
        self.remote = Some(remote.to_string());
        self
    }

    pub fn with_restart(mut self) -> Self {
        self.restart = true;
        self
    }

    pub fn remote_name(&self) -> &str {
        self.remote.as_deref().unwrap_or(&self.name)
    }
}

/// Descriptor table for one type of remote object (or slot)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSchema {
    #[serde(default)]
    pub attributes: Vec<AttributeSpec>,
    #[serde(default)]
    pub composites: Vec<CompositeSpec>,
    #[serde(default)]
    pub collections: Vec<CollectionSpec>,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attribute(mut self, spec: AttributeSpec) -> Self {
        self.attributes.push(spec);
        self
    }

    pub fn composite(mut self, spec: CompositeSpec) -> Self {
        self.composites.push(spec);
        self
    }

    pub fn collection(mut self, spec: CollectionSpec) -> Self {
        self.collections.push(spec);
        self
    }

    pub fn find_attribute(&self, name: &str) -> Option<&AttributeSpec> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn find_composite(&self, name: &str) -> Option<&CompositeSpec> {
        self.composites.iter().find(|c| c.name == name)
    }

    pub fn find_collection(&self, name: &str) -> Option<&CollectionSpec> {
        self.collections.iter().find(|c| c.name == name)
    }

    /// Check the table is well formed
    ///
    /// Names and remote names must be unique per level, every composite
    /// needs at least one field and an anchor among them.
    pub fn validate(&self) -> Result<()> {
        self.validate_at("")
    }

    fn validate_at(&self, path: &str) -> Result<()> {
        let mut names = HashSet::new();
        let mut remotes = HashSet::new();

        let entries = self
            .attributes
            .iter()
            .map(|a| (a.name.as_str(), a.remote_name()))
            .chain(self.composites.iter().map(|c| (c.name.as_str(), c.remote_name())))
            .chain(self.collections.iter().map(|c| (c.name.as_str(), c.remote_name())));

        for (name, remote) in entries {
            if name.is_empty() {
                return Err(Error::schema(path, "empty attribute name"));
            }
            if !names.insert(name) {
                return Err(Error::schema(path, format!("duplicate name `{name}`")));
            }
            if !remotes.insert(remote) {
                return Err(Error::schema(path, format!("duplicate remote name `{remote}`")));
            }
        }

        for composite in &self.composites {
            let composite_path = join_path(path, &composite.name);
            if composite.fields.is_empty() {
                return Err(Error::schema(&composite_path, "composite has no fields"));
            }
            let mut fields = HashSet::new();
            for field in &composite.fields {
                if !fields.insert(field.name.as_str()) {
                    return Err(Error::schema(
                        &composite_path,
                        format!("duplicate field `{}`", field.name),
                    ));
                }
                // sub-fields travel inside the composite value
                if field.remote.is_some() || field.restart {
                    return Err(Error::schema(
                        &composite_path,
                        format!(
                            "field `{}` cannot set remote or restart; set them on the composite",
                            field.name
                        ),
                    ));
                }
            }
            if composite.field(&composite.anchor).is_none() {
                return Err(Error::schema(
                    &composite_path,
                    format!("anchor `{}` is not one of its fields", composite.anchor),
                ));
            }
        }

        for collection in &self.collections {
            collection
                .slot
                .validate_at(&join_path(path, &collection.name))?;
        }

        Ok(())
    }

    /// Record unknown names and kind mismatches in a declared/observed pair
    pub fn check(
        &self,
        declared: &DeclaredObject,
        observed: &ObservedObject,
        path: &str,
        diagnostics: &mut Diagnostics,
    ) {
        for (name, value) in &declared.scalars {
            let value_path = join_path(path, name);
            match self.find_attribute(name) {
                Some(spec) => {
                    if let Some(v) = value.concrete() {
                        check_kind(spec, v.kind(), &value_path, diagnostics);
                    }
                }
                None => diagnostics.push(Diagnostic::UnknownAttribute { path: value_path }),
            }
        }
        for (name, value) in &observed.scalars {
            let value_path = join_path(path, name);
            match self.find_attribute(name) {
                Some(spec) => check_kind(spec, value.kind(), &value_path, diagnostics),
                None => diagnostics.push(Diagnostic::UnknownAttribute { path: value_path }),
            }
        }

        for (name, value) in &declared.composites {
            let value_path = join_path(path, name);
            match self.find_composite(name) {
                Some(spec) => {
                    if let Some(fields) = value.concrete() {
                        check_declared_fields(spec, fields, &value_path, diagnostics);
                    }
                }
                None => diagnostics.push(Diagnostic::UnknownAttribute { path: value_path }),
            }
        }
        for (name, fields) in &observed.composites {
            let value_path = join_path(path, name);
            match self.find_composite(name) {
                Some(spec) => check_observed_fields(spec, fields, &value_path, diagnostics),
                None => diagnostics.push(Diagnostic::UnknownAttribute { path: value_path }),
            }
        }

        let empty_declared = DeclaredObject::default();
        let empty_observed = ObservedObject::default();

        for (name, value) in &declared.collections {
            let value_path = join_path(path, name);
            let Some(spec) = self.find_collection(name) else {
                diagnostics.push(Diagnostic::UnknownAttribute { path: value_path });
                continue;
            };
            if let Some(slots) = value.concrete() {
                for (key, slot) in slots {
                    let observed_slot = observed.collection(name).get(key).unwrap_or(&empty_observed);
                    spec.slot
                        .check(slot, observed_slot, &join_path(&value_path, key), diagnostics);
                }
            }
        }
        for (name, slots) in &observed.collections {
            let value_path = join_path(path, name);
            let Some(spec) = self.find_collection(name) else {
                diagnostics.push(Diagnostic::UnknownAttribute { path: value_path });
                continue;
            };
            let declared_slots = declared.collections.get(name).and_then(|d| d.concrete());
            for (key, slot) in slots {
                // slots present on both sides were checked above
                if declared_slots.is_some_and(|d| d.contains_key(key)) {
                    continue;
                }
                spec.slot
                    .check(&empty_declared, slot, &join_path(&value_path, key), diagnostics);
            }
        }
    }
}

fn check_kind(spec: &AttributeSpec, found: ScalarKind, path: &str, diagnostics: &mut Diagnostics) {
    if spec.kind != found {
        diagnostics.push(Diagnostic::KindMismatch {
            path: path.to_string(),
            expected: spec.kind,
            found,
        });
    }
}

fn check_declared_fields(
    spec: &CompositeSpec,
    fields: &DeclaredFields,
    path: &str,
    diagnostics: &mut Diagnostics,
) {
    for (name, value) in fields {
        let field_path = join_path(path, name);
        match spec.field(name) {
            Some(field) => {
                if let Some(v) = value.concrete() {
                    check_kind(field, v.kind(), &field_path, diagnostics);
                }
            }
            None => diagnostics.push(Diagnostic::UnknownAttribute { path: field_path }),
        }
    }
}

fn check_observed_fields(
    spec: &CompositeSpec,
    fields: &Fields,
    path: &str,
    diagnostics: &mut Diagnostics,
) {
    for (name, value) in fields {
        let field_path = join_path(path, name);
        match spec.field(name) {
            Some(field) => check_kind(field, value.kind(), &field_path, diagnostics),
            None => diagnostics.push(Diagnostic::UnknownAttribute { path: field_path }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Declared, Scalar};
    use std::collections::BTreeMap;

    fn cpu_schema() -> ObjectSchema {
        ObjectSchema::new()
            .attribute(AttributeSpec::new("cores", ScalarKind::Int).with_remote("CPUCores"))
            .composite(CompositeSpec::new(
                "emulation",
                "type",
                vec![
                    AttributeSpec::new("type", ScalarKind::String),
                    AttributeSpec::new("flags", ScalarKind::Set),
                ],
            ))
            .collection(CollectionSpec::new(
                "cdrom",
                Granularity::AtomicReplace,
                ObjectSchema::new().attribute(AttributeSpec::new("file_id", ScalarKind::String)),
            ))
    }

    #[test]
    fn test_valid_schema() {
        assert!(cpu_schema().validate().is_ok());
        assert_eq!(cpu_schema().attributes[0].remote_name(), "CPUCores");
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let schema = cpu_schema().attribute(AttributeSpec::new("cores", ScalarKind::Int));
        let err = schema.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate name `cores`"));
    }

    #[test]
    fn test_duplicate_remote_names_rejected() {
        let schema =
            cpu_schema().attribute(AttributeSpec::new("sockets", ScalarKind::Int).with_remote("CPUCores"));
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_anchor_must_be_a_field() {
        let schema = ObjectSchema::new().composite(CompositeSpec::new(
            "vga",
            "type",
            vec![AttributeSpec::new("memory", ScalarKind::Int)],
        ));
        let err = schema.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid schema at vga: anchor `type` is not one of its fields"
        );
    }

    #[test]
    fn test_sub_field_remote_and_restart_rejected() {
        for field in [
            AttributeSpec::new("type", ScalarKind::String).with_restart(),
            AttributeSpec::new("type", ScalarKind::String).with_remote("kind"),
        ] {
            let schema = ObjectSchema::new().composite(CompositeSpec::new("vga", "type", vec![field]));
            let err = schema.validate().unwrap_err();
            assert_eq!(
                err.to_string(),
                "invalid schema at vga: field `type` cannot set remote or restart; set them on the composite"
            );
        }

        let schema = ObjectSchema::new().composite(
            CompositeSpec::new("vga", "type", vec![AttributeSpec::new("type", ScalarKind::String)])
                .with_restart(),
        );
        assert!(schema.validate().is_ok());
    }

    #[test]
    fn test_slot_schema_validated() {
        let schema = ObjectSchema::new().collection(CollectionSpec::new(
            "disk",
            Granularity::FieldLevel,
            ObjectSchema::new().composite(CompositeSpec::new("x", "a", vec![])),
        ));
        let err = schema.validate().unwrap_err();
        assert!(err.to_string().starts_with("invalid schema at disk.x"));
    }

    #[test]
    fn test_check_reports_kinds_and_unknowns() {
        let schema = cpu_schema();
        let declared = DeclaredObject::new()
            .with_scalar("cores", "four")
            .with_scalar("memory", 1024_i64)
            .with_composite(
                "emulation",
                Declared::Concrete(BTreeMap::from([("flags".to_string(), "+aes".into())])),
            );
        let observed = ObservedObject::new().with_collection(
            "cdrom",
            BTreeMap::from([(
                "ide2".to_string(),
                ObservedObject::new().with_scalar("file_id", 3_i64),
            )]),
        );

        let mut diagnostics = Diagnostics::new();
        schema.check(&declared, &observed, "", &mut diagnostics);
        let paths: Vec<&str> = diagnostics.iter().map(Diagnostic::path).collect();
        assert_eq!(paths, vec!["cores", "memory", "emulation.flags", "cdrom.ide2.file_id"]);
    }

    #[test]
    fn test_unresolved_values_are_not_kind_checked() {
        let declared = DeclaredObject::new().with_scalar("cores", Declared::<Scalar>::Unresolved);
        let mut diagnostics = Diagnostics::new();
        cpu_schema().check(&declared, &ObservedObject::new(), "", &mut diagnostics);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_schema_deserializes() {
        let schema: ObjectSchema = serde_json::from_str(
            r#"{
                "attributes": [{ "name": "cores", "kind": "int", "restart": true }],
                "collections": [{
                    "name": "cdrom",
                    "granularity": "atomic-replace",
                    "slot": { "attributes": [{ "name": "file_id", "kind": "string" }] }
                }]
            }"#,
        )
        .unwrap();
        assert!(schema.attributes[0].restart);
        assert_eq!(schema.collections[0].granularity, Granularity::AtomicReplace);
        assert!(schema.validate().is_ok());
    }
}
