//! Update operations - the engine's output
//!
//! One [`UpdateOperation`] per remote object, ready to be serialized by the
//! submission layer into a single combined write.

use crate::error::{Diagnostic, join_path};
use crate::value::{Fields, Scalar, SlotKey};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Value assigned to a remote field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Scalar(Scalar),
    /// Every sub-field of a composite, resent as one value
    Composite(Fields),
    /// Nested slots inside a full slot body
    Slots(BTreeMap<SlotKey, Body>),
}

/// Full description of a slot, keyed by remote field name
pub type Body = BTreeMap<String, FieldValue>;

/// Change to an existing slot
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", content = "payload", rename_all = "kebab-case")]
pub enum SlotUpdate {
    /// Replace the whole slot (atomic collections)
    Replace(Body),
    /// Apply field-level changes scoped to the slot
    Patch(UpdateOperation),
}

/// Slot additions, updates and removals for one keyed collection
///
/// The three key sets are kept disjoint: inserting a key into a second set
/// is refused with [`Diagnostic::InternalConsistency`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollectionChanges {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    to_create: BTreeMap<SlotKey, Body>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    to_update: BTreeMap<SlotKey, SlotUpdate>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    to_delete: BTreeSet<SlotKey>,
    /// Set when a created or replaced slot touches a restart-flagged field
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    restart_required: bool,
}

impl CollectionChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, key: &str, body: Body) -> Result<(), Diagnostic> {
        self.ensure_unclaimed(key, "create")?;
        self.to_create.insert(key.to_string(), body);
        Ok(())
    }

    pub fn update(&mut self, key: &str, update: SlotUpdate) -> Result<(), Diagnostic> {
        self.ensure_unclaimed(key, "update")?;
        self.to_update.insert(key.to_string(), update);
        Ok(())
    }

    pub fn delete(&mut self, key: &str) -> Result<(), Diagnostic> {
        self.ensure_unclaimed(key, "delete")?;
        self.to_delete.insert(key.to_string());
        Ok(())
    }

    fn ensure_unclaimed(&self, key: &str, wanted: &str) -> Result<(), Diagnostic> {
        let existing = if self.to_create.contains_key(key) {
            Some("create")
        } else if self.to_update.contains_key(key) {
            Some("update")
        } else if self.to_delete.contains(key) {
            Some("delete")
        } else {
            None
        };

        match existing {
            Some(existing) => Err(Diagnostic::InternalConsistency {
                path: key.to_string(),
                detail: format!("slot already marked for {existing}, refusing {wanted}"),
            }),
            None => Ok(()),
        }
    }

    pub fn to_create(&self) -> &BTreeMap<SlotKey, Body> {
        &self.to_create
    }

    pub fn to_update(&self) -> &BTreeMap<SlotKey, SlotUpdate> {
        &self.to_update
    }

    pub fn to_delete(&self) -> &BTreeSet<SlotKey> {
        &self.to_delete
    }

    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }

    pub fn mark_restart_required(&mut self) {
        self.restart_required = true;
    }

    /// Whether applying these changes needs a restart of the remote object
    ///
    /// True when a created or replaced slot was marked, or when any
    /// field-level patch inside needs one.
    pub fn restart_required(&self) -> bool {
        self.restart_required
            || self.to_update.values().any(|update| match update {
                SlotUpdate::Patch(op) => op.restart_required,
                SlotUpdate::Replace(_) => false,
            })
    }

    fn check_consistency(&self, path: &str, found: &mut Vec<Diagnostic>) {
        let overlaps = [
            ("create", "update", self.to_create.keys().filter(|k| self.to_update.contains_key(*k)).collect::<Vec<_>>()),
            ("update", "delete", self.to_update.keys().filter(|k| self.to_delete.contains(*k)).collect()),
            ("create", "delete", self.to_create.keys().filter(|k| self.to_delete.contains(*k)).collect()),
        ];
        for (first, second, keys) in overlaps {
            for key in keys {
                found.push(Diagnostic::InternalConsistency {
                    path: join_path(path, key),
                    detail: format!("slot marked for both {first} and {second}"),
                });
            }
        }
        for (key, update) in &self.to_update {
            if let SlotUpdate::Patch(op) = update {
                op.check_consistency_at(&join_path(path, key), found);
            }
        }
    }
}

/// Everything that must be written to bring one remote object in line
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdateOperation {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    assign: BTreeMap<String, FieldValue>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    remove: BTreeSet<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    collections: BTreeMap<String, CollectionChanges>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    restart_required: bool,
}

impl UpdateOperation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a remote field
    pub fn assign(&mut self, field: &str, value: FieldValue) -> Result<(), Diagnostic> {
        if self.remove.contains(field) {
            return Err(Diagnostic::InternalConsistency {
                path: field.to_string(),
                detail: "field already marked for removal, refusing assignment".to_string(),
            });
        }
        self.assign.insert(field.to_string(), value);
        Ok(())
    }

    /// Mark a remote field for removal
    pub fn remove(&mut self, field: &str) -> Result<(), Diagnostic> {
        if self.assign.contains_key(field) {
            return Err(Diagnostic::InternalConsistency {
                path: field.to_string(),
                detail: "field already assigned, refusing removal".to_string(),
            });
        }
        self.remove.insert(field.to_string());
        Ok(())
    }

    /// Attach the changes of a keyed collection (ignored when empty)
    pub fn attach(&mut self, field: &str, changes: CollectionChanges) {
        if changes.is_empty() {
            return;
        }
        if changes.restart_required() {
            self.restart_required = true;
        }
        self.collections.insert(field.to_string(), changes);
    }

    pub fn mark_restart_required(&mut self) {
        self.restart_required = true;
    }

    pub fn assignments(&self) -> &BTreeMap<String, FieldValue> {
        &self.assign
    }

    pub fn removals(&self) -> &BTreeSet<String> {
        &self.remove
    }

    pub fn collections(&self) -> &BTreeMap<String, CollectionChanges> {
        &self.collections
    }

    pub fn collection(&self, field: &str) -> Option<&CollectionChanges> {
        self.collections.get(field)
    }

    /// Whether the remote object must restart for the changes to apply
    pub fn restart_required(&self) -> bool {
        self.restart_required
    }

    /// Nothing to write; the caller should skip the remote call
    pub fn is_empty(&self) -> bool {
        self.assign.is_empty() && self.remove.is_empty() && self.collections.is_empty()
    }

    /// Number of top-level field and slot changes
    pub fn change_count(&self) -> usize {
        self.assign.len()
            + self.remove.len()
            + self
                .collections
                .values()
                .map(|c| c.to_create.len() + c.to_update.len() + c.to_delete.len())
                .sum::<usize>()
    }

    /// Field removals followed by deleted slot keys, sorted and deduplicated
    ///
    /// Remote write APIs typically accept a single list of names to delete,
    /// with slot keys (e.g. `ide2`) in the same namespace as field names.
    pub fn delete_list(&self) -> Vec<String> {
        let mut names: BTreeSet<&str> = self.remove.iter().map(String::as_str).collect();
        for changes in self.collections.values() {
            names.extend(changes.to_delete.iter().map(String::as_str));
        }
        names.into_iter().map(str::to_string).collect()
    }

    /// Overlapping set/remove or create/update/delete entries, recursively
    pub fn check_consistency(&self) -> Vec<Diagnostic> {
        let mut found = Vec::new();
        self.check_consistency_at("", &mut found);
        found
    }

    fn check_consistency_at(&self, path: &str, found: &mut Vec<Diagnostic>) {
        for field in self.assign.keys().filter(|f| self.remove.contains(*f)) {
            found.push(Diagnostic::InternalConsistency {
                path: join_path(path, field),
                detail: "field both assigned and removed".to_string(),
            });
        }
        for (field, changes) in &self.collections {
            changes.check_consistency(&join_path(path, field), found);
        }
    }
}
