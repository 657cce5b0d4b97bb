//! Keyed-collection reconciler
//!
//! Slots present only in the declaration are created, slots present only
//! remotely are deleted, and slots on both sides are updated either by
//! full replacement or field by field, depending on the collection's
//! [`Granularity`].

use crate::engine;
use crate::error::{Diagnostics, join_path};
use crate::operation::{Body, CollectionChanges, FieldValue, SlotUpdate};
use crate::schema::{CollectionSpec, Granularity, ObjectSchema};
use crate::value::{Declared, DeclaredObject, ObservedObject, Origin, Scalar, SlotKey};
use log::trace;
use std::collections::BTreeMap;

/// Compute slot additions, updates and removals for one collection
///
/// An absent or unresolved declaration leaves every slot untouched; an
/// explicitly empty one deletes them all.
pub fn reconcile(
    spec: &CollectionSpec,
    declared: &Declared<BTreeMap<SlotKey, DeclaredObject>>,
    observed: &BTreeMap<SlotKey, ObservedObject>,
    origin: Origin,
    path: &str,
    diagnostics: &mut Diagnostics,
) -> CollectionChanges {
    let mut changes = CollectionChanges::new();

    let Declared::Concrete(declared) = declared else {
        return changes;
    };

    for (key, slot) in declared {
        let slot_path = join_path(path, key);

        let outcome = match observed.get(key) {
            None => {
                trace!("{slot_path}: create");
                let created = body(&spec.slot, slot, None);
                if restart_touched(&spec.slot, &created, &Body::new()) {
                    changes.mark_restart_required();
                }
                changes.create(key, created)
            }
            Some(current) => match spec.granularity {
                Granularity::AtomicReplace => {
                    if slot_matches(&spec.slot, slot, current) {
                        continue;
                    }
                    trace!("{slot_path}: replace");
                    let replacement = body(&spec.slot, slot, Some(current));
                    if restart_touched(&spec.slot, &replacement, &observed_body(&spec.slot, current)) {
                        changes.mark_restart_required();
                    }
                    changes.update(key, SlotUpdate::Replace(replacement))
                }
                Granularity::FieldLevel => {
                    let patch =
                        engine::reconcile_object(&spec.slot, slot, current, origin, &slot_path, diagnostics);
                    if patch.is_empty() {
                        continue;
                    }
                    trace!("{slot_path}: patch {} change(s)", patch.change_count());
                    changes.update(key, SlotUpdate::Patch(patch))
                }
            },
        };

        if let Err(diagnostic) = outcome {
            diagnostics.push(diagnostic.within(path));
        }
    }

    for key in observed.keys().filter(|k| !declared.contains_key(*k)) {
        trace!("{}: delete", join_path(path, key));
        if let Err(diagnostic) = changes.delete(key) {
            diagnostics.push(diagnostic.within(path));
        }
    }

    changes
}

/// Structural equality between a declared slot and its observed state
///
/// Unresolved values match anything; absent nested collections are not
/// compared since they leave the remote slots untouched.
pub fn slot_matches(schema: &ObjectSchema, declared: &DeclaredObject, observed: &ObservedObject) -> bool {
    let absent = Declared::Absent;

    let scalars_match = schema.attributes.iter().all(|attr| {
        let want = declared.scalars.get(&attr.name).unwrap_or(&absent);
        scalar_matches(want, observed.scalars.get(&attr.name))
    });

    let composites_match = schema.composites.iter().all(|spec| {
        let have = observed.composite(&spec.name);
        match declared.composites.get(&spec.name) {
            None | Some(Declared::Absent) => have.is_empty(),
            Some(Declared::Unresolved) => true,
            Some(Declared::Concrete(fields)) => spec.fields.iter().all(|field| {
                let want = fields.get(&field.name).unwrap_or(&absent);
                scalar_matches(want, have.get(&field.name))
            }),
        }
    });

    let collections_match = schema.collections.iter().all(|spec| {
        let have = observed.collection(&spec.name);
        match declared.collections.get(&spec.name) {
            None | Some(Declared::Absent | Declared::Unresolved) => true,
            Some(Declared::Concrete(slots)) => {
                slots.len() == have.len()
                    && slots.iter().all(|(key, slot)| {
                        have.get(key)
                            .is_some_and(|current| slot_matches(&spec.slot, slot, current))
                    })
            }
        }
    });

    scalars_match && composites_match && collections_match
}

fn scalar_matches(declared: &Declared<Scalar>, observed: Option<&Scalar>) -> bool {
    match declared {
        Declared::Unresolved => true,
        Declared::Absent => observed.is_none(),
        Declared::Concrete(value) => observed == Some(value),
    }
}

/// Full body of a slot, keyed by remote field name
///
/// Unresolved values are filled in from `observed` when the slot already
/// exists, so a full replacement does not erase values the remote side
/// computed. Absent values are left out.
pub fn body(schema: &ObjectSchema, declared: &DeclaredObject, observed: Option<&ObservedObject>) -> Body {
    let mut out = Body::new();

    for attr in &schema.attributes {
        let value = match declared.scalars.get(&attr.name) {
            Some(Declared::Concrete(value)) => Some(value.clone()),
            Some(Declared::Unresolved) => observed.and_then(|o| o.scalars.get(&attr.name).cloned()),
            None | Some(Declared::Absent) => None,
        };
        if let Some(value) = value {
            out.insert(attr.remote_name().to_string(), FieldValue::Scalar(value));
        }
    }

    for spec in &schema.composites {
        let have = observed.map(|o| o.composite(&spec.name));
        let fields = match declared.composites.get(&spec.name) {
            Some(Declared::Concrete(fields)) => spec
                .fields
                .iter()
                .filter_map(|field| {
                    let value = match fields.get(&field.name) {
                        Some(Declared::Concrete(value)) => Some(value.clone()),
                        Some(Declared::Unresolved) => have.and_then(|h| h.get(&field.name).cloned()),
                        None | Some(Declared::Absent) => None,
                    };
                    value.map(|v| (field.name.clone(), v))
                })
                .collect(),
            Some(Declared::Unresolved) => have.cloned().unwrap_or_default(),
            None | Some(Declared::Absent) => continue,
        };
        if !fields.is_empty() {
            out.insert(spec.remote_name().to_string(), FieldValue::Composite(fields));
        }
    }

    for spec in &schema.collections {
        let have = observed.map(|o| o.collection(&spec.name));
        let slots: BTreeMap<SlotKey, Body> = match declared.collections.get(&spec.name) {
            Some(Declared::Concrete(slots)) => slots
                .iter()
                .map(|(key, slot)| {
                    let current = have.and_then(|h| h.get(key));
                    (key.clone(), body(&spec.slot, slot, current))
                })
                .collect(),
            Some(Declared::Unresolved) => have
                .map(|h| {
                    h.iter()
                        .map(|(key, slot)| (key.clone(), observed_body(&spec.slot, slot)))
                        .collect()
                })
                .unwrap_or_default(),
            None | Some(Declared::Absent) => continue,
        };
        if !slots.is_empty() {
            out.insert(spec.remote_name().to_string(), FieldValue::Slots(slots));
        }
    }

    out
}

/// Body of an observed slot, keyed by remote field name
fn observed_body(schema: &ObjectSchema, observed: &ObservedObject) -> Body {
    let mut out = Body::new();
    for attr in &schema.attributes {
        if let Some(value) = observed.scalars.get(&attr.name) {
            out.insert(attr.remote_name().to_string(), FieldValue::Scalar(value.clone()));
        }
    }
    for spec in &schema.composites {
        let fields = observed.composite(&spec.name);
        if !fields.is_empty() {
            out.insert(spec.remote_name().to_string(), FieldValue::Composite(fields.clone()));
        }
    }
    for spec in &schema.collections {
        let slots: BTreeMap<SlotKey, Body> = observed
            .collection(&spec.name)
            .iter()
            .map(|(key, slot)| (key.clone(), observed_body(&spec.slot, slot)))
            .collect();
        if !slots.is_empty() {
            out.insert(spec.remote_name().to_string(), FieldValue::Slots(slots));
        }
    }
    out
}

/// Whether going from `old` to `new` changes a restart-flagged field
///
/// Bodies are keyed by remote name; nested slots are compared pairwise,
/// a missing slot counting as an empty body.
fn restart_touched(schema: &ObjectSchema, new: &Body, old: &Body) -> bool {
    let changed = |remote: &str| new.get(remote) != old.get(remote);

    if schema.attributes.iter().any(|attr| attr.restart && changed(attr.remote_name())) {
        return true;
    }
    if schema.composites.iter().any(|spec| spec.restart && changed(spec.remote_name())) {
        return true;
    }

    schema.collections.iter().any(|spec| {
        let remote = spec.remote_name();
        if !changed(remote) {
            return false;
        }
        if spec.restart {
            return true;
        }
        let empty: BTreeMap<SlotKey, Body> = BTreeMap::new();
        let new_slots = match new.get(remote) {
            Some(FieldValue::Slots(slots)) => slots,
            _ => &empty,
        };
        let old_slots = match old.get(remote) {
            Some(FieldValue::Slots(slots)) => slots,
            _ => &empty,
        };
        let blank = Body::new();
        new_slots.keys().chain(old_slots.keys()).any(|key| {
            restart_touched(
                &spec.slot,
                new_slots.get(key).unwrap_or(&blank),
                old_slots.get(key).unwrap_or(&blank),
            )
        })
    })
}


/// Property tests for slot partitioning
#[cfg(test)]
mod proptest_key_sets {
    use super::*;
    use crate::schema::AttributeSpec;
    use crate::value::ScalarKind;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn spec(granularity: Granularity) -> CollectionSpec {
        CollectionSpec::new(
            "cdrom",
            granularity,
            ObjectSchema::new().attribute(AttributeSpec::new("file_id", ScalarKind::String)),
        )
    }

    fn arb_key() -> impl Strategy<Value = SlotKey> {
        prop::sample::select(vec!["ide0", "ide1", "ide2", "ide3", "sata0", "scsi0"]).prop_map(str::to_string)
    }

    fn arb_file() -> impl Strategy<Value = &'static str> {
        prop::sample::select(vec!["none", "cdrom", "local:iso/a.iso", "local:iso/b.iso"])
    }

    fn arb_declared() -> impl Strategy<Value = BTreeMap<SlotKey, DeclaredObject>> {
        prop::collection::btree_map(
            arb_key(),
            arb_file().prop_map(|file| DeclaredObject::new().with_scalar("file_id", file)),
            0..5,
        )
    }

    fn arb_observed() -> impl Strategy<Value = BTreeMap<SlotKey, ObservedObject>> {
        prop::collection::btree_map(
            arb_key(),
            arb_file().prop_map(|file| ObservedObject::new().with_scalar("file_id", file)),
            0..5,
        )
    }

    fn arb_granularity() -> impl Strategy<Value = Granularity> {
        prop_oneof![Just(Granularity::AtomicReplace), Just(Granularity::FieldLevel)]
    }

    proptest! {
        /// Declared keys are created, updated or already in line; observed-only
        /// keys are deleted; no key is claimed twice
        #[test]
        fn key_sets_are_complete_and_disjoint(
            declared in arb_declared(),
            observed in arb_observed(),
            granularity in arb_granularity(),
        ) {
            let collection = spec(granularity);
            let mut diagnostics = Diagnostics::new();
            let changes = reconcile(
                &collection,
                &Declared::Concrete(declared.clone()),
                &observed,
                Origin::Created,
                "cdrom",
                &mut diagnostics,
            );
            prop_assert!(diagnostics.is_empty());

            let created: BTreeSet<&SlotKey> = changes.to_create().keys().collect();
            let updated: BTreeSet<&SlotKey> = changes.to_update().keys().collect();
            let deleted: BTreeSet<&SlotKey> = changes.to_delete().iter().collect();

            prop_assert!(created.is_disjoint(&updated));
            prop_assert!(created.is_disjoint(&deleted));
            prop_assert!(updated.is_disjoint(&deleted));

            for (key, slot) in &declared {
                let in_line = observed
                    .get(key)
                    .is_some_and(|current| slot_matches(&collection.slot, slot, current));
                prop_assert_eq!(created.contains(key), !observed.contains_key(key));
                prop_assert_eq!(updated.contains(key), observed.contains_key(key) && !in_line);
            }

            let orphans: BTreeSet<&SlotKey> = observed.keys().filter(|k| !declared.contains_key(*k)).collect();
            prop_assert_eq!(deleted, orphans);
        }
    }
}
