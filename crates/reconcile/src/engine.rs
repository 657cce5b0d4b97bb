//! Reconciliation entry points
//!
//! [`plan`] reconciles one remote object against its last observed state;
//! [`plan_create`] builds the body for an object that does not exist yet.

use crate::aggregate::Aggregator;
use crate::collection;
use crate::composite;
use crate::error::{Diagnostics, Result, join_path};
use crate::operation::UpdateOperation;
use crate::scalar;
use crate::schema::ObjectSchema;
use crate::value::{Declared, DeclaredObject, Observed, ObservedObject, Origin};
use log::debug;

/// Compute the update that brings `observed` in line with `declared`
///
/// All problems in the object are collected first; if there are any the
/// object is rejected as a whole with [`crate::Error::Rejected`].
pub fn plan(
    schema: &ObjectSchema,
    declared: &DeclaredObject,
    observed: &ObservedObject,
    origin: Origin,
) -> Result<UpdateOperation> {
    schema.validate()?;

    let mut diagnostics = Diagnostics::new();
    schema.check(declared, observed, "", &mut diagnostics);

    let op = reconcile_object(schema, declared, observed, origin, "", &mut diagnostics);
    diagnostics.extend(op.check_consistency());

    if diagnostics.is_empty() {
        debug!(
            "planned {} change(s), {} removal(s){}",
            op.change_count(),
            op.delete_list().len(),
            if op.restart_required() { ", restart required" } else { "" }
        );
    } else {
        debug!(
            "rejected with {} diagnostic(s){}",
            diagnostics.len(),
            if diagnostics.has_defects() { ", including defects" } else { "" }
        );
    }
    diagnostics.into_result(op)
}

/// Body for creating an object that does not exist remotely yet
///
/// Same as reconciling against an empty observed object: concrete values
/// are assigned, unresolved and absent ones are left out.
pub fn plan_create(schema: &ObjectSchema, declared: &DeclaredObject) -> Result<UpdateOperation> {
    plan(schema, declared, &ObservedObject::default(), Origin::Created)
}

/// Reconcile every attribute, composite and collection the schema names
pub(crate) fn reconcile_object(
    schema: &ObjectSchema,
    declared: &DeclaredObject,
    observed: &ObservedObject,
    origin: Origin,
    path: &str,
    diagnostics: &mut Diagnostics,
) -> UpdateOperation {
    let absent_scalar = Declared::Absent;
    let absent_fields = Declared::Absent;
    let absent_slots = Declared::Absent;

    let mut aggregator = Aggregator::new(path);

    for spec in &schema.attributes {
        let want = declared.scalars.get(&spec.name).unwrap_or(&absent_scalar);
        let have = Observed::from(observed.scalars.get(&spec.name).cloned());
        aggregator.scalar(spec, scalar::reconcile(want, &have, origin));
    }

    for spec in &schema.composites {
        let want = declared.composites.get(&spec.name).unwrap_or(&absent_fields);
        match composite::reconcile(spec, want, observed.composite(&spec.name), origin) {
            Ok(instruction) => aggregator.composite(spec, instruction),
            Err(diagnostic) => diagnostics.push(diagnostic.within(path)),
        }
    }

    for spec in &schema.collections {
        let want = declared.collections.get(&spec.name).unwrap_or(&absent_slots);
        let changes = collection::reconcile(
            spec,
            want,
            observed.collection(&spec.name),
            origin,
            &join_path(path, &spec.name),
            diagnostics,
        );
        aggregator.collection(spec, changes);
    }

    let (op, found) = aggregator.finish();
    diagnostics.extend(found);
    op
}


/// Property tests over whole objects
#[cfg(test)]
mod proptest_objects {
    use super::*;
    use crate::schema::{AttributeSpec, CollectionSpec, CompositeSpec, Granularity};
    use crate::value::{Fields, Scalar, ScalarKind};
    use proptest::prelude::*;
    use proptest::sample::select;
    use std::collections::BTreeMap;

    fn schema() -> ObjectSchema {
        ObjectSchema::new()
            .attribute(AttributeSpec::new("cores", ScalarKind::Int).with_restart())
            .attribute(AttributeSpec::new("name", ScalarKind::String))
            .composite(
                CompositeSpec::new(
                    "emulation",
                    "type",
                    vec![
                        AttributeSpec::new("type", ScalarKind::String),
                        AttributeSpec::new("flags", ScalarKind::Set),
                    ],
                )
                .with_remote("cpu"),
            )
            .collection(CollectionSpec::new(
                "cdrom",
                Granularity::AtomicReplace,
                ObjectSchema::new().attribute(AttributeSpec::new("file_id", ScalarKind::String)),
            ))
            .collection(CollectionSpec::new(
                "disk",
                Granularity::FieldLevel,
                ObjectSchema::new()
                    .attribute(AttributeSpec::new("size", ScalarKind::Int))
                    .attribute(AttributeSpec::new("aio", ScalarKind::String).with_restart()),
            ))
    }

    fn arb_observed() -> impl Strategy<Value = ObservedObject> {
        (
            prop::option::of(1_i64..64),
            prop::option::of(select(vec!["web", "db", "cache"])),
            prop::option::of((
                select(vec!["host", "kvm64", "x86-64-v2"]),
                prop::collection::btree_set(select(vec!["+aes", "-pcid", "+pdpe1gb"]), 0..3),
            )),
            prop::collection::btree_map(select(vec!["ide0", "ide2", "sata0"]), select(vec!["none", "cdrom"]), 0..3),
            prop::collection::btree_map(
                select(vec!["scsi0", "scsi1"]),
                (1_i64..512, select(vec!["native", "io_uring"])),
                0..3,
            ),
        )
            .prop_map(|(cores, name, emulation, cdrom, disk)| {
                let mut object = ObservedObject::new();
                if let Some(cores) = cores {
                    object = object.with_scalar("cores", cores);
                }
                if let Some(name) = name {
                    object = object.with_scalar("name", name);
                }
                if let Some((kind, flags)) = emulation {
                    object = object.with_composite(
                        "emulation",
                        Fields::from([
                            ("type".to_string(), Scalar::from(kind)),
                            ("flags".to_string(), Scalar::set(flags)),
                        ]),
                    );
                }
                if !cdrom.is_empty() {
                    let slots = cdrom
                        .into_iter()
                        .map(|(key, file)| (key.to_string(), ObservedObject::new().with_scalar("file_id", file)))
                        .collect();
                    object = object.with_collection("cdrom", slots);
                }
                if !disk.is_empty() {
                    let slots = disk
                        .into_iter()
                        .map(|(key, (size, aio))| {
                            let slot = ObservedObject::new().with_scalar("size", size).with_scalar("aio", aio);
                            (key.to_string(), slot)
                        })
                        .collect();
                    object = object.with_collection("disk", slots);
                }
                object
            })
    }

    /// Declare exactly what is observed
    fn declare(observed: &ObservedObject) -> DeclaredObject {
        DeclaredObject {
            scalars: observed
                .scalars
                .iter()
                .map(|(name, value)| (name.clone(), Declared::Concrete(value.clone())))
                .collect(),
            composites: observed
                .composites
                .iter()
                .map(|(name, fields)| {
                    let fields = fields
                        .iter()
                        .map(|(field, value)| (field.clone(), Declared::Concrete(value.clone())))
                        .collect();
                    (name.clone(), Declared::Concrete(fields))
                })
                .collect(),
            collections: observed
                .collections
                .iter()
                .map(|(name, slots)| {
                    let slots: BTreeMap<_, _> = slots.iter().map(|(key, slot)| (key.clone(), declare(slot))).collect();
                    (name.clone(), Declared::Concrete(slots))
                })
                .collect(),
        }
    }

    proptest! {
        /// Declaring what is already there produces nothing to write
        #[test]
        fn converged_object_plans_nothing(observed in arb_observed()) {
            let op = plan(&schema(), &declare(&observed), &observed, Origin::Created).unwrap();
            prop_assert!(op.is_empty());
            prop_assert!(!op.restart_required());
        }

        /// A cloned object with nothing declared keeps everything it inherited
        #[test]
        fn clone_never_removes_inherited(observed in arb_observed()) {
            let op = plan(&schema(), &DeclaredObject::new(), &observed, Origin::Cloned).unwrap();
            prop_assert!(op.removals().is_empty());
            prop_assert!(op.delete_list().is_empty());
        }

        /// The same object created blank loses every top-level field it had
        #[test]
        fn created_object_drops_undeclared(observed in arb_observed()) {
            let op = plan(&schema(), &DeclaredObject::new(), &observed, Origin::Created).unwrap();
            let expected = observed.scalars.len()
                + usize::from(observed.composites.contains_key("emulation"));
            prop_assert_eq!(op.removals().len(), expected);
        }
    }
}
