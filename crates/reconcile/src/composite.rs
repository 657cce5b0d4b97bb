//! Composite reconciler
//!
//! A composite is stored remotely as one indivisible value (e.g. a CPU
//! emulation descriptor `type=host,flags=+aes`), so a change to any
//! sub-field resends all of them.

use crate::error::Diagnostic;
use crate::scalar;
use crate::schema::CompositeSpec;
use crate::value::{Declared, DeclaredFields, Fields, Instruction, Observed, Origin};
use log::trace;

/// Outcome of reconciling one composite
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompositeInstruction {
    Keep,
    /// Every sub-field ends up empty; remove the remote field
    RemoveWhole,
    /// Resend the composite with all current sub-field values
    ReplaceWith(Fields),
}

/// Reconcile the sub-fields of a composite as one unit
///
/// Fails with [`Diagnostic::StructuralContradiction`] when the anchor would
/// be removed while other sub-fields keep a value.
pub fn reconcile(
    spec: &CompositeSpec,
    declared: &Declared<DeclaredFields>,
    observed: &Fields,
    origin: Origin,
) -> Result<CompositeInstruction, Diagnostic> {
    let declared_fields = match declared {
        Declared::Unresolved => return Ok(CompositeInstruction::Keep),
        Declared::Absent if observed.is_empty() => return Ok(CompositeInstruction::Keep),
        // every sub-field is absent
        Declared::Absent => None,
        Declared::Concrete(fields) => Some(fields),
    };

    let absent = Declared::Absent;
    let mut merged = observed.clone();
    let mut anchor_removed = false;

    for field in &spec.fields {
        let want = declared_fields
            .and_then(|fields| fields.get(&field.name))
            .unwrap_or(&absent);
        let have = Observed::from(observed.get(&field.name).cloned());

        match scalar::reconcile(want, &have, origin) {
            Instruction::Keep => {}
            Instruction::Set(value) => {
                trace!("{}.{}: set {value}", spec.name, field.name);
                merged.insert(field.name.clone(), value);
            }
            Instruction::Remove => {
                trace!("{}.{}: remove", spec.name, field.name);
                merged.remove(&field.name);
                if field.name == spec.anchor {
                    anchor_removed = true;
                }
            }
        }
    }

    if anchor_removed && !merged.is_empty() {
        return Err(Diagnostic::StructuralContradiction {
            path: spec.name.clone(),
            anchor: spec.anchor.clone(),
            dependents: merged.keys().cloned().collect(),
        });
    }

    if merged.is_empty() {
        if observed.is_empty() {
            return Ok(CompositeInstruction::Keep);
        }
        return Ok(CompositeInstruction::RemoveWhole);
    }

    if merged == *observed {
        Ok(CompositeInstruction::Keep)
    } else {
        Ok(CompositeInstruction::ReplaceWith(merged))
    }
}
