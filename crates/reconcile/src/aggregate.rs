//! Instruction aggregator - folds per-attribute instructions into one operation

use crate::composite::CompositeInstruction;
use crate::error::Diagnostics;
use crate::operation::{CollectionChanges, FieldValue, UpdateOperation};
use crate::schema::{AttributeSpec, CollectionSpec, CompositeSpec};
use crate::value::{Instruction, Scalar};

/// Collects instructions for one object (or slot) into an [`UpdateOperation`]
///
/// Everything is keyed by remote field name. Overlaps are recorded as
/// diagnostics instead of being resolved silently.
#[derive(Debug, Default)]
pub struct Aggregator {
    path: String,
    op: UpdateOperation,
    diagnostics: Diagnostics,
}

impl Aggregator {
    /// Start aggregating for the object at `path` (empty for the root)
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            ..Self::default()
        }
    }

    pub fn scalar(&mut self, spec: &AttributeSpec, instruction: Instruction<Scalar>) {
        let outcome = match instruction {
            Instruction::Keep => return,
            Instruction::Set(value) => self.op.assign(spec.remote_name(), FieldValue::Scalar(value)),
            Instruction::Remove => self.op.remove(spec.remote_name()),
        };
        self.note_restart(spec.restart);
        if let Err(diagnostic) = outcome {
            self.diagnostics.push(diagnostic.within(&self.path));
        }
    }

    pub fn composite(&mut self, spec: &CompositeSpec, instruction: CompositeInstruction) {
        let outcome = match instruction {
            CompositeInstruction::Keep => return,
            CompositeInstruction::RemoveWhole => self.op.remove(spec.remote_name()),
            CompositeInstruction::ReplaceWith(fields) => self
                .op
                .assign(spec.remote_name(), FieldValue::Composite(fields)),
        };
        self.note_restart(spec.restart);
        if let Err(diagnostic) = outcome {
            self.diagnostics.push(diagnostic.within(&self.path));
        }
    }

    pub fn collection(&mut self, spec: &CollectionSpec, changes: CollectionChanges) {
        if changes.is_empty() {
            return;
        }
        self.note_restart(spec.restart);
        self.op.attach(spec.remote_name(), changes);
    }

    fn note_restart(&mut self, restart: bool) {
        if restart {
            self.op.mark_restart_required();
        }
    }

    /// The aggregated operation and any overlaps found on the way
    pub fn finish(self) -> (UpdateOperation, Diagnostics) {
        (self.op, self.diagnostics)
    }
}
