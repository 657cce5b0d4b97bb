//! Scalar reconciler - one attribute, one instruction

use crate::value::{Declared, Instruction, Observed, Origin};

/// Decide what to do with a single attribute
///
/// - `Unresolved` never produces a write.
/// - A concrete value is set unless the remote already holds it.
/// - An absent value removes the remote one, except on cloned objects
///   where undeclared attributes are inherited from the clone source.
pub fn reconcile<T>(declared: &Declared<T>, observed: &Observed<T>, origin: Origin) -> Instruction<T>
where
    T: PartialEq + Clone,
{
    match (declared, observed) {
        (Declared::Unresolved, _) => Instruction::Keep,
        (Declared::Concrete(want), Observed::Concrete(have)) if want == have => Instruction::Keep,
        (Declared::Concrete(want), _) => Instruction::Set(want.clone()),
        (Declared::Absent, Observed::Concrete(_)) if !origin.is_clone() => Instruction::Remove,
        (Declared::Absent, _) => Instruction::Keep,
    }
}
