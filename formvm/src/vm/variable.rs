use crate::raw::code::{DataType, InstType};
use crate::raw::form::VarId;

/// Where a `var`-typed operand was actually found while resolving it off the
/// stack. Only the variants the core handles are constructible; anything
/// else is rejected during resolution as `InvalidVariableAccess`.
#[derive(Debug, Copy, Clone)]
pub enum VariableLocation {
	StackTopOrGlobal,
	Global(VarId),
	Local(VarId),
}

impl VariableLocation {
	pub fn inst_type(&self) -> InstType {
		match self {
			Self::StackTopOrGlobal => InstType::StackTopOrGlobal,
			Self::Global(_) => InstType::Global,
			Self::Local(_) => InstType::Local,
		}
	}
}

/// A value popped from a `var`-typed operand, preserving the `DataType` tag
/// it carried and where it came from so a handler could write a result back
/// to the same slot.
#[derive(Debug, Copy, Clone)]
pub struct VariableReference<T> {
	pub value: T,
	pub tag: DataType,
	pub location: VariableLocation,
}

impl<T> VariableReference<T> {
	pub fn into_inner(self) -> T {
		self.value
	}
}
