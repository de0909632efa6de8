use std::fmt::{Display, Formatter};
use std::sync::Arc;

use crate::raw::code::{DataType, Instr};
use crate::raw::errors::ReadError;

/// Fatal interpreter errors. Every variant unwinds `VM::run` immediately;
/// the VM owns all of its state so no partial cleanup is required, and the
/// originating `Form` stays reusable for another `VM`.
#[derive(Debug)]
pub enum VmError {
	UnknownOpcode(u8),
	InvalidTypeCombination { opcode: Instr, t1: DataType, t2: DataType },
	DivisionByZero,
	StackOverflow,
	StackUnderflow,
	FrameOverflow,
	UnimplementedBuiltin(Arc<str>),
	InvalidVariableAccess(&'static str),
	Unimplemented(&'static str),
	Cancelled,
	/// Raised by `Form::string`/script lookups surfacing a decode-shaped error at run time.
	InvalidStringReference(u32),
}

/// A `VmError` together with the execution context it failed in, for a
/// single-line diagnostic.
#[derive(Debug)]
pub struct VmFault {
	pub error: VmError,
	pub script: Arc<str>,
	pub pc: usize,
}

impl Display for VmFault {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "{} (in '{}' at block {})", self.error, self.script, self.pc)
	}
}

impl Display for VmError {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::UnknownOpcode(op) => write!(f, "unknown opcode {op:#04x}"),
			Self::InvalidTypeCombination { opcode, t1, t2 } => {
				write!(f, "{opcode:?} has no implementation for ({t1:?}, {t2:?})")
			},
			Self::DivisionByZero => write!(f, "integer division by zero"),
			Self::StackOverflow => write!(f, "main stack overflow"),
			Self::StackUnderflow => write!(f, "main stack underflow"),
			Self::FrameOverflow => write!(f, "call depth exceeded"),
			Self::UnimplementedBuiltin(name) => write!(f, "call to unregistered builtin '{name}'"),
			Self::InvalidVariableAccess(reason) => write!(f, "invalid variable access: {reason}"),
			Self::Unimplemented(what) => write!(f, "unimplemented: {what}"),
			Self::Cancelled => write!(f, "execution cancelled: step budget exhausted"),
			Self::InvalidStringReference(idx) => write!(f, "invalid string reference {idx:#x}"),
		}
	}
}

/// Decode errors reached while resolving something at run time (a script
/// name, a string-table lookup) collapse to the closest `VmError`; the
/// interpreter otherwise never touches the decode layer after a `Form` is built.
impl From<ReadError> for VmError {
	fn from(error: ReadError) -> Self {
		match error {
			ReadError::UnknownOpcode(op) => Self::UnknownOpcode(op),
			ReadError::InvalidStringReference(idx) => Self::InvalidStringReference(idx),
			_ => Self::Unimplemented("decode error reached the interpreter"),
		}
	}
}

impl std::error::Error for VmError {}
impl std::error::Error for VmFault {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		Some(&self.error)
	}
}
