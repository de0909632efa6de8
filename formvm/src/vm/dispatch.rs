use crate::raw::code::DataType;
use crate::vm::error::VmError;
use crate::vm::stack::MainStack;

/// One operand after its runtime `DataType` tag has been resolved to a
/// concrete Rust type. Turning the dynamic tag into one of these variants is
/// the dispatcher's whole job: once an opcode handler has a `NumericValue`,
/// the rest of its logic is ordinary statically-typed code, not a redispatch
/// per operation.
#[derive(Debug, Copy, Clone)]
pub enum NumericValue {
	F64(f64),
	F32(f32),
	I64(i64),
	I32(i32),
	I16(i16),
}

impl NumericValue {
	pub fn data_type(&self) -> DataType {
		match self {
			Self::F64(_) => DataType::F64,
			Self::F32(_) => DataType::F32,
			Self::I64(_) => DataType::I64,
			Self::I32(_) => DataType::I32,
			Self::I16(_) => DataType::I16,
		}
	}

	pub fn is_float(&self) -> bool {
		matches!(self, Self::F64(_) | Self::F32(_))
	}

	fn width(&self) -> u32 {
		match self {
			Self::F64(_) | Self::I64(_) => 64,
			Self::F32(_) | Self::I32(_) => 32,
			Self::I16(_) => 16,
		}
	}

	/// Width if this operand is itself a float, zero otherwise, so an
	/// integer operand's width never inflates the float branch's result type.
	fn float_width(&self) -> u32 {
		match self {
			Self::F64(_) => 64,
			Self::F32(_) => 32,
			Self::I64(_) | Self::I32(_) | Self::I16(_) => 0,
		}
	}

	pub fn as_f64(&self) -> f64 {
		match *self {
			Self::F64(v) => v,
			Self::F32(v) => v as f64,
			Self::I64(v) => v as f64,
			Self::I32(v) => v as f64,
			Self::I16(v) => v as f64,
		}
	}

	pub fn as_i64(&self) -> i64 {
		match *self {
			Self::F64(v) => v as i64,
			Self::F32(v) => v as i64,
			Self::I64(v) => v,
			Self::I32(v) => v as i64,
			Self::I16(v) => v as i64,
		}
	}
}

/// Pops one operand declared as a numeric primitive (never `var`, which is
/// resolved one level up by the interpreter since it needs frame/instance
/// state this module has no business holding).
pub fn pop_numeric(stack: &mut MainStack, t: DataType) -> Result<NumericValue, VmError> {
	Ok(match t {
		DataType::F64 => NumericValue::F64(stack.pop()?),
		DataType::F32 => NumericValue::F32(stack.pop()?),
		DataType::I64 => NumericValue::I64(stack.pop()?),
		DataType::I32 => NumericValue::I32(stack.pop()?),
		DataType::I16 => NumericValue::I16(stack.pop()?),
		DataType::Str | DataType::Var => return Err(VmError::InvalidVariableAccess("operand is not a numeric primitive")),
	})
}

pub fn push_numeric(stack: &mut MainStack, value: NumericValue) -> Result<(), VmError> {
	match value {
		NumericValue::F64(v) => stack.push(v),
		NumericValue::F32(v) => stack.push(v),
		NumericValue::I64(v) => stack.push(v),
		NumericValue::I32(v) => stack.push(v),
		NumericValue::I16(v) => stack.push(v),
	}
}

/// Wraps `value` as a stack variable tagged with its own concrete type,
/// used wherever the arithmetic join rule or `conv …→var` produces a
/// variable result.
pub fn push_numeric_as_variable(stack: &mut MainStack, value: NumericValue) -> Result<(), VmError> {
	match value {
		NumericValue::F64(v) => stack.push_stack_variable(v),
		NumericValue::F32(v) => stack.push_stack_variable(v),
		NumericValue::I64(v) => stack.push_stack_variable(v),
		NumericValue::I32(v) => stack.push_stack_variable(v),
		NumericValue::I16(v) => stack.push_stack_variable(v),
	}
}

/// Converts `value` to the statically-known numeric type named by `target`
/// and pushes it as a plain (non-variable) primitive (`conv` to a numeric type).
pub fn push_converted(stack: &mut MainStack, value: NumericValue, target: DataType) -> Result<(), VmError> {
	match target {
		DataType::F64 => stack.push(value.as_f64()),
		DataType::F32 => stack.push(value.as_f64() as f32),
		DataType::I64 => stack.push(value.as_i64()),
		DataType::I32 => stack.push(value.as_i64() as i32),
		DataType::I16 => stack.push(value.as_i64() as i16),
		DataType::Str | DataType::Var => Err(VmError::InvalidVariableAccess("not a numeric conversion target")),
	}
}

/// Reads a `var` operand's payload once its tag is known, for the
/// `stack_top_or_global` resolution path.
pub fn pop_variable_payload(stack: &mut MainStack, tag: DataType) -> Result<NumericValue, VmError> {
	Ok(match tag {
		DataType::F64 => NumericValue::F64(stack.read_variable_parameter()?),
		DataType::F32 => NumericValue::F32(stack.read_variable_parameter()?),
		DataType::I64 => NumericValue::I64(stack.read_variable_parameter()?),
		DataType::I32 => NumericValue::I32(stack.read_variable_parameter()?),
		DataType::I16 => NumericValue::I16(stack.read_variable_parameter()?),
		DataType::Str | DataType::Var => return Err(VmError::InvalidVariableAccess("variable payload is not numeric")),
	})
}

/// Reads a stack variable's payload at an arbitrary frame-relative offset,
/// for the `local` resolution path, which must not disturb the main cursor.
pub fn read_numeric_at(stack: &MainStack, at: usize, tag: DataType) -> Result<NumericValue, VmError> {
	Ok(match tag {
		DataType::F64 => NumericValue::F64(stack.stack_variable_payload_at(at)?),
		DataType::F32 => NumericValue::F32(stack.stack_variable_payload_at(at)?),
		DataType::I64 => NumericValue::I64(stack.stack_variable_payload_at(at)?),
		DataType::I32 => NumericValue::I32(stack.stack_variable_payload_at(at)?),
		DataType::I16 => NumericValue::I16(stack.stack_variable_payload_at(at)?),
		DataType::Str | DataType::Var => return Err(VmError::InvalidVariableAccess("variable payload is not numeric")),
	})
}

/// A pair of operands promoted to a common primitive type: widest width
/// present, with either operand being a float forcing the float branch. An
/// integer operand's width does not widen a float result past what the
/// float operand(s) themselves call for.
#[derive(Debug, Copy, Clone)]
pub enum JoinedPair {
	F64(f64, f64),
	F32(f32, f32),
	I64(i64, i64),
	I32(i32, i32),
	I16(i16, i16),
}

impl JoinedPair {
	pub fn data_type(&self) -> DataType {
		match self {
			Self::F64(..) => DataType::F64,
			Self::F32(..) => DataType::F32,
			Self::I64(..) => DataType::I64,
			Self::I32(..) => DataType::I32,
			Self::I16(..) => DataType::I16,
		}
	}
}

pub fn join(a: NumericValue, b: NumericValue) -> JoinedPair {
	if a.is_float() || b.is_float() {
		let width = a.float_width().max(b.float_width()).max(32);
		if width >= 64 {
			JoinedPair::F64(a.as_f64(), b.as_f64())
		} else {
			JoinedPair::F32(a.as_f64() as f32, b.as_f64() as f32)
		}
	} else {
		match a.width().max(b.width()) {
			w if w >= 64 => JoinedPair::I64(a.as_i64(), b.as_i64()),
			w if w >= 32 => JoinedPair::I32(a.as_i64() as i32, b.as_i64() as i32),
			_ => JoinedPair::I16(a.as_i64() as i16, b.as_i64() as i16),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn join_float_ignores_integer_width() {
		let joined = join(NumericValue::I64(3), NumericValue::F32(2.5));
		assert!(matches!(joined, JoinedPair::F32(3.0, 2.5)));
	}

	#[test]
	fn join_widens_float_to_f64_only_from_a_float_operand() {
		let joined = join(NumericValue::I64(3), NumericValue::F64(2.5));
		assert!(matches!(joined, JoinedPair::F64(3.0, 2.5)));
	}

	#[test]
	fn join_prefers_widest_integer() {
		let joined = join(NumericValue::I16(3), NumericValue::I32(9000));
		assert!(matches!(joined, JoinedPair::I32(3, 9000)));
	}

	#[test]
	fn pop_numeric_rejects_non_primitive() {
		let mut stack = MainStack::new(16);
		assert!(matches!(pop_numeric(&mut stack, DataType::Var), Err(VmError::InvalidVariableAccess(_))));
	}
}
