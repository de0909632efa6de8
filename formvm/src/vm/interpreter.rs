use std::sync::Arc;

use crate::builtins::BuiltinResolver;
use crate::raw::code::{decode_block, CompFunc, DataType, InstType, Instr, SpecialVar};
use crate::raw::form::{Form, Script, VarId};
use crate::vm::context::ContextStack;
use crate::vm::dispatch::{
	join, pop_numeric, pop_variable_payload, push_converted, push_numeric, push_numeric_as_variable, read_numeric_at,
	JoinedPair, NumericValue,
};
use crate::vm::error::{VmError, VmFault};
use crate::vm::frame::{Frame, FrameStack};
use crate::vm::instance::{InstanceId, InstanceManager};
use crate::vm::stack::{MainStack, StackValue, STACK_VARIABLE_SIZE};
use crate::vm::variable::{VariableLocation, VariableReference};

/// Default capacity for [`MainStack`], matching the source's fixed
/// preallocated buffer.
pub const DEFAULT_MAX_STACK_DEPTH: usize = 1 << 20;

/// Default bound on call nesting before `FrameOverflow`.
pub const DEFAULT_MAX_FRAME_DEPTH: usize = 512;

/// One operand after resolution, carrying whether it came off a plain
/// primitive slot or a `var`-typed one (arithmetic needs to know this to
/// decide whether its result is re-wrapped as a stack variable).
enum Operand {
	Primitive(NumericValue),
	Variable(VariableReference<NumericValue>),
}

impl Operand {
	fn numeric(&self) -> NumericValue {
		match self {
			Self::Primitive(v) => *v,
			Self::Variable(v) => v.value,
		}
	}

	fn is_var(&self) -> bool {
		matches!(self, Self::Variable(_))
	}
}

enum ArithOp {
	Mul,
	Div,
	Add,
	Sub,
	Shl,
	Shr,
}

/// The bytecode virtual machine: owns the main stack, frame/context stacks,
/// and instance manager for a single run. `'f` ties the VM to the `Form` it
/// executes against, which may be shared across many VMs.
pub struct VM<'f> {
	form: &'f Form,
	stack: MainStack,
	frames: FrameStack,
	#[allow(dead_code)]
	contexts: ContextStack,
	instances: InstanceManager,
	builtins: Option<&'f dyn BuiltinResolver>,
	step_budget: Option<u64>,
}

impl<'f> VM<'f> {
	pub fn new(form: &'f Form) -> Self {
		Self::with_builtins(form, None)
	}

	pub fn with_builtins(form: &'f Form, builtins: Option<&'f dyn BuiltinResolver>) -> Self {
		Self {
			form,
			stack: MainStack::new(DEFAULT_MAX_STACK_DEPTH),
			frames: FrameStack::new(DEFAULT_MAX_FRAME_DEPTH),
			contexts: ContextStack::new(),
			instances: InstanceManager::new(),
			builtins,
			step_budget: None,
		}
	}

	/// A cooperative step budget checked once per block; exhausting it
	/// raises `Cancelled` rather than looping forever.
	pub fn with_step_budget(mut self, budget: u64) -> Self {
		self.step_budget = Some(budget);
		self
	}

	pub fn instances(&self) -> &InstanceManager {
		&self.instances
	}

	pub fn instances_mut(&mut self) -> &mut InstanceManager {
		&mut self.instances
	}

	pub fn push_stack_variable<T: StackValue>(&mut self, value: T) -> Result<(), VmError> {
		self.stack.push_stack_variable(value)
	}

	/// Hex-dumps the current frame's stack bytes.
	pub fn print_stack_frame(&self) {
		let base = self.frames.top().map(|f| f.stack_offset).unwrap_or(0);
		let bytes = self.stack.frame_slice(base, self.stack.offset());
		let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
		let message = format!("Stack frame data ({:5} bytes): {}", self.stack.offset() - base, hex);
		#[cfg(feature = "tracing")]
		tracing::info!("{message}");
		#[cfg(not(feature = "tracing"))]
		println!("{message}");
	}

	/// Runs `script` to completion, leaving exactly one stack variable (its
	/// return value) above the stack offset this call started at.
	#[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(script = %script_name(self.form, script))))]
	pub fn run(&mut self, script: &Script) -> Result<(), VmFault> {
		let name: Arc<str> = Arc::from(script_name(self.form, script));
		let stack_offset = self.stack.offset();
		self.frames
			.push(Frame { stack_offset, script: name })
			.map_err(|error| VmFault { error, script: Arc::from("<root>"), pc: 0 })?;
		let result = self.execute(script);
		self.frames.pop();
		result
	}

	fn execute(&mut self, script: &Script) -> Result<(), VmFault> {
		let name: Arc<str> = Arc::from(script_name(self.form, script));
		let mut pc: usize = 0;
		loop {
			match self.step(script, &name, pc)? {
				Some(delta) => pc = (pc as i64 + delta) as usize,
				None => return Ok(()),
			}
		}
	}

	fn step(&mut self, script: &Script, name: &Arc<str>, pc: usize) -> Result<Option<i64>, VmFault> {
		let fault = |error: VmError| VmFault { error, script: name.clone(), pc };

		if let Some(budget) = self.step_budget.as_mut() {
			if *budget == 0 {
				return Err(fault(VmError::Cancelled));
			}
			*budget -= 1;
		}

		let word = script.word_at(pc).ok_or_else(|| fault(VmError::Unimplemented("pc ran past end of script without a ret")))?;
		let block = decode_block(word).map_err(VmError::from).map_err(fault)?;

		#[cfg(feature = "vm-verbose")]
		tracing::trace!(pc, opcode = ?block.opcode, "dispatch");

		match block.opcode {
			Instr::Conv => {
				let src = self.pop_operand(block.t1).map_err(fault)?;
				self.convert_and_push(src, block.t2).map_err(fault)?;
				Ok(Some(1))
			},

			Instr::Mul => self.arithmetic(block.t1, block.t2, ArithOp::Mul, block.opcode).map_err(fault).map(|_| Some(1)),
			Instr::Div => self.arithmetic(block.t1, block.t2, ArithOp::Div, block.opcode).map_err(fault).map(|_| Some(1)),
			Instr::Add => self.arithmetic(block.t1, block.t2, ArithOp::Add, block.opcode).map_err(fault).map(|_| Some(1)),
			Instr::Sub => self.arithmetic(block.t1, block.t2, ArithOp::Sub, block.opcode).map_err(fault).map(|_| Some(1)),
			Instr::Shl => self.arithmetic(block.t1, block.t2, ArithOp::Shl, block.opcode).map_err(fault).map(|_| Some(1)),
			Instr::Shr => self.arithmetic(block.t1, block.t2, ArithOp::Shr, block.opcode).map_err(fault).map(|_| Some(1)),

			Instr::Cmp => {
				let func = block.comp_func().map_err(VmError::from).map_err(fault)?;
				let (a, b) = self.op_pop2(block.t1, block.t2).map_err(fault)?;
				let joined = join(a.numeric(), b.numeric());
				self.stack.push(compare(func, joined)).map_err(fault)?;
				Ok(Some(1))
			},

			Instr::Popz => {
				self.pop_operand(block.t1).map_err(fault)?;
				Ok(Some(1))
			},

			Instr::B => Ok(Some(block.imm24_signed() as i64)),

			Instr::Bt => {
				let taken = self.stack.pop::<bool>().map_err(fault)?;
				Ok(Some(if taken { block.imm24_signed() as i64 } else { 1 }))
			},

			Instr::Bf => {
				let taken = self.stack.pop::<bool>().map_err(fault)?;
				Ok(Some(if !taken { block.imm24_signed() as i64 } else { 1 }))
			},

			Instr::PushI16 => {
				self.stack.push(block.imm16_signed()).map_err(fault)?;
				Ok(Some(1))
			},

			Instr::PushSpc => {
				let code = script
					.word_at(pc + 1)
					.ok_or_else(|| fault(VmError::Unimplemented("pushspc missing its trailing word")))?
					& 0x00FF_FFFF;
				self.push_special(SpecialVar::from_code(code)).map_err(fault)?;
				Ok(Some(2))
			},

			Instr::Call => {
				self.call(script, &block, pc, fault)?;
				Ok(Some(2))
			},

			Instr::Ret => {
				self.ret().map_err(fault)?;
				Ok(None)
			},

			Instr::PushEnv => Err(fault(VmError::Unimplemented("pushenv"))),
			Instr::PopEnv => Err(fault(VmError::Unimplemented("popenv"))),
		}
	}

	/// `fault` wraps a local `VmError` with the caller's script/pc: a bad
	/// function index or an overflowed frame happens at the call site. A
	/// nested [`Self::execute`] failure is already a `VmFault` attributed to
	/// its own innermost point of failure and is propagated as-is.
	fn call(
		&mut self,
		script: &Script,
		block: &crate::raw::code::Block,
		pc: usize,
		fault: impl Fn(VmError) -> VmFault,
	) -> Result<(), VmFault> {
		let argument_count = block.argument_count() as usize;
		let function_index = script
			.word_at(pc + 1)
			.ok_or_else(|| fault(VmError::Unimplemented("call missing its function-index word")))? as usize;
		let stack_offset = self
			.stack
			.offset()
			.checked_sub(argument_count * STACK_VARIABLE_SIZE)
			.ok_or_else(|| fault(VmError::StackUnderflow))?;
		let func = self
			.form
			.functions
			.get(function_index)
			.ok_or_else(|| fault(VmError::InvalidVariableAccess("call targets an unknown function index")))?;
		let name: Arc<str> = Arc::from(self.form.string(func.name).unwrap_or("<unknown>"));

		if func.is_builtin {
			let resolver = self.builtins.ok_or_else(|| fault(VmError::UnimplementedBuiltin(name.clone())))?;
			self.frames.push(Frame { stack_offset, script: name.clone() }).map_err(&fault)?;
			let result = resolver.call(&name, &mut self.stack, argument_count as u16);
			self.frames.pop();
			result.map_err(fault)
		} else {
			let script_index = func
				.script_index
				.ok_or_else(|| fault(VmError::InvalidVariableAccess("non-builtin function has no associated script")))?;
			let callee = self
				.form
				.code
				.get(script_index as usize)
				.ok_or_else(|| fault(VmError::InvalidVariableAccess("unknown script index")))?
				.clone();
			self.frames.push(Frame { stack_offset, script: name }).map_err(&fault)?;
			self.execute(&callee)?;
			self.frames.pop();
			Ok(())
		}
	}

	fn ret(&mut self) -> Result<(), VmError> {
		let frame_offset = self.frames.top().ok_or(VmError::InvalidVariableAccess("ret with no active frame"))?.stack_offset;
		let top = self.stack.offset();
		let src_start = top.checked_sub(STACK_VARIABLE_SIZE).ok_or(VmError::StackUnderflow)?;
		self.stack.copy_within(src_start..top, frame_offset);
		let delta = (frame_offset + STACK_VARIABLE_SIZE) as isize - top as isize;
		self.stack.skip(delta)
	}

	fn push_special(&mut self, var: SpecialVar) -> Result<(), VmError> {
		match var {
			SpecialVar::Argument(n) => {
				let base = self.frames.top().ok_or(VmError::InvalidVariableAccess("pushspc with no active frame"))?.stack_offset;
				let start = base + n as usize * STACK_VARIABLE_SIZE;
				let bytes = self.stack.frame_slice(start, start + STACK_VARIABLE_SIZE).to_vec();
				self.stack.push_raw(&bytes)
			},
			SpecialVar::Reserved(_) => Err(VmError::Unimplemented("reserved special variable")),
		}
	}

	fn convert_and_push(&mut self, src: Operand, target: DataType) -> Result<(), VmError> {
		match target {
			DataType::Var => push_numeric_as_variable(&mut self.stack, src.numeric()),
			DataType::Str => Err(VmError::Unimplemented("string conversion")),
			numeric_target => push_converted(&mut self.stack, src.numeric(), numeric_target),
		}
	}

	fn arithmetic(&mut self, t1: DataType, t2: DataType, op: ArithOp, opcode: Instr) -> Result<(), VmError> {
		let (a, b) = self.op_pop2(t1, t2)?;
		let is_var = a.is_var() || b.is_var();
		let joined = join(a.numeric(), b.numeric());
		let result = apply_arith(op, joined, opcode)?;
		if is_var {
			push_numeric_as_variable(&mut self.stack, result)
		} else {
			push_numeric(&mut self.stack, result)
		}
	}

	/// Pops `(a, b)` in the operand's logical order: `t1`'s pop happens
	/// first but lands in `b`, `t2`'s pop happens second but lands in `a`,
	/// since the stack is LIFO and these are pushed `a` then `b`.
	fn op_pop2(&mut self, t1: DataType, t2: DataType) -> Result<(Operand, Operand), VmError> {
		let b = self.pop_operand(t1)?;
		let a = self.pop_operand(t2)?;
		Ok((a, b))
	}

	fn pop_operand(&mut self, t: DataType) -> Result<Operand, VmError> {
		match t {
			// A plain `var` operand on the stack is always the 16-byte shape
			// `conv …→var`/`pushspc` leave behind: tag then payload, no
			// separate location marker. `resolve_variable_reference` covers
			// the `global`/`local` case for hosts that need named access.
			DataType::Var => {
				let tag = self.stack.pop_stack_variable_tag()?;
				let value = pop_variable_payload(&mut self.stack, tag)?;
				Ok(Operand::Variable(VariableReference { value, tag, location: VariableLocation::StackTopOrGlobal }))
			},
			DataType::Str => Err(VmError::InvalidVariableAccess("string operands are not implemented by the core")),
			numeric => pop_numeric(&mut self.stack, numeric).map(Operand::Primitive),
		}
	}

	/// Resolves a named `global`/`local` variable reference given an
	/// already-known `InstType`/`VarId`. No core opcode drives this path
	/// directly (none of the core instructions encode an `InstType` marker),
	/// but it is the counterpart a host uses to read a named variable the
	/// same way [`Self::write_variable`] writes one.
	#[allow(dead_code)]
	fn resolve_variable_reference(&self, inst_type: InstType, var_id: VarId) -> Result<VariableReference<NumericValue>, VmError> {
		match inst_type {
			InstType::Global => {
				let tag = self
					.instances
					.global()
					.variable(var_id)
					.ok_or(VmError::InvalidVariableAccess("unknown global variable"))?
					.tag();
				let value = read_numeric_variable(&self.instances, InstanceId::GLOBAL, var_id, tag)?;
				Ok(VariableReference { value, tag, location: VariableLocation::Global(var_id) })
			},
			InstType::Local => {
				let base = self.frames.top().ok_or(VmError::InvalidVariableAccess("no active frame for local variable"))?.stack_offset;
				let at = base + var_id.0 as usize * STACK_VARIABLE_SIZE;
				let tag = self.stack.stack_variable_tag_at(at)?;
				let value = read_numeric_at(&self.stack, at, tag)?;
				Ok(VariableReference { value, tag, location: VariableLocation::Local(var_id) })
			},
			InstType::StackTopOrGlobal | InstType::Instance | InstType::SelfInstance => {
				Err(VmError::InvalidVariableAccess("not a named variable location"))
			},
		}
	}

	/// Writes a value resolved via [`Self::resolve_variable_reference`]'s
	/// location back to its source. No core opcode currently invokes this,
	/// since the core instruction set has no dedicated store instruction.
	#[allow(dead_code)]
	fn write_variable<T: StackValue>(&mut self, location: VariableLocation, value: T) -> Result<(), VmError> {
		match location {
			VariableLocation::StackTopOrGlobal => Err(VmError::InvalidVariableAccess("stack_top_or_global is read-only")),
			VariableLocation::Global(var_id) => {
				self.instances.write_variable(InstanceId::GLOBAL, var_id, value);
				Ok(())
			},
			VariableLocation::Local(var_id) => {
				let base = self.frames.top().ok_or(VmError::InvalidVariableAccess("no active frame for local variable"))?.stack_offset;
				let at = base + var_id.0 as usize * STACK_VARIABLE_SIZE;
				self.stack.write_stack_variable_at(at, value)
			},
		}
	}
}

fn script_name<'f>(form: &'f Form, script: &Script) -> &'f str {
	form.string(script.name).unwrap_or("<unknown>")
}

fn read_numeric_variable(
	instances: &InstanceManager,
	instance: InstanceId,
	id: VarId,
	tag: DataType,
) -> Result<NumericValue, VmError> {
	Ok(match tag {
		DataType::F64 => NumericValue::F64(instances.read_variable(instance, id)?),
		DataType::F32 => NumericValue::F32(instances.read_variable(instance, id)?),
		DataType::I64 => NumericValue::I64(instances.read_variable(instance, id)?),
		DataType::I32 => NumericValue::I32(instances.read_variable(instance, id)?),
		DataType::I16 => NumericValue::I16(instances.read_variable(instance, id)?),
		DataType::Str | DataType::Var => return Err(VmError::InvalidVariableAccess("variable payload is not numeric")),
	})
}

fn compare(func: CompFunc, joined: JoinedPair) -> bool {
	match joined {
		JoinedPair::F64(a, b) => apply_cmp(func, a, b),
		JoinedPair::F32(a, b) => apply_cmp(func, a, b),
		JoinedPair::I64(a, b) => apply_cmp(func, a, b),
		JoinedPair::I32(a, b) => apply_cmp(func, a, b),
		JoinedPair::I16(a, b) => apply_cmp(func, a, b),
	}
}

fn apply_cmp<T: PartialOrd>(func: CompFunc, a: T, b: T) -> bool {
	match func {
		CompFunc::Lt => a < b,
		CompFunc::Lte => a <= b,
		CompFunc::Eq => a == b,
		CompFunc::Neq => a != b,
		CompFunc::Gte => a >= b,
		CompFunc::Gt => a > b,
	}
}

fn apply_arith(op: ArithOp, joined: JoinedPair, opcode: Instr) -> Result<NumericValue, VmError> {
	use JoinedPair::*;

	let type_error = || VmError::InvalidTypeCombination { opcode, t1: joined.data_type(), t2: joined.data_type() };

	Ok(match (op, joined) {
		(ArithOp::Mul, F64(a, b)) => NumericValue::F64(a * b),
		(ArithOp::Mul, F32(a, b)) => NumericValue::F32(a * b),
		(ArithOp::Mul, I64(a, b)) => NumericValue::I64(a.wrapping_mul(b)),
		(ArithOp::Mul, I32(a, b)) => NumericValue::I32(a.wrapping_mul(b)),
		(ArithOp::Mul, I16(a, b)) => NumericValue::I16(a.wrapping_mul(b)),

		(ArithOp::Add, F64(a, b)) => NumericValue::F64(a + b),
		(ArithOp::Add, F32(a, b)) => NumericValue::F32(a + b),
		(ArithOp::Add, I64(a, b)) => NumericValue::I64(a.wrapping_add(b)),
		(ArithOp::Add, I32(a, b)) => NumericValue::I32(a.wrapping_add(b)),
		(ArithOp::Add, I16(a, b)) => NumericValue::I16(a.wrapping_add(b)),

		(ArithOp::Sub, F64(a, b)) => NumericValue::F64(a - b),
		(ArithOp::Sub, F32(a, b)) => NumericValue::F32(a - b),
		(ArithOp::Sub, I64(a, b)) => NumericValue::I64(a.wrapping_sub(b)),
		(ArithOp::Sub, I32(a, b)) => NumericValue::I32(a.wrapping_sub(b)),
		(ArithOp::Sub, I16(a, b)) => NumericValue::I16(a.wrapping_sub(b)),

		(ArithOp::Div, F64(a, b)) => NumericValue::F64(a / b),
		(ArithOp::Div, F32(a, b)) => NumericValue::F32(a / b),
		(ArithOp::Div, I64(a, b)) => NumericValue::I64(checked_div(a, b)?),
		(ArithOp::Div, I32(a, b)) => NumericValue::I32(checked_div(a, b)?),
		(ArithOp::Div, I16(a, b)) => NumericValue::I16(checked_div(a, b)?),

		(ArithOp::Shl, I64(a, b)) => NumericValue::I64(a.wrapping_shl(b as u32 & 63)),
		(ArithOp::Shl, I32(a, b)) => NumericValue::I32(a.wrapping_shl(b as u32 & 31)),
		(ArithOp::Shl, I16(a, b)) => NumericValue::I16(a.wrapping_shl(b as u32 & 15)),
		(ArithOp::Shr, I64(a, b)) => NumericValue::I64(a.wrapping_shr(b as u32 & 63)),
		(ArithOp::Shr, I32(a, b)) => NumericValue::I32(a.wrapping_shr(b as u32 & 31)),
		(ArithOp::Shr, I16(a, b)) => NumericValue::I16(a.wrapping_shr(b as u32 & 15)),

		(ArithOp::Shl | ArithOp::Shr, F64(..) | F32(..)) => return Err(type_error()),
	})
}

trait CheckedDiv: Sized {
	fn checked_div_vm(self, rhs: Self) -> Result<Self, VmError>;
}

macro_rules! impl_checked_div {
	($ty: ty) => {
		impl CheckedDiv for $ty {
			fn checked_div_vm(self, rhs: Self) -> Result<Self, VmError> {
				self.checked_div(rhs).ok_or(VmError::DivisionByZero)
			}
		}
	};
}

impl_checked_div!(i16);
impl_checked_div!(i32);
impl_checked_div!(i64);

fn checked_div<T: CheckedDiv>(a: T, b: T) -> Result<T, VmError> {
	a.checked_div_vm(b)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn block_word(opcode: Instr, t1: DataType, t2: DataType, imm16: u16) -> u32 {
		((opcode as u32) << 24) | ((t2 as u32) << 20) | ((t1 as u32) << 16) | imm16 as u32
	}

	fn branch_word(opcode: Instr, imm24: i32) -> u32 {
		((opcode as u32) << 24) | (imm24 as u32 & 0x00FF_FFFF)
	}

	fn words_to_code(words: &[u32]) -> std::sync::Arc<[u8]> {
		let mut bytes = Vec::with_capacity(words.len() * 4);
		for w in words {
			bytes.extend_from_slice(&w.to_le_bytes());
		}
		std::sync::Arc::from(bytes.as_slice())
	}

	fn make_form_with_script(words: &[u32]) -> (Form, owning_ref::ArcRef<[u8]>) {
		use crate::raw::form::{FunctionDefinition, StringReference};

		let code_bytes: owning_ref::ArcRef<[u8]> = owning_ref::ArcRef::new(words_to_code(words));
		let script = Script { name: StringReference(0), code: code_bytes.clone() };
		let form = Form::for_tests(
			vec![std::sync::Arc::from("main")],
			vec![],
			vec![FunctionDefinition { name: StringReference(0), is_builtin: false, script_index: Some(0) }],
			vec![],
			vec![script],
		);
		(form, code_bytes)
	}

	fn run_script(words: &[u32]) -> Result<VM<'static>, VmFault> {
		let (form, _code) = make_form_with_script(words);
		let form: &'static Form = Box::leak(Box::new(form));
		let mut vm = VM::new(form);
		vm.run(&form.code[0])?;
		Ok(vm)
	}

	#[test]
	fn push_pop_round_trip_scenario() {
		// pushi16 -7; conv i32->i64; conv i64->var; ret
		let words = [
			block_word(Instr::PushI16, DataType::I32, DataType::I32, (-7i16) as u16),
			block_word(Instr::Conv, DataType::I32, DataType::I64, 0),
			block_word(Instr::Conv, DataType::I64, DataType::Var, 0),
			block_word(Instr::Ret, DataType::I32, DataType::I32, 0),
		];
		let vm = run_script(&words).unwrap();
		assert_eq!(vm.stack.offset(), STACK_VARIABLE_SIZE);
		assert_eq!(vm.stack.stack_variable_tag_at(0).unwrap(), DataType::I64);
		assert_eq!(vm.stack.stack_variable_payload_at::<i64>(0).unwrap(), -7);
	}

	#[test]
	fn arithmetic_join_scenario() {
		// pushi16 3; conv i32->f64; conv f64->var; pushi16 2; mul i32,var; ret
		//
		// one operand is already a stack variable, so the widened result
		// comes back out as a variable too, per the join rule.
		let words = [
			block_word(Instr::PushI16, DataType::I32, DataType::I32, 3),
			block_word(Instr::Conv, DataType::I32, DataType::F64, 0),
			block_word(Instr::Conv, DataType::F64, DataType::Var, 0),
			block_word(Instr::PushI16, DataType::I32, DataType::I32, 2),
			block_word(Instr::Mul, DataType::I32, DataType::Var, 0),
			block_word(Instr::Ret, DataType::I32, DataType::I32, 0),
		];
		let vm = run_script(&words).unwrap();
		assert_eq!(vm.stack.stack_variable_tag_at(0).unwrap(), DataType::F64);
		assert_eq!(vm.stack.stack_variable_payload_at::<f64>(0).unwrap(), 6.0);
	}

	#[test]
	fn comparison_and_branch_taken_scenario() {
		// pushi16 5; pushi16 5; cmp i32,i32,eq; bf +4; pushi16 1; conv->var; b +3; pushi16 0; conv->var; ret
		let mut cmp_word = block_word(Instr::Cmp, DataType::I32, DataType::I32, 0);
		cmp_word |= (CompFunc::Eq as u32) << 8;
		let words = [
			block_word(Instr::PushI16, DataType::I32, DataType::I32, 5),
			block_word(Instr::PushI16, DataType::I32, DataType::I32, 5),
			cmp_word,
			branch_word(Instr::Bf, 4),
			block_word(Instr::PushI16, DataType::I32, DataType::I32, 1),
			block_word(Instr::Conv, DataType::I32, DataType::Var, 0),
			branch_word(Instr::B, 3),
			block_word(Instr::PushI16, DataType::I32, DataType::I32, 0),
			block_word(Instr::Conv, DataType::I32, DataType::Var, 0),
			block_word(Instr::Ret, DataType::I32, DataType::I32, 0),
		];
		let vm = run_script(&words).unwrap();
		assert_eq!(vm.stack.stack_variable_payload_at::<i32>(0).unwrap(), 1);
	}

	#[test]
	fn comparison_and_branch_not_taken_scenario() {
		let mut cmp_word = block_word(Instr::Cmp, DataType::I32, DataType::I32, 0);
		cmp_word |= (CompFunc::Neq as u32) << 8;
		let words = [
			block_word(Instr::PushI16, DataType::I32, DataType::I32, 5),
			block_word(Instr::PushI16, DataType::I32, DataType::I32, 5),
			cmp_word,
			branch_word(Instr::Bf, 4),
			block_word(Instr::PushI16, DataType::I32, DataType::I32, 1),
			block_word(Instr::Conv, DataType::I32, DataType::Var, 0),
			branch_word(Instr::B, 3),
			block_word(Instr::PushI16, DataType::I32, DataType::I32, 0),
			block_word(Instr::Conv, DataType::I32, DataType::Var, 0),
			block_word(Instr::Ret, DataType::I32, DataType::I32, 0),
		];
		let vm = run_script(&words).unwrap();
		assert_eq!(vm.stack.stack_variable_payload_at::<i32>(0).unwrap(), 0);
	}

	#[test]
	fn division_by_zero_is_reported() {
		let words = [
			block_word(Instr::PushI16, DataType::I32, DataType::I32, 1),
			block_word(Instr::PushI16, DataType::I32, DataType::I32, 0),
			block_word(Instr::Div, DataType::I32, DataType::I32, 0),
			block_word(Instr::Ret, DataType::I32, DataType::I32, 0),
		];
		let error = run_script(&words).unwrap_err();
		assert!(matches!(error.error, VmError::DivisionByZero));
	}

	#[test]
	fn call_with_arguments_scenario() {
		use crate::raw::form::{FunctionDefinition, StringReference};

		// callee: pushspc argument[0]; pushspc argument[1]; add i32,i32; ret
		let callee_words = [
			block_word(Instr::PushSpc, DataType::I32, DataType::I32, 0),
			0, // argument 0 special var code
			block_word(Instr::PushSpc, DataType::I32, DataType::I32, 0),
			1, // argument 1 special var code
			block_word(Instr::Add, DataType::Var, DataType::Var, 0),
			block_word(Instr::Ret, DataType::I32, DataType::I32, 0),
		];
		let caller_words = [
			block_word(Instr::PushI16, DataType::I32, DataType::I32, 3),
			block_word(Instr::Conv, DataType::I32, DataType::Var, 0),
			block_word(Instr::PushI16, DataType::I32, DataType::I32, 4),
			block_word(Instr::Conv, DataType::I32, DataType::Var, 0),
			block_word(Instr::Call, DataType::I32, DataType::I32, 2),
			0, // function index
			block_word(Instr::Ret, DataType::I32, DataType::I32, 0),
		];

		let callee_code: owning_ref::ArcRef<[u8]> = owning_ref::ArcRef::new(words_to_code(&callee_words));
		let caller_code: owning_ref::ArcRef<[u8]> = owning_ref::ArcRef::new(words_to_code(&caller_words));
		let callee = Script { name: StringReference(0), code: callee_code };
		let caller = Script { name: StringReference(1), code: caller_code };
		let form = Form::for_tests(
			vec![std::sync::Arc::from("callee"), std::sync::Arc::from("caller")],
			vec![],
			vec![FunctionDefinition { name: StringReference(0), is_builtin: false, script_index: Some(0) }],
			vec![],
			vec![callee, caller],
		);
		let form: &'static Form = Box::leak(Box::new(form));

		let mut vm = VM::new(form);
		vm.run(&form.code[1]).unwrap();
		assert_eq!(vm.stack.stack_variable_payload_at::<i32>(0).unwrap(), 7);
		assert_eq!(vm.stack.offset(), STACK_VARIABLE_SIZE);
	}
}
