use std::collections::HashMap;

use nohash_hasher::BuildNoHashHasher;

use crate::raw::code::DataType;
use crate::raw::form::VarId;
use crate::vm::error::VmError;
use crate::vm::stack::StackValue;

/// Identifies an instance in the instance manager; `GLOBAL` is the
/// distinguished instance backing unqualified global variables.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct InstanceId(pub u32);

impl InstanceId {
	pub const GLOBAL: InstanceId = InstanceId(0);
}

/// A variable's tagged payload, stored with the same shape as an on-stack
/// stack variable but independent of any particular `MainStack`.
#[derive(Debug, Copy, Clone)]
pub struct VariableSlot {
	tag: DataType,
	payload: [u8; 8],
}

impl Default for VariableSlot {
	fn default() -> Self {
		Self { tag: DataType::I32, payload: [0; 8] }
	}
}

impl VariableSlot {
	pub fn tag(&self) -> DataType {
		self.tag
	}

	pub fn write<T: StackValue>(&mut self, value: T) {
		self.tag = T::data_type();
		self.payload = [0; 8];
		self.payload[..T::byte_width()].copy_from_slice(&value.to_le_bytes_vec());
	}

	pub fn read<T: StackValue>(&self) -> T {
		T::from_le_bytes_slice(&self.payload[..T::byte_width()])
	}
}

/// One instance's variable slots, created lazily on first write; creation and
/// destruction of instances themselves is an out-of-scope collaborator.
#[derive(Debug, Default)]
pub struct Instance {
	variables: HashMap<u32, VariableSlot, BuildNoHashHasher<u32>>,
}

impl Instance {
	pub fn variable(&self, id: VarId) -> Option<&VariableSlot> {
		self.variables.get(&id.0)
	}

	pub fn variable_mut(&mut self, id: VarId) -> &mut VariableSlot {
		self.variables.entry(id.0).or_default()
	}
}

/// Global and per-instance variable storage keyed by `VarId`.
///
/// Lifecycle of instances themselves belongs to collaborators outside the
/// core; the manager only ever reads and lazily creates storage for the ids
/// it is asked about.
#[derive(Debug)]
pub struct InstanceManager {
	instances: HashMap<u32, Instance, BuildNoHashHasher<u32>>,
}

impl Default for InstanceManager {
	fn default() -> Self {
		Self::new()
	}
}

impl InstanceManager {
	pub fn new() -> Self {
		let mut instances: HashMap<u32, Instance, BuildNoHashHasher<u32>> = HashMap::default();
		instances.insert(InstanceId::GLOBAL.0, Instance::default());
		Self { instances }
	}

	pub fn global(&self) -> &Instance {
		self.instances.get(&InstanceId::GLOBAL.0).expect("global instance always present")
	}

	pub fn global_mut(&mut self) -> &mut Instance {
		self.instances.get_mut(&InstanceId::GLOBAL.0).expect("global instance always present")
	}

	pub fn instance(&self, id: InstanceId) -> Option<&Instance> {
		self.instances.get(&id.0)
	}

	pub fn instance_mut(&mut self, id: InstanceId) -> &mut Instance {
		self.instances.entry(id.0).or_default()
	}

	pub fn read_variable<T: StackValue>(&self, instance: InstanceId, id: VarId) -> Result<T, VmError> {
		let slot = self
			.instance(instance)
			.and_then(|inst| inst.variable(id))
			.ok_or(VmError::InvalidVariableAccess("read of unset variable"))?;
		Ok(slot.read())
	}

	pub fn write_variable<T: StackValue>(&mut self, instance: InstanceId, id: VarId, value: T) {
		self.instance_mut(instance).variable_mut(id).write(value);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn global_instance_is_preallocated() {
		let manager = InstanceManager::new();
		assert!(manager.instance(InstanceId::GLOBAL).is_some());
	}

	#[test]
	fn write_then_read_round_trips() {
		let mut manager = InstanceManager::new();
		manager.write_variable(InstanceId::GLOBAL, VarId(7), 42i32);
		let value: i32 = manager.read_variable(InstanceId::GLOBAL, VarId(7)).unwrap();
		assert_eq!(value, 42);
		assert_eq!(manager.global().variable(VarId(7)).unwrap().tag(), DataType::I32);
	}

	#[test]
	fn unset_variable_is_reported() {
		let manager = InstanceManager::new();
		assert!(matches!(
			manager.read_variable::<i32>(InstanceId::GLOBAL, VarId(1)),
			Err(VmError::InvalidVariableAccess(_))
		));
	}
}
