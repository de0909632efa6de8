use std::sync::Arc;

use crate::vm::error::VmError;

/// One call record: the stack offset at which the callee's arguments begin,
/// and the script the frame is executing, kept around so a `VmFault` can
/// render the call chain without unwinding through every level.
#[derive(Debug, Clone)]
pub struct Frame {
	pub stack_offset: usize,
	pub script: Arc<str>,
}

/// A bounded LIFO of [`Frame`]s. `push` fails with `FrameOverflow` rather
/// than growing, since the core treats call depth as a discipline the host
/// is expected to configure (`max_frame_depth`), not an elastic resource.
pub struct FrameStack {
	frames: Vec<Frame>,
	max_depth: usize,
}

impl FrameStack {
	pub fn new(max_depth: usize) -> Self {
		Self { frames: Vec::new(), max_depth }
	}

	pub fn push(&mut self, frame: Frame) -> Result<&mut Frame, VmError> {
		if self.frames.len() >= self.max_depth {
			return Err(VmError::FrameOverflow);
		}
		self.frames.push(frame);
		Ok(self.frames.last_mut().expect("just pushed"))
	}

	pub fn top(&self) -> Option<&Frame> {
		self.frames.last()
	}

	pub fn top_mut(&mut self) -> Option<&mut Frame> {
		self.frames.last_mut()
	}

	pub fn pop(&mut self) -> Option<Frame> {
		self.frames.pop()
	}

	pub fn depth(&self) -> usize {
		self.frames.len()
	}

	/// Innermost-first, for a diagnostic's "call chain of script names".
	pub fn call_chain(&self) -> impl Iterator<Item = &Arc<str>> {
		self.frames.iter().rev().map(|f| &f.script)
	}
}
