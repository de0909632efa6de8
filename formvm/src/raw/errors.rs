use std::fmt::{Display, Formatter};

/// Errors raised while decoding a binary form into a [`crate::raw::form::Form`].
#[derive(Debug)]
pub enum ReadError {
	IoError(std::io::Error),
	/// A read would have consumed bytes past the end of the buffer.
	TruncatedInput,
	/// The leading chunk was not `FORM`, or a nested chunk's tag was not valid ASCII.
	InvalidMagic,
	/// A chunk the VM requires to run any script was absent.
	MissingChunk(&'static str),
	/// A list address pointed outside of its containing chunk.
	InvalidAddress { chunk: &'static str, address: u32 },
	/// A string table reference did not resolve to a valid entry.
	InvalidStringReference(u32),
	/// A block's opcode byte did not match any known instruction.
	UnknownOpcode(u8),

	#[cfg(feature = "memmap2")]
	MemMapError(memmap2::Error),
}

impl From<std::io::Error> for ReadError {
	fn from(value: std::io::Error) -> Self {
		Self::IoError(value)
	}
}

#[cfg(feature = "memmap2")]
impl From<memmap2::Error> for ReadError {
	fn from(value: memmap2::Error) -> Self {
		Self::MemMapError(value)
	}
}

impl Display for ReadError {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::IoError(e) => write!(f, "I/O error: {e}"),
			Self::TruncatedInput => write!(f, "truncated input: read past end of buffer"),
			Self::InvalidMagic => write!(f, "invalid or missing FORM magic"),
			Self::MissingChunk(tag) => write!(f, "missing required chunk '{tag}'"),
			Self::InvalidAddress { chunk, address } => {
				write!(f, "address {address:#x} in chunk '{chunk}' out of range")
			},
			Self::InvalidStringReference(idx) => write!(f, "invalid string reference {idx:#x}"),
			Self::UnknownOpcode(op) => write!(f, "unknown opcode {op:#04x}"),
			#[cfg(feature = "memmap2")]
			Self::MemMapError(e) => write!(f, "memory-map error: {e}"),
		}
	}
}

impl std::error::Error for ReadError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Self::IoError(e) => Some(e),
			#[cfg(feature = "memmap2")]
			Self::MemMapError(e) => Some(e),
			_ => None,
		}
	}
}
