use std::sync::Arc;

use owning_ref::ArcRef;

use crate::raw::chunk::read_chunk_header;
use crate::raw::errors::ReadError;
use crate::raw::reader::BinaryReader;

/// A handle into [`Form::strings`], produced by decoding a `STRG`-chunk address.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct StringReference(pub u32);

/// Identifies a named variable slot within an instance or the global scope.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct VarId(pub u32);

/// One compiled script: a name and its code region as raw little-endian words.
///
/// `code` is a zero-copy slice of the form's backing buffer; nothing here is
/// a pre-decoded [`crate::raw::code::Block`], since some words are trailing
/// operands (a `call`'s function index, a `pushspc`'s special-var code) that
/// would not decode as valid instructions on their own.
#[derive(Debug, Clone)]
pub struct Script {
	pub name: StringReference,
	pub code: ArcRef<[u8]>,
}

impl Script {
	pub fn word_count(&self) -> usize {
		self.code.len() / 4
	}

	/// Reads the 32-bit little-endian word at block index `index`, if in range.
	pub fn word_at(&self, index: usize) -> Option<u32> {
		let start = index.checked_mul(4)?;
		let bytes = self.code.get(start..start + 4)?;
		Some(u32::from_le_bytes(bytes.try_into().unwrap()))
	}
}

#[derive(Debug, Clone)]
pub struct ScriptDefinition {
	pub name: StringReference,
	/// Index into [`Form::code`], or `None` for a declared-but-uncompiled script.
	pub code_index: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct FunctionDefinition {
	pub name: StringReference,
	pub is_builtin: bool,
	/// Index into [`Form::code`]; set exactly when `is_builtin` is false.
	pub script_index: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct VariableDefinition {
	pub name: StringReference,
	pub var_id: VarId,
}

/// The fully decoded, immutable in-memory form.
///
/// Produced once from a byte buffer and then shared read-only: many `VM`s may
/// run against the same `Form` concurrently.
#[derive(Debug)]
pub struct Form {
	strings: Vec<Arc<str>>,
	pub variables: Vec<VariableDefinition>,
	pub functions: Vec<FunctionDefinition>,
	pub scripts: Vec<ScriptDefinition>,
	pub code: Vec<Script>,
}

impl Form {
	pub fn string(&self, reference: StringReference) -> Result<&str, ReadError> {
		self.strings
			.get(reference.0 as usize)
			.map(|s| s.as_ref())
			.ok_or(ReadError::InvalidStringReference(reference.0))
	}

	pub fn script_by_name(&self, name: &str) -> Option<&Script> {
		self.code.iter().find(|s| self.string(s.name).ok() == Some(name))
	}

	/// Decodes a complete form from its backing buffer: a `FORM` chunk
	/// containing `STRG`, `VARI`, `FUNC`, `SCPT`, and `CODE` child chunks.
	#[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
	pub fn read(data: Arc<[u8]>) -> Result<Self, ReadError> {
		let root: ArcRef<[u8]> = ArcRef::new(data);
		let mut reader = BinaryReader::new(root.as_ref());
		let (header, mut body) = read_chunk_header(&mut reader)?;
		if &header.tag != b"FORM" {
			return Err(ReadError::InvalidMagic);
		}

		let mut strings = None;
		let mut variables = None;
		let mut functions = None;
		let mut scripts = None;
		let mut code = None;

		while !body.is_empty() {
			let (chunk, mut payload) = read_chunk_header(&mut body)?;
			match &chunk.tag {
				b"STRG" => strings = Some(decode_strings(&mut payload)?),
				b"VARI" => variables = Some(decode_variables(&mut payload)?),
				b"FUNC" => functions = Some(decode_functions(&mut payload)?),
				b"SCPT" => scripts = Some(decode_scripts(&mut payload)?),
				b"CODE" => {
					let code_chunk = arc_view(&root, payload.remaining());
					code = Some(decode_code(&mut payload, &code_chunk)?);
				},
				_ => {
					#[cfg(feature = "tracing")]
					tracing::trace!(tag = chunk.tag_str(), "skipping unknown chunk");
				},
			}
		}

		Ok(Self {
			strings: strings.ok_or(ReadError::MissingChunk("STRG"))?,
			variables: variables.ok_or(ReadError::MissingChunk("VARI"))?,
			functions: functions.ok_or(ReadError::MissingChunk("FUNC"))?,
			scripts: scripts.ok_or(ReadError::MissingChunk("SCPT"))?,
			code: code.ok_or(ReadError::MissingChunk("CODE"))?,
		})
	}
}

#[cfg(test)]
impl Form {
	/// Assembles a `Form` directly from decoded parts, skipping the chunk
	/// encoding, for tests that only care about interpreter behavior.
	pub fn for_tests(
		strings: Vec<Arc<str>>,
		variables: Vec<VariableDefinition>,
		functions: Vec<FunctionDefinition>,
		scripts: Vec<ScriptDefinition>,
		code: Vec<Script>,
	) -> Self {
		Self { strings, variables, functions, scripts, code }
	}
}

fn decode_strings(reader: &mut BinaryReader) -> Result<Vec<Arc<str>>, ReadError> {
	let list = reader.read_address_list()?;
	list.decode(|r| r.read_length_prefixed_str().map(Arc::from))
}

fn decode_variables(reader: &mut BinaryReader) -> Result<Vec<VariableDefinition>, ReadError> {
	let list = reader.read_address_list()?;
	list.decode(|r| {
		Ok(VariableDefinition {
			name: StringReference(r.read()?),
			var_id: VarId(r.read()?),
		})
	})
}

fn decode_functions(reader: &mut BinaryReader) -> Result<Vec<FunctionDefinition>, ReadError> {
	let list = reader.read_address_list()?;
	list.decode(|r| {
		let name = StringReference(r.read()?);
		let is_builtin = r.read::<u32>()? != 0;
		let script_index: i32 = r.read()?;
		Ok(FunctionDefinition {
			name,
			is_builtin,
			script_index: (!is_builtin && script_index >= 0).then_some(script_index as u32),
		})
	})
}

fn decode_scripts(reader: &mut BinaryReader) -> Result<Vec<ScriptDefinition>, ReadError> {
	let list = reader.read_address_list()?;
	list.decode(|r| {
		let name = StringReference(r.read()?);
		let id: i32 = r.read()?;
		Ok(ScriptDefinition {
			name,
			code_index: (id >= 0).then_some(id as u32),
		})
	})
}

/// `code_chunk` is an owned view over this `CODE` chunk's own payload, so each
/// script's `code_offset` is resolved relative to it rather than to the whole file.
fn decode_code(reader: &mut BinaryReader, code_chunk: &ArcRef<[u8]>) -> Result<Vec<Script>, ReadError> {
	let list = reader.read_address_list()?;
	list.decode(|r| {
		let name = StringReference(r.read()?);
		let code_length = r.read::<u32>()? as usize;
		let code_offset = r.read::<u32>()? as usize;
		let end = code_offset.checked_add(code_length).ok_or(ReadError::TruncatedInput)?;
		if end > code_chunk.len() {
			return Err(ReadError::InvalidAddress { chunk: "CODE", address: code_offset as u32 });
		}
		let code = code_chunk.clone().map(|s| &s[code_offset..end]);
		Ok(Script { name, code })
	})
}

/// Reinterprets `slice` (a borrow derived from `root`'s own backing buffer) as
/// an `ArcRef` keeping `root`'s allocation alive, preserving zero-copy sharing
/// across nested chunk payloads.
fn arc_view(root: &ArcRef<[u8]>, slice: &[u8]) -> ArcRef<[u8]> {
	let root_start = root.as_ptr() as usize;
	let start = slice.as_ptr() as usize - root_start;
	let end = start + slice.len();
	debug_assert!(end <= root.len());
	root.clone().map(|s| &s[start..end])
}

#[cfg(test)]
mod tests {
	use super::*;

	fn push_address_list(data: &mut Vec<u8>, base: u32, element_size: u32, count: u32) {
		data.extend_from_slice(&count.to_le_bytes());
		for i in 0..count {
			data.extend_from_slice(&(base + i * element_size).to_le_bytes());
		}
	}

	fn chunk(tag: &[u8; 4], payload: &[u8]) -> Vec<u8> {
		let mut out = Vec::new();
		out.extend_from_slice(tag);
		out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
		out.extend_from_slice(payload);
		out
	}

	#[test]
	fn decodes_minimal_form() {
		// STRG: one string "main" at a self-described offset.
		let mut strg = Vec::new();
		push_address_list(&mut strg, 8, 0, 1);
		strg.extend_from_slice(&4u32.to_le_bytes());
		strg.extend_from_slice(b"main");

		// VARI: no variables.
		let vari = 0u32.to_le_bytes().to_vec();

		// FUNC: no functions.
		let func = 0u32.to_le_bytes().to_vec();

		// SCPT: no scripts.
		let scpt = 0u32.to_le_bytes().to_vec();

		// CODE: one script named string-index 0, two words of code at offset 12.
		let mut code = Vec::new();
		push_address_list(&mut code, 8, 12, 1);
		code.extend_from_slice(&0u32.to_le_bytes()); // name ref
		code.extend_from_slice(&8u32.to_le_bytes()); // code_length
		code.extend_from_slice(&20u32.to_le_bytes()); // code_offset (absolute within CODE payload)
		code.extend_from_slice(&0xDEADBEEFu32.to_le_bytes());
		code.extend_from_slice(&0xCAFEBABEu32.to_le_bytes());

		let mut payload = Vec::new();
		payload.extend_from_slice(&chunk(b"STRG", &strg));
		payload.extend_from_slice(&chunk(b"VARI", &vari));
		payload.extend_from_slice(&chunk(b"FUNC", &func));
		payload.extend_from_slice(&chunk(b"SCPT", &scpt));
		payload.extend_from_slice(&chunk(b"CODE", &code));

		let form_bytes = chunk(b"FORM", &payload);
		let form = Form::read(Arc::from(form_bytes.as_slice())).unwrap();

		assert_eq!(form.code.len(), 1);
		let script = &form.code[0];
		assert_eq!(form.string(script.name).unwrap(), "main");
		assert_eq!(script.word_count(), 2);
		assert_eq!(script.word_at(0), Some(0xDEADBEEF));
		assert_eq!(script.word_at(1), Some(0xCAFEBABE));
		assert_eq!(script.word_at(2), None);
	}

	#[test]
	fn rejects_bad_magic() {
		let bytes = chunk(b"NOPE", &[]);
		assert!(matches!(Form::read(Arc::from(bytes.as_slice())), Err(ReadError::InvalidMagic)));
	}

	#[test]
	fn missing_chunk_is_reported() {
		let payload = chunk(b"STRG", &0u32.to_le_bytes());
		let bytes = chunk(b"FORM", &payload);
		assert!(matches!(Form::read(Arc::from(bytes.as_slice())), Err(ReadError::MissingChunk("VARI"))));
	}
}
