use crate::raw::errors::ReadError;
use crate::raw::reader::BinaryReader;

/// A chunk header as it appears in the container: a 4-byte ASCII tag followed
/// by a `u32` payload length.
#[derive(Debug, Copy, Clone)]
pub struct ChunkHeader {
	pub tag: [u8; 4],
	pub length: u32,
}

impl ChunkHeader {
	pub fn tag_str(&self) -> &str {
		std::str::from_utf8(&self.tag).unwrap_or("????")
	}
}

/// Reads one chunk header and returns it along with a reader scoped to its payload.
///
/// The returned reader's lifetime ties it to the payload slice, so callers can
/// decode the chunk body and then resume the parent reader past it regardless
/// of how much of the payload they actually consumed.
#[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
pub fn read_chunk_header<'l>(reader: &mut BinaryReader<'l>) -> Result<(ChunkHeader, BinaryReader<'l>), ReadError> {
	let tag: [u8; 4] = reader.read()?;
	let length: u32 = reader.read()?;
	let payload = reader.read_bytes(length as usize)?;
	Ok((ChunkHeader { tag, length }, BinaryReader::new(payload)))
}
