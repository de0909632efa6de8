use std::mem::{size_of, MaybeUninit};
use std::slice::from_raw_parts_mut;

use crate::raw::errors::ReadError;

/// A positioned cursor over an immutable byte range.
///
/// Mirrors the cursor used by the chunk/table decoders this crate is
/// patterned after: every read is bounds-checked and failures surface as
/// [`ReadError::TruncatedInput`] rather than panicking.
#[derive(Copy, Clone)]
pub struct BinaryReader<'l> {
	data: &'l [u8],
	position: usize,
}

impl<'l> BinaryReader<'l> {
	pub fn new(data: &'l [u8]) -> Self {
		Self { data, position: 0 }
	}

	#[inline]
	pub fn tell(&self) -> usize {
		self.position
	}

	#[inline]
	pub fn len(&self) -> usize {
		self.data.len()
	}

	#[inline]
	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}

	/// Repositions the cursor to an absolute offset from the start of the buffer.
	#[inline]
	pub fn seek(&mut self, absolute: usize) -> Result<(), ReadError> {
		if absolute > self.data.len() {
			return Err(ReadError::TruncatedInput);
		}
		self.position = absolute;
		Ok(())
	}

	/// Returns a cursor over the same buffer positioned at `absolute`, leaving `self` untouched.
	pub fn at(&self, absolute: usize) -> Result<Self, ReadError> {
		let mut clone = *self;
		clone.seek(absolute)?;
		Ok(clone)
	}

	pub fn remaining(&self) -> &'l [u8] {
		&self.data[self.position..]
	}

	/// Reads `count` raw bytes and advances the cursor.
	pub fn read_bytes(&mut self, count: usize) -> Result<&'l [u8], ReadError> {
		let end = self.position.checked_add(count).ok_or(ReadError::TruncatedInput)?;
		let slice = self.data.get(self.position..end).ok_or(ReadError::TruncatedInput)?;
		self.position = end;
		Ok(slice)
	}

	/// Reads a value implementing [`FromByteStream`].
	#[inline]
	pub fn read<T: FromByteStream>(&mut self) -> Result<T, ReadError> {
		T::read(self)
	}

	/// Reads a null-terminated string starting at the cursor and advances past the terminator.
	pub fn read_c_str(&mut self) -> Result<&'l str, ReadError> {
		let start = self.position;
		let end = self.data[start..]
			.iter()
			.position(|b| *b == 0)
			.ok_or(ReadError::TruncatedInput)?;
		let str = std::str::from_utf8(&self.data[start..start + end]).map_err(|_| ReadError::TruncatedInput)?;
		self.position = start + end + 1;
		Ok(str)
	}

	/// Reads a null-terminated string located at an absolute offset, without moving this cursor.
	pub fn read_c_str_at(&self, absolute: usize) -> Result<&'l str, ReadError> {
		self.at(absolute)?.read_c_str()
	}

	/// Reads a length-prefixed (`u32` byte length) string at the cursor.
	pub fn read_length_prefixed_str(&mut self) -> Result<&'l str, ReadError> {
		let len = self.read::<u32>()? as usize;
		let bytes = self.read_bytes(len)?;
		std::str::from_utf8(bytes).map_err(|_| ReadError::TruncatedInput)
	}

	/// Reads a `{ count: u32, addresses: [u32; count] }` list header and yields the
	/// resolved element cursor for each address, in order. Addresses are absolute
	/// offsets from the start of the buffer this reader was constructed over.
	pub fn read_address_list(&mut self) -> Result<AddressList<'l>, ReadError> {
		let count = self.read::<u32>()? as usize;
		let mut addresses = Vec::with_capacity(count);
		for _ in 0..count {
			addresses.push(self.read::<u32>()?);
		}
		Ok(AddressList { root: *self, addresses })
	}
}

/// The result of decoding a `{ count, count × address }` indirected list header.
pub struct AddressList<'l> {
	root: BinaryReader<'l>,
	addresses: Vec<u32>,
}

impl<'l> AddressList<'l> {
	pub fn len(&self) -> usize {
		self.addresses.len()
	}

	pub fn is_empty(&self) -> bool {
		self.addresses.is_empty()
	}

	/// Decodes every element with `f`, following each address in turn.
	pub fn decode<T>(&self, mut f: impl FnMut(&mut BinaryReader<'l>) -> Result<T, ReadError>) -> Result<Vec<T>, ReadError> {
		let mut out = Vec::with_capacity(self.addresses.len());
		for &address in &self.addresses {
			let mut reader = self.root.at(address as usize)?;
			out.push(f(&mut reader)?);
		}
		Ok(out)
	}
}

/// Implemented by anything that can be read off a [`BinaryReader`] in its own encoding.
pub trait FromByteStream: Sized {
	fn read(reader: &mut BinaryReader) -> Result<Self, ReadError>;
}

#[inline]
unsafe fn read_pod<T: Copy>(reader: &mut BinaryReader) -> Result<T, ReadError> {
	let bytes = reader.read_bytes(size_of::<T>())?;
	let mut value = MaybeUninit::<T>::uninit();
	from_raw_parts_mut(value.as_mut_ptr() as *mut u8, size_of::<T>()).copy_from_slice(bytes);
	Ok(value.assume_init())
}

macro_rules! impl_from_byte_stream_le {
	($($ty: ty),*) => {$(
		impl FromByteStream for $ty {
			#[inline]
			fn read(reader: &mut BinaryReader) -> Result<Self, ReadError> {
				let bytes: [u8; size_of::<Self>()] = unsafe { read_pod(reader)? };
				Ok(Self::from_le_bytes(bytes))
			}
		}
	)*};
}

impl FromByteStream for u8 {
	#[inline]
	fn read(reader: &mut BinaryReader) -> Result<Self, ReadError> {
		Ok(reader.read_bytes(1)?[0])
	}
}

impl FromByteStream for i8 {
	#[inline]
	fn read(reader: &mut BinaryReader) -> Result<Self, ReadError> {
		Ok(reader.read_bytes(1)?[0] as i8)
	}
}

impl_from_byte_stream_le!(u16, u32, u64, i16, i32, i64, f32, f64);

impl<const SIZE: usize> FromByteStream for [u8; SIZE] {
	fn read(reader: &mut BinaryReader) -> Result<Self, ReadError> {
		let mut bytes = [0u8; SIZE];
		bytes.copy_from_slice(reader.read_bytes(SIZE)?);
		Ok(bytes)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn reads_le_integers() {
		let data = [0x2Au8, 0x00, 0x00, 0x00, 0xFFu8, 0xFFu8, 0x7Fu8, 0x00];
		let mut reader = BinaryReader::new(&data);
		assert_eq!(reader.read::<i32>().unwrap(), 42);
		assert_eq!(reader.read::<u16>().unwrap(), 0xFFFF);
		assert_eq!(reader.tell(), 6);
	}

	#[test]
	fn truncated_read_errors() {
		let data = [0u8; 2];
		let mut reader = BinaryReader::new(&data);
		assert!(matches!(reader.read::<u32>(), Err(ReadError::TruncatedInput)));
	}

	#[test]
	fn seek_and_snapshot_dont_alias() {
		let data = [1u8, 2, 3, 4];
		let mut reader = BinaryReader::new(&data);
		reader.seek(2).unwrap();
		let snapshot = reader.at(0).unwrap();
		assert_eq!(reader.tell(), 2);
		assert_eq!(snapshot.tell(), 0);
	}

	#[test]
	fn reads_null_terminated_string_at_absolute_offset() {
		let data = b"\x00\x00hello\x00world";
		let reader = BinaryReader::new(data);
		assert_eq!(reader.read_c_str_at(2).unwrap(), "hello");
	}

	#[test]
	fn address_list_follows_indirection() {
		// count=2, addr[0]=12, addr[1]=16, then two u32 payloads at those offsets.
		let mut data = Vec::new();
		data.extend_from_slice(&2u32.to_le_bytes());
		data.extend_from_slice(&12u32.to_le_bytes());
		data.extend_from_slice(&16u32.to_le_bytes());
		data.extend_from_slice(&111u32.to_le_bytes());
		data.extend_from_slice(&222u32.to_le_bytes());
		let mut reader = BinaryReader::new(&data);
		let list = reader.read_address_list().unwrap();
		let values = list.decode(|r| r.read::<u32>()).unwrap();
		assert_eq!(values, vec![111, 222]);
	}
}
