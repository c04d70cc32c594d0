use byteorder::WriteBytesExt;

use crate::{
	error::Error,
	read_write::{LittleEndianReader, LittleEndianWriter},
};

/// Structure handle that identifies the controller's STRING template.
pub const STRING_HANDLE: u16 = 0x0FCE;

/// ControlLogix STRING tags hold at most 82 characters.
pub const MAX_STRING_LEN: usize = 82;

// The length word, character data and trailing alignment pad occupy a fixed
// 88-byte slot on the wire, regardless of the current string length.
const DATA_SLOT: usize = 4 + MAX_STRING_LEN + 2;

/// A ControlLogix STRING value: up to 82 ASCII characters in a fixed slot.
///
/// On the wire the value travels as the structure handle `0x0FCE`, a 16-bit
/// pad, a 32-bit length, and the zero-padded character slot.
#[derive(Debug, Clone, PartialEq)]
pub struct LogixString(String);

impl LogixString {
	/// Constructs a new LogixString.
	///
	/// Strings longer than 82 characters do not fit the controller's slot
	/// and are rejected rather than silently truncated.
	pub fn new(s: &str) -> Result<LogixString, Error> {
		if s.len() > MAX_STRING_LEN {
			return Err(Error::Argument(format!(
				"string of {} chars exceeds the {} char STRING slot",
				s.len(),
				MAX_STRING_LEN
			)));
		}
		Ok(LogixString(s.to_owned()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Size of the encoded value: handle, pad, then the fixed data slot.
	pub(crate) fn encoded_len() -> usize {
		2 + 2 + DATA_SLOT
	}

	pub(crate) fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<(), Error> {
		w.write_val(STRING_HANDLE)?;
		w.write_val(0u16)?;
		w.write_val(self.0.len() as u32)?;
		let bytes = self.0.as_bytes();
		for idx in 0..(DATA_SLOT - 4) {
			w.write_val(if idx < bytes.len() { bytes[idx] } else { 0 })?;
		}
		Ok(())
	}

	/// Decodes a STRING payload (the bytes following the 0x02A0 type code).
	///
	/// Trailing pad bytes beyond the reported length are ignored, so slots
	/// shorter than the nominal 88 bytes are accepted as long as the
	/// characters themselves are present.
	pub(crate) fn decode(raw: &[u8]) -> Result<LogixString, Error> {
		let mut c = std::io::Cursor::new(raw);
		let handle: u16 = c
			.read_val()
			.map_err(|_| Error::Framing("truncated STRING payload".into()))?;
		if handle != STRING_HANDLE {
			return Err(Error::Framing(format!(
				"expected STRING handle 0x{:04X}, got 0x{:04X}",
				STRING_HANDLE, handle
			)));
		}
		let _pad: u16 = c
			.read_val()
			.map_err(|_| Error::Framing("truncated STRING payload".into()))?;
		let len: u32 = c
			.read_val()
			.map_err(|_| Error::Framing("truncated STRING payload".into()))?;
		let len = len as usize;
		let chars = &raw[8..];
		if len > MAX_STRING_LEN || len > chars.len() {
			return Err(Error::Framing(format!(
				"STRING length {} exceeds payload of {} chars",
				len,
				chars.len()
			)));
		}
		let text: String = chars[..len].iter().map(|&b| b as char).collect();
		Ok(LogixString(text))
	}
}

impl std::fmt::Display for LogixString {
	fn fmt(&self, fmt: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
		write!(fmt, "{}", self.0)
	}
}

impl std::cmp::PartialEq<str> for LogixString {
	fn eq(&self, other: &str) -> bool {
		self.0 == other
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_roundtrip() {
		let s = LogixString::new("Hello").unwrap();
		let mut v = Vec::new();
		s.encode(&mut v).unwrap();
		assert_eq!(v.len(), LogixString::encoded_len());
		// handle, pad, length
		assert_eq!(&v[..8], &[0xCE, 0x0F, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00]);
		assert_eq!(&v[8..13], b"Hello");
		assert!(v[13..].iter().all(|&b| b == 0));

		let back = LogixString::decode(&v).unwrap();
		assert_eq!(back, s);
	}

	#[test]
	fn test_short_slot_accepted() {
		// Handle, pad, length 2, then just the characters.
		let v = [0xCE, 0x0F, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, b'o', b'k'];
		let s = LogixString::decode(&v).unwrap();
		assert_eq!(s.as_str(), "ok");
	}

	#[test]
	fn test_bad_handle() {
		let v = [0xAB, 0x0F, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
		assert!(matches!(
			LogixString::decode(&v),
			Err(Error::Framing(_))
		));
	}

	#[test]
	fn test_oversize_rejected() {
		let long: String = std::iter::repeat('x').take(83).collect();
		assert!(matches!(
			LogixString::new(&long),
			Err(Error::Argument(_))
		));
	}

	#[test]
	fn test_length_beyond_payload() {
		let v = [0xCE, 0x0F, 0x00, 0x00, 0x40, 0x00, 0x00, 0x00, b'x'];
		assert!(matches!(
			LogixString::decode(&v),
			Err(Error::Framing(_))
		));
	}
}
