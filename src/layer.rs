use std::io::Cursor;

use crate::error::Error;

/// One layer of the nested request/response framing.
///
/// A transaction is a stack of layers, each writing its own header and
/// delegating the rest to the single child it wraps:
///
/// ```text
/// Encapsulation
///  └─ SendRRData
///      └─ UnconnectedSend
///          └─ MessageRouter
///              └─ service body (ReadData, WriteData, ...)
/// ```
///
/// Encoding runs top-down, decoding bottom-up through the same objects:
/// request fields are read by `encode`, response fields are filled in by
/// `decode`.
pub trait ProtocolLayer {
	/// Total bytes this layer and its body contribute to the request.
	fn request_size(&self) -> usize;

	/// Appends this layer's header followed by its body's encoding.
	fn encode(&self, buf: &mut Vec<u8>) -> Result<(), Error>;

	/// Minimum number of bytes that must be buffered before `decode` can
	/// run. May inspect the bytes received so far; the encapsulation layer
	/// resolves the total frame size from its length field once the first
	/// four bytes are present.
	fn response_size(&self, buf: &[u8]) -> usize {
		let _ = buf;
		0
	}

	/// Consumes this layer's header from `r`, then decodes the body from
	/// the remaining `available` byte count.
	fn decode(&mut self, r: &mut Cursor<&[u8]>, available: usize) -> Result<(), Error>;
}

/// The empty body: contributes no bytes and accepts any response body.
impl ProtocolLayer for () {
	fn request_size(&self) -> usize {
		0
	}

	fn encode(&self, _buf: &mut Vec<u8>) -> Result<(), Error> {
		Ok(())
	}

	fn decode(&mut self, _r: &mut Cursor<&[u8]>, _available: usize) -> Result<(), Error> {
		Ok(())
	}
}
