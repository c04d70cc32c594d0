use std::convert::TryFrom;
use std::io::Cursor;

use crate::{
	error::Error,
	layer::ProtocolLayer,
	path::CipPath,
	read_write::{LittleEndianReader, LittleEndianWriter},
};

/// Set on the service code of every MessageRouter reply.
pub const REPLY_FLAG: u8 = 0x80;

/// CIP service that routes an embedded request across the backplane.
pub const UNCONNECTED_SEND: u8 = 0x52;

/// General status a multi-service reply uses for "an embedded request failed".
pub const EMBEDDED_SERVICE_ERROR: u8 = 0x1E;

/// Encapsulation commands understood by this client.
#[repr(u16)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Command {
	ListServices = 0x0004,
	RegisterSession = 0x0065,
	UnregisterSession = 0x0066,
	SendRRData = 0x006F,
}

impl Command {
	pub fn code(self) -> u16 {
		self as u16
	}
}

impl TryFrom<u16> for Command {
	type Error = Error;
	fn try_from(val: u16) -> Result<Command, Error> {
		match val {
			0x0004 => Ok(Command::ListServices),
			0x0065 => Ok(Command::RegisterSession),
			0x0066 => Ok(Command::UnregisterSession),
			0x006F => Ok(Command::SendRRData),
			x => Err(Error::Framing(format!(
				"unknown encapsulation command 0x{:04X}",
				x
			))),
		}
	}
}

/// Size of the fixed encapsulation header.
pub const ENCAPSULATION_HEADER: usize = 24;

/// The outermost layer: a 24-byte header in front of every frame.
///
/// Layout, all little-endian: `command (u16) | length (u16) | session (u32) |
/// status (u32) | sender context (8 bytes) | options (u32)`, followed by the
/// command-specific body. `length` counts the body bytes only.
///
/// The response must echo the command and the sender context; the session
/// field of a RegisterSession response carries the newly allocated handle.
#[derive(Debug)]
pub struct Encapsulation<B> {
	pub command: Command,
	pub session: u32,
	pub context: [u8; 8],
	pub body: B,
}

impl<B: ProtocolLayer> Encapsulation<B> {
	pub fn new(command: Command, session: u32, context: [u8; 8], body: B) -> Encapsulation<B> {
		Encapsulation {
			command,
			session,
			context,
			body,
		}
	}
}

impl<B: ProtocolLayer> ProtocolLayer for Encapsulation<B> {
	fn request_size(&self) -> usize {
		ENCAPSULATION_HEADER + self.body.request_size()
	}

	fn encode(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
		buf.write_val(self.command.code())?;
		buf.write_val(self.body.request_size() as u16)?;
		buf.write_val(self.session)?;
		buf.write_val(0u32)?;
		buf.write_val(self.context)?;
		buf.write_val(0u32)?;
		self.body.encode(buf)
	}

	fn response_size(&self, buf: &[u8]) -> usize {
		if buf.len() < 4 {
			ENCAPSULATION_HEADER
		} else {
			let length = u16::from_le_bytes([buf[2], buf[3]]);
			ENCAPSULATION_HEADER + length as usize
		}
	}

	fn decode(&mut self, r: &mut Cursor<&[u8]>, available: usize) -> Result<(), Error> {
		if available < ENCAPSULATION_HEADER {
			return Err(Error::Framing(format!(
				"encapsulation header needs {} bytes, got {}",
				ENCAPSULATION_HEADER, available
			)));
		}
		let command: u16 = r.read_val()?;
		if command != self.command.code() {
			return Err(Error::Framing(format!(
				"sent command 0x{:04X} but response carries 0x{:04X}",
				self.command.code(),
				command
			)));
		}
		let length: u16 = r.read_val()?;
		let session: u32 = r.read_val()?;
		if self.command == Command::RegisterSession {
			self.session = session;
		} else if session != self.session {
			return Err(Error::Framing(format!(
				"session mismatch: sent 0x{:08X}, response carries 0x{:08X}",
				self.session, session
			)));
		}
		let status: u32 = r.read_val()?;
		if status != 0 {
			return Err(Error::Framing(format!(
				"encapsulation status 0x{:08X}",
				status
			)));
		}
		let context: [u8; 8] = r.read_val()?;
		if context != self.context {
			return Err(Error::Framing("sender context mismatch".into()));
		}
		let _options: u32 = r.read_val()?;

		let length = length as usize;
		if available < ENCAPSULATION_HEADER + length {
			return Err(Error::Framing(format!(
				"encapsulation body of {} bytes truncated to {}",
				length,
				available - ENCAPSULATION_HEADER
			)));
		}
		self.body.decode(r, length)
	}
}

const NULL_ADDRESS_ITEM: u16 = 0x0000;
const UNCONNECTED_DATA_ITEM: u16 = 0x00B2;

// interface handle + timeout + item count + null address item + data item header
const SEND_RR_DATA_HEADER: usize = 4 + 2 + 2 + 4 + 4;

/// SendRRData body: interface handle, timeout, then a two-item Common Packet
/// Format list — a null address item and the unconnected data item whose
/// payload is the child's bytes.
#[derive(Debug)]
pub struct SendRRData<B> {
	pub body: B,
}

impl<B: ProtocolLayer> SendRRData<B> {
	pub fn new(body: B) -> SendRRData<B> {
		SendRRData { body }
	}
}

impl<B: ProtocolLayer> ProtocolLayer for SendRRData<B> {
	fn request_size(&self) -> usize {
		SEND_RR_DATA_HEADER + self.body.request_size()
	}

	fn encode(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
		buf.write_val(0u32)?;
		buf.write_val(0u16)?;
		buf.write_val(2u16)?;
		buf.write_val(NULL_ADDRESS_ITEM)?;
		buf.write_val(0u16)?;
		buf.write_val(UNCONNECTED_DATA_ITEM)?;
		buf.write_val(self.body.request_size() as u16)?;
		self.body.encode(buf)
	}

	fn decode(&mut self, r: &mut Cursor<&[u8]>, available: usize) -> Result<(), Error> {
		if available < SEND_RR_DATA_HEADER {
			return Err(Error::Framing("truncated SendRRData envelope".into()));
		}
		let _interface: u32 = r.read_val()?;
		let _timeout: u16 = r.read_val()?;
		let items: u16 = r.read_val()?;
		if items != 2 {
			return Err(Error::Framing(format!(
				"expected 2 CPF items, got {}",
				items
			)));
		}
		let address_type: u16 = r.read_val()?;
		let address_len: u16 = r.read_val()?;
		if address_type != NULL_ADDRESS_ITEM || address_len != 0 {
			return Err(Error::Framing(format!(
				"expected null address item, got type 0x{:04X} length {}",
				address_type, address_len
			)));
		}
		let data_type: u16 = r.read_val()?;
		if data_type != UNCONNECTED_DATA_ITEM {
			return Err(Error::Framing(format!(
				"expected unconnected data item, got type 0x{:04X}",
				data_type
			)));
		}
		let data_len: u16 = r.read_val()?;
		let data_len = data_len as usize;
		if data_len > available - SEND_RR_DATA_HEADER {
			return Err(Error::Framing(format!(
				"data item of {} bytes truncated to {}",
				data_len,
				available - SEND_RR_DATA_HEADER
			)));
		}
		self.body.decode(r, data_len)
	}
}

/// UnconnectedSend (service 0x52 on the ConnectionManager): wraps the
/// embedded message with CIP timing and a port/slot route so the Ethernet
/// module forwards it across the backplane to the controller.
///
/// The ConnectionManager strips this wrapper from the response, so decoding
/// is entirely the embedded message's business.
#[derive(Debug)]
pub struct UnconnectedSend<B> {
	pub slot: u8,
	pub priority: u8,
	pub timeout_ticks: u8,
	pub body: B,
}

impl<B: ProtocolLayer> UnconnectedSend<B> {
	pub fn new(slot: u8, body: B) -> UnconnectedSend<B> {
		UnconnectedSend {
			slot,
			priority: 0x06,
			timeout_ticks: 0x9A,
			body,
		}
	}
}

impl<B: ProtocolLayer> ProtocolLayer for UnconnectedSend<B> {
	fn request_size(&self) -> usize {
		let embedded = self.body.request_size();
		// service + path, priority + ticks + embedded length, embedded
		// message plus its alignment pad, route path size + reserved +
		// port segment
		1 + CipPath::connection_manager().request_size()
			+ 4 + embedded + (embedded & 1)
			+ 4
	}

	fn encode(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
		let embedded = self.body.request_size();
		buf.write_val(UNCONNECTED_SEND)?;
		CipPath::connection_manager().encode(buf)?;
		buf.write_val(self.priority)?;
		buf.write_val(self.timeout_ticks)?;
		buf.write_val(embedded as u16)?;
		self.body.encode(buf)?;
		if embedded & 1 == 1 {
			buf.write_val(0u8)?;
		}
		buf.write_val(1u8)?;
		buf.write_val(0u8)?;
		buf.write_val(1u8)?;
		buf.write_val(self.slot)?;
		Ok(())
	}

	fn decode(&mut self, r: &mut Cursor<&[u8]>, available: usize) -> Result<(), Error> {
		self.body.decode(r, available)
	}
}

/// How a MessageRouter layer reacts to a non-zero general status.
#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) enum StatusPolicy {
	/// Any non-zero status is an error (single-request stacks).
	Fail,
	/// Tolerate 0x1E so the embedded sub-responses can report individually
	/// (the outer layer of a multi request).
	TolerateEmbedded,
	/// Record the status and skip the body (sub-responses of a multi
	/// request; the caller inspects each one).
	Record,
}

/// MessageRouter frame: `service | path word count | path | body`.
///
/// The reply echoes the service with [REPLY_FLAG] set, then carries a
/// reserved byte, the general status, and the extended status words in
/// front of the body. `status` and `extended` hold whatever the response
/// reported.
#[derive(Debug)]
pub struct MessageRouter<B> {
	pub service: u8,
	pub path: CipPath,
	pub status: u8,
	pub extended: Vec<u16>,
	pub(crate) policy: StatusPolicy,
	pub body: B,
}

impl<B: ProtocolLayer> MessageRouter<B> {
	pub fn new(service: u8, path: CipPath, body: B) -> MessageRouter<B> {
		MessageRouter {
			service,
			path,
			status: 0,
			extended: Vec::new(),
			policy: StatusPolicy::Fail,
			body,
		}
	}

	pub(crate) fn with_policy(
		service: u8,
		path: CipPath,
		body: B,
		policy: StatusPolicy,
	) -> MessageRouter<B> {
		MessageRouter {
			service,
			path,
			status: 0,
			extended: Vec::new(),
			policy,
			body,
		}
	}

	/// The per-request error for a recorded non-zero status, if any.
	pub(crate) fn status_error(&self) -> Option<Error> {
		if self.status == 0 {
			None
		} else {
			Some(Error::from_status(
				self.service,
				self.status,
				self.extended.clone(),
			))
		}
	}
}

impl<B: ProtocolLayer> ProtocolLayer for MessageRouter<B> {
	fn request_size(&self) -> usize {
		1 + self.path.request_size() + self.body.request_size()
	}

	fn encode(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
		buf.write_val(self.service)?;
		self.path.encode(buf)?;
		self.body.encode(buf)
	}

	fn decode(&mut self, r: &mut Cursor<&[u8]>, available: usize) -> Result<(), Error> {
		if available < 4 {
			return Err(Error::Framing("truncated MessageRouter reply".into()));
		}
		let reply: u8 = r.read_val()?;
		if reply != (self.service | REPLY_FLAG) {
			return Err(Error::Framing(format!(
				"sent service 0x{:02X} but reply carries 0x{:02X}",
				self.service, reply
			)));
		}
		let _reserved: u8 = r.read_val()?;
		self.status = r.read_val()?;
		let extended_words: u8 = r.read_val()?;
		if available < 4 + 2 * extended_words as usize {
			return Err(Error::Framing("truncated extended status".into()));
		}
		self.extended.clear();
		for _ in 0..extended_words {
			self.extended.push(r.read_val()?);
		}

		let remaining = available - 4 - 2 * extended_words as usize;
		if self.status != 0 {
			match self.policy {
				StatusPolicy::Fail => {
					return Err(Error::from_status(
						self.service,
						self.status,
						self.extended.clone(),
					))
				}
				StatusPolicy::TolerateEmbedded => {
					if self.status != EMBEDDED_SERVICE_ERROR {
						return Err(Error::from_status(
							self.service,
							self.status,
							self.extended.clone(),
						));
					}
				}
				StatusPolicy::Record => {
					// Leave the body untouched; whatever follows a failed
					// sub-request is not a valid body.
					r.set_position(r.position() + remaining as u64);
					return Ok(());
				}
			}
		}
		self.body.decode(r, remaining)
	}
}
