use std::io::Cursor;

use crate::{
	data::CipData,
	error::Error,
	layer::ProtocolLayer,
	protocol::MessageRouter,
	read_write::{LittleEndianReader, LittleEndianWriter},
};

/// Get_Attribute_Single
pub const GET_ATTRIBUTE_SINGLE: u8 = 0x0E;
/// CIP_MultiRequest, addressed to the MessageRouter object
pub const MULTI_REQUEST: u8 = 0x0A;
/// CIP_ReadData
pub const READ_DATA: u8 = 0x4C;
/// CIP_WriteData
pub const WRITE_DATA: u8 = 0x4D;

const PROTOCOL_VERSION: u16 = 1;

/// RegisterSession body: protocol version and option flags, echoed back.
/// The allocated handle arrives in the encapsulation header's session field.
#[derive(Debug, Default)]
pub struct RegisterSession;

impl ProtocolLayer for RegisterSession {
	fn request_size(&self) -> usize {
		4
	}

	fn encode(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
		buf.write_val(PROTOCOL_VERSION)?;
		buf.write_val(0u16)?;
		Ok(())
	}

	fn decode(&mut self, r: &mut Cursor<&[u8]>, available: usize) -> Result<(), Error> {
		if available < 4 {
			return Err(Error::Framing("truncated RegisterSession reply".into()));
		}
		let version: u16 = r.read_val()?;
		let _flags: u16 = r.read_val()?;
		if version != PROTOCOL_VERSION {
			return Err(Error::Framing(format!(
				"unsupported encapsulation protocol version {}",
				version
			)));
		}
		Ok(())
	}
}

/// One service advertised by a ListServices reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceItem {
	pub item_type: u16,
	pub version: u16,
	pub capabilities: u16,
	pub name: String,
}

/// ListServices body. The request is empty; the response is an item list
/// where the first item's name tells us whether the device speaks
/// EtherNet/IP at all.
#[derive(Debug, Default)]
pub struct ListServices {
	pub services: Vec<ServiceItem>,
}

impl ListServices {
	/// True if the first advertised service name begins with "Comm"
	/// (case-insensitive), the marker of EtherNet/IP explicit messaging.
	pub fn supports_ethernet_ip(&self) -> bool {
		self.services
			.first()
			.map(|item| {
				let prefix: String = item.name.chars().take(4).collect();
				prefix.eq_ignore_ascii_case("comm")
			})
			.unwrap_or(false)
	}
}

impl ProtocolLayer for ListServices {
	fn request_size(&self) -> usize {
		0
	}

	fn encode(&self, _buf: &mut Vec<u8>) -> Result<(), Error> {
		Ok(())
	}

	fn decode(&mut self, r: &mut Cursor<&[u8]>, available: usize) -> Result<(), Error> {
		if available < 2 {
			return Err(Error::Framing("truncated ListServices reply".into()));
		}
		let count: u16 = r.read_val()?;
		let mut consumed = 2;
		self.services.clear();
		for _ in 0..count {
			if available < consumed + 4 {
				return Err(Error::Framing("truncated service item".into()));
			}
			let item_type: u16 = r.read_val()?;
			let length: u16 = r.read_val()?;
			let length = length as usize;
			consumed += 4;
			if length < 4 || available < consumed + length {
				return Err(Error::Framing(format!(
					"service item of {} bytes truncated",
					length
				)));
			}
			let version: u16 = r.read_val()?;
			let capabilities: u16 = r.read_val()?;
			let mut name = String::with_capacity(length - 4);
			for _ in 0..length - 4 {
				let b: u8 = r.read_val()?;
				if b > 0 {
					name.push(b as char);
				}
			}
			consumed += length;
			self.services.push(ServiceItem {
				item_type,
				version,
				capabilities,
				name,
			});
		}
		Ok(())
	}
}

/// CIP_ReadData body: the request names an element count, the response
/// carries a type code and the raw element bytes, decoded into `data`.
#[derive(Debug)]
pub struct ReadData {
	pub elements: u16,
	pub data: Option<CipData>,
}

impl ReadData {
	pub fn new(elements: u16) -> ReadData {
		ReadData {
			elements,
			data: None,
		}
	}
}

impl ProtocolLayer for ReadData {
	fn request_size(&self) -> usize {
		2
	}

	fn encode(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
		buf.write_val(self.elements)?;
		Ok(())
	}

	fn decode(&mut self, r: &mut Cursor<&[u8]>, available: usize) -> Result<(), Error> {
		if available < 2 {
			return Err(Error::Framing("truncated read response".into()));
		}
		let type_code: u16 = r.read_val()?;
		let start = r.position() as usize;
		let raw = &r.get_ref()[start..start + (available - 2)];
		self.data = Some(CipData::decode(type_code, raw)?);
		r.set_position((start + available - 2) as u64);
		Ok(())
	}
}

/// CIP_WriteData body: type code, element count and the raw element bytes.
/// A successful response has no body.
#[derive(Debug)]
pub struct WriteData {
	pub data: CipData,
}

impl WriteData {
	pub fn new(data: CipData) -> WriteData {
		WriteData { data }
	}
}

impl ProtocolLayer for WriteData {
	fn request_size(&self) -> usize {
		4 + self.data.payload_len()
	}

	fn encode(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
		buf.write_val(self.data.typ().code())?;
		buf.write_val(self.data.elements() as u16)?;
		self.data.encode(buf)
	}

	fn decode(&mut self, _r: &mut Cursor<&[u8]>, _available: usize) -> Result<(), Error> {
		Ok(())
	}
}

/// Attribute value reader for the u16 Identity attributes (vendor, device
/// type, revision).
#[derive(Debug, Default)]
pub struct ShortAttribute {
	pub value: u16,
}

impl ProtocolLayer for ShortAttribute {
	fn request_size(&self) -> usize {
		0
	}

	fn encode(&self, _buf: &mut Vec<u8>) -> Result<(), Error> {
		Ok(())
	}

	fn decode(&mut self, r: &mut Cursor<&[u8]>, available: usize) -> Result<(), Error> {
		if available < 2 {
			return Err(Error::Framing("truncated attribute value".into()));
		}
		self.value = r.read_val()?;
		Ok(())
	}
}

/// Attribute value reader for the u32 serial number attribute.
#[derive(Debug, Default)]
pub struct IntAttribute {
	pub value: u32,
}

impl ProtocolLayer for IntAttribute {
	fn request_size(&self) -> usize {
		0
	}

	fn encode(&self, _buf: &mut Vec<u8>) -> Result<(), Error> {
		Ok(())
	}

	fn decode(&mut self, r: &mut Cursor<&[u8]>, available: usize) -> Result<(), Error> {
		if available < 4 {
			return Err(Error::Framing("truncated attribute value".into()));
		}
		self.value = r.read_val()?;
		Ok(())
	}
}

/// Attribute value reader for the length-prefixed product name attribute.
#[derive(Debug, Default)]
pub struct StringAttribute {
	pub value: String,
}

impl ProtocolLayer for StringAttribute {
	fn request_size(&self) -> usize {
		0
	}

	fn encode(&self, _buf: &mut Vec<u8>) -> Result<(), Error> {
		Ok(())
	}

	fn decode(&mut self, r: &mut Cursor<&[u8]>, available: usize) -> Result<(), Error> {
		if available < 1 {
			return Err(Error::Framing("truncated attribute value".into()));
		}
		let len: u8 = r.read_val()?;
		if available < 1 + len as usize {
			return Err(Error::Framing("truncated attribute value".into()));
		}
		self.value.clear();
		for _ in 0..len {
			let b: u8 = r.read_val()?;
			self.value.push(b as char);
		}
		Ok(())
	}
}

/// CIP_MultiRequest body: `count`, `count` offsets relative to the start of
/// the body, then the concatenated sub-requests, each a complete
/// MessageRouter frame. The response mirrors the shape; every sub-response
/// is decoded by the same MessageRouter logic as a standalone reply, with
/// failures recorded per sub-request rather than failing the batch.
#[derive(Debug)]
pub struct MultiRequest<B> {
	pub requests: Vec<MessageRouter<B>>,
}

impl<B: ProtocolLayer> MultiRequest<B> {
	pub fn new(requests: Vec<MessageRouter<B>>) -> MultiRequest<B> {
		MultiRequest { requests }
	}
}

impl<B: ProtocolLayer> ProtocolLayer for MultiRequest<B> {
	fn request_size(&self) -> usize {
		2 + 2 * self.requests.len()
			+ self
				.requests
				.iter()
				.map(ProtocolLayer::request_size)
				.sum::<usize>()
	}

	fn encode(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
		buf.write_val(self.requests.len() as u16)?;
		let mut offset = 2 + 2 * self.requests.len();
		for request in &self.requests {
			buf.write_val(offset as u16)?;
			offset += request.request_size();
		}
		for request in &self.requests {
			request.encode(buf)?;
		}
		Ok(())
	}

	fn decode(&mut self, r: &mut Cursor<&[u8]>, available: usize) -> Result<(), Error> {
		let base = r.position() as usize;
		if available < 2 + 2 * self.requests.len() {
			return Err(Error::Framing("truncated multi-request reply".into()));
		}
		let count: u16 = r.read_val()?;
		if count as usize != self.requests.len() {
			return Err(Error::Framing(format!(
				"sent {} sub-requests but reply answers {}",
				self.requests.len(),
				count
			)));
		}
		let mut offsets = Vec::with_capacity(count as usize);
		for _ in 0..count {
			let offset: u16 = r.read_val()?;
			offsets.push(offset as usize);
		}
		for (idx, request) in self.requests.iter_mut().enumerate() {
			let start = offsets[idx];
			let end = if idx + 1 < offsets.len() {
				offsets[idx + 1]
			} else {
				available
			};
			if start > end || end > available {
				return Err(Error::Framing(format!(
					"sub-response {} spans {}..{} outside the {} byte body",
					idx, start, end, available
				)));
			}
			r.set_position((base + start) as u64);
			request.decode(r, end - start)?;
		}
		r.set_position((base + available) as u64);
		Ok(())
	}
}
