use byteorder::{ReadBytesExt, WriteBytesExt};

use crate::{
	error::Error,
	read_write::{LittleEndianReader, LittleEndianWriter},
};

const CLASS_SEGMENT: u8 = 0x20;
const INSTANCE_SEGMENT: u8 = 0x24;
const ATTRIBUTE_SEGMENT: u8 = 0x30;
const SYMBOL_SEGMENT: u8 = 0x91;
const ELEMENT_SEGMENT_U8: u8 = 0x28;
const ELEMENT_SEGMENT_U16: u8 = 0x29;
const ELEMENT_SEGMENT_U32: u8 = 0x2A;

/// One step of a CIP request path.
#[derive(Debug, Clone, PartialEq)]
pub enum PathSegment {
	/// Object class, e.g. 0x01 Identity, 0x02 MessageRouter, 0x06 ConnectionManager
	Class(u8),
	/// Object instance, typically 1
	Instance(u8),
	/// Attribute of the addressed instance
	Attribute(u8),
	/// Named tag or structure member
	Symbol(String),
	/// Array subscript following a symbolic segment
	Element(u32),
}

impl PathSegment {
	/// Encoded size in bytes; always even, segments are word aligned.
	fn encoded_len(&self) -> usize {
		match self {
			PathSegment::Class(_) | PathSegment::Instance(_) | PathSegment::Attribute(_) => 2,
			PathSegment::Symbol(name) => 2 + name.len() + (name.len() & 1),
			PathSegment::Element(n) if *n < 0x100 => 2,
			PathSegment::Element(n) if *n < 0x1_0000 => 4,
			PathSegment::Element(_) => 6,
		}
	}

	fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<(), Error> {
		match self {
			PathSegment::Class(id) => {
				w.write_val(CLASS_SEGMENT)?;
				w.write_val(*id)?;
			}
			PathSegment::Instance(id) => {
				w.write_val(INSTANCE_SEGMENT)?;
				w.write_val(*id)?;
			}
			PathSegment::Attribute(id) => {
				w.write_val(ATTRIBUTE_SEGMENT)?;
				w.write_val(*id)?;
			}
			PathSegment::Symbol(name) => {
				w.write_val(SYMBOL_SEGMENT)?;
				w.write_val(name.len() as u8)?;
				for b in name.bytes() {
					w.write_val(b)?;
				}
				if name.len() & 1 == 1 {
					w.write_val(0u8)?;
				}
			}
			PathSegment::Element(n) if *n < 0x100 => {
				w.write_val(ELEMENT_SEGMENT_U8)?;
				w.write_val(*n as u8)?;
			}
			PathSegment::Element(n) if *n < 0x1_0000 => {
				w.write_val(ELEMENT_SEGMENT_U16)?;
				w.write_val(0u8)?;
				w.write_val(*n as u16)?;
			}
			PathSegment::Element(n) => {
				w.write_val(ELEMENT_SEGMENT_U32)?;
				w.write_val(0u8)?;
				w.write_val(*n)?;
			}
		}
		Ok(())
	}

	fn decode<R: ReadBytesExt>(r: &mut R) -> Result<PathSegment, Error> {
		let kind: u8 = r.read_val()?;
		Ok(match kind {
			CLASS_SEGMENT => PathSegment::Class(r.read_val()?),
			INSTANCE_SEGMENT => PathSegment::Instance(r.read_val()?),
			ATTRIBUTE_SEGMENT => PathSegment::Attribute(r.read_val()?),
			SYMBOL_SEGMENT => {
				let len: u8 = r.read_val()?;
				let mut name = String::with_capacity(len as usize);
				for _ in 0..len {
					let b: u8 = r.read_val()?;
					name.push(b as char);
				}
				if len & 1 == 1 {
					let _pad: u8 = r.read_val()?;
				}
				PathSegment::Symbol(name)
			}
			ELEMENT_SEGMENT_U8 => {
				let idx: u8 = r.read_val()?;
				PathSegment::Element(idx as u32)
			}
			ELEMENT_SEGMENT_U16 => {
				let _pad: u8 = r.read_val()?;
				let idx: u16 = r.read_val()?;
				PathSegment::Element(idx as u32)
			}
			ELEMENT_SEGMENT_U32 => {
				let _pad: u8 = r.read_val()?;
				PathSegment::Element(r.read_val()?)
			}
			x => {
				return Err(Error::Framing(format!(
					"unsupported path segment type 0x{:02X}",
					x
				)))
			}
		})
	}
}

/// A CIP request path: the address part of every explicit message.
///
/// Built either from one of the well-known objects or from a tag name:
///
/// ```
/// use etherip::CipPath;
///
/// let vendor = CipPath::identity().attr(1);
/// let tag = CipPath::symbol("Rack.Slot[2].Temp").unwrap();
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CipPath {
	segments: Vec<PathSegment>,
}

impl CipPath {
	/// Identity object, instance 1.
	pub fn identity() -> CipPath {
		CipPath {
			segments: vec![PathSegment::Class(0x01), PathSegment::Instance(1)],
		}
	}

	/// MessageRouter object, instance 1.
	pub fn message_router() -> CipPath {
		CipPath {
			segments: vec![PathSegment::Class(0x02), PathSegment::Instance(1)],
		}
	}

	/// ConnectionManager object, instance 1.
	pub fn connection_manager() -> CipPath {
		CipPath {
			segments: vec![PathSegment::Class(0x06), PathSegment::Instance(1)],
		}
	}

	/// Parses a tag name into symbolic and element segments.
	///
	/// Dotted components become symbolic segments, `[k]` subscripts become
	/// numeric element segments: `a.b[3].c` is Symbol(a), Symbol(b),
	/// Element(3), Symbol(c).
	pub fn symbol(tag: &str) -> Result<CipPath, Error> {
		let mut segments = Vec::new();
		for component in tag.split('.') {
			let (name, subscripts) = match component.find('[') {
				Some(pos) => (&component[..pos], &component[pos..]),
				None => (component, ""),
			};
			if name.is_empty() {
				return Err(Error::Argument(format!("malformed tag name '{}'", tag)));
			}
			segments.push(PathSegment::Symbol(name.to_owned()));

			let mut rest = subscripts;
			while !rest.is_empty() {
				if !rest.starts_with('[') {
					return Err(Error::Argument(format!("malformed tag name '{}'", tag)));
				}
				let close = rest
					.find(']')
					.ok_or_else(|| Error::Argument(format!("malformed tag name '{}'", tag)))?;
				let idx: u32 = rest[1..close]
					.parse()
					.map_err(|_| Error::Argument(format!("malformed tag name '{}'", tag)))?;
				segments.push(PathSegment::Element(idx));
				rest = &rest[close + 1..];
			}
		}
		Ok(CipPath { segments })
	}

	/// Appends an instance segment.
	pub fn instance(mut self, id: u8) -> CipPath {
		self.segments.push(PathSegment::Instance(id));
		self
	}

	/// Appends an attribute segment.
	pub fn attr(mut self, id: u8) -> CipPath {
		self.segments.push(PathSegment::Attribute(id));
		self
	}

	/// Appends a numeric element segment.
	pub fn element(mut self, n: u32) -> CipPath {
		self.segments.push(PathSegment::Element(n));
		self
	}

	pub fn segments(&self) -> &[PathSegment] {
		&self.segments
	}

	/// Byte length of the packed segments, excluding the word-count prefix.
	pub fn encoded_len(&self) -> usize {
		self.segments.iter().map(PathSegment::encoded_len).sum()
	}

	/// Bytes this path contributes to a request: word count plus segments.
	pub(crate) fn request_size(&self) -> usize {
		1 + self.encoded_len()
	}

	/// Writes the path as its 16-bit-word count followed by the segments.
	pub fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<(), Error> {
		w.write_val((self.encoded_len() / 2) as u8)?;
		for segment in &self.segments {
			segment.encode(w)?;
		}
		Ok(())
	}

	/// Reads back a word-count-prefixed path.
	pub fn decode<R: ReadBytesExt>(r: &mut R) -> Result<CipPath, Error> {
		let words: u8 = r.read_val()?;
		let total = words as usize * 2;
		let mut consumed = 0;
		let mut segments = Vec::new();
		while consumed < total {
			let segment = PathSegment::decode(r)?;
			consumed += segment.encoded_len();
			segments.push(segment);
		}
		if consumed != total {
			return Err(Error::Framing(format!(
				"path segments spill over the declared {} words",
				words
			)));
		}
		Ok(CipPath { segments })
	}
}
