use std::io;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

/// Read one little-endian value of type `T` from the current position.
///
/// Everything on the EtherNet/IP wire is little-endian, so all of the codec
/// and framing code funnels through these two traits rather than naming the
/// byte order at every call site.
pub trait LittleEndianReader<T> {
	fn read_val(&mut self) -> Result<T, io::Error>;
}

/// Write one value of type `T` in little-endian order.
pub trait LittleEndianWriter<T>: WriteBytesExt {
	fn write_val(&mut self, v: T) -> Result<(), io::Error>;
}

impl<R: ReadBytesExt> LittleEndianReader<u8> for R {
	fn read_val(&mut self) -> Result<u8, io::Error> {
		self.read_u8()
	}
}

impl<R: ReadBytesExt> LittleEndianReader<i8> for R {
	fn read_val(&mut self) -> Result<i8, io::Error> {
		self.read_i8()
	}
}

impl<T: WriteBytesExt> LittleEndianWriter<u8> for T {
	fn write_val(&mut self, v: u8) -> Result<(), io::Error> {
		self.write_u8(v)
	}
}

impl<T: WriteBytesExt> LittleEndianWriter<i8> for T {
	fn write_val(&mut self, v: i8) -> Result<(), io::Error> {
		self.write_i8(v)
	}
}

impl<T: WriteBytesExt> LittleEndianWriter<bool> for T {
	fn write_val(&mut self, v: bool) -> Result<(), io::Error> {
		self.write_u8(if v { 1 } else { 0 })
	}
}

macro_rules! derive_reader {
{ $( $m:ident: $t:ty ),* } => {
		$(
			impl<R: ReadBytesExt> LittleEndianReader<$t> for R {
				fn read_val(&mut self) -> Result<$t, io::Error> {
					self . $m ::<LittleEndian>()
				}
			}
		)*
	}
}
derive_reader! {
	read_u16: u16, read_i16: i16,
	read_u32: u32, read_i32: i32,
	read_u64: u64, read_i64: i64,
	read_f32: f32, read_f64: f64
}

macro_rules! derive_writer {
{ $( $m:ident: $t:ty ),* } => {
		$(
			impl<T: WriteBytesExt> LittleEndianWriter<$t> for T {
				fn write_val(&mut self, v: $t) -> Result<(), io::Error> {
					self . $m ::<LittleEndian>(v)
				}
			}
		)*
	}
}
derive_writer! {
	write_u16: u16, write_i16: i16,
	write_u32: u32, write_i32: i32,
	write_u64: u64, write_i64: i64,
	write_f32: f32, write_f64: f64
}

// Fixed-size byte runs: the 8-byte sender context and similar opaque fields.
impl<R: ReadBytesExt, const N: usize> LittleEndianReader<[u8; N]> for R {
	fn read_val(&mut self) -> Result<[u8; N], io::Error> {
		let mut val = [0u8; N];
		self.read_exact(&mut val)?;
		Ok(val)
	}
}

impl<T: WriteBytesExt, const N: usize> LittleEndianWriter<[u8; N]> for T {
	fn write_val(&mut self, v: [u8; N]) -> Result<(), io::Error> {
		self.write_all(&v)
	}
}
