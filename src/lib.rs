//! This crate speaks the EtherNet/IP encapsulation protocol and the CIP
//! services carried over it, enough to read and write named tags on
//! Allen-Bradley ControlLogix / CompactLogix controllers over a single TCP
//! connection to port 0xAF12.
//!
//! A transaction is a stack of framing layers, each contributing its own
//! header and delegating the body to the layer it wraps:
//!
//! ```text
//! Encapsulation (command, session, sender context)
//!  └─ SendRRData (interface handle, timeout, CPF items)
//!      └─ UnconnectedSend (backplane route to the CPU slot)
//!          └─ MessageRouter (service code + request path)
//!              └─ ReadData / WriteData / MultiRequest / attribute reader
//! ```
//!
//! [tcp::EtherNetIP] drives that stack over a socket:
//!
//! ```no_run
//! use etherip::EtherNetIP;
//!
//! let mut plc = EtherNetIP::connect("192.168.1.10", 0)?;
//! println!("talking to {}", plc.device_info()?.name);
//!
//! let counter = plc.read_tag("Counter")?;
//! plc.write_tag("Setpoint", 3.5f32.into())?;
//! plc.close();
//! # Ok::<(), etherip::Error>(())
//! ```
//!
//! The protocol is strictly request/response: a session owns one connection
//! and one buffer, serves one transaction at a time, and is not meant to be
//! shared across threads without external serialization.

mod data;
mod error;
mod layer;
mod path;
mod protocol;
mod read_write;
mod services;
mod string;
pub mod tcp;

pub use data::{CipData, CipType};
pub use error::Error;
pub use layer::ProtocolLayer;
pub use path::{CipPath, PathSegment};
pub use protocol::{
	Command, Encapsulation, MessageRouter, SendRRData, UnconnectedSend, EMBEDDED_SERVICE_ERROR,
	ENCAPSULATION_HEADER, REPLY_FLAG, UNCONNECTED_SEND,
};
pub use read_write::{LittleEndianReader, LittleEndianWriter};
pub use services::{
	IntAttribute, ListServices, MultiRequest, ReadData, RegisterSession, ServiceItem,
	ShortAttribute, StringAttribute, WriteData, GET_ATTRIBUTE_SINGLE, MULTI_REQUEST, READ_DATA,
	WRITE_DATA,
};
pub use string::{LogixString, MAX_STRING_LEN, STRING_HANDLE};
pub use tcp::{ConnectOptions, Connection, DeviceInfo, EtherNetIP, Transport, DEFAULT_PORT};
