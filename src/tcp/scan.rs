//! Periodic tag polling on top of a session.
//!
//! A [ScanList] keeps a set of tags with a per-tag maximum age and refreshes
//! the stale ones in a single multi-request whenever [ScanList::process] is
//! called. Drive it from whatever loop paces your application; nothing here
//! spawns threads or sleeps.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::warn;

use crate::{
	data::CipData,
	tcp::{EtherNetIP, Transport},
};

/// One polled tag: its last known value and when it was last read.
#[derive(Debug)]
pub struct RefreshableTag {
	tag: String,
	elements: u16,
	max_age: Duration,
	last_updated: Option<Instant>,
	data: Option<CipData>,
}

impl RefreshableTag {
	pub fn new(tag: &str, elements: u16, max_age: Duration) -> RefreshableTag {
		RefreshableTag {
			tag: tag.to_owned(),
			elements,
			max_age,
			last_updated: None,
			data: None,
		}
	}

	pub fn tag(&self) -> &str {
		&self.tag
	}

	/// The most recent value, if any poll has succeeded yet.
	pub fn value(&self) -> Option<&CipData> {
		self.data.as_ref()
	}

	pub fn needs_refresh(&self) -> bool {
		match self.last_updated {
			None => true,
			Some(at) => at.elapsed() > self.max_age,
		}
	}

	fn update(&mut self, data: CipData) {
		self.data = Some(data);
		self.last_updated = Some(Instant::now());
	}
}

/// A set of tags polled together over one session.
#[derive(Debug, Default)]
pub struct ScanList {
	entries: Vec<RefreshableTag>,
}

impl ScanList {
	pub fn new() -> ScanList {
		ScanList::default()
	}

	pub fn add(&mut self, tag: &str, elements: u16, max_age: Duration) {
		self.entries.push(RefreshableTag::new(tag, elements, max_age));
	}

	pub fn entries(&self) -> &[RefreshableTag] {
		&self.entries
	}

	/// Reads every stale tag in one transaction and stores the fresh
	/// values. Returns how many tags were polled. A tag the controller
	/// rejects is logged and left stale; it will be retried on the next
	/// call.
	pub fn process<T: Transport>(&mut self, plc: &mut EtherNetIP<T>) -> Result<usize> {
		let due: Vec<usize> = (0..self.entries.len())
			.filter(|&idx| self.entries[idx].needs_refresh())
			.collect();
		if due.is_empty() {
			return Ok(0);
		}

		let wanted: Vec<(&str, u16)> = due
			.iter()
			.map(|&idx| (self.entries[idx].tag.as_str(), self.entries[idx].elements))
			.collect();
		let results = plc
			.read_many_elements(&wanted)
			.context("scan poll failed")?;

		for (&idx, result) in due.iter().zip(results) {
			match result {
				Ok(data) => self.entries[idx].update(data),
				Err(e) => warn!("scan of '{}' failed: {}", self.entries[idx].tag, e),
			}
		}
		Ok(due.len())
	}
}
