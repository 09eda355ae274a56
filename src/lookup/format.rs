use std::collections::BTreeMap;

use super::{FamilyData, LookupData};
use crate::global::{dir_entry::NameCrc, endian::Endian, error::*};

/// Length of the NUL padded cache-format label in the version block
pub(crate) const LABEL_LENGTH: usize = 16;
/// name + entries + dir offset + crc + major + minor
const RECORD_SIZE: usize = 4 + 4 + 4 + 4 + 2 + 2;
/// name + crc
const FAMILY_SIZE: usize = 4 + 4;

/// The version block at the top of a lookup cache file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct VersionInfo {
	pub(crate) codec: i32,
	pub(crate) label: [u8; LABEL_LENGTH],
}

impl VersionInfo {
	pub(crate) fn new(codec: i32, label: &str) -> VersionInfo {
		let mut buffer = [0u8; LABEL_LENGTH];
		let bytes = label.as_bytes();
		let len = bytes.len().min(LABEL_LENGTH - 1);
		buffer[..len].copy_from_slice(&bytes[..len]);

		VersionInfo { codec, label: buffer }
	}
}

/// Everything a cache file holds.
#[derive(Debug, Default)]
pub(crate) struct CacheContents {
	pub(crate) data: BTreeMap<NameCrc, LookupData>,
	pub(crate) families: BTreeMap<NameCrc, FamilyData>,
}

struct Reader<'a> {
	bytes: &'a [u8],
	position: usize,
	endian: Endian,
}

impl<'a> Reader<'a> {
	fn take(&mut self, count: usize) -> ResResult<&'a [u8]> {
		let end = self.position + count;
		if end > self.bytes.len() {
			return Err(ResError::ReadError(format!(
				"lookup cache truncated at byte {} of {}",
				self.position,
				self.bytes.len()
			)));
		}

		let slice = &self.bytes[self.position..end];
		self.position = end;
		Ok(slice)
	}

	fn u32(&mut self) -> ResResult<u32> {
		let endian = self.endian;
		self.take(4).map(|b| endian.read_u32(b))
	}

	fn u16(&mut self) -> ResResult<u16> {
		let endian = self.endian;
		self.take(2).map(|b| endian.read_u16(b))
	}
}

/// Read and check the magic + version block. `None` when the file belongs to another format or version.
pub(crate) fn parse(bytes: &[u8], endian: Endian, expected: &VersionInfo) -> ResResult<Option<CacheContents>> {
	let mut reader = Reader {
		bytes,
		position: 0,
		endian,
	};

	if reader.u32()? != crate::LOOKUP_MAGIC {
		return Ok(None);
	}

	let codec = reader.u32()? as i32;
	let label = reader.take(LABEL_LENGTH)?;
	if codec != expected.codec || label != expected.label {
		return Ok(None);
	}

	let mut contents = CacheContents::default();

	let count = reader.u32()?;
	for _ in 0..count {
		let name = NameCrc(reader.u32()?);
		let data = LookupData {
			num_entries_unique: reader.u32()?,
			dir_offset: reader.u32()?,
			crc: reader.u32()?,
			major: reader.u16()?,
			minor: reader.u16()?,
		};

		contents.data.insert(name, data);
	}

	let families = reader.u32()?;
	for _ in 0..families {
		let name = NameCrc(reader.u32()?);
		let crc = reader.u32()?;
		contents.families.insert(name, FamilyData { crc });
	}

	Ok(Some(contents))
}

/// Serialize a whole cache file
pub(crate) fn write(
	version: &VersionInfo, data: &BTreeMap<NameCrc, LookupData>, families: &BTreeMap<NameCrc, FamilyData>,
	endian: Endian,
) -> Vec<u8> {
	let mut buffer =
		Vec::with_capacity(4 + 4 + LABEL_LENGTH + 8 + data.len() * RECORD_SIZE + families.len() * FAMILY_SIZE);

	buffer.extend_from_slice(&endian.u32_bytes(crate::LOOKUP_MAGIC));
	buffer.extend_from_slice(&endian.i32_bytes(version.codec));
	buffer.extend_from_slice(&version.label);

	buffer.extend_from_slice(&endian.u32_bytes(data.len() as u32));
	for (name, record) in data {
		buffer.extend_from_slice(&endian.u32_bytes(name.0));
		buffer.extend_from_slice(&endian.u32_bytes(record.num_entries_unique));
		buffer.extend_from_slice(&endian.u32_bytes(record.dir_offset));
		buffer.extend_from_slice(&endian.u32_bytes(record.crc));
		buffer.extend_from_slice(&endian.u16_bytes(record.major));
		buffer.extend_from_slice(&endian.u16_bytes(record.minor));
	}

	buffer.extend_from_slice(&endian.u32_bytes(families.len() as u32));
	for (name, family) in families {
		buffer.extend_from_slice(&endian.u32_bytes(name.0));
		buffer.extend_from_slice(&endian.u32_bytes(family.crc));
	}

	buffer
}
