use std::io::Read;
use super::{codec::Codec, endian::Endian, error::*};

/// The fixed header at the start of every archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FileHeader {
	pub(crate) magic: u32,
	pub version: i32,
	pub num_entries: i32,
	pub dir_offset: u32,
}

impl FileHeader {
	pub const BASE_SIZE: usize = crate::HEADER_SIZE;

	/// Header written on create, patched by the first flush
	pub(crate) fn fresh(codec: Codec) -> FileHeader {
		FileHeader {
			magic: crate::MAGIC,
			version: codec.tag(),
			num_entries: 0,
			dir_offset: u32::MAX,
		}
	}

	pub(crate) fn new(codec: Codec, num_entries: u32, dir_offset: u32) -> FileHeader {
		FileHeader {
			magic: crate::MAGIC,
			version: codec.tag(),
			num_entries: num_entries as i32,
			dir_offset,
		}
	}

	/// Validates this header's magic, codec and entry count, returning the codec the archive was written with
	pub(crate) fn validate(&self) -> ResResult<Codec> {
		if self.magic != crate::MAGIC {
			return Err(ResError::CorruptHeader(self.magic));
		};

		let codec = Codec::from_tag(self.version).ok_or(ResError::UnsupportedVersion(self.version))?;

		if self.num_entries <= 0 {
			return Err(ResError::EmptyArchive);
		};

		Ok(codec)
	}

	pub(crate) fn from_handle<T: Read>(mut handle: T, endian: Endian) -> ResResult<FileHeader> {
		let mut buffer: [u8; FileHeader::BASE_SIZE] = [0u8; FileHeader::BASE_SIZE];
		handle
			.read_exact(&mut buffer)
			.map_err(|e| ResError::ReadError(format!("Open - Reading fault: {e}")))?;

		Ok(FileHeader::from_bytes(&buffer, endian))
	}

	pub(crate) fn from_bytes(buffer: &[u8; FileHeader::BASE_SIZE], endian: Endian) -> FileHeader {
		FileHeader {
			magic: endian.read_u32(&buffer[0..4]),
			version: endian.read_i32(&buffer[4..8]),
			num_entries: endian.read_i32(&buffer[8..12]),
			dir_offset: endian.read_u32(&buffer[12..16]),
		}
	}

	pub(crate) fn to_bytes(&self, endian: Endian) -> [u8; FileHeader::BASE_SIZE] {
		let mut buffer: [u8; FileHeader::BASE_SIZE] = [0u8; FileHeader::BASE_SIZE];
		buffer[0..4].copy_from_slice(&endian.u32_bytes(self.magic));
		buffer[4..8].copy_from_slice(&endian.i32_bytes(self.version));
		buffer[8..12].copy_from_slice(&endian.i32_bytes(self.num_entries));
		buffer[12..16].copy_from_slice(&endian.u32_bytes(self.dir_offset));
		buffer
	}
}
