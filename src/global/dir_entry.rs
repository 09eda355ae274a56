use std::fmt;
use super::{endian::Endian, error::*, flags::EntryFlags};

/// CRC-32 of a case-normalised name. Directories are sorted by this value.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct NameCrc(pub u32);

impl NameCrc {
	/// Hash a name: ASCII lower-cased, with `\` treated as `/`
	pub fn new(name: impl AsRef<str>) -> NameCrc {
		let mut hasher = crc32fast::Hasher::new();

		for byte in name.as_ref().bytes() {
			let byte = match byte {
				b'\\' => b'/',
				other => other.to_ascii_lowercase(),
			};
			hasher.update(&[byte]);
		}

		NameCrc(hasher.finalize())
	}

	/// Returns a copy of the underlying hash.
	#[inline(always)]
	pub fn value(&self) -> u32 {
		self.0
	}
}

impl From<&str> for NameCrc {
	fn from(name: &str) -> Self {
		NameCrc::new(name)
	}
}

impl fmt::Display for NameCrc {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:#010x}", self.0)
	}
}

impl fmt::Debug for NameCrc {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "NameCrc({:#010x})", self.0)
	}
}

/// One record of an archive's directory. This can be fetched without reading the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
	/// Hash of the entry's name
	pub name: NameCrc,
	/// The number of bytes stored in the archive, compressed size for compressed entries once flushed
	pub size: u32,
	/// Location of the payload, as an offset of bytes from the beginning of the file
	pub offset: u32,
	/// The flags packed next to the size
	pub flags: EntryFlags,
}

impl DirEntry {
	/// On-disk size of one record: name, size|flags, offset
	pub const SIZE: usize = crate::DIR_ENTRY_SIZE;

	/// Create an entry to be added to an archive. An `offset` of zero gets a synthetic placeholder on add.
	pub fn new(name: impl Into<NameCrc>, size: usize, flags: EntryFlags) -> ResResult<DirEntry> {
		if size > crate::MAX_ENTRY_SIZE as usize {
			return Err(ResError::EntryTooLarge(size));
		}

		Ok(DirEntry {
			name: name.into(),
			size: size as u32,
			offset: 0,
			flags,
		})
	}

	/// Setter for the [`offset`](DirEntry::offset) field, entries sharing an offset are candidates for de-duplication
	pub fn at(mut self, offset: u32) -> DirEntry {
		self.offset = offset;
		self
	}

	/// Whether this entry shares its payload with another
	#[inline(always)]
	pub fn is_duplicate(&self) -> bool {
		self.flags.contains(EntryFlags::DUPLICATE)
	}

	/// Whether this entry's payload is still waiting for a flush
	#[inline(always)]
	pub fn is_saved(&self) -> bool {
		!self.flags.contains(EntryFlags::NOT_SAVED)
	}

	pub(crate) fn from_bytes(buffer: &[u8], endian: Endian) -> DirEntry {
		let packed = endian.read_u32(&buffer[4..8]);

		DirEntry {
			name: NameCrc(endian.read_u32(&buffer[0..4])),
			size: packed & crate::MAX_ENTRY_SIZE,
			offset: endian.read_u32(&buffer[8..12]),
			flags: EntryFlags::from_bits((packed >> 24) as u8),
		}
	}

	pub(crate) fn to_bytes(&self, endian: Endian) -> [u8; DirEntry::SIZE] {
		let packed = (self.size & crate::MAX_ENTRY_SIZE) | ((self.flags.persisted().bits() as u32) << 24);

		let mut buffer = [0u8; DirEntry::SIZE];
		buffer[0..4].copy_from_slice(&endian.u32_bytes(self.name.0));
		buffer[4..8].copy_from_slice(&endian.u32_bytes(packed));
		buffer[8..12].copy_from_slice(&endian.u32_bytes(self.offset));
		buffer
	}
}

impl fmt::Display for DirEntry {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(
			f,
			"[DirEntry] name: {}, offset: {}, size: {}, flags: {}",
			self.name, self.offset, self.size, self.flags
		)
	}
}

/// Parse a raw directory block of `count` records
pub(crate) fn parse_directory(bytes: &[u8], count: usize, endian: Endian) -> ResResult<Vec<DirEntry>> {
	let expected = count * DirEntry::SIZE;
	if bytes.len() != expected {
		return Err(ResError::DirectoryReadError(format!(
			"expected {expected} bytes for {count} entries, got {}",
			bytes.len()
		)));
	}

	Ok(bytes
		.chunks_exact(DirEntry::SIZE)
		.map(|chunk| DirEntry::from_bytes(chunk, endian))
		.collect())
}

/// Serialize a directory into a flat block, in the given byte order
pub(crate) fn serialize_directory(entries: &[DirEntry], endian: Endian) -> Vec<u8> {
	let mut buffer = Vec::with_capacity(entries.len() * DirEntry::SIZE);
	for entry in entries {
		buffer.extend_from_slice(&entry.to_bytes(endian));
	}

	buffer
}
