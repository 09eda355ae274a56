use std::fmt;
use super::error::*;

/// Abstracted access and manipulation of the 8 flag bits packed next to every directory entry's size.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct EntryFlags {
	pub(crate) bits: u8,
}

impl EntryFlags {
	/// Bits only meaningful at runtime, never written to disk and not settable by callers.
	pub const RESERVED_MASK: u8 = EntryFlags::NOT_SAVED | EntryFlags::TEMP_DATA;

	/// The entry was added but its payload hasn't been flushed yet
	pub const NOT_SAVED: u8 = 0b_0000_0001;
	/// The entry shares its payload with another entry at the same offset
	pub const DUPLICATE: u8 = 0b_0000_0010;
	/// The payload is stored compressed with the archive's codec
	pub const COMPRESS: u8 = 0b_0000_0100;
	/// The in-memory buffer of this entry is owned by the archive and freed when the entry is closed
	pub const TEMP_DATA: u8 = 0b_0000_1000;
	/// The caller-provided buffer is already encoded, flushing writes it verbatim
	pub const COMPRESSED: u8 = 0b_1000_0000;

	/// Construct an `EntryFlags` struct from a `u8` number
	#[inline(always)]
	pub fn from_bits(bits: u8) -> Self {
		EntryFlags { bits }
	}

	/// Returns a copy of the underlying number.
	#[inline(always)]
	pub fn bits(&self) -> u8 {
		self.bits
	}

	/// Create a new empty instance
	#[inline(always)]
	pub fn new() -> Self {
		EntryFlags { bits: 0 }
	}

	/// Set a bit into the underlying [`u8`], will fail if set into the reserved mask.
	/// The `toggle` parameter specifies whether to insert the flags (when true), or to pop the flag, (when false).
	pub fn set(&mut self, bit: u8, toggle: bool) -> ResResult<u8> {
		if (EntryFlags::RESERVED_MASK & bit) != 0 {
			return Err(ResError::RestrictedFlagAccessError);
		}

		self.force_set(bit, toggle);
		Ok(self.bits)
	}

	/// Builder flavoured [`set`](EntryFlags::set)
	pub fn with(mut self, bit: u8) -> ResResult<Self> {
		self.set(bit, true)?;
		Ok(self)
	}

	pub(crate) fn force_set(&mut self, mask: u8, toggle: bool) {
		if toggle {
			self.bits |= mask;
		} else {
			self.bits &= !mask;
		}
	}

	/// The bits that survive a round trip through the directory block
	#[inline(always)]
	pub(crate) fn persisted(self) -> EntryFlags {
		EntryFlags {
			bits: self.bits & !EntryFlags::RESERVED_MASK,
		}
	}

	#[inline(always)]
	/// Checks whether the given flag is set.
	pub fn contains(&self, bit: u8) -> bool {
		(self.bits & bit) != 0
	}
}

#[rustfmt::skip]
impl fmt::Display for EntryFlags {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let not_saved = if self.contains(EntryFlags::NOT_SAVED) { 'N' } else { '-' };
		let duplicate = if self.contains(EntryFlags::DUPLICATE) { 'D' } else { '-' };
		let compress = if self.contains(EntryFlags::COMPRESS) { 'C' } else { '-' };
		let temp = if self.contains(EntryFlags::TEMP_DATA) { 'T' } else { '-' };

		write!(f, "Flags[{}{}{}{}]", not_saved, duplicate, compress, temp)
	}
}

#[rustfmt::skip]
impl fmt::Debug for EntryFlags {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}: <{}u8 : {:#010b}>", self, self.bits, self.bits)
	}
}

/// How the file system should open an archive's handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
	/// "rb", the file must exist
	Read,
	/// "r+b", the file must exist and be writable
	ReadWrite,
	/// "w+b", the file is created or truncated
	Create,
}

impl OpenMode {
	/// The C-style access string this mode stands for
	pub fn as_str(&self) -> &'static str {
		match self {
			OpenMode::Read => "rb",
			OpenMode::ReadWrite => "r+b",
			OpenMode::Create => "w+b",
		}
	}
}

/// Access bits passed to [`ResourceSystem::open`](crate::system::ResourceSystem::open).
#[derive(Copy, Clone, Default, PartialEq, Eq)]
#[repr(transparent)]
pub struct AccessMode {
	pub(crate) bits: u32,
}

impl AccessMode {
	/// Read entries
	pub const READ: u32 = 0b0001;
	/// Write entries into an existing archive, combine with [`READ`](AccessMode::READ)
	pub const WRITE: u32 = 0b0010;
	/// Create (or truncate) the archive
	pub const CREATE: u32 = 0b0100;
	/// Read and write headers and directories in swapped byte order
	pub const SWAP_ENDIAN: u32 = 0b1000;

	/// Read-only access
	pub const fn read() -> AccessMode {
		AccessMode { bits: AccessMode::READ }
	}

	/// Read and append to an existing archive
	pub const fn read_write() -> AccessMode {
		AccessMode {
			bits: AccessMode::READ | AccessMode::WRITE,
		}
	}

	/// Create a fresh archive
	pub const fn create() -> AccessMode {
		AccessMode {
			bits: AccessMode::CREATE,
		}
	}

	/// Construct from raw bits, validated lazily by [`resolve`](AccessMode::resolve)
	#[inline(always)]
	pub fn from_bits(bits: u32) -> AccessMode {
		AccessMode { bits }
	}

	/// Returns a copy of the underlying number.
	#[inline(always)]
	pub fn bits(&self) -> u32 {
		self.bits
	}

	/// Toggle the [`SWAP_ENDIAN`](AccessMode::SWAP_ENDIAN) bit
	pub fn swap_endian(mut self, swap: bool) -> AccessMode {
		if swap {
			self.bits |= AccessMode::SWAP_ENDIAN;
		} else {
			self.bits &= !AccessMode::SWAP_ENDIAN;
		}
		self
	}

	/// Whether headers and directories are byte swapped
	#[inline(always)]
	pub fn swaps_endian(&self) -> bool {
		(self.bits & AccessMode::SWAP_ENDIAN) != 0
	}

	#[inline(always)]
	fn access(&self) -> u32 {
		self.bits & !AccessMode::SWAP_ENDIAN
	}

	/// Whether this mode only reads
	#[inline(always)]
	pub fn is_read_only(&self) -> bool {
		self.access() == AccessMode::READ
	}

	/// Whether the archive's header and directory are read on open
	#[inline(always)]
	pub fn reads(&self) -> bool {
		matches!(self.resolve(), Ok(OpenMode::Read | OpenMode::ReadWrite))
	}

	/// Map the access bits onto a file system open mode
	pub fn resolve(&self) -> ResResult<OpenMode> {
		let access = self.access();

		if access == AccessMode::READ {
			Ok(OpenMode::Read)
		} else if access == (AccessMode::READ | AccessMode::WRITE) {
			Ok(OpenMode::ReadWrite)
		} else if (access & AccessMode::CREATE) != 0 {
			Ok(OpenMode::Create)
		} else {
			Err(ResError::InvalidAccessMode(self.bits))
		}
	}
}

impl fmt::Debug for AccessMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mode = self.resolve().map(|m| m.as_str()).unwrap_or("invalid");
		write!(f, "AccessMode[{}{}]", mode, if self.swaps_endian() { ", swapped" } else { "" })
	}
}
