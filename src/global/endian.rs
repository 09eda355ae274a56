/// Byte order of the on-disk structures of one archive or lookup cache.
/// Archives are written little-endian unless opened with [`AccessMode::SWAP_ENDIAN`](crate::global::flags::AccessMode::SWAP_ENDIAN).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Endian {
	/// Native layout of the format
	#[default]
	Little,
	/// Swapped layout, used for big-endian targets
	Big,
}

impl Endian {
	/// Pick the swapped order when `swap` is set
	#[inline(always)]
	pub fn from_swap(swap: bool) -> Endian {
		if swap {
			Endian::Big
		} else {
			Endian::Little
		}
	}

	#[inline(always)]
	pub(crate) fn read_u32(self, bytes: &[u8]) -> u32 {
		let bytes: [u8; 4] = [bytes[0], bytes[1], bytes[2], bytes[3]];
		match self {
			Endian::Little => u32::from_le_bytes(bytes),
			Endian::Big => u32::from_be_bytes(bytes),
		}
	}

	#[inline(always)]
	pub(crate) fn read_i32(self, bytes: &[u8]) -> i32 {
		self.read_u32(bytes) as i32
	}

	#[inline(always)]
	pub(crate) fn read_u16(self, bytes: &[u8]) -> u16 {
		let bytes: [u8; 2] = [bytes[0], bytes[1]];
		match self {
			Endian::Little => u16::from_le_bytes(bytes),
			Endian::Big => u16::from_be_bytes(bytes),
		}
	}

	#[inline(always)]
	pub(crate) fn u32_bytes(self, value: u32) -> [u8; 4] {
		match self {
			Endian::Little => value.to_le_bytes(),
			Endian::Big => value.to_be_bytes(),
		}
	}

	#[inline(always)]
	pub(crate) fn i32_bytes(self, value: i32) -> [u8; 4] {
		self.u32_bytes(value as u32)
	}

	#[inline(always)]
	pub(crate) fn u16_bytes(self, value: u16) -> [u8; 2] {
		match self {
			Endian::Little => value.to_le_bytes(),
			Endian::Big => value.to_be_bytes(),
		}
	}
}
