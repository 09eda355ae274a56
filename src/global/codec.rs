use std::fmt;

use super::{endian::Endian, error::*};

#[cfg(feature = "compression")]
use lz4_flex as lz4;
#[cfg(feature = "compression")]
use snap;

/// Markers framing a [`Codec::Passthrough`] blob
pub(crate) const PASSTHROUGH_HEAD: &[u8; 10] = b">>rawbuf>>";
pub(crate) const PASSTHROUGH_TAIL: &[u8; 10] = b"<<rawbuf<<";
const PASSTHROUGH_OVERHEAD: usize = PASSTHROUGH_HEAD.len() + PASSTHROUGH_TAIL.len();

/// Size of the decoded-length prefix in front of every [`Codec::Lz4`] blob
const SIZE_PREFIX: usize = 4;

/// The three interchangeable codecs an archive can be written with, identified on disk by a small version tag.
///
/// Compressed *entries* are framed as blobs:
/// - `Lz4`: `[u32 decoded size][lz4 block]`, the decoder must be told the exact output size.
/// - `Snappy`: a raw snappy stream, which embeds its decoded size.
/// - `Passthrough`: `>>rawbuf>>` + data + `<<rawbuf<<`, used to exercise the uncompressed path.
///
/// Compressed *directories* are bare blocks, their decoded size is always `entries * 12`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Codec {
	/// Uses [LZ4](https://crates.io/crates/lz4_flex) block compression, tag `10`
	#[default]
	Lz4,
	/// Uses raw [snappy](https://crates.io/crates/snap), tag `11`
	Snappy,
	/// No compression, tag `12`
	Passthrough,
}

impl Codec {
	/// Version tag of [`Codec::Lz4`]
	pub const LZ4_TAG: i32 = 10;
	/// Version tag of [`Codec::Snappy`]
	pub const SNAPPY_TAG: i32 = 11;
	/// Version tag of [`Codec::Passthrough`]
	pub const PASSTHROUGH_TAG: i32 = 12;

	/// The on-disk version tag
	pub const fn tag(self) -> i32 {
		match self {
			Codec::Lz4 => Codec::LZ4_TAG,
			Codec::Snappy => Codec::SNAPPY_TAG,
			Codec::Passthrough => Codec::PASSTHROUGH_TAG,
		}
	}

	/// Resolve a version tag, `None` for tags this build doesn't know
	pub fn from_tag(tag: i32) -> Option<Codec> {
		match tag {
			Codec::LZ4_TAG => Some(Codec::Lz4),
			Codec::SNAPPY_TAG => Some(Codec::Snappy),
			Codec::PASSTHROUGH_TAG => Some(Codec::Passthrough),
			_ => None,
		}
	}

	/// Compress a bare block, no framing
	pub fn compress_block(self, data: &[u8]) -> ResResult<Vec<u8>> {
		match self {
			#[cfg(feature = "compression")]
			Codec::Lz4 => Ok(lz4::block::compress(data)),
			#[cfg(feature = "compression")]
			Codec::Snappy => snap::raw::Encoder::new()
				.compress_vec(data)
				.map_err(|e| ResError::EncodeError(e.to_string())),
			#[cfg(not(feature = "compression"))]
			Codec::Lz4 | Codec::Snappy => Err(ResError::MissingFeatureError("compression")),
			Codec::Passthrough => Ok(data.to_vec()),
		}
	}

	/// Decompress a bare block whose decoded size is known up front
	pub fn decompress_block(self, data: &[u8], expected: usize) -> ResResult<Vec<u8>> {
		let decoded = match self {
			#[cfg(feature = "compression")]
			Codec::Lz4 => {
				if expected == 0 {
					Vec::new()
				} else {
					lz4::block::decompress(data, expected).map_err(|e| ResError::DecodeError(e.to_string()))?
				}
			},
			#[cfg(feature = "compression")]
			Codec::Snappy => snap::raw::Decoder::new()
				.decompress_vec(data)
				.map_err(|e| ResError::DecodeError(e.to_string()))?,
			#[cfg(not(feature = "compression"))]
			Codec::Lz4 | Codec::Snappy => return Err(ResError::MissingFeatureError("compression")),
			Codec::Passthrough => data.to_vec(),
		};

		if decoded.len() != expected {
			return Err(ResError::DecodeError(format!(
				"{self} block decoded to {} bytes, expected {expected}",
				decoded.len()
			)));
		}

		Ok(decoded)
	}

	/// Encode an entry payload into a framed blob
	pub fn encode(self, data: &[u8], endian: Endian) -> ResResult<Vec<u8>> {
		match self {
			Codec::Lz4 => {
				let block = self.compress_block(data)?;

				let mut blob = Vec::with_capacity(SIZE_PREFIX + block.len());
				blob.extend_from_slice(&endian.u32_bytes(data.len() as u32));
				blob.extend_from_slice(&block);
				Ok(blob)
			},
			Codec::Snappy => self.compress_block(data),
			Codec::Passthrough => {
				let mut blob = Vec::with_capacity(data.len() + PASSTHROUGH_OVERHEAD);
				blob.extend_from_slice(PASSTHROUGH_HEAD);
				blob.extend_from_slice(data);
				blob.extend_from_slice(PASSTHROUGH_TAIL);
				Ok(blob)
			},
		}
	}

	/// Query the decoded size of a framed blob without decoding it
	pub fn decoded_len(self, blob: &[u8], endian: Endian) -> ResResult<usize> {
		match self {
			Codec::Lz4 => {
				if blob.len() < SIZE_PREFIX {
					return Err(ResError::CorruptEntrySize(blob.len()));
				}

				Ok(endian.read_u32(&blob[..SIZE_PREFIX]) as usize)
			},
			#[cfg(feature = "compression")]
			Codec::Snappy => snap::raw::decompress_len(blob).map_err(|e| ResError::DecodeError(e.to_string())),
			#[cfg(not(feature = "compression"))]
			Codec::Snappy => Err(ResError::MissingFeatureError("compression")),
			Codec::Passthrough => blob
				.len()
				.checked_sub(PASSTHROUGH_OVERHEAD)
				.ok_or(ResError::CorruptEntrySize(blob.len())),
		}
	}

	/// The still-encoded part of a blob, without any size prefix or markers
	pub(crate) fn payload(self, blob: &[u8]) -> &[u8] {
		match self {
			Codec::Lz4 if blob.len() >= SIZE_PREFIX => &blob[SIZE_PREFIX..],
			Codec::Passthrough if blob.len() >= PASSTHROUGH_OVERHEAD => {
				&blob[PASSTHROUGH_HEAD.len()..blob.len() - PASSTHROUGH_TAIL.len()]
			},
			_ => blob,
		}
	}

	/// Decode a framed blob, refusing decoded sizes at or above `ceiling`
	pub fn decode(self, blob: &[u8], endian: Endian, ceiling: usize) -> ResResult<Vec<u8>> {
		let size = self.decoded_len(blob, endian)?;
		if size >= ceiling {
			return Err(ResError::SizeCeilingExceeded { size, ceiling });
		}

		self.decompress_block(self.payload(blob), size)
	}
}

impl fmt::Display for Codec {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Codec::Lz4 => write!(f, "LZ4"),
			Codec::Snappy => write!(f, "Snappy"),
			Codec::Passthrough => write!(f, "Passthrough"),
		}
	}
}
