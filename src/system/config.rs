use std::fmt;

use crate::global::codec::Codec;

/// Settings of a [`ResourceSystem`](crate::system::ResourceSystem)
#[derive(Clone)]
pub struct ResourceConfig {
	/// How many archives may hold an OS handle at once, the least recently used one is evicted past this
	pub max_open_files: usize,
	/// Decoded payload sizes at or above this are treated as corruption
	pub max_decompressed_size: usize,
	/// Streamed archives untouched for this many frames get their directory released by [`tick`](crate::system::ResourceSystem::tick)
	pub release_after_frames: u64,
	/// The codec newly created archives are written with
	pub codec: Codec,
	/// Keep a compressed copy of every flushed directory in memory, directories released later are restored from it
	pub compress_directory: bool,
}

impl Default for ResourceConfig {
	fn default() -> Self {
		ResourceConfig {
			max_open_files: 16,
			max_decompressed_size: 10_000_000,
			release_after_frames: 300,
			codec: Codec::default(),
			compress_directory: false,
		}
	}
}

impl fmt::Debug for ResourceConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ResourceConfig")
			.field("max_open_files", &self.max_open_files)
			.field("max_decompressed_size", &self.max_decompressed_size)
			.field("release_after_frames", &self.release_after_frames)
			.field("codec", &self.codec.to_string())
			.field("compress_directory", &self.compress_directory)
			.finish()
	}
}

// Setters
impl ResourceConfig {
	/// Setter for the `max_open_files` field, clamped to at least one
	pub fn max_open_files(mut self, count: usize) -> Self {
		self.max_open_files = count.max(1);
		self
	}

	/// Setter for the `max_decompressed_size` field
	pub fn max_decompressed_size(mut self, ceiling: usize) -> Self {
		self.max_decompressed_size = ceiling;
		self
	}

	/// Setter for the `release_after_frames` field
	pub fn release_after_frames(mut self, frames: u64) -> Self {
		self.release_after_frames = frames;
		self
	}

	/// Setter for the `codec` field
	pub fn codec(mut self, codec: Codec) -> Self {
		self.codec = codec;
		self
	}

	/// Setter for the `compress_directory` field
	pub fn compress_directory(mut self, compress: bool) -> Self {
		self.compress_directory = compress;
		self
	}
}
