//! The side-file cache of per-archive directory summaries.
//!
//! Opening an archive normally costs one header read and one directory read. With a
//! [`LookupDataManager`] attached, the header read is skipped when the cache holds a record for the
//! archive written by the same cache-format version, and streamed archives can find their
//! directory at all (streaming never reads headers).

use std::{
	collections::BTreeMap,
	io::{self, Read, Write},
	sync::Arc,
};

use parking_lot::RwLock;

use crate::global::{codec::Codec, dir_entry::NameCrc, endian::Endian, error::*};
use crate::vfs::{FileSystem, OpenFlags, OpenMode};

mod format;
use format::VersionInfo;

/// A manager shared between the caller and every archive opened under it
pub type SharedLookup = Arc<RwLock<LookupDataManager>>;

/// Major and minor number of the cache format, stored both in the version block and in every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheVersion {
	/// Bumped on incompatible changes to the cached contents
	pub major: u16,
	/// Bumped on compatible changes
	pub minor: u16,
}

impl CacheVersion {
	/// The human readable `major.minor` form written into the version block
	pub fn label(&self) -> String {
		format!("{}.{}", self.major, self.minor)
	}
}

impl Default for CacheVersion {
	fn default() -> Self {
		CacheVersion { major: 1, minor: 0 }
	}
}

/// Settings of a [`LookupDataManager`]
#[derive(Debug, Clone)]
pub struct LookupConfig {
	/// Prefix of paths inside the user-data folder, stripped by [`adjust_name`](LookupDataManager::adjust_name)
	pub user_prefix: String,
	/// Prefix of paths inside the engine root, stripped by [`adjust_name`](LookupDataManager::adjust_name)
	pub engine_root: String,
	/// The running cache-format version
	pub version: CacheVersion,
	/// Codec tag stored in the version block, caches written for another codec are discarded
	pub codec: Codec,
}

impl Default for LookupConfig {
	fn default() -> Self {
		LookupConfig {
			user_prefix: "%USER%/".to_string(),
			engine_root: "engine/".to_string(),
			version: CacheVersion::default(),
			codec: Codec::default(),
		}
	}
}

impl LookupConfig {
	/// Setter for the `user_prefix` field
	pub fn user_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.user_prefix = prefix.into();
		self
	}

	/// Setter for the `engine_root` field
	pub fn engine_root(mut self, root: impl Into<String>) -> Self {
		self.engine_root = root.into();
		self
	}

	/// Setter for the `version` field
	pub fn version(mut self, major: u16, minor: u16) -> Self {
		self.version = CacheVersion { major, minor };
		self
	}

	/// Setter for the `codec` field
	pub fn codec(mut self, codec: Codec) -> Self {
		self.codec = codec;
		self
	}
}

/// Cached summary of one archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupData {
	/// Number of directory records
	pub num_entries_unique: u32,
	/// Where the directory block starts
	pub dir_offset: u32,
	/// Content CRC supplied by whoever stored the record
	pub crc: u32,
	/// Cache-format major version the record was written with
	pub major: u16,
	/// Cache-format minor version the record was written with
	pub minor: u16,
}

impl LookupData {
	/// Whether this record was written by the given cache-format version
	#[inline(always)]
	pub fn matches(&self, version: CacheVersion) -> bool {
		self.major == version.major && self.minor == version.minor
	}
}

/// Per content-family metadata, kept in the second table of the cache file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FamilyData {
	/// Content CRC of the family
	pub crc: u32,
}

/// In-memory view of one lookup cache file.
#[derive(Debug)]
pub struct LookupDataManager {
	config: LookupConfig,
	path: Option<String>,
	endian: Endian,
	read_only: bool,
	dirty: bool,
	data: BTreeMap<NameCrc, LookupData>,
	families: BTreeMap<NameCrc, FamilyData>,
}

impl LookupDataManager {
	/// An empty, writable manager not bound to any file
	pub fn new(config: LookupConfig) -> LookupDataManager {
		LookupDataManager {
			config,
			path: None,
			endian: Endian::Little,
			read_only: false,
			dirty: false,
			data: BTreeMap::new(),
			families: BTreeMap::new(),
		}
	}

	/// Wrap into the shared form archives hold on to
	pub fn shared(self) -> SharedLookup {
		Arc::new(RwLock::new(self))
	}

	fn version_info(&self) -> VersionInfo {
		VersionInfo::new(self.config.codec.tag(), &self.config.version.label())
	}

	/// Bind to `path` and read it. Returns `false` when there was no usable cache: the file is
	/// missing, or it was written for another format or version. In that case the cache starts out empty.
	pub fn load(&mut self, fs: &dyn FileSystem, path: &str, swap_endian: bool, read_only: bool) -> ResResult<bool> {
		self.path = Some(path.to_string());
		self.endian = Endian::from_swap(swap_endian);
		self.read_only = read_only;
		self.dirty = false;
		self.data.clear();
		self.families.clear();

		let mut handle = match fs.open(path, OpenMode::Read, OpenFlags::default()) {
			Ok(handle) => handle,
			Err(err) if err.kind() == io::ErrorKind::NotFound => {
				tracing::debug!("no lookup cache at {path}");
				return Ok(false);
			},
			Err(err) => return Err(err.into()),
		};

		let mut bytes = Vec::new();
		handle.read_to_end(&mut bytes)?;

		let contents = match format::parse(&bytes, self.endian, &self.version_info()) {
			Ok(Some(contents)) => contents,
			Ok(None) => {
				tracing::warn!("lookup cache {path} was written by another version, discarding it");
				return Ok(false);
			},
			Err(err) => {
				tracing::warn!("lookup cache {path} is corrupt, discarding it: {err}");
				return Ok(false);
			},
		};

		self.data = contents.data;
		self.families = contents.families;

		tracing::debug!("loaded {} lookup records from {path}", self.data.len());
		Ok(true)
	}

	/// Write the whole cache to `path`, skipped when nothing changed since the last save.
	/// Returns whether the file was written.
	pub fn save(&mut self, fs: &dyn FileSystem, path: &str, swap_endian: bool) -> ResResult<bool> {
		if !self.dirty {
			return Ok(false);
		}

		let bytes = format::write(&self.version_info(), &self.data, &self.families, Endian::from_swap(swap_endian));

		let mut handle = fs.open(path, OpenMode::Create, OpenFlags { on_disk: true })?;
		handle
			.write_all(&bytes)
			.map_err(|e| ResError::WriteError(format!("Lookup cache <{path}>: {e}")))?;
		handle.sync()?;

		self.dirty = false;
		tracing::debug!("saved {} lookup records to {path}", self.data.len());
		Ok(true)
	}

	/// [`save`](LookupDataManager::save) back to the file this manager was loaded from, if it is writable
	pub fn flush(&mut self, fs: &dyn FileSystem) -> ResResult<bool> {
		if self.read_only {
			return Ok(false);
		}

		match self.path.clone() {
			Some(path) => {
				let swap = self.endian == Endian::Big;
				self.save(fs, &path, swap)
			},
			None => Ok(false),
		}
	}

	/// The key under which an archive path is cached. Every caller has to go through this,
	/// otherwise stores and queries won't meet.
	pub fn adjust_name(&self, raw: &str) -> NameCrc {
		NameCrc::new(self.adjust_path(raw))
	}

	/// The normalised path [`adjust_name`](LookupDataManager::adjust_name) hashes
	pub fn adjust_path(&self, raw: &str) -> String {
		let path = raw.replace('\\', "/");
		let lower = path.to_ascii_lowercase();

		for prefix in [&self.config.user_prefix, &self.config.engine_root] {
			let prefix = prefix.replace('\\', "/").to_ascii_lowercase();
			if !prefix.is_empty() && lower.starts_with(&prefix) {
				return path[prefix.len()..].to_string();
			}
		}

		if let Some(levels) = lower.find("levels/") {
			if let Some(position) = lower[levels..].find("shadercache/") {
				return path[levels + position..].to_string();
			}
		}

		path
	}

	/// The record stored for an adjusted name, regardless of its version
	pub fn get(&self, name: NameCrc) -> Option<&LookupData> {
		self.data.get(&name)
	}

	/// The record stored for an adjusted name, if it was written by the running cache-format version
	pub fn trusted(&self, name: NameCrc) -> Option<LookupData> {
		self.data.get(&name).filter(|d| d.matches(self.config.version)).copied()
	}

	/// Store a snapshot of an archive's directory location, replacing any previous record
	pub fn add_data(&mut self, name: NameCrc, num_entries_unique: u32, dir_offset: u32, crc: u32) {
		let record = LookupData {
			num_entries_unique,
			dir_offset,
			crc,
			major: self.config.version.major,
			minor: self.config.version.minor,
		};

		if self.data.insert(name, record) != Some(record) {
			self.dirty = true;
		}
	}

	/// Drop every record carrying `crc`, returning how many went away
	pub fn remove_data(&mut self, crc: u32) -> usize {
		let before = self.data.len();
		self.data.retain(|_, d| d.crc != crc);

		let removed = before - self.data.len();
		if removed > 0 {
			self.dirty = true;
		}

		removed
	}

	/// Store the metadata of a content family
	pub fn add_family(&mut self, name: NameCrc, crc: u32) {
		let family = FamilyData { crc };
		if self.families.insert(name, family) != Some(family) {
			self.dirty = true;
		}
	}

	/// The metadata of a content family
	pub fn family(&self, name: NameCrc) -> Option<FamilyData> {
		self.families.get(&name).copied()
	}

	/// Force (or cancel) the next save
	pub fn mark_dirty(&mut self, dirty: bool) {
		self.dirty = dirty;
	}

	/// Whether the next save will write
	#[inline(always)]
	pub fn is_dirty(&self) -> bool {
		self.dirty
	}

	/// Archives under a read-only manager never request direct on-disk opens
	#[inline(always)]
	pub fn is_read_only(&self) -> bool {
		self.read_only
	}

	/// Mark this manager read-only (or writable)
	pub fn set_read_only(&mut self, read_only: bool) {
		self.read_only = read_only;
	}

	/// The codec this cache was written for
	#[inline(always)]
	pub fn codec(&self) -> Codec {
		self.config.codec
	}

	/// The running cache-format version
	#[inline(always)]
	pub fn version(&self) -> CacheVersion {
		self.config.version
	}

	/// Number of archive records
	pub fn len(&self) -> usize {
		self.data.len()
	}

	/// Whether no archive records are held
	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}

	/// Every archive record, in name order
	pub fn records(&self) -> impl Iterator<Item = (NameCrc, &LookupData)> {
		self.data.iter().map(|(name, data)| (*name, data))
	}
}
