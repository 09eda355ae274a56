use std::{
	collections::{BTreeMap, HashMap},
	io::{Read, Seek, SeekFrom, Write},
	mem,
	sync::{atomic::Ordering, Arc},
};

use super::{
	open_entry::{EntryBuffer, OpenEntry},
	ArchiveId, CompressedEntry, Context, LoadStatus, SeekOrigin,
};
use crate::global::{
	codec::Codec,
	dir_entry::{parse_directory, DirEntry, NameCrc},
	endian::Endian,
	error::*,
	flags::{AccessMode, EntryFlags},
	header::FileHeader,
};
use crate::lookup::SharedLookup;
use crate::stream::StreamInfo;
use crate::vfs::FileHandle;

/// One physical archive: header, payloads, and a directory sorted by name hash.
pub(crate) struct ResFile {
	pub(crate) id: ArchiveId,
	pub(crate) name: String,
	pub(crate) access: AccessMode,
	pub(crate) handle: Option<Box<dyn FileHandle>>,
	pub(crate) active: bool,
	pub(crate) endian: Endian,
	pub(crate) codec: Codec,

	pub(crate) dir: Vec<DirEntry>,
	pub(crate) open_entries: BTreeMap<NameCrc, OpenEntry>,
	pub(crate) dir_valid: bool,
	pub(crate) dirty: bool,
	pub(crate) dir_streaming: bool,
	pub(crate) num_entries: u32,
	pub(crate) dir_offset: u32,
	/// Directory block encoded with `codec`, kept to restore a released directory
	pub(crate) compressed_dir: Option<Vec<u8>>,
	/// Entries of a streamed directory, installed once every directory read is in
	pub(crate) staged_dir: Option<Vec<DirEntry>>,
	pub(crate) next_synthetic_offset: u32,
	/// Add order of the entries not flushed yet
	pub(crate) added: HashMap<NameCrc, usize>,

	pub(crate) stream: Option<Arc<StreamInfo>>,
	pub(crate) lookup: Option<SharedLookup>,
	pub(crate) lookup_resolved: bool,
	pub(crate) last_error: Option<String>,
}

impl ResFile {
	pub(crate) fn new(id: ArchiveId, name: String) -> ResFile {
		ResFile {
			id,
			name,
			access: AccessMode::default(),
			handle: None,
			active: false,
			endian: Endian::Little,
			codec: Codec::default(),
			dir: Vec::new(),
			open_entries: BTreeMap::new(),
			dir_valid: false,
			dirty: false,
			dir_streaming: false,
			num_entries: 0,
			dir_offset: 0,
			compressed_dir: None,
			staged_dir: None,
			next_synthetic_offset: crate::SYNTHETIC_OFFSET_BASE,
			added: HashMap::new(),
			stream: None,
			lookup: None,
			lookup_resolved: false,
			last_error: None,
		}
	}

	/// Forget the previous session before (re)opening
	pub(crate) fn reset(&mut self, access: AccessMode, lookup: Option<SharedLookup>, stream: Option<Arc<StreamInfo>>) {
		self.access = access;
		self.endian = Endian::from_swap(access.swaps_endian());
		self.lookup = lookup;
		self.stream = stream;
		self.lookup_resolved = false;
		self.last_error = None;

		if !self.dirty {
			self.dir.clear();
			self.open_entries.clear();
			self.added.clear();
			self.dir_valid = false;
			self.compressed_dir = None;
		}
	}

	pub(crate) fn set_error(&mut self, err: &ResError) {
		tracing::debug!("{}: {err}", self.name);
		self.last_error = Some(err.to_string());
	}

	pub(crate) fn find(&self, name: NameCrc) -> Option<usize> {
		self.dir.binary_search_by_key(&name, |e| e.name).ok()
	}

	pub(crate) fn entry(&self, name: NameCrc) -> Option<&DirEntry> {
		self.find(name).map(|index| &self.dir[index])
	}

	pub(crate) fn pending_entries(&self) -> usize {
		self.stream.as_ref().map(|s| s.queues.lock().entries.len()).unwrap_or(0)
	}

	/// A directory load or entry reads are in flight
	pub(crate) fn is_stream_busy(&self) -> bool {
		self.dir_streaming || self.pending_entries() > 0
	}

	fn handle(&mut self, op: &'static str) -> ResResult<&mut Box<dyn FileHandle>> {
		self.handle.as_mut().ok_or(ResError::InvalidHandle(op))
	}

	pub(crate) fn read_raw(&mut self, offset: u64, size: usize, op: &'static str) -> ResResult<Vec<u8>> {
		let handle = self.handle(op)?;

		handle
			.seek(SeekFrom::Start(offset))
			.map_err(|e| ResError::SeekError(format!("{op} - Seek error: {e}")))?;

		let mut buffer = vec![0u8; size];
		handle
			.read_exact(&mut buffer)
			.map_err(|e| ResError::ReadError(format!("{op} - Reading fault: {e}")))?;

		Ok(buffer)
	}

	/// Take the directory location from the lookup cache, if it holds a trusted record
	pub(crate) fn resolve_lookup(&mut self) -> bool {
		let Some(lookup) = self.lookup.clone() else {
			return false;
		};

		let manager = lookup.read();
		match manager.trusted(manager.adjust_name(&self.name)) {
			Some(data) => {
				self.codec = manager.codec();
				self.num_entries = data.num_entries_unique;
				self.dir_offset = data.dir_offset;
				self.lookup_resolved = true;
				true
			},
			None => false,
		}
	}

	pub(crate) fn read_header(&mut self) -> ResResult<()> {
		let endian = self.endian;
		let handle = self.handle("Open")?;

		handle
			.seek(SeekFrom::Start(0))
			.map_err(|e| ResError::SeekError(format!("Open - Seek error: {e}")))?;
		let header = FileHeader::from_handle(handle.as_mut(), endian)?;

		self.codec = header.validate()?;
		self.num_entries = header.num_entries as u32;
		self.dir_offset = header.dir_offset;

		Ok(())
	}

	/// Write the placeholder header of a new archive
	pub(crate) fn start_fresh(&mut self, codec: Codec) -> ResResult<()> {
		let header = FileHeader::fresh(codec).to_bytes(self.endian);
		let handle = self.handle("Open")?;

		handle
			.seek(SeekFrom::Start(0))
			.map_err(|e| ResError::SeekError(format!("Open - Seek error: {e}")))?;
		handle
			.write_all(&header)
			.map_err(|e| ResError::WriteError(format!("Open - Writing fault: {e}")))?;

		self.codec = codec;
		self.num_entries = 0;
		self.dir_offset = FileHeader::BASE_SIZE as u32;
		self.dir.clear();
		self.open_entries.clear();
		self.added.clear();
		self.compressed_dir = None;
		self.dirty = false;
		self.dir_valid = true;

		Ok(())
	}

	/// Load the directory through the handle, or start streaming it in
	pub(crate) fn load_directory(&mut self, ctx: &Context) -> ResResult<LoadStatus> {
		if self.stream.is_some() {
			return self.request_directory(ctx);
		}

		let count = self.num_entries as usize;
		let bytes = self
			.read_raw(self.dir_offset as u64, count * DirEntry::SIZE, "Open")
			.map_err(|e| ResError::DirectoryReadError(e.to_string()))?;

		self.install_directory(parse_directory(&bytes, count, self.endian)?);
		tracing::debug!("loaded {count} directory entries of {}", self.name);

		Ok(LoadStatus::Ready)
	}

	pub(crate) fn install_directory(&mut self, mut entries: Vec<DirEntry>) {
		if entries.windows(2).any(|w| w[0].name > w[1].name) {
			tracing::warn!("directory of {} is not sorted by name", self.name);
			entries.sort_by_key(|e| e.name);
		}

		self.dir = entries;
		self.dir_valid = true;
	}

	/// Make the directory valid again, from the in-memory compressed copy when there is one
	pub(crate) fn prepare_directory(&mut self, ctx: &Context) -> ResResult<LoadStatus> {
		if self.dir_valid {
			return Ok(LoadStatus::Ready);
		}

		let Some(compressed) = self.compressed_dir.as_ref() else {
			return self.load_directory(ctx);
		};

		let count = self.num_entries as usize;
		let bytes = self
			.codec
			.decompress_block(compressed, count * DirEntry::SIZE)
			.map_err(|e| ResError::CorruptDirectory(e.to_string()))?;
		let compressed_len = compressed.len() as u64;

		self.install_directory(parse_directory(&bytes, count, self.endian)?);
		ctx.compressed_dir_bytes.fetch_add(compressed_len, Ordering::Relaxed);

		Ok(LoadStatus::Ready)
	}

	/// Drop the directory and every open entry. Refused while dirty or streaming.
	pub(crate) fn release_directory(&mut self) -> bool {
		if self.dirty || self.is_stream_busy() {
			return false;
		}

		if !self.dir_valid {
			return false;
		}

		for entry in self.dir.iter().filter(|e| !e.is_saved()) {
			tracing::warn!("releasing the directory of {} drops unsaved entry {}", self.name, entry.name);
		}

		self.open_entries.clear();
		self.added.clear();
		self.dir = Vec::new();
		self.dir_valid = false;

		tracing::debug!("released the directory of {}", self.name);
		true
	}

	/// Rewind an entry and drop its owned buffer, optionally forgetting it altogether
	pub(crate) fn close_entry(&mut self, name: NameCrc, erase: bool) -> bool {
		let Some(open) = self.open_entries.get_mut(&name) else {
			return false;
		};

		open.close();
		if erase {
			self.open_entries.remove(&name);
		}

		if let Some(index) = self.find(name) {
			self.dir[index].flags.force_set(EntryFlags::TEMP_DATA, false);
		}

		true
	}

	pub(crate) fn buffer(&self, name: NameCrc) -> Option<Arc<[u8]>> {
		self.open_entries.get(&name).and_then(|o| o.buffer.data()).cloned()
	}

	/// Open an entry for a full read: rewind it, report a failed streamed read once, and
	/// hand out the payload if it is already in memory
	pub(crate) fn take_loaded(&mut self, name: NameCrc) -> ResResult<Option<Arc<[u8]>>> {
		let open = self.open_entries.entry(name).or_default();
		open.cursor = 0;

		if open.failed {
			open.failed = false;
			return Err(ResError::StreamReadFailed(name));
		}

		Ok(open.buffer.data().cloned())
	}

	/// Decode a stored payload according to the entry's flags
	pub(crate) fn decode_entry(&self, ctx: &Context, entry: &DirEntry, blob: Vec<u8>) -> ResResult<Vec<u8>> {
		if entry.flags.contains(EntryFlags::COMPRESS) {
			self.codec.decode(&blob, self.endian, ctx.config.max_decompressed_size)
		} else {
			Ok(blob)
		}
	}

	/// Keep a payload the archive read, as an owned buffer
	pub(crate) fn store_loaded(&mut self, name: NameCrc, data: Arc<[u8]>) {
		if let Some(index) = self.find(name) {
			self.dir[index].flags.force_set(EntryFlags::TEMP_DATA, true);
		}

		let open = self.open_entries.entry(name).or_default();
		open.buffer = EntryBuffer::Owned(data);
		open.failed = false;
	}

	pub(crate) fn read_sync(&mut self, ctx: &Context, entry: &DirEntry) -> ResResult<Arc<[u8]>> {
		let blob = self.read_raw(entry.offset as u64, entry.size as usize, "FileRead")?;
		let data: Arc<[u8]> = self.decode_entry(ctx, entry, blob)?.into();

		self.store_loaded(entry.name, data.clone());
		Ok(data)
	}

	/// Partial read served from memory, `None` when the entry has no buffer
	pub(crate) fn read_buffered(&mut self, name: NameCrc, buffer: &mut [u8]) -> Option<usize> {
		let open = self.open_entries.entry(name).or_default();
		let data = open.buffer.data()?;

		let start = (open.cursor as usize).min(data.len());
		let count = buffer.len().min(data.len() - start);
		buffer[..count].copy_from_slice(&data[start..start + count]);

		open.cursor += count as u64;
		Some(count)
	}

	/// Partial read straight from the file at `offset + cursor`
	pub(crate) fn read_direct(&mut self, entry: &DirEntry, buffer: &mut [u8]) -> ResResult<usize> {
		let cursor = self.open_entries.entry(entry.name).or_default().cursor;
		let remaining = (entry.size as u64).saturating_sub(cursor) as usize;
		let count = buffer.len().min(remaining);

		let bytes = self.read_raw(entry.offset as u64 + cursor, count, "FileRead2")?;
		buffer[..count].copy_from_slice(&bytes);

		self.open_entries.entry(entry.name).or_default().cursor += count as u64;
		Ok(count)
	}

	pub(crate) fn seek_entry(&mut self, entry: &DirEntry, offset: i64, origin: SeekOrigin) -> ResResult<u64> {
		self.handle("FileSeek")?;

		let open = self.open_entries.entry(entry.name).or_default();
		let target = match origin {
			SeekOrigin::Start => offset,
			SeekOrigin::Current => open.cursor as i64 + offset,
			SeekOrigin::End => entry.size as i64 - offset,
		};

		if target < 0 {
			return Err(ResError::SeekError(format!(
				"FileSeek - position {target} lies before entry {}",
				entry.name
			)));
		}

		open.cursor = target as u64;
		let position = entry.offset as u64 + target as u64;

		self.handle("FileSeek")?
			.seek(SeekFrom::Start(position))
			.map_err(|e| ResError::SeekError(format!("FileSeek - Seek error: {e}")))?;

		Ok(target as u64)
	}

	pub(crate) fn write_data(&mut self, entry: &DirEntry, data: &[u8]) -> ResResult<usize> {
		let size = entry.size as usize;
		if data.len() < size {
			return Err(ResError::WriteError(format!(
				"FileWrite - Wrong data: {} bytes for an entry of {size}",
				data.len()
			)));
		}

		if !entry.is_saved() {
			let open = self.open_entries.entry(entry.name).or_default();
			open.buffer = EntryBuffer::Borrowed(Arc::from(&data[..size]));
			self.dirty = true;
			return Ok(size);
		}

		if entry.flags.contains(EntryFlags::COMPRESS) {
			return Err(ResError::CompressedWrite(entry.name));
		}

		let handle = self.handle("FileWrite")?;
		handle
			.seek(SeekFrom::Start(entry.offset as u64))
			.map_err(|e| ResError::SeekError(format!("FileWrite - Seek error: {e}")))?;
		handle
			.write_all(&data[..size])
			.map_err(|e| ResError::WriteError(format!("FileWrite - Writing fault: {e}")))?;

		// a cached copy would be stale now
		self.close_entry(entry.name, false);
		Ok(size)
	}

	pub(crate) fn add_entry(&mut self, mut entry: DirEntry, data: Option<Arc<[u8]>>) -> ResResult<usize> {
		let index = match self.dir.binary_search_by_key(&entry.name, |e| e.name) {
			Ok(_) => return Ok(self.dir.len()),
			Err(index) => index,
		};

		if entry.offset == 0 {
			entry.offset = self.next_synthetic_offset;
			self.next_synthetic_offset = self.next_synthetic_offset.wrapping_add(1);
		}

		// zero sized entries take no storage
		if entry.size == 0 {
			return Ok(self.dir.len());
		}

		if let Some(data) = &data {
			if data.len() < entry.size as usize {
				return Err(ResError::WriteError(format!(
					"FileAdd - Wrong data: {} bytes for an entry of {}",
					data.len(),
					entry.size
				)));
			}
		}

		entry.flags.force_set(EntryFlags::TEMP_DATA, false);
		entry.flags.force_set(EntryFlags::NOT_SAVED, true);
		self.dir.insert(index, entry);

		let order = self.added.len();
		self.added.insert(entry.name, order);

		if let Some(data) = data {
			self.open_entries.entry(entry.name).or_default().buffer = EntryBuffer::Borrowed(data);
		}

		self.dirty = true;
		Ok(self.dir.len())
	}

	pub(crate) fn read_compressed(&mut self, entry: &DirEntry) -> ResResult<CompressedEntry> {
		self.handle("FileReadCompressed")?;

		if !entry.is_saved() || entry.offset >= crate::SYNTHETIC_OFFSET_BASE {
			return Err(ResError::ReadError(format!(
				"FileReadCompressed - entry {} has not been flushed yet",
				entry.name
			)));
		}

		let blob = self.read_raw(entry.offset as u64, entry.size as usize, "FileReadCompressed")?;

		if entry.flags.contains(EntryFlags::COMPRESS) {
			let decoded_size = self.codec.decoded_len(&blob, self.endian)?;
			let data = self.codec.payload(&blob).to_vec();

			Ok(CompressedEntry {
				encoded_size: data.len(),
				decoded_size,
				data,
			})
		} else {
			Ok(CompressedEntry {
				decoded_size: blob.len(),
				encoded_size: blob.len(),
				data: blob,
			})
		}
	}

	pub(crate) fn modification_time(&mut self) -> ResResult<u64> {
		match self.handle.as_ref() {
			Some(handle) => Ok(handle.modification_time()?),
			None => Ok(0),
		}
	}

	pub(crate) fn resource_size(&mut self) -> ResResult<u64> {
		let Some(handle) = self.handle.as_mut() else {
			return Ok(0);
		};

		let length = handle
			.seek(SeekFrom::End(0))
			.map_err(|e| ResError::SeekError(format!("Size - Seek error: {e}")))?;
		handle
			.seek(SeekFrom::Start(0))
			.map_err(|e| ResError::SeekError(format!("Size - Seek error: {e}")))?;

		Ok(length)
	}

	pub(crate) fn memory_size(&self) -> usize {
		let buffers: usize = self.open_entries.values().map(OpenEntry::owned_bytes).sum();

		mem::size_of::<ResFile>()
			+ self.dir.len() * mem::size_of::<DirEntry>()
			+ self.open_entries.len() * mem::size_of::<OpenEntry>()
			+ self.compressed_dir.as_ref().map(Vec::len).unwrap_or(0)
			+ buffers
	}
}
