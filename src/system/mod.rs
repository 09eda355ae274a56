//! The process-wide archive manager.
//!
//! A [`ResourceSystem`] owns every archive it [`create`](ResourceSystem::create)s, bounds the number
//! of OS handles held at once with a least-recently-used ring, and garbage collects the directories
//! of streamed archives on [`tick`](ResourceSystem::tick).
//!
//! All archive state lives behind one lock. A second, narrower lock guards the streaming ring, and
//! every [`StreamInfo`] carries its own lock for its in-flight requests. The order is always
//! archives, then streaming ring, then stream queues.

use std::{
	collections::HashMap,
	fmt,
	sync::{
		atomic::{AtomicU64, Ordering},
		mpsc, Arc,
	},
};

use lru::LruCache;
use parking_lot::Mutex;

use crate::global::{
	codec::Codec,
	dir_entry::{DirEntry, NameCrc},
	error::*,
	flags::{AccessMode, OpenMode},
};
use crate::lookup::{LookupData, SharedLookup};
use crate::stream::{CompletionSink, RequestId, RequestTag, StreamCompletion, StreamEngine, StreamInfo, StreamRequest};
use crate::vfs::{FileSystem, OpenFlags};

mod archive;
mod config;
mod flush;
mod open_entry;
mod streaming;

pub use config::ResourceConfig;

use archive::ResFile;
use streaming::StreamRing;

/// Handle of one archive registered in a [`ResourceSystem`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchiveId(pub(crate) u32);

impl ArchiveId {
	/// Returns a copy of the underlying number.
	#[inline(always)]
	pub fn value(&self) -> u32 {
		self.0
	}
}

impl fmt::Display for ArchiveId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "archive#{}", self.0)
	}
}

/// Whether a directory is usable yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
	/// The directory is in memory
	Ready,
	/// The directory is being streamed in, poll again later
	Pending,
}

/// Result of a directory lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryLookup {
	/// The entry, as currently recorded in the directory
	Found(DirEntry),
	/// The directory itself is still streaming in, try again later
	Streaming,
	/// No such entry
	Missing,
}

impl EntryLookup {
	/// The entry, if it was found
	pub fn found(self) -> Option<DirEntry> {
		match self {
			EntryLookup::Found(entry) => Some(entry),
			_ => None,
		}
	}
}

/// Result of [`ResourceSystem::read_entry`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
	/// The decoded payload
	Ready(Arc<[u8]>),
	/// A streamed read was issued (or the directory is still streaming), poll again later
	Pending,
	/// A streamed read of this entry is already in flight, don't issue another
	InFlight,
}

impl ReadOutcome {
	/// The payload, if it is available
	pub fn ready(self) -> Option<Arc<[u8]>> {
		match self {
			ReadOutcome::Ready(data) => Some(data),
			_ => None,
		}
	}
}

/// Reference point of [`ResourceSystem::seek_entry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOrigin {
	/// From the start of the entry
	Start,
	/// From the entry's current cursor
	Current,
	/// Backwards from the end of the entry, the cursor lands on `size - offset`
	End,
}

impl SeekOrigin {
	/// Raw value of [`SeekOrigin::Start`]
	pub const SET: i32 = 0;
	/// Raw value of [`SeekOrigin::Current`]
	pub const CUR: i32 = 1;
	/// Raw value of [`SeekOrigin::End`]
	pub const END: i32 = 2;

	/// Parse a C-style `whence` value
	pub fn from_raw(whence: i32) -> ResResult<SeekOrigin> {
		match whence {
			SeekOrigin::SET => Ok(SeekOrigin::Start),
			SeekOrigin::CUR => Ok(SeekOrigin::Current),
			SeekOrigin::END => Ok(SeekOrigin::End),
			other => Err(ResError::InvalidSeekMode(other)),
		}
	}
}

/// A payload as stored on disk, still encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedEntry {
	/// The encoded bytes without size prefix or markers
	pub data: Vec<u8>,
	/// Size of the payload once decoded
	pub decoded_size: usize,
	/// Size of [`data`](CompressedEntry::data)
	pub encoded_size: usize,
}

/// Everything archives need that doesn't live behind the archive lock
pub(crate) struct Context {
	pub(crate) config: ResourceConfig,
	pub(crate) fs: Arc<dyn FileSystem>,
	streamer: Option<Arc<dyn StreamEngine>>,
	sink: CompletionSink,
	pub(crate) streams: Mutex<StreamRing>,
	next_request: AtomicU64,
	frame: AtomicU64,
	pub(crate) compressed_dir_bytes: AtomicU64,
}

impl Context {
	pub(crate) fn next_request_id(&self) -> RequestId {
		RequestId(self.next_request.fetch_add(1, Ordering::Relaxed) + 1)
	}

	#[inline(always)]
	pub(crate) fn frame(&self) -> u64 {
		self.frame.load(Ordering::Relaxed)
	}

	/// Hand a read to the stream engine, its completion arrives through the system's sink
	pub(crate) fn start_read(&self, tag: RequestTag, path: &str, offset: u64, size: usize) -> ResResult<()> {
		let streamer = self.streamer.as_ref().ok_or(ResError::NoStreamEngine)?;

		tracing::debug!("stream request {} for {path}: {size} bytes at {offset}", tag.id);
		let request = StreamRequest {
			tag,
			path: path.to_string(),
			offset,
			size,
		};

		streamer.start_read(request, self.sink.clone());
		Ok(())
	}
}

/// The archive registry and the open-file ring, guarded together
pub(crate) struct SystemState {
	pub(crate) archives: HashMap<ArchiveId, ResFile>,
	/// Active archives, most recently used first
	lru: LruCache<ArchiveId, ()>,
	open_count: usize,
	next_id: u32,
}

impl SystemState {
	fn get(&self, id: ArchiveId) -> ResResult<&ResFile> {
		self.archives.get(&id).ok_or(ResError::UnknownArchive(id))
	}

	fn get_mut(&mut self, id: ArchiveId) -> ResResult<&mut ResFile> {
		self.archives.get_mut(&id).ok_or(ResError::UnknownArchive(id))
	}

	/// Make `id` the most recently used archive, acquiring a handle if it has none.
	/// Past the first activation, a released directory is brought back in.
	fn activate(&mut self, ctx: &Context, id: ArchiveId, first_time: bool) -> ResResult<()> {
		let archive = self.get(id)?;

		if archive.active {
			self.lru.push(id, ());
		} else {
			let mut mode = archive.access.resolve()?;
			let streamed = archive.stream.is_some();
			let name = archive.name.clone();
			let flags = OpenFlags {
				on_disk: archive.lookup.as_ref().is_some_and(|l| !l.read().is_read_only()),
			};

			self.lru.push(id, ());
			while self.open_count >= ctx.config.max_open_files {
				let oldest = self.lru.peek_lru().map(|(&victim, _)| victim);
				match oldest {
					Some(victim) if victim != id => {
						tracing::debug!("evicting {victim} to make room for {name}");
						self.deactivate(ctx, victim);
					},
					_ => break,
				}
			}

			// streamed archives never read through a handle of their own
			let handle = if streamed {
				None
			} else {
				// "w+b" would truncate what the first activation wrote
				if !first_time && mode == OpenMode::Create {
					mode = OpenMode::ReadWrite;
				}

				match ctx.fs.open(&name, mode, flags) {
					Ok(handle) => Some(handle),
					Err(source) => {
						self.lru.pop(&id);
						return Err(ResError::OpenFailed { name, source });
					},
				}
			};

			let archive = self.get_mut(id)?;
			archive.handle = handle;
			archive.active = true;
			self.open_count += 1;

			tracing::debug!("activated {} ({}), {} archives open", name, mode.as_str(), self.open_count);
		}

		let archive = self.get_mut(id)?;
		if !first_time && !archive.dir_valid {
			archive.prepare_directory(ctx)?;
		}

		Ok(())
	}

	/// Flush if writable, drop the handle and leave the ring. The directory stays in memory.
	fn deactivate(&mut self, ctx: &Context, id: ArchiveId) {
		if let Some(archive) = self.archives.get_mut(&id) {
			if archive.handle.is_some() && !archive.access.is_read_only() {
				if let Err(err) = archive.flush(ctx) {
					tracing::warn!("flushing {} on deactivation failed: {err}", archive.name);
					archive.set_error(&err);
				}
			}

			archive.handle = None;
			if archive.active {
				self.open_count = self.open_count.saturating_sub(1);
			}
			archive.active = false;
		}

		self.lru.pop(&id);
	}

	fn open(
		&mut self, ctx: &Context, id: ArchiveId, access: AccessMode, lookup: Option<SharedLookup>,
		stream: Option<Arc<StreamInfo>>,
	) -> ResResult<LoadStatus> {
		let archive = self.get(id)?;
		if archive.name.is_empty() {
			return Err(ResError::InvalidName);
		}

		let mode = access.resolve()?;
		if archive.active {
			self.deactivate(ctx, id);
		}

		let stream = if access.reads() { stream } else { None };
		if stream.is_some() && ctx.streamer.is_none() {
			return Err(ResError::NoStreamEngine);
		}

		self.get_mut(id)?.reset(access, lookup, stream);

		let mut activated = self.activate(ctx, id, true);
		if activated.is_err() && mode != OpenMode::Read {
			let name = self.get(id)?.name.clone();
			if ctx.fs.exists(&name) {
				tracing::debug!("{name} refused a writable open, clearing its read-only attribute");
				ctx.fs.ensure_writable(&name)?;
				activated = self.activate(ctx, id, true);
			}
		}
		activated?;

		let loaded = self.load_opened(ctx, id, access);
		if let Err(err) = &loaded {
			tracing::debug!("opening {id} failed after activation, giving its handle back: {err}");
			self.deactivate(ctx, id);
		}

		loaded
	}

	/// Resolve the header and directory of a freshly activated archive
	fn load_opened(&mut self, ctx: &Context, id: ArchiveId, access: AccessMode) -> ResResult<LoadStatus> {
		let archive = self.get_mut(id)?;
		if access.reads() {
			if !archive.resolve_lookup() {
				if archive.handle.is_none() {
					return Err(ResError::StreamingRequiresLookupData(archive.name.clone()));
				}

				archive.read_header()?;
			}

			if let Some(info) = &archive.stream {
				info.queues.lock().archive = Some(id);
			}

			archive.load_directory(ctx)
		} else {
			archive.start_fresh(ctx.config.codec)?;
			Ok(LoadStatus::Ready)
		}
	}

	fn close(&mut self, ctx: &Context, id: ArchiveId) -> ResResult<()> {
		let archive = self.get(id)?;
		if archive.is_stream_busy() {
			return Err(ResError::StreamingInProgress(archive.name.clone()));
		}

		ctx.streams.lock().unlink(id);

		if !archive.access.is_read_only() && archive.dirty {
			self.activate(ctx, id, false)?;
			self.get_mut(id)?.flush(ctx)?;
		}

		self.deactivate(ctx, id);

		let archive = self.get_mut(id)?;
		archive.release_directory();
		archive.compressed_dir = None;
		archive.lookup_resolved = false;

		if let Some(info) = archive.stream.take() {
			let mut queues = info.queues.lock();
			if queues.archive == Some(id) {
				queues.archive = None;
			}
		}

		Ok(())
	}

	fn lookup_entry(&mut self, ctx: &Context, id: ArchiveId, name: NameCrc) -> ResResult<EntryLookup> {
		let archive = self.get(id)?;
		if archive.dir_streaming {
			return Ok(EntryLookup::Streaming);
		}

		if !archive.dir_valid {
			self.activate(ctx, id, false)?;

			let archive = self.get(id)?;
			if archive.dir_streaming {
				return Ok(EntryLookup::Streaming);
			}
			if !archive.dir_valid {
				return Ok(EntryLookup::Missing);
			}
		}

		let archive = self.get(id)?;
		Ok(match archive.entry(name) {
			Some(entry) => EntryLookup::Found(*entry),
			None => EntryLookup::Missing,
		})
	}

	/// Like [`lookup_entry`](SystemState::lookup_entry), but only a found entry is a success
	fn require_entry(&mut self, ctx: &Context, id: ArchiveId, name: NameCrc) -> ResResult<DirEntry> {
		match self.lookup_entry(ctx, id, name)? {
			EntryLookup::Found(entry) => Ok(entry),
			EntryLookup::Streaming => Err(ResError::StreamingInProgress(self.get(id)?.name.clone())),
			EntryLookup::Missing => Err(ResError::EntryNotFound(name)),
		}
	}
}

/// Owns every archive, the open-file budget, and the streaming bookkeeping.
///
/// ```
/// use std::sync::Arc;
/// use resfile::prelude::*;
///
/// let fs = MemoryFileSystem::new();
/// let system = ResourceSystem::new(ResourceConfig::default(), Arc::new(fs.clone()));
///
/// let id = system.create("shaders.res");
/// system.open(id, AccessMode::create(), None, None).unwrap();
///
/// let entry = DirEntry::new("shader/a", 5, EntryFlags::new()).unwrap();
/// system.add_entry(id, entry, Some(Arc::from(&b"hello"[..]))).unwrap();
/// system.close(id).unwrap();
///
/// system.open(id, AccessMode::read(), None, None).unwrap();
/// let data = system.read_entry(id, "shader/a").unwrap().ready().unwrap();
/// assert_eq!(&data[..], b"hello");
/// ```
pub struct ResourceSystem {
	ctx: Context,
	state: Mutex<SystemState>,
	completions: Mutex<mpsc::Receiver<StreamCompletion>>,
}

impl ResourceSystem {
	/// A system without streaming support
	pub fn new(config: ResourceConfig, fs: Arc<dyn FileSystem>) -> ResourceSystem {
		ResourceSystem::build(config, fs, None)
	}

	/// A system that can stream directories and entries through `streamer`
	pub fn with_streamer(config: ResourceConfig, fs: Arc<dyn FileSystem>, streamer: Arc<dyn StreamEngine>) -> ResourceSystem {
		ResourceSystem::build(config, fs, Some(streamer))
	}

	fn build(config: ResourceConfig, fs: Arc<dyn FileSystem>, streamer: Option<Arc<dyn StreamEngine>>) -> ResourceSystem {
		let (sender, receiver) = mpsc::channel();

		ResourceSystem {
			ctx: Context {
				config,
				fs,
				streamer,
				sink: CompletionSink::new(sender),
				streams: Mutex::new(StreamRing::new()),
				next_request: AtomicU64::new(0),
				frame: AtomicU64::new(0),
				compressed_dir_bytes: AtomicU64::new(0),
			},
			state: Mutex::new(SystemState {
				archives: HashMap::new(),
				lru: LruCache::unbounded(),
				open_count: 0,
				next_id: 0,
			}),
			completions: Mutex::new(receiver),
		}
	}

	/// The configuration this system was built with
	pub fn config(&self) -> &ResourceConfig {
		&self.ctx.config
	}

	/// The file system archives are opened through
	pub fn file_system(&self) -> &Arc<dyn FileSystem> {
		&self.ctx.fs
	}

	/// Run `op` under the archive lock, recording a failure as the archive's last error
	fn with_state<T>(&self, id: ArchiveId, op: impl FnOnce(&mut SystemState, &Context) -> ResResult<T>) -> ResResult<T> {
		let mut state = self.state.lock();
		let result = op(&mut state, &self.ctx);

		if let Err(err) = &result {
			if let Some(archive) = state.archives.get_mut(&id) {
				archive.set_error(err);
			}
		}

		result
	}

	/// Register an archive by path. Nothing touches the file system until it is opened.
	pub fn create(&self, name: impl Into<String>) -> ArchiveId {
		let mut state = self.state.lock();
		state.next_id += 1;

		let id = ArchiveId(state.next_id);
		state.archives.insert(id, ResFile::new(id, name.into()));
		id
	}

	/// Close an archive and forget it
	pub fn remove(&self, id: ArchiveId) -> ResResult<()> {
		self.with_state(id, |state, ctx| {
			state.close(ctx, id)?;
			state.archives.remove(&id);
			Ok(())
		})
	}

	/// The path an archive was created with
	pub fn name(&self, id: ArchiveId) -> ResResult<String> {
		Ok(self.state.lock().get(id)?.name.clone())
	}

	/// Open an archive.
	///
	/// Reading modes take the directory location from `lookup` when it holds a trusted record,
	/// and from the archive header otherwise. With a `stream` context, no handle is acquired and
	/// the directory is streamed in, which requires the lookup record and yields [`LoadStatus::Pending`].
	/// Creating modes write a fresh header.
	pub fn open(
		&self, id: ArchiveId, access: AccessMode, lookup: Option<SharedLookup>, stream: Option<Arc<StreamInfo>>,
	) -> ResResult<LoadStatus> {
		self.with_state(id, |state, ctx| state.open(ctx, id, access, lookup, stream))
	}

	/// Mark an archive as most recently used, re-acquiring its handle and directory if needed
	pub fn activate(&self, id: ArchiveId) -> ResResult<()> {
		self.with_state(id, |state, ctx| state.activate(ctx, id, false))
	}

	/// Flush and drop an archive's handle, keeping its directory in memory
	pub fn deactivate(&self, id: ArchiveId) -> ResResult<()> {
		self.with_state(id, |state, ctx| {
			state.get(id)?;
			state.deactivate(ctx, id);
			Ok(())
		})
	}

	/// Flush, drop the handle and the directory. Fails while streamed reads are in flight.
	pub fn close(&self, id: ArchiveId) -> ResResult<()> {
		self.with_state(id, |state, ctx| state.close(ctx, id))
	}

	/// Drop the in-memory directory, unless it is dirty or streaming. Returns whether it was dropped.
	pub fn release_directory(&self, id: ArchiveId) -> ResResult<bool> {
		self.with_state(id, |state, _| Ok(state.get_mut(id)?.release_directory()))
	}

	/// Look an entry up by name
	pub fn get_entry(&self, id: ArchiveId, name: impl Into<NameCrc>) -> ResResult<EntryLookup> {
		let name = name.into();
		self.poll_completions();
		self.with_state(id, |state, ctx| state.lookup_entry(ctx, id, name))
	}

	/// Whether the archive holds an entry of that name
	pub fn file_exists(&self, id: ArchiveId, name: impl Into<NameCrc>) -> ResResult<bool> {
		Ok(matches!(self.get_entry(id, name)?, EntryLookup::Found(_)))
	}

	/// Stored size of an entry
	pub fn entry_length(&self, id: ArchiveId, name: impl Into<NameCrc>) -> ResResult<usize> {
		let name = name.into();
		self.with_state(id, |state, ctx| Ok(state.require_entry(ctx, id, name)?.size as usize))
	}

	/// Snapshot of the in-memory directory, empty when it isn't loaded
	pub fn directory(&self, id: ArchiveId) -> ResResult<Vec<DirEntry>> {
		Ok(self.state.lock().get(id)?.dir.clone())
	}

	/// Read an entry's whole payload, decoded.
	///
	/// Synchronous archives return [`ReadOutcome::Ready`] or an error. Streamed archives answer
	/// [`ReadOutcome::Pending`] for the call that issued the read and [`ReadOutcome::InFlight`] for
	/// any repeat before it completes; once completed, the payload is returned from memory.
	pub fn read_entry(&self, id: ArchiveId, name: impl Into<NameCrc>) -> ResResult<ReadOutcome> {
		let name = name.into();
		self.poll_completions();

		self.with_state(id, |state, ctx| {
			let entry = match state.lookup_entry(ctx, id, name)? {
				EntryLookup::Found(entry) => entry,
				EntryLookup::Streaming => return Ok(ReadOutcome::Pending),
				EntryLookup::Missing => return Err(ResError::EntryNotFound(name)),
			};

			if let Some(data) = state.get_mut(id)?.take_loaded(name)? {
				return Ok(ReadOutcome::Ready(data));
			}

			state.activate(ctx, id, false)?;

			let archive = state.get_mut(id)?;
			if archive.stream.is_some() {
				return archive.request_entry(ctx, &entry);
			}

			archive.read_sync(ctx, &entry).map(ReadOutcome::Ready)
		})
	}

	/// Read the next `buffer.len()` bytes at the entry's cursor, advancing it. Returns the count read,
	/// which is short only at the end of the entry.
	pub fn read_entry_partial(&self, id: ArchiveId, name: impl Into<NameCrc>, buffer: &mut [u8]) -> ResResult<usize> {
		let name = name.into();

		self.with_state(id, |state, ctx| {
			let entry = state.require_entry(ctx, id, name)?;
			if let Some(count) = state.get_mut(id)?.read_buffered(name, buffer) {
				return Ok(count);
			}

			state.activate(ctx, id, false)?;
			state.get_mut(id)?.read_direct(&entry, buffer)
		})
	}

	/// The stored bytes of an entry without decoding them
	pub fn read_entry_compressed(&self, id: ArchiveId, name: impl Into<NameCrc>) -> ResResult<CompressedEntry> {
		let name = name.into();

		self.with_state(id, |state, ctx| {
			let entry = state.require_entry(ctx, id, name)?;
			state.activate(ctx, id, false)?;
			state.get_mut(id)?.read_compressed(&entry)
		})
	}

	/// The buffer currently held for an entry, if any
	pub fn entry_buffer(&self, id: ArchiveId, name: impl Into<NameCrc>) -> ResResult<Option<Arc<[u8]>>> {
		let name = name.into();
		self.with_state(id, |state, _| Ok(state.get(id)?.buffer(name)))
	}

	/// Rewind an entry and drop the buffer the archive read for it. Entries still waiting for a flush are kept.
	pub fn close_entry(&self, id: ArchiveId, name: impl Into<NameCrc>) -> ResResult<bool> {
		let name = name.into();

		self.with_state(id, |state, ctx| {
			let entry = state.require_entry(ctx, id, name)?;
			if !entry.is_saved() {
				return Ok(false);
			}

			Ok(state.get_mut(id)?.close_entry(name, true))
		})
	}

	/// Overwrite an uncompressed entry in place with exactly its stored size of `data`.
	/// Entries not flushed yet get their pending buffer replaced instead.
	pub fn write_entry_data(&self, id: ArchiveId, name: impl Into<NameCrc>, data: &[u8]) -> ResResult<usize> {
		let name = name.into();

		self.with_state(id, |state, ctx| {
			let entry = state.require_entry(ctx, id, name)?;
			if state.get(id)?.access.is_read_only() {
				return Err(ResError::WrongAccessMode("FileWrite"));
			}

			state.activate(ctx, id, false)?;
			state.get_mut(id)?.write_data(&entry, data)
		})
	}

	/// Move an entry's cursor and the underlying file position along with it. Returns the new cursor.
	pub fn seek_entry(&self, id: ArchiveId, name: impl Into<NameCrc>, offset: i64, origin: SeekOrigin) -> ResResult<u64> {
		let name = name.into();

		self.with_state(id, |state, ctx| {
			let entry = state.require_entry(ctx, id, name)?;
			state.activate(ctx, id, false)?;
			state.get_mut(id)?.seek_entry(&entry, offset, origin)
		})
	}

	/// Register a new entry, with its payload if it has one. Entries whose name is taken are ignored.
	/// Returns the number of entries in the directory.
	pub fn add_entry(&self, id: ArchiveId, entry: DirEntry, data: Option<Arc<[u8]>>) -> ResResult<usize> {
		self.with_state(id, |state, ctx| {
			let archive = state.get(id)?;
			if archive.access.is_read_only() || archive.access.resolve().is_err() || archive.stream.is_some() {
				return Err(ResError::WrongAccessMode("FileAdd"));
			}

			if !archive.dir_valid && entry.size != 0 {
				state.activate(ctx, id, false)?;
			}

			state.get_mut(id)?.add_entry(entry, data)
		})
	}

	/// Write every pending entry, the directory and the header. Returns the directory's size in bytes.
	/// A clean or read-only archive is left untouched.
	pub fn flush(&self, id: ArchiveId) -> ResResult<usize> {
		self.with_state(id, |state, ctx| {
			let archive = state.get(id)?;
			let dir_size = archive.dir.len() * DirEntry::SIZE;

			if archive.access.is_read_only() {
				return Ok(dir_size);
			}

			if let Some(lookup) = archive.lookup.clone() {
				if let Err(err) = lookup.write().flush(ctx.fs.as_ref()) {
					tracing::warn!("flushing lookup cache of {} failed: {err}", archive.name);
				}
			}

			if !archive.dirty {
				return Ok(dir_size);
			}

			state.activate(ctx, id, false)?;
			state.get_mut(id)?.flush(ctx)
		})
	}

	/// Advance the logical frame counter used to age streamed directories
	pub fn advance_frame(&self) -> u64 {
		self.ctx.frame.fetch_add(1, Ordering::Relaxed) + 1
	}

	/// Set the logical frame counter
	pub fn set_frame(&self, frame: u64) {
		self.ctx.frame.store(frame, Ordering::Relaxed);
	}

	/// The logical frame counter
	pub fn frame(&self) -> u64 {
		self.ctx.frame()
	}

	/// Whether any archive is tracked for streaming
	pub fn is_streaming(&self) -> bool {
		!self.ctx.streams.lock().is_empty()
	}

	/// Whether an archive holds a slot in the open-file ring
	pub fn is_active(&self, id: ArchiveId) -> ResResult<bool> {
		Ok(self.state.lock().get(id)?.active)
	}

	/// Whether an archive holds an OS handle
	pub fn has_handle(&self, id: ArchiveId) -> ResResult<bool> {
		Ok(self.state.lock().get(id)?.handle.is_some())
	}

	/// Whether an archive's directory is in memory
	pub fn is_directory_valid(&self, id: ArchiveId) -> ResResult<bool> {
		Ok(self.state.lock().get(id)?.dir_valid)
	}

	/// Whether an archive has unflushed changes
	pub fn is_dirty(&self, id: ArchiveId) -> ResResult<bool> {
		Ok(self.state.lock().get(id)?.dirty)
	}

	/// Number of archives holding an open-file slot
	pub fn open_count(&self) -> usize {
		self.state.lock().open_count
	}

	/// The message of the last failed operation on an archive
	pub fn last_error(&self, id: ArchiveId) -> ResResult<Option<String>> {
		Ok(self.state.lock().get(id)?.last_error.clone())
	}

	/// The codec an archive's payloads are encoded with
	pub fn codec(&self, id: ArchiveId) -> ResResult<Codec> {
		Ok(self.state.lock().get(id)?.codec)
	}

	/// Modification stamp of the archive file, zero for archives without a handle
	pub fn modification_time(&self, id: ArchiveId) -> ResResult<u64> {
		self.with_state(id, |state, ctx| {
			state.activate(ctx, id, false)?;
			state.get_mut(id)?.modification_time()
		})
	}

	/// Size of the archive file, zero for archives without a handle
	pub fn resource_size(&self, id: ArchiveId) -> ResResult<u64> {
		self.with_state(id, |state, _| state.get_mut(id)?.resource_size())
	}

	/// Memory held by an archive's directory, open entries and owned buffers
	pub fn memory_size(&self, id: ArchiveId) -> ResResult<usize> {
		Ok(self.state.lock().get(id)?.memory_size())
	}

	/// Compressed bytes decoded so far to restore released directories
	pub fn compressed_directory_bytes(&self) -> u64 {
		self.ctx.compressed_dir_bytes.load(Ordering::Relaxed)
	}

	/// Record the archive's directory location in its lookup manager under `crc`.
	/// `false` when the archive has no lookup manager.
	pub fn store_lookup_data(&self, id: ArchiveId, crc: u32) -> ResResult<bool> {
		self.with_state(id, |state, _| {
			let archive = state.get(id)?;
			let Some(lookup) = archive.lookup.as_ref() else {
				return Ok(false);
			};

			let mut manager = lookup.write();
			let key = manager.adjust_name(&archive.name);
			manager.add_data(key, archive.num_entries, archive.dir_offset, crc);
			manager.mark_dirty(true);

			Ok(true)
		})
	}

	/// The archive's record in its lookup manager
	pub fn lookup_data(&self, id: ArchiveId) -> ResResult<Option<LookupData>> {
		let state = self.state.lock();
		let archive = state.get(id)?;

		let Some(lookup) = archive.lookup.as_ref() else {
			return Ok(None);
		};

		let manager = lookup.read();
		let data = manager.get(manager.adjust_name(&archive.name)).copied();
		Ok(data)
	}

	/// Close every archive. Archives that fail to close stay registered, the first failure is returned.
	pub fn shutdown(&self) -> ResResult<()> {
		self.poll_completions();

		let mut state = self.state.lock();
		let mut ids: Vec<ArchiveId> = state.archives.keys().copied().collect();
		ids.sort();

		let mut first_error = None;
		for id in ids {
			if let Err(err) = state.close(&self.ctx, id) {
				tracing::warn!("closing {id} on shutdown failed: {err}");
				if let Some(archive) = state.archives.get_mut(&id) {
					archive.set_error(&err);
				}
				first_error.get_or_insert(err);
			}
		}

		match first_error {
			Some(err) => Err(err),
			None => Ok(()),
		}
	}
}

impl Drop for ResourceSystem {
	fn drop(&mut self) {
		let state = self.state.get_mut();

		for archive in state.archives.values() {
			if archive.active {
				tracing::warn!(
					"resource file still open at shutdown: {} (streaming: {})",
					archive.name,
					archive.stream.is_some()
				);
			}
		}
	}
}
