use std::{
	collections::HashMap,
	io::{self, Read, Seek, SeekFrom, Write},
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc,
	},
};

use parking_lot::{Mutex, RwLock};

use super::{FileHandle, FileSystem, OpenFlags, OpenMode};

#[derive(Debug, Default)]
struct MemoryFile {
	data: Vec<u8>,
	read_only: bool,
	modified: u64,
}

#[derive(Debug, Default)]
struct Counters {
	clock: AtomicU64,
	writes: AtomicU64,
	opens: AtomicU64,
}

/// A [`FileSystem`] kept entirely in memory. Cloning shares the same files.
#[derive(Debug, Default, Clone)]
pub struct MemoryFileSystem {
	files: Arc<RwLock<HashMap<String, Arc<Mutex<MemoryFile>>>>>,
	counters: Arc<Counters>,
}

impl MemoryFileSystem {
	/// An empty file system
	pub fn new() -> MemoryFileSystem {
		MemoryFileSystem::default()
	}

	fn key(path: &str) -> String {
		path.replace('\\', "/")
	}

	/// Create or replace a file
	pub fn insert(&self, path: &str, data: impl Into<Vec<u8>>) {
		let modified = self.counters.clock.fetch_add(1, Ordering::Relaxed) + 1;
		let file = MemoryFile {
			data: data.into(),
			read_only: false,
			modified,
		};

		self.files.write().insert(MemoryFileSystem::key(path), Arc::new(Mutex::new(file)));
	}

	/// Copy of a file's current contents
	pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
		let files = self.files.read();
		files.get(&MemoryFileSystem::key(path)).map(|f| f.lock().data.clone())
	}

	/// Drop a file
	pub fn remove(&self, path: &str) -> bool {
		self.files.write().remove(&MemoryFileSystem::key(path)).is_some()
	}

	/// Toggle the read-only attribute of an existing file
	pub fn set_read_only(&self, path: &str, read_only: bool) -> bool {
		match self.files.read().get(&MemoryFileSystem::key(path)) {
			Some(file) => {
				file.lock().read_only = read_only;
				true
			},
			None => false,
		}
	}

	/// Whether a file carries the read-only attribute
	pub fn is_read_only(&self, path: &str) -> bool {
		let files = self.files.read();
		files
			.get(&MemoryFileSystem::key(path))
			.map(|f| f.lock().read_only)
			.unwrap_or(false)
	}

	/// Number of `write` calls issued through any handle so far
	pub fn write_calls(&self) -> u64 {
		self.counters.writes.load(Ordering::Relaxed)
	}

	/// Number of successful opens so far
	pub fn open_calls(&self) -> u64 {
		self.counters.opens.load(Ordering::Relaxed)
	}
}

impl FileSystem for MemoryFileSystem {
	fn open(&self, path: &str, mode: OpenMode, _flags: OpenFlags) -> io::Result<Box<dyn FileHandle>> {
		let key = MemoryFileSystem::key(path);

		let file = match mode {
			OpenMode::Read | OpenMode::ReadWrite => {
				let files = self.files.read();
				let file = files
					.get(&key)
					.cloned()
					.ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{path} does not exist")))?;

				if mode == OpenMode::ReadWrite && file.lock().read_only {
					return Err(io::Error::new(io::ErrorKind::PermissionDenied, format!("{path} is read-only")));
				}

				file
			},
			OpenMode::Create => {
				let mut files = self.files.write();
				let file = files.entry(key).or_default().clone();

				{
					let mut guard = file.lock();
					if guard.read_only {
						return Err(io::Error::new(io::ErrorKind::PermissionDenied, format!("{path} is read-only")));
					}

					guard.data.clear();
					guard.modified = self.counters.clock.fetch_add(1, Ordering::Relaxed) + 1;
				}

				file
			},
		};

		self.counters.opens.fetch_add(1, Ordering::Relaxed);

		Ok(Box::new(MemoryHandle {
			file,
			counters: self.counters.clone(),
			position: 0,
			writable: mode != OpenMode::Read,
		}))
	}

	fn exists(&self, path: &str) -> bool {
		self.files.read().contains_key(&MemoryFileSystem::key(path))
	}

	fn ensure_writable(&self, path: &str) -> io::Result<()> {
		if self.set_read_only(path, false) {
			Ok(())
		} else {
			Err(io::Error::new(io::ErrorKind::NotFound, format!("{path} does not exist")))
		}
	}
}

struct MemoryHandle {
	file: Arc<Mutex<MemoryFile>>,
	counters: Arc<Counters>,
	position: u64,
	writable: bool,
}

impl Read for MemoryHandle {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		let file = self.file.lock();
		let start = (self.position as usize).min(file.data.len());
		let count = buf.len().min(file.data.len() - start);

		buf[..count].copy_from_slice(&file.data[start..start + count]);
		self.position += count as u64;
		Ok(count)
	}
}

impl Write for MemoryHandle {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		if !self.writable {
			return Err(io::Error::new(io::ErrorKind::PermissionDenied, "handle opened for reading"));
		}

		let mut file = self.file.lock();
		let start = self.position as usize;
		let end = start + buf.len();

		if file.data.len() < end {
			file.data.resize(end, 0);
		}

		file.data[start..end].copy_from_slice(buf);
		file.modified = self.counters.clock.fetch_add(1, Ordering::Relaxed) + 1;
		self.counters.writes.fetch_add(1, Ordering::Relaxed);
		self.position = end as u64;

		Ok(buf.len())
	}

	fn flush(&mut self) -> io::Result<()> {
		Ok(())
	}
}

impl Seek for MemoryHandle {
	fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
		let len = self.file.lock().data.len() as i64;

		let target = match pos {
			SeekFrom::Start(offset) => offset as i64,
			SeekFrom::Current(delta) => self.position as i64 + delta,
			SeekFrom::End(delta) => len + delta,
		};

		if target < 0 {
			return Err(io::Error::new(io::ErrorKind::InvalidInput, "seek before start of file"));
		}

		self.position = target as u64;
		Ok(self.position)
	}
}

impl FileHandle for MemoryHandle {
	fn modification_time(&self) -> io::Result<u64> {
		Ok(self.file.lock().modified)
	}
}
