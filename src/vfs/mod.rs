use std::{
	fs,
	io::{self, Read, Seek, Write},
	path::{Path, PathBuf},
	time::UNIX_EPOCH,
};

pub use crate::global::flags::OpenMode;

mod memory;
pub use memory::MemoryFileSystem;

/// Hints passed along with every open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenFlags {
	/// Bypass any packed/virtual layer and go to the real file on disk
	pub on_disk: bool,
}

/// An open file, as handed out by a [`FileSystem`].
pub trait FileHandle: Read + Write + Seek + Send {
	/// Last modification stamp of the underlying file
	fn modification_time(&self) -> io::Result<u64>;

	/// Push buffered writes down to the underlying storage
	fn sync(&mut self) -> io::Result<()> {
		self.flush()
	}
}

/// The file system archives live on. Paths are the archive names, unmodified.
pub trait FileSystem: Send + Sync {
	/// Open `path` in the given mode
	fn open(&self, path: &str, mode: OpenMode, flags: OpenFlags) -> io::Result<Box<dyn FileHandle>>;

	/// Whether a file exists at `path`
	fn exists(&self, path: &str) -> bool;

	/// Clear a read-only attribute on `path`, so it can be opened for writing
	fn ensure_writable(&self, path: &str) -> io::Result<()>;
}

/// [`FileSystem`] over `std::fs`, resolving archive names relative to a root directory.
#[derive(Debug, Clone)]
pub struct DiskFileSystem {
	root: PathBuf,
}

impl DiskFileSystem {
	/// Resolve paths relative to `root`
	pub fn new(root: impl AsRef<Path>) -> DiskFileSystem {
		DiskFileSystem {
			root: root.as_ref().to_path_buf(),
		}
	}

	/// Where an archive name lands on disk
	pub fn resolve(&self, path: &str) -> PathBuf {
		self.root.join(path.replace('\\', "/"))
	}
}

impl FileHandle for fs::File {
	fn modification_time(&self) -> io::Result<u64> {
		let modified = self.metadata()?.modified()?;
		let elapsed = modified.duration_since(UNIX_EPOCH).map_err(io::Error::other)?;

		Ok(elapsed.as_secs())
	}

	fn sync(&mut self) -> io::Result<()> {
		self.flush()?;
		self.sync_data()
	}
}

impl FileSystem for DiskFileSystem {
	fn open(&self, path: &str, mode: OpenMode, _flags: OpenFlags) -> io::Result<Box<dyn FileHandle>> {
		let path = self.resolve(path);
		let mut options = fs::OpenOptions::new();

		match mode {
			OpenMode::Read => options.read(true),
			OpenMode::ReadWrite => options.read(true).write(true),
			OpenMode::Create => {
				if let Some(parent) = path.parent() {
					fs::create_dir_all(parent)?;
				}

				options.read(true).write(true).create(true).truncate(true)
			},
		};

		Ok(Box::new(options.open(path)?))
	}

	fn exists(&self, path: &str) -> bool {
		self.resolve(path).is_file()
	}

	#[allow(clippy::permissions_set_readonly_false)]
	fn ensure_writable(&self, path: &str) -> io::Result<()> {
		let path = self.resolve(path);
		let mut permissions = fs::metadata(&path)?.permissions();

		if permissions.readonly() {
			tracing::debug!("clearing read-only attribute of {}", path.display());
			permissions.set_readonly(false);
			fs::set_permissions(&path, permissions)?;
		}

		Ok(())
	}
}
