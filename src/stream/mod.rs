//! Asynchronous reads of directories and entries.
//!
//! The core never blocks on a streamed read. It hands a [`StreamRequest`] to a [`StreamEngine`],
//! which posts a [`StreamCompletion`] into a [`CompletionSink`] once the bytes are in. The
//! [`ResourceSystem`](crate::system::ResourceSystem) drains those messages under its own lock, so
//! engine threads never touch archive state directly.

use std::{
	fmt, io,
	sync::{mpsc, Arc},
};

use parking_lot::Mutex;

use crate::global::dir_entry::NameCrc;
use crate::system::ArchiveId;

mod threaded;
pub use threaded::ThreadedStreamEngine;

/// Unique id of one physical read request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub(crate) u64);

impl fmt::Display for RequestId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// What a request was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
	/// The raw directory block of the archive
	Directory,
	/// The payload of one entry
	Entry(NameCrc),
}

/// Opaque routing information, echoed back by the engine in the matching [`StreamCompletion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTag {
	pub(crate) id: RequestId,
	pub(crate) archive: ArchiveId,
	pub(crate) kind: RequestKind,
}

impl RequestTag {
	/// The request's id
	pub fn id(&self) -> RequestId {
		self.id
	}

	/// What the request reads
	pub fn kind(&self) -> RequestKind {
		self.kind
	}
}

/// "Read `size` bytes at `offset` from `path`".
#[derive(Debug, Clone)]
pub struct StreamRequest {
	/// Echo this back in the completion
	pub tag: RequestTag,
	/// The archive's path, as given to the file system
	pub path: String,
	/// Byte offset into the file
	pub offset: u64,
	/// Number of bytes to read
	pub size: usize,
}

/// Final result of one [`StreamRequest`].
#[derive(Debug)]
pub struct StreamCompletion {
	/// The tag of the request this completes
	pub tag: RequestTag,
	/// The bytes read, exactly `size` long on success
	pub result: io::Result<Vec<u8>>,
}

/// Where engines post completions. Cheap to clone, safe to move across threads.
#[derive(Debug, Clone)]
pub struct CompletionSink {
	sender: mpsc::Sender<StreamCompletion>,
}

impl CompletionSink {
	pub(crate) fn new(sender: mpsc::Sender<StreamCompletion>) -> CompletionSink {
		CompletionSink { sender }
	}

	/// Post the result of a request. Results for a system that has been dropped are discarded.
	pub fn complete(&self, tag: RequestTag, result: io::Result<Vec<u8>>) {
		if self.sender.send(StreamCompletion { tag, result }).is_err() {
			tracing::debug!("dropping completion of request {}, the resource system is gone", tag.id);
		}
	}
}

/// The asynchronous I/O subsystem.
pub trait StreamEngine: Send + Sync {
	/// Start reading. Must not call back into the resource system; post to `sink` instead.
	fn start_read(&self, request: StreamRequest, sink: CompletionSink);
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct StreamEntry {
	pub(crate) name: NameCrc,
	pub(crate) request: RequestId,
}

#[derive(Debug, Default)]
pub(crate) struct StreamQueues {
	pub(crate) archive: Option<ArchiveId>,
	pub(crate) dir_requests: usize,
	pub(crate) dir_reads: Vec<RequestId>,
	pub(crate) entries: Vec<StreamEntry>,
}

impl StreamQueues {
	/// Queue a read of `name`, `false` when one is already in flight
	pub(crate) fn add_entry(&mut self, name: NameCrc, request: RequestId) -> bool {
		if self.entries.iter().any(|e| e.name == name) {
			return false;
		}

		self.entries.push(StreamEntry { name, request });
		true
	}

	pub(crate) fn remove_entry(&mut self, request: RequestId) -> Option<StreamEntry> {
		let index = self.entries.iter().position(|e| e.request == request)?;
		Some(self.entries.remove(index))
	}
}

/// Per-archive streaming context, shared between the caller that asked for streaming and the archive.
#[derive(Debug, Default)]
pub struct StreamInfo {
	pub(crate) queues: Mutex<StreamQueues>,
}

impl StreamInfo {
	/// A fresh context, pass it to [`ResourceSystem::open`](crate::system::ResourceSystem::open)
	pub fn new() -> Arc<StreamInfo> {
		Arc::new(StreamInfo::default())
	}

	/// The archive this context is bound to
	pub fn archive(&self) -> Option<ArchiveId> {
		self.queues.lock().archive
	}

	/// Directory reads still outstanding
	pub fn pending_directory_reads(&self) -> usize {
		self.queues.lock().dir_reads.len()
	}

	/// Entry reads still outstanding
	pub fn pending_entries(&self) -> usize {
		self.queues.lock().entries.len()
	}

	/// Whether a read of `name` is in flight
	pub fn is_pending(&self, name: NameCrc) -> bool {
		self.queues.lock().entries.iter().any(|e| e.name == name)
	}
}
