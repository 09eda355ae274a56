use std::sync::Arc;

/// Who holds the in-memory payload of an open entry
#[derive(Debug, Clone, Default)]
pub(crate) enum EntryBuffer {
	/// Nothing loaded
	#[default]
	Empty,
	/// Handed in by the caller on add or write, kept until flushed
	Borrowed(Arc<[u8]>),
	/// Read (and decoded) by the archive, dropped when the entry is closed
	Owned(Arc<[u8]>),
}

impl EntryBuffer {
	pub(crate) fn data(&self) -> Option<&Arc<[u8]>> {
		match self {
			EntryBuffer::Empty => None,
			EntryBuffer::Borrowed(data) | EntryBuffer::Owned(data) => Some(data),
		}
	}

	#[inline(always)]
	pub(crate) fn is_owned(&self) -> bool {
		matches!(self, EntryBuffer::Owned(_))
	}
}

/// Cursor and buffer of an entry that has been read, seeked or written
#[derive(Debug, Clone, Default)]
pub(crate) struct OpenEntry {
	pub(crate) cursor: u64,
	pub(crate) buffer: EntryBuffer,
	/// A streamed read of this entry failed, reported once by the next read
	pub(crate) failed: bool,
}

impl OpenEntry {
	/// Rewind, and drop the buffer if the archive owns it
	pub(crate) fn close(&mut self) {
		self.cursor = 0;
		if self.buffer.is_owned() {
			self.buffer = EntryBuffer::Empty;
		}
	}

	/// Bytes held by an owned buffer
	pub(crate) fn owned_bytes(&self) -> usize {
		match &self.buffer {
			EntryBuffer::Owned(data) => data.len(),
			_ => 0,
		}
	}
}
