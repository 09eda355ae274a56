use std::{io, sync::Arc};

use lru::LruCache;

use super::{archive::ResFile, ArchiveId, Context, LoadStatus, ReadOutcome, ResourceSystem};
use crate::global::{
	dir_entry::{parse_directory, DirEntry, NameCrc},
	error::*,
};
use crate::stream::{RequestId, RequestKind, RequestTag, StreamCompletion, StreamInfo};

/// Archives touched by streaming, most recent first, with the frame they were last touched in
#[derive(Debug)]
pub(crate) struct StreamRing {
	ring: LruCache<ArchiveId, u64>,
}

impl StreamRing {
	pub(crate) fn new() -> StreamRing {
		StreamRing {
			ring: LruCache::unbounded(),
		}
	}

	pub(crate) fn touch(&mut self, id: ArchiveId, frame: u64) {
		self.ring.push(id, frame);
	}

	pub(crate) fn unlink(&mut self, id: ArchiveId) {
		self.ring.pop(&id);
	}

	pub(crate) fn is_empty(&self) -> bool {
		self.ring.is_empty()
	}

	/// Snapshot of `(archive, stamp)`, oldest first
	pub(crate) fn stamps_from_back(&self) -> Vec<(ArchiveId, u64)> {
		self.ring.iter().rev().map(|(&id, &stamp)| (id, stamp)).collect()
	}
}

impl Context {
	/// Stamp `id` with the current frame and move it to the head of the streaming ring
	pub(crate) fn tick_streaming(&self, id: ArchiveId) {
		let frame = self.frame();
		self.streams.lock().touch(id, frame);
	}
}

impl ResFile {
	fn stream_info(&self) -> ResResult<Arc<StreamInfo>> {
		self.stream.clone().ok_or(ResError::InvalidHandle("Stream"))
	}

	/// Issue the read of the whole directory block. Its location has to come from the lookup cache.
	pub(crate) fn request_directory(&mut self, ctx: &Context) -> ResResult<LoadStatus> {
		if !self.lookup_resolved {
			return Err(ResError::StreamingRequiresLookupData(self.name.clone()));
		}

		let info = self.stream_info()?;
		ctx.tick_streaming(self.id);

		if self.dir_streaming {
			return Ok(LoadStatus::Pending);
		}

		let size = self.num_entries as usize * DirEntry::SIZE;
		if size == 0 {
			self.install_directory(Vec::new());
			return Ok(LoadStatus::Ready);
		}

		let request = ctx.next_request_id();
		{
			let mut queues = info.queues.lock();
			queues.archive = Some(self.id);
			queues.dir_reads.push(request);
			queues.dir_requests += 1;
		}

		self.dir_valid = false;
		self.dir_streaming = true;

		let tag = RequestTag {
			id: request,
			archive: self.id,
			kind: RequestKind::Directory,
		};

		if let Err(err) = ctx.start_read(tag, &self.name, self.dir_offset as u64, size) {
			let mut queues = info.queues.lock();
			queues.dir_reads.retain(|r| *r != request);
			queues.dir_requests = queues.dir_requests.saturating_sub(1);
			self.dir_streaming = false;
			return Err(err);
		}

		Ok(LoadStatus::Pending)
	}

	/// Issue the read of one entry, unless one is in flight already
	pub(crate) fn request_entry(&mut self, ctx: &Context, entry: &DirEntry) -> ResResult<ReadOutcome> {
		let info = self.stream_info()?;
		ctx.tick_streaming(self.id);

		if !self.dir_valid {
			return Ok(ReadOutcome::Pending);
		}

		let request = ctx.next_request_id();
		if !info.queues.lock().add_entry(entry.name, request) {
			return Ok(ReadOutcome::InFlight);
		}

		let tag = RequestTag {
			id: request,
			archive: self.id,
			kind: RequestKind::Entry(entry.name),
		};

		if let Err(err) = ctx.start_read(tag, &self.name, entry.offset as u64, entry.size as usize) {
			info.queues.lock().remove_entry(request);
			return Err(err);
		}

		Ok(ReadOutcome::Pending)
	}

	pub(crate) fn apply_completion(&mut self, ctx: &Context, completion: StreamCompletion) {
		let Some(info) = self.stream.clone() else {
			tracing::debug!("{} is no longer streaming, dropping request {}", self.name, completion.tag.id);
			return;
		};

		match completion.tag.kind {
			RequestKind::Directory => self.complete_directory(&info, completion.tag.id, completion.result),
			RequestKind::Entry(name) => self.complete_entry(ctx, &info, name, completion.tag.id, completion.result),
		}
	}

	fn complete_directory(&mut self, info: &StreamInfo, request: RequestId, result: io::Result<Vec<u8>>) {
		let mut queues = info.queues.lock();

		let Some(position) = queues.dir_reads.iter().position(|r| *r == request) else {
			tracing::debug!("stale directory request {request} for {}", self.name);
			return;
		};
		queues.dir_reads.remove(position);

		let parsed = result
			.map_err(|e| ResError::DirectoryReadError(e.to_string()))
			.and_then(|bytes| parse_directory(&bytes, self.num_entries as usize, self.endian));

		match parsed {
			Ok(entries) => {
				queues.dir_requests = queues.dir_requests.saturating_sub(1);
				self.staged_dir = Some(entries);
			},
			Err(err) => {
				tracing::warn!("streaming the directory of {} failed: {err}", self.name);
				self.set_error(&err);
			},
		}

		if queues.dir_reads.is_empty() {
			let staged = self.staged_dir.take();
			if queues.dir_requests == 0 {
				if let Some(entries) = staged {
					self.install_directory(entries);
					tracing::debug!("streamed {} directory entries of {}", self.dir.len(), self.name);
				}
			}

			queues.dir_requests = 0;
			self.dir_streaming = false;
		}
	}

	fn complete_entry(
		&mut self, ctx: &Context, info: &StreamInfo, name: NameCrc, request: RequestId, result: io::Result<Vec<u8>>,
	) {
		if info.queues.lock().remove_entry(request).is_none() {
			tracing::debug!("stale entry request {request} for {}", self.name);
			return;
		}

		let decoded = match result {
			Ok(blob) => match self.entry(name).copied() {
				Some(entry) => self.decode_entry(ctx, &entry, blob),
				None => {
					tracing::warn!("streamed entry {name} is gone from the directory of {}", self.name);
					return;
				},
			},
			Err(err) => Err(ResError::ReadError(format!("FileRead - Error during streaming data: {err}"))),
		};

		match decoded {
			Ok(data) => self.store_loaded(name, data.into()),
			Err(err) => {
				tracing::warn!("streaming entry {name} of {} failed: {err}", self.name);
				self.set_error(&err);
				self.open_entries.entry(name).or_default().failed = true;
			},
		}
	}
}

impl ResourceSystem {
	/// Apply every completion posted by the stream engine so far. Returns how many were applied.
	pub fn poll_completions(&self) -> usize {
		let completions: Vec<StreamCompletion> = self.completions.lock().try_iter().collect();
		if completions.is_empty() {
			return 0;
		}

		let count = completions.len();
		let mut state = self.state.lock();

		for completion in completions {
			match state.archives.get_mut(&completion.tag.archive) {
				Some(archive) => archive.apply_completion(&self.ctx, completion),
				None => tracing::debug!(
					"dropping request {} of removed {}",
					completion.tag.id,
					completion.tag.archive
				),
			}
		}

		count
	}

	/// Release the directories of streamed archives that have been idle for longer than
	/// [`release_after_frames`](crate::system::ResourceConfig::release_after_frames).
	/// Meant to be called once per frame, from one thread. Returns how many directories were released.
	pub fn tick(&self) -> usize {
		self.poll_completions();

		let mut state = self.state.lock();
		let mut streams = self.ctx.streams.lock();
		let frame = self.ctx.frame();
		let mut released = 0;

		for (id, stamp) in streams.stamps_from_back() {
			let Some(archive) = state.archives.get_mut(&id) else {
				streams.unlink(id);
				continue;
			};

			if archive.stream.is_none() {
				streams.unlink(id);
				continue;
			}

			if archive.is_stream_busy() {
				continue;
			}

			if frame.saturating_sub(stamp) > self.ctx.config.release_after_frames {
				streams.unlink(id);
				if archive.release_directory() {
					released += 1;
				}
			}
		}

		released
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn touching_moves_to_the_front() {
		let mut ring = StreamRing::new();
		let (a, b, c) = (ArchiveId(1), ArchiveId(2), ArchiveId(3));

		ring.touch(a, 1);
		ring.touch(b, 2);
		ring.touch(c, 3);
		assert_eq!(ring.stamps_from_back(), vec![(a, 1), (b, 2), (c, 3)]);

		// a fresh stamp makes the oldest the newest
		ring.touch(a, 7);
		assert_eq!(ring.stamps_from_back(), vec![(b, 2), (c, 3), (a, 7)]);

		ring.unlink(c);
		ring.unlink(c);
		assert_eq!(ring.stamps_from_back(), vec![(b, 2), (a, 7)]);

		ring.unlink(b);
		ring.unlink(a);
		assert!(ring.is_empty());
	}
}
