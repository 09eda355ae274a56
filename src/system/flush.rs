use std::{
	collections::{HashMap, HashSet},
	io::{Seek, SeekFrom, Write},
};

use super::{archive::ResFile, Context};
use crate::global::{
	codec::Codec,
	dir_entry::{serialize_directory, DirEntry},
	endian::Endian,
	error::*,
	flags::EntryFlags,
	header::FileHeader,
};

impl ResFile {
	/// Write pending payloads, then the directory right behind them, then the header.
	/// Returns the size of the directory in bytes. On failure the archive stays dirty so the flush can be retried.
	pub(crate) fn flush(&mut self, ctx: &Context) -> ResResult<usize> {
		let dir_size = self.dir.len() * DirEntry::SIZE;

		if self.access.is_read_only() || !self.dirty {
			return Ok(dir_size);
		}

		if self.handle.is_none() {
			return Err(ResError::InvalidHandle("Flush"));
		}

		self.dirty = false;
		if let Err(err) = self.write_pending(ctx) {
			self.dirty = true;
			return Err(err);
		}

		Ok(dir_size)
	}

	/// Pairs of `(original, duplicate)` indices among entries sharing an offset, for every group with an unsaved member.
	///
	/// An unsaved entry flagged as a duplicate points at a saved entry of its offset when there is one. Every other
	/// unsaved entry is only ever paired with unsaved entries: the earliest added one holding a payload becomes the
	/// original, the later ones its duplicates.
	fn duplicate_pairs(&mut self) -> Vec<(usize, usize)> {
		let mut groups: HashMap<u32, Vec<usize>> = HashMap::new();
		for (index, entry) in self.dir.iter().enumerate() {
			groups.entry(entry.offset).or_default().push(index);
		}

		let mut pairs = Vec::new();
		for group in groups.values() {
			if group.len() < 2 {
				continue;
			}

			let saved = group
				.iter()
				.copied()
				.find(|&i| self.dir[i].is_saved() && !self.dir[i].is_duplicate());

			let mut unsaved = Vec::new();
			for &index in group.iter().filter(|&&i| !self.dir[i].is_saved()) {
				match saved {
					Some(original) if self.dir[index].is_duplicate() => pairs.push((original, index)),
					_ => unsaved.push(index),
				}
			}

			if unsaved.len() < 2 {
				continue;
			}

			unsaved.sort_by_key(|&i| (self.added.get(&self.dir[i].name).copied().unwrap_or(usize::MAX), i));

			let original = unsaved
				.iter()
				.copied()
				.find(|&i| !self.dir[i].is_duplicate() && self.buffer(self.dir[i].name).is_some())
				.or_else(|| unsaved.iter().copied().find(|&i| !self.dir[i].is_duplicate()))
				.unwrap_or(unsaved[0]);

			self.dir[original].flags.force_set(EntryFlags::DUPLICATE, false);
			pairs.extend(unsaved.into_iter().filter(|&i| i != original).map(|i| (original, i)));
		}

		pairs.sort_unstable();
		pairs
	}

	/// Frame a pending payload the way it is stored
	fn encode_payload(&self, entry: &DirEntry, data: &[u8]) -> ResResult<Vec<u8>> {
		let size = entry.size as usize;
		let raw = data.get(..size).ok_or_else(|| {
			ResError::WriteError(format!(
				"Flush - {} bytes of data for entry {} of {size}",
				data.len(),
				entry.name
			))
		})?;

		let blob = if !entry.flags.contains(EntryFlags::COMPRESS) {
			raw.to_vec()
		} else if !entry.flags.contains(EntryFlags::COMPRESSED) {
			self.codec.encode(raw, self.endian)?
		} else {
			// encoded by the caller, with a native order size prefix
			let mut blob = raw.to_vec();
			if self.codec == Codec::Lz4 && self.endian == Endian::Big && blob.len() >= 4 {
				blob[..4].reverse();
			}
			blob
		};

		if blob.len() > crate::MAX_ENTRY_SIZE as usize {
			return Err(ResError::EntryTooLarge(blob.len()));
		}

		Ok(blob)
	}

	fn write_pending(&mut self, ctx: &Context) -> ResResult<()> {
		let duplicates = self.duplicate_pairs();
		let duplicate_set: HashSet<usize> = duplicates.iter().map(|&(_, d)| d).collect();

		let mut seek = self.dir_offset as u64;
		let mut updates = 0usize;

		for index in 0..self.dir.len() {
			let entry = self.dir[index];
			if entry.is_saved() {
				continue;
			}

			if !duplicate_set.contains(&index) {
				let Some(data) = self.buffer(entry.name) else {
					tracing::warn!("entry {} of {} has no data to flush", entry.name, self.name);
					continue;
				};

				let blob = self.encode_payload(&entry, &data)?;
				let handle = self.handle.as_mut().ok_or(ResError::InvalidHandle("Flush"))?;

				handle
					.seek(SeekFrom::Start(seek))
					.map_err(|e| ResError::SeekError(format!("Flush - Seek error: {e}")))?;
				handle
					.write_all(&blob)
					.map_err(|e| ResError::WriteError(format!("Flush - Writing fault: {e}")))?;

				self.open_entries.remove(&entry.name);

				let stored = &mut self.dir[index];
				stored.offset = seek as u32;
				stored.size = blob.len() as u32;
				stored.flags.force_set(EntryFlags::TEMP_DATA, false);

				seek += blob.len() as u64;
				// a retry must not overwrite what is already committed
				self.dir_offset = seek as u32;
			}

			self.dir[index].flags.force_set(EntryFlags::NOT_SAVED, false);
			updates += 1;
		}

		for (original, duplicate) in duplicates {
			let source = self.dir[original];
			let target = &mut self.dir[duplicate];

			target.offset = source.offset;
			target.size = source.size;
			target.flags = source.flags.persisted();
			target.flags.force_set(EntryFlags::DUPLICATE, true);

			self.open_entries.remove(&target.name);
			updates += 1;
		}

		self.added.clear();
		if updates == 0 {
			return Ok(());
		}

		self.flush_directory(ctx, seek)?;

		let header = FileHeader::new(self.codec, self.dir.len() as u32, seek as u32);
		let endian = self.endian;
		let handle = self.handle.as_mut().ok_or(ResError::InvalidHandle("Flush"))?;

		handle
			.seek(SeekFrom::Start(0))
			.map_err(|e| ResError::SeekError(format!("Flush - Seek error: {e}")))?;
		handle
			.write_all(&header.to_bytes(endian))
			.map_err(|e| ResError::WriteError(format!("Flush - Writing fault: {e}")))?;
		handle
			.sync()
			.map_err(|e| ResError::WriteError(format!("Flush - Sync fault: {e}")))?;

		tracing::debug!(
			"flushed {updates} entries of {}, {} in the directory at {seek}",
			self.name,
			self.dir.len()
		);

		Ok(())
	}

	/// Write the directory at `offset` and publish its new location
	fn flush_directory(&mut self, ctx: &Context, offset: u64) -> ResResult<usize> {
		let bytes = serialize_directory(&self.dir, self.endian);
		let handle = self.handle.as_mut().ok_or(ResError::InvalidHandle("FlushDir"))?;

		handle
			.seek(SeekFrom::Start(offset))
			.map_err(|e| ResError::SeekError(format!("FlushDir - Seek error: {e}")))?;
		handle
			.write_all(&bytes)
			.map_err(|e| ResError::WriteError(format!("FlushDir - Writing fault: {e}")))?;

		self.dir_offset = offset as u32;
		self.num_entries = self.dir.len() as u32;
		self.compressed_dir = if ctx.config.compress_directory {
			Some(self.codec.compress_block(&bytes)?)
		} else {
			None
		};
		self.dir_valid = true;

		if let Some(lookup) = self.lookup.clone() {
			let mut manager = lookup.write();
			let key = manager.adjust_name(&self.name);

			if let Some(existing) = manager.get(key).copied() {
				manager.add_data(key, self.num_entries, self.dir_offset, existing.crc);
				manager.mark_dirty(true);
			}

			if let Err(err) = manager.flush(ctx.fs.as_ref()) {
				tracing::warn!("saving the lookup cache after flushing {} failed: {err}", self.name);
			}
		}

		Ok(bytes.len())
	}
}
