#![cfg(test)]
// This is meant to mirror as closely as possible, how users should use the crate

use std::sync::Arc;
use crate::prelude::*;

mod disk;
mod format;
mod lookup;
mod streaming;

/// Deterministic, mildly compressible test payload
fn payload(seed: u8, len: usize) -> Vec<u8> {
	(0..len).map(|i| seed.wrapping_add((i % 13) as u8)).collect()
}

fn compress_flags() -> EntryFlags {
	EntryFlags::new().with(EntryFlags::COMPRESS).unwrap()
}

fn memory_system(config: ResourceConfig) -> (MemoryFileSystem, ResourceSystem) {
	let fs = MemoryFileSystem::new();
	let system = ResourceSystem::new(config, Arc::new(fs.clone()));
	(fs, system)
}

/// Create `name`, add every `(entry name, data, flags)`, flush and close it
fn write_archive(
	system: &ResourceSystem, name: &str, entries: &[(&str, Vec<u8>, EntryFlags)], access: AccessMode,
) -> ResResult<ArchiveId> {
	let id = system.create(name);
	system.open(id, access, None, None)?;

	for (entry_name, data, flags) in entries {
		let entry = DirEntry::new(*entry_name, data.len(), *flags)?;
		system.add_entry(id, entry, Some(Arc::from(data.as_slice())))?;
	}

	system.flush(id)?;
	system.close(id)?;
	Ok(id)
}

/// The three entries of a typical shader cache
fn shader_entries() -> Vec<(&'static str, Vec<u8>, EntryFlags)> {
	vec![
		("A", payload(1, 100), EntryFlags::new()),
		("B", payload(2, 50), compress_flags()),
		("C", payload(3, 100), EntryFlags::new()),
	]
}

#[test]
fn defaults() {
	let config = ResourceConfig::default();
	assert_eq!(config.max_open_files, 16);
	assert_eq!(config.max_decompressed_size, 10_000_000);
	assert_eq!(config.release_after_frames, 300);
	assert_eq!(config.codec, Codec::Lz4);
	assert!(!config.compress_directory);

	assert_eq!(ResourceConfig::default().max_open_files(0).max_open_files, 1);

	let lookup = LookupConfig::default();
	assert_eq!(lookup.user_prefix, "%USER%/");
	assert_eq!(lookup.version, CacheVersion::default());

	let _flags = EntryFlags::default();
	let _manager = LookupDataManager::new(LookupConfig::default());
	let _info = StreamInfo::new();
	format!("{:?}", config);
}
