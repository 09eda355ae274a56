use std::sync::Arc;

use super::*;

const CACHE: &str = "shaders/lookupdata.bin";

fn manager() -> LookupDataManager {
	LookupDataManager::new(LookupConfig::default())
}

#[test]
fn adjusted_names() {
	let manager = manager();

	assert_eq!(manager.adjust_path("%USER%/Shaders/Cache/a.res"), "Shaders/Cache/a.res");
	assert_eq!(manager.adjust_path("%user%/shaders/a.res"), "shaders/a.res");
	assert_eq!(manager.adjust_path("Engine/Shaders/b.res"), "Shaders/b.res");
	assert_eq!(
		manager.adjust_path("game/Levels/Ocean/ShaderCache/c.res"),
		"ShaderCache/c.res"
	);
	assert_eq!(manager.adjust_path("game\\shaders\\d.res"), "game/shaders/d.res");

	// stores and queries meet regardless of where the name came from
	assert_eq!(
		manager.adjust_name("%USER%/Shaders/a.res"),
		manager.adjust_name("engine\\shaders\\A.RES")
	);

	let custom = LookupDataManager::new(LookupConfig::default().user_prefix("user/").engine_root("root/"));
	assert_eq!(custom.adjust_path("user/x.res"), "x.res");
	assert_eq!(custom.adjust_path("%USER%/x.res"), "%USER%/x.res");
}

#[test]
fn records_and_families() {
	let mut manager = manager();
	let name = manager.adjust_name("shaders/a.res");

	assert!(manager.is_empty());
	manager.add_data(name, 12, 4096, 0xC0FFEE);
	assert!(manager.is_dirty());

	let record = *manager.get(name).unwrap();
	assert_eq!(record.num_entries_unique, 12);
	assert_eq!(record.dir_offset, 4096);
	assert!(record.matches(CacheVersion::default()));
	assert_eq!(manager.trusted(name), Some(record));

	// same record again changes nothing
	manager.mark_dirty(false);
	manager.add_data(name, 12, 4096, 0xC0FFEE);
	assert!(!manager.is_dirty());

	manager.add_data(NameCrc::new("b"), 1, 16, 0xC0FFEE);
	manager.add_data(NameCrc::new("c"), 1, 16, 0xBEEF);
	assert_eq!(manager.len(), 3);

	assert_eq!(manager.remove_data(0xC0FFEE), 2);
	assert_eq!(manager.remove_data(0xC0FFEE), 0);
	assert_eq!(manager.records().map(|(name, _)| name).collect::<Vec<_>>(), vec![NameCrc::new("c")]);

	manager.add_family(NameCrc::new("illum"), 77);
	assert_eq!(manager.family(NameCrc::new("illum")), Some(FamilyData { crc: 77 }));
	assert_eq!(manager.family(NameCrc::new("water")), None);
}

#[test]
fn save_then_load() -> ResResult {
	let fs = MemoryFileSystem::new();

	for swap in [false, true] {
		let mut writer = manager();
		writer.add_data(NameCrc::new("a"), 3, 900, 1);
		writer.add_data(NameCrc::new("b"), 5, 1200, 2);
		writer.add_family(NameCrc::new("f"), 3);

		assert!(writer.save(&fs, CACHE, swap)?);
		assert!(!writer.save(&fs, CACHE, swap)?);

		let mut reader = manager();
		assert!(reader.load(&fs, CACHE, swap, true)?);
		assert_eq!(reader.len(), 2);
		assert_eq!(reader.get(NameCrc::new("b")), writer.get(NameCrc::new("b")));
		assert_eq!(reader.family(NameCrc::new("f")), Some(FamilyData { crc: 3 }));
		assert!(reader.is_read_only());
		assert!(!reader.is_dirty());

		// the other byte order doesn't even find the magic
		let mut mismatched = manager();
		assert!(!mismatched.load(&fs, CACHE, !swap, false)?);
		assert!(mismatched.is_empty());
	}

	Ok(())
}

#[test]
fn unusable_caches_start_empty() -> ResResult {
	let fs = MemoryFileSystem::new();

	let mut missing = manager();
	assert!(!missing.load(&fs, CACHE, false, false)?);

	let mut writer = manager();
	writer.add_data(NameCrc::new("a"), 3, 900, 1);
	writer.save(&fs, CACHE, false)?;

	let mut newer = LookupDataManager::new(LookupConfig::default().version(2, 0));
	assert!(!newer.load(&fs, CACHE, false, false)?);
	assert!(newer.is_empty());

	let mut other_codec = LookupDataManager::new(LookupConfig::default().codec(Codec::Snappy));
	assert!(!other_codec.load(&fs, CACHE, false, false)?);

	let mut bytes = fs.contents(CACHE).unwrap();
	bytes.truncate(bytes.len() - 3);
	fs.insert(CACHE, bytes);

	let mut truncated = manager();
	assert!(!truncated.load(&fs, CACHE, false, false)?);
	assert!(truncated.is_empty());

	// a discarded cache is rewritten on the next flush
	truncated.add_data(NameCrc::new("z"), 1, 16, 9);
	assert!(truncated.flush(&fs)?);

	let mut reloaded = manager();
	assert!(reloaded.load(&fs, CACHE, false, false)?);
	assert_eq!(reloaded.len(), 1);

	Ok(())
}

#[test]
fn read_only_managers_never_write() -> ResResult {
	let fs = MemoryFileSystem::new();
	let mut manager = manager();

	manager.load(&fs, CACHE, false, true)?;
	manager.add_data(NameCrc::new("a"), 1, 16, 0);
	assert!(!manager.flush(&fs)?);
	assert!(fs.contents(CACHE).is_none());

	manager.set_read_only(false);
	assert!(manager.flush(&fs)?);
	assert!(fs.contents(CACHE).is_some());

	Ok(())
}

#[test]
fn lookup_records_skip_the_header() -> ResResult {
	let (fs, system) = memory_system(ResourceConfig::default());
	let lookup = manager().shared();
	lookup.write().load(&fs, CACHE, false, false)?;

	let name = "%USER%/shaders/cache.res";
	let id = system.create(name);
	system.open(id, AccessMode::create(), Some(lookup.clone()), None)?;
	for (entry, data, flags) in shader_entries() {
		system.add_entry(id, DirEntry::new(entry, data.len(), flags)?, Some(Arc::from(data)))?;
	}
	system.flush(id)?;

	assert_eq!(system.lookup_data(id)?, None);
	assert!(system.store_lookup_data(id, 0xABCD)?);

	let record = system.lookup_data(id)?.unwrap();
	assert_eq!(record.num_entries_unique, 3);
	assert_eq!(record.crc, 0xABCD);

	// the next flush writes the cache and moves the record along with the directory
	system.add_entry(id, DirEntry::new("D", 20, EntryFlags::new())?, Some(Arc::from(payload(8, 20))))?;
	system.flush(id)?;
	system.close(id)?;

	let bytes = fs.contents(name).unwrap();
	let dir_offset = u32::from_le_bytes(bytes[12..16].try_into().unwrap());

	let record = system.lookup_data(id)?.unwrap();
	assert_eq!(record.num_entries_unique, 4);
	assert_eq!(record.dir_offset, dir_offset);
	assert!(!lookup.read().is_dirty());

	let mut reloaded = manager();
	assert!(reloaded.load(&fs, CACHE, false, true)?);
	assert_eq!(reloaded.get(reloaded.adjust_name(name)), Some(&record));

	// with a trusted record the header is never looked at
	let mut broken = bytes;
	broken[..4].copy_from_slice(&[0; 4]);
	fs.insert(name, broken);

	system.open(id, AccessMode::read(), Some(lookup.clone()), None)?;
	assert_eq!(&system.read_entry(id, "D")?.ready().unwrap()[..], payload(8, 20).as_slice());
	system.close(id)?;

	assert!(matches!(
		system.open(id, AccessMode::read(), None, None),
		Err(ResError::CorruptHeader(0))
	));

	Ok(())
}
