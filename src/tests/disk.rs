use std::{fs, io::Write, sync::Arc};

use super::*;

#[test]
fn disk_round_trip() -> ResResult {
	let root = tempfile::tempdir()?;
	let disk = DiskFileSystem::new(root.path());
	let system = ResourceSystem::new(ResourceConfig::default().codec(Codec::Snappy), Arc::new(disk.clone()));

	let name = "shaders\\cache\\disk.res";
	let entries = shader_entries();
	let id = write_archive(&system, name, &entries, AccessMode::create())?;

	let path = disk.resolve(name);
	assert!(path.is_file());
	assert!(disk.exists(name));

	system.open(id, AccessMode::read(), None, None)?;
	assert_eq!(system.codec(id)?, Codec::Snappy);
	assert_eq!(system.resource_size(id)?, fs::metadata(&path)?.len());
	assert!(system.modification_time(id)? > 0);

	for (entry, data, _) in &entries {
		assert_eq!(&system.read_entry(id, *entry)?.ready().unwrap()[..], data.as_slice());
	}

	system.close(id)?;
	Ok(())
}

#[test]
fn disk_read_only_files() -> ResResult {
	let root = tempfile::tempdir()?;
	let disk = DiskFileSystem::new(root.path());
	let system = ResourceSystem::new(ResourceConfig::default(), Arc::new(disk.clone()));

	let id = write_archive(&system, "locked.res", &shader_entries(), AccessMode::create())?;

	let path = disk.resolve("locked.res");
	let mut permissions = fs::metadata(&path)?.permissions();
	permissions.set_readonly(true);
	fs::set_permissions(&path, permissions)?;

	// reading doesn't care
	system.open(id, AccessMode::read(), None, None)?;
	assert_eq!(system.directory(id)?.len(), 3);

	disk.ensure_writable("locked.res")?;
	assert!(!fs::metadata(&path)?.permissions().readonly());

	system.open(id, AccessMode::read_write(), None, None)?;
	system.add_entry(id, DirEntry::new("D", 3, EntryFlags::new())?, Some(Arc::from(&b"abc"[..])))?;
	system.close(id)?;

	system.open(id, AccessMode::read(), None, None)?;
	assert_eq!(&system.read_entry(id, "D")?.ready().unwrap()[..], b"abc");
	Ok(())
}

#[test]
fn missing_parent_directories_are_created() -> ResResult {
	let root = tempfile::tempdir()?;
	let disk = DiskFileSystem::new(root.path());

	let mut handle = disk.open("a/b/c.res", OpenMode::Create, OpenFlags::default())?;
	handle.write_all(b"CPCK")?;
	handle.sync()?;
	drop(handle);

	assert_eq!(fs::read(root.path().join("a/b/c.res"))?, b"CPCK");
	assert!(matches!(
		disk.ensure_writable("a/b/missing.res"),
		Err(err) if err.kind() == std::io::ErrorKind::NotFound
	));

	Ok(())
}
