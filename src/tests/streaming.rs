use std::{
	io,
	sync::{
		atomic::{AtomicUsize, Ordering},
		Arc,
	},
	thread,
	time::Duration,
};

use parking_lot::Mutex;
use rayon::prelude::*;

use super::*;

const ARCHIVE: &str = "levels/harbor/shadercache/harbor.res";

/// Queues every request until the test decides how it completes
#[derive(Default)]
struct ManualStreamEngine {
	fs: MemoryFileSystem,
	queue: Mutex<Vec<(StreamRequest, CompletionSink)>>,
	issued: AtomicUsize,
}

impl StreamEngine for ManualStreamEngine {
	fn start_read(&self, request: StreamRequest, sink: CompletionSink) {
		self.issued.fetch_add(1, Ordering::SeqCst);
		self.queue.lock().push((request, sink));
	}
}

impl ManualStreamEngine {
	fn issued(&self) -> usize {
		self.issued.load(Ordering::SeqCst)
	}

	fn queued(&self) -> usize {
		self.queue.lock().len()
	}

	fn read(&self, request: &StreamRequest) -> io::Result<Vec<u8>> {
		let file = self
			.fs
			.contents(&request.path)
			.ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, request.path.clone()))?;

		let start = request.offset as usize;
		file.get(start..start + request.size)
			.map(<[u8]>::to_vec)
			.ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))
	}

	fn complete_all(&self) -> usize {
		let jobs = std::mem::take(&mut *self.queue.lock());
		for (request, sink) in &jobs {
			sink.complete(request.tag, self.read(request));
		}
		jobs.len()
	}

	fn fail_all(&self) -> usize {
		let jobs = std::mem::take(&mut *self.queue.lock());
		for (request, sink) in &jobs {
			sink.complete(request.tag, Err(io::Error::other("simulated device error")));
		}
		jobs.len()
	}
}

struct Fixture {
	engine: Arc<ManualStreamEngine>,
	lookup: SharedLookup,
	system: ResourceSystem,
	id: ArchiveId,
	info: Arc<StreamInfo>,
}

/// Write the shader archive with a synchronous system, record it in a lookup cache, then open it
/// for streaming in a second system
fn fixture(config: ResourceConfig) -> ResResult<Fixture> {
	let fs = MemoryFileSystem::new();
	let lookup = LookupDataManager::new(LookupConfig::default()).shared();

	let writer = ResourceSystem::new(ResourceConfig::default(), Arc::new(fs.clone()));
	let written = writer.create(ARCHIVE);
	writer.open(written, AccessMode::create(), Some(lookup.clone()), None)?;
	for (name, data, flags) in shader_entries() {
		writer.add_entry(written, DirEntry::new(name, data.len(), flags)?, Some(Arc::from(data)))?;
	}
	writer.flush(written)?;
	writer.store_lookup_data(written, 1)?;
	writer.close(written)?;

	let engine = Arc::new(ManualStreamEngine {
		fs: fs.clone(),
		..Default::default()
	});

	let system = ResourceSystem::with_streamer(config, Arc::new(fs), engine.clone());
	let id = system.create(ARCHIVE);
	let info = StreamInfo::new();

	let status = system.open(id, AccessMode::read(), Some(lookup.clone()), Some(info.clone()))?;
	assert_eq!(status, LoadStatus::Pending);

	Ok(Fixture {
		engine,
		lookup,
		system,
		id,
		info,
	})
}

/// A fixture whose directory has already streamed in
fn loaded(config: ResourceConfig) -> ResResult<Fixture> {
	let fixture = fixture(config)?;
	fixture.engine.complete_all();
	assert!(fixture.system.get_entry(fixture.id, "A")?.found().is_some());
	Ok(fixture)
}

#[test]
fn directory_streams_in() -> ResResult {
	let Fixture {
		engine, system, id, info, ..
	} = fixture(ResourceConfig::default())?;

	assert_eq!(engine.issued(), 1);
	assert!(!system.has_handle(id)?);
	assert_eq!(info.archive(), Some(id));
	assert_eq!(info.pending_directory_reads(), 1);
	assert!(system.is_streaming());

	assert_eq!(system.get_entry(id, "A")?, EntryLookup::Streaming);
	assert_eq!(system.read_entry(id, "A")?, ReadOutcome::Pending);
	assert!(matches!(system.close(id), Err(ResError::StreamingInProgress(_))));
	// no duplicate directory request while the first is in flight
	assert_eq!(engine.issued(), 1);

	assert_eq!(engine.complete_all(), 1);
	assert_eq!(system.poll_completions(), 1);

	assert!(system.is_directory_valid(id)?);
	assert_eq!(info.pending_directory_reads(), 0);
	assert_eq!(system.directory(id)?.len(), 3);
	assert!(system.directory(id)?.windows(2).all(|w| w[0].name < w[1].name));

	system.close(id)?;
	Ok(())
}

#[test]
fn failed_directory_read_leaves_it_invalid() -> ResResult {
	let Fixture {
		engine, system, id, info, ..
	} = fixture(ResourceConfig::default())?;

	assert_eq!(engine.fail_all(), 1);
	assert_eq!(system.poll_completions(), 1);

	assert!(!system.is_directory_valid(id)?);
	assert_eq!(info.pending_directory_reads(), 0);
	assert!(system.last_error(id)?.is_some());
	assert!(system.directory(id)?.is_empty());

	// the next lookup simply asks again
	assert_eq!(system.get_entry(id, "B")?, EntryLookup::Streaming);
	assert_eq!(engine.issued(), 2);

	engine.complete_all();
	assert!(system.file_exists(id, "B")?);
	Ok(())
}

#[test]
fn entries_stream_in_once() -> ResResult {
	let Fixture {
		engine, system, id, info, ..
	} = loaded(ResourceConfig::default())?;

	assert_eq!(system.read_entry(id, "B")?, ReadOutcome::Pending);
	assert_eq!(system.read_entry(id, "B")?, ReadOutcome::InFlight);
	assert_eq!(engine.issued(), 2);
	assert_eq!(engine.queued(), 1);
	assert!(info.is_pending(NameCrc::new("B")));
	assert_eq!(info.pending_entries(), 1);

	assert!(matches!(system.close(id), Err(ResError::StreamingInProgress(_))));

	engine.complete_all();
	let b = system.read_entry(id, "B")?.ready().unwrap();
	assert_eq!(&b[..], payload(2, 50).as_slice());
	assert_eq!(info.pending_entries(), 0);

	let entry = system.get_entry(id, "B")?.found().unwrap();
	assert!(entry.flags.contains(EntryFlags::TEMP_DATA));

	// served from memory from now on
	assert_eq!(system.read_entry(id, "B")?.ready(), Some(b));
	assert_eq!(engine.issued(), 2);

	system.close(id)?;
	Ok(())
}

#[test]
fn concurrent_requests_issue_one_read() -> ResResult {
	let Fixture { engine, system, id, .. } = loaded(ResourceConfig::default())?;

	let outcomes = (0..32)
		.into_par_iter()
		.map(|_| system.read_entry(id, "C"))
		.collect::<ResResult<Vec<_>>>()?;

	assert_eq!(outcomes.iter().filter(|o| **o == ReadOutcome::Pending).count(), 1);
	assert_eq!(outcomes.iter().filter(|o| **o == ReadOutcome::InFlight).count(), 31);
	assert_eq!(engine.issued(), 2);

	engine.complete_all();
	assert_eq!(&system.read_entry(id, "C")?.ready().unwrap()[..], payload(3, 100).as_slice());
	Ok(())
}

#[test]
fn failed_entry_reads_are_reported_once() -> ResResult {
	let Fixture { engine, system, id, .. } = loaded(ResourceConfig::default())?;

	assert_eq!(system.read_entry(id, "A")?, ReadOutcome::Pending);
	engine.fail_all();

	assert!(matches!(system.read_entry(id, "A"), Err(ResError::StreamReadFailed(_))));
	assert!(system.last_error(id)?.is_some());

	assert_eq!(system.read_entry(id, "A")?, ReadOutcome::Pending);
	assert_eq!(engine.issued(), 3);

	engine.complete_all();
	assert_eq!(&system.read_entry(id, "A")?.ready().unwrap()[..], payload(1, 100).as_slice());
	Ok(())
}

#[test]
fn idle_directories_are_collected() -> ResResult {
	let Fixture {
		engine, system, id, info, ..
	} = loaded(ResourceConfig::default().release_after_frames(10))?;

	system.set_frame(5);
	assert_eq!(system.tick(), 0);
	assert!(system.is_directory_valid(id)?);

	// busy archives are left alone
	assert_eq!(system.read_entry(id, "A")?, ReadOutcome::Pending);
	system.set_frame(100);
	assert_eq!(system.tick(), 0);
	assert!(system.is_directory_valid(id)?);

	// last touched by the entry request at frame 5
	engine.complete_all();
	assert_eq!(system.advance_frame(), 101);
	assert_eq!(system.tick(), 1);
	assert!(!system.is_directory_valid(id)?);
	assert!(!system.is_streaming());
	assert_eq!(system.entry_buffer(id, "A")?, None);

	// touching the archive streams the directory back in
	assert_eq!(system.get_entry(id, "A")?, EntryLookup::Streaming);
	assert!(system.is_streaming());
	assert_eq!(info.pending_directory_reads(), 1);

	engine.complete_all();
	assert!(system.file_exists(id, "A")?);
	assert_eq!(system.frame(), 101);
	Ok(())
}

#[test]
fn streaming_needs_lookup_data_and_an_engine() -> ResResult {
	let Fixture { lookup, system, .. } = loaded(ResourceConfig::default())?;

	let unknown = system.create("levels/harbor/shadercache/unknown.res");
	assert!(matches!(
		system.open(unknown, AccessMode::read(), Some(lookup.clone()), Some(StreamInfo::new())),
		Err(ResError::StreamingRequiresLookupData(_))
	));
	assert!(matches!(
		system.open(unknown, AccessMode::read(), None, Some(StreamInfo::new())),
		Err(ResError::StreamingRequiresLookupData(_))
	));
	assert!(!system.is_active(unknown)?);

	let plain = ResourceSystem::new(ResourceConfig::default(), Arc::new(MemoryFileSystem::new()));
	let id = plain.create(ARCHIVE);
	assert!(matches!(
		plain.open(id, AccessMode::read(), Some(lookup), Some(StreamInfo::new())),
		Err(ResError::NoStreamEngine)
	));

	Ok(())
}

#[test]
fn streamed_archives_are_read_only() -> ResResult {
	let Fixture { system, id, .. } = loaded(ResourceConfig::default())?;

	let entry = DirEntry::new("new", 4, EntryFlags::new())?;
	assert!(matches!(
		system.add_entry(id, entry, Some(Arc::from(&b"data"[..]))),
		Err(ResError::WrongAccessMode("FileAdd"))
	));
	Ok(())
}

#[test]
fn stray_completions_are_dropped() -> ResResult {
	let Fixture { engine, system, id, .. } = loaded(ResourceConfig::default())?;
	assert_eq!(system.read_entry(id, "A")?, ReadOutcome::Pending);

	let jobs = std::mem::take(&mut *engine.queue.lock());
	assert_eq!(jobs.len(), 1);
	let (request, sink) = &jobs[0];

	// an archive nobody registered
	let mut tag = request.tag;
	tag.archive = ArchiveId(999);
	sink.complete(tag, Ok(vec![0; request.size]));

	// an archive that never streamed
	let other = system.create("other.res");
	tag.archive = other;
	sink.complete(tag, Ok(vec![0; request.size]));

	assert_eq!(system.poll_completions(), 2);
	assert_eq!(system.entry_buffer(other, "A")?, None);
	assert_eq!(system.entry_buffer(id, "A")?, None);

	// the real completion still lands
	sink.complete(request.tag, engine.read(request));
	assert_eq!(&system.read_entry(id, "A")?.ready().unwrap()[..], payload(1, 100).as_slice());
	Ok(())
}

#[test]
fn threaded_engine() -> ResResult {
	let fs = MemoryFileSystem::new();
	let lookup = LookupDataManager::new(LookupConfig::default()).shared();

	let writer = ResourceSystem::new(ResourceConfig::default(), Arc::new(fs.clone()));
	let written = writer.create(ARCHIVE);
	writer.open(written, AccessMode::create(), Some(lookup.clone()), None)?;
	for (name, data, flags) in shader_entries() {
		writer.add_entry(written, DirEntry::new(name, data.len(), flags)?, Some(Arc::from(data)))?;
	}
	writer.flush(written)?;
	writer.store_lookup_data(written, 1)?;
	writer.close(written)?;

	let engine = Arc::new(ThreadedStreamEngine::new(Arc::new(fs.clone()))?);
	let system = ResourceSystem::with_streamer(ResourceConfig::default(), Arc::new(fs), engine);

	let id = system.create(ARCHIVE);
	let info = StreamInfo::new();
	system.open(id, AccessMode::read(), Some(lookup), Some(info.clone()))?;

	let mut data = None;
	for _ in 0..2000 {
		if let Some(ready) = system.read_entry(id, "B")?.ready() {
			data = Some(ready);
			break;
		}

		thread::sleep(Duration::from_millis(1));
	}

	assert_eq!(&data.unwrap()[..], payload(2, 50).as_slice());
	assert_eq!(info.pending_entries(), 0);

	system.shutdown()?;
	Ok(())
}
