#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(clippy::or_fun_call)]
#![allow(clippy::manual_map)]

/*!
A resource archive container, and the runtime that keeps many of them open at once.

An archive is a 16 byte header, the entry payloads, and a directory of 12 byte records sorted by the
CRC-32 of each entry's name. Payloads can be compressed with one of three codecs, entries sharing a
payload are written once, and archives can be rewritten in place as entries are added.

A [`ResourceSystem`](system::ResourceSystem) owns the archives. It bounds the number of OS handles held
with a least-recently-used ring, streams directories and entries through a pluggable
[`StreamEngine`](stream::StreamEngine), and releases the directories of idle streamed archives. A
[`LookupDataManager`](lookup::LookupDataManager) caches where each archive keeps its directory, so
streamed archives never need to read their header.

### 🔫 Cargo Features
- `compression`: Pulls `lz4_flex` and `snap` as dependencies and enables the `Lz4` and `Snappy` codecs.
- `default`: Enables the `compression` feature.

### 🀄 Show me some code _dang it!_

```
use std::sync::Arc;
use resfile::prelude::*;

let fs = MemoryFileSystem::new();
let system = ResourceSystem::new(ResourceConfig::default(), Arc::new(fs.clone()));

let id = system.create("shaders.res");
system.open(id, AccessMode::create(), None, None).unwrap();

let flags = EntryFlags::new().with(EntryFlags::COMPRESS).unwrap();
let entry = DirEntry::new("shader/blur", 9, flags).unwrap();
system.add_entry(id, entry, Some(Arc::from(&b"blur pass"[..]))).unwrap();
system.close(id).unwrap();

// roundtrip
system.open(id, AccessMode::read(), None, None).unwrap();
let data = system.read_entry(id, "shader/blur").unwrap().ready().unwrap();
assert_eq!(&data[..], b"blur pass");
```
*/

/// All tests are included in this module.
mod tests;

pub(crate) mod global;

/// Per-archive directory location cache, and its on-disk format
pub mod lookup;

/// Asynchronous read requests and the engines that serve them
pub mod stream;

/// The archive manager: [`ResourceSystem`](system::ResourceSystem) and its configuration
pub mod system;

/// File systems archives are opened through
pub mod vfs;

/// Magic number of an archive header, `"CPCK"` read as a little-endian `u32`
pub const MAGIC: u32 = 0x4B43_5043;

/// Size of the archive header: magic, codec tag, entry count, directory offset
pub const HEADER_SIZE: usize = 16;

/// Size of one directory record: name crc, size with flags, offset
pub const DIR_ENTRY_SIZE: usize = 12;

/// Largest payload a directory record can describe, its size field is 24 bits wide
pub const MAX_ENTRY_SIZE: u32 = 0x00FF_FFFF;

/// Offsets handed to entries added without one start here, well past any real payload
pub const SYNTHETIC_OFFSET_BASE: u32 = 0x1000_0000;

/// Magic number of a lookup cache file, `"CFRL"` read as a little-endian `u32`
pub const LOOKUP_MAGIC: u32 = 0x4C52_4643;

/// The archive format: directory records, flags, codecs and errors
pub mod format {
	pub use crate::global::{
		codec::Codec,
		dir_entry::{DirEntry, NameCrc},
		endian::Endian,
		error::*,
		flags::{AccessMode, EntryFlags, OpenMode},
	};
}

/// Consolidated crate imports.
pub mod prelude {
	pub use crate::format::*;

	pub use crate::lookup::{CacheVersion, FamilyData, LookupConfig, LookupData, LookupDataManager, SharedLookup};

	pub use crate::stream::{
		CompletionSink, RequestId, RequestKind, RequestTag, StreamCompletion, StreamEngine, StreamInfo, StreamRequest,
		ThreadedStreamEngine,
	};

	pub use crate::system::{
		ArchiveId, CompressedEntry, EntryLookup, LoadStatus, ReadOutcome, ResourceConfig, ResourceSystem, SeekOrigin,
	};

	pub use crate::vfs::{DiskFileSystem, FileHandle, FileSystem, MemoryFileSystem, OpenFlags};
}
