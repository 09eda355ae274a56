use std::io;
use thiserror::Error;

use super::dir_entry::NameCrc;
use crate::system::ArchiveId;

/// Internal `Result` type alias used by `resfile`. Basically equal to: `Result<T, ResError>`
pub type ResResult<T = ()> = Result<T, ResError>;

/// All errors manifestable within `resfile` collected into a neat enum
#[derive(Debug, Error)]
pub enum ResError {
	/// a necessary cargo feature wasn't enabled for a certain action: eg trying to decode an LZ4 blob without the `compression` feature
	#[error("[ResFile::MissingFeatureError] Unable to continue with operation, the cargo feature ({0}) is missing")]
	MissingFeatureError(&'static str),
	/// thin wrapper over [io::Error](std::io::Error), captures all IO errors not covered by a more specific variant
	#[error("[ResFile::IOError] {0}")]
	IOError(#[from] io::Error),
	/// the archive was opened or created with an empty name
	#[error("[ResFile::InvalidName] No resource name")]
	InvalidName,
	/// the requested access bits don't map onto any supported open mode
	#[error("[ResFile::InvalidAccessMode] Wrong access mode: {0:#06b}")]
	InvalidAccessMode(u32),
	/// a raw seek origin outside of {start, current, end}
	#[error("[ResFile::InvalidSeekMode] Wrong seek type: {0}")]
	InvalidSeekMode(i32),
	/// the file system refused to hand out a handle for the archive
	#[error("[ResFile::OpenFailed] Can't open resource file <{name}>: {source}")]
	OpenFailed {
		/// The archive path
		name: String,
		/// The underlying cause
		source: io::Error,
	},
	/// invalid magic found in the header, the source is not a resource archive or is corrupt
	#[error("[ResFile::CorruptHeader] Wrong header magic: {0:#010x}")]
	CorruptHeader(u32),
	/// the header (or lookup cache) names a codec this build doesn't know
	#[error("[ResFile::UnsupportedVersion] Wrong version number: {0}")]
	UnsupportedVersion(i32),
	/// the header declares zero entries
	#[error("[ResFile::EmptyArchive] Empty resource file")]
	EmptyArchive,
	/// the directory block couldn't be read in full
	#[error("[ResFile::DirectoryReadError] Directory reading error: {0}")]
	DirectoryReadError(String),
	/// a compressed in-memory directory failed to decode
	#[error("[ResFile::CorruptDirectory] Compressed resource file directory corrupt: {0}")]
	CorruptDirectory(String),
	/// streamed reads need the directory location from the lookup cache
	#[error("[ResFile::StreamingRequiresLookupData] No lookup data for <{0}> while streaming")]
	StreamingRequiresLookupData(String),
	/// streaming was requested but the system has no stream engine
	#[error("[ResFile::NoStreamEngine] No stream engine attached to the resource system")]
	NoStreamEngine,
	/// an archive operation needs an OS handle that the archive doesn't hold
	#[error("[ResFile::InvalidHandle] {0} - Invalid file handle")]
	InvalidHandle(&'static str),
	/// a read from the archive handle came back short or failed
	#[error("[ResFile::ReadError] {0}")]
	ReadError(String),
	/// a write to the archive handle came back short or failed
	#[error("[ResFile::WriteError] {0}")]
	WriteError(String),
	/// repositioning the archive handle failed, or the requested position is out of range
	#[error("[ResFile::SeekError] {0}")]
	SeekError(String),
	/// the entry isn't present in the directory
	#[error("[ResFile::EntryNotFound] Wrong file id: {0}")]
	EntryNotFound(NameCrc),
	/// the operation requires a different access mode
	#[error("[ResFile::WrongAccessMode] {0} - wrong access mode")]
	WrongAccessMode(&'static str),
	/// compressed entries are only written by flushing
	#[error("[ResFile::CompressedWrite] Entry {0} is compressed and can only be written by a flush")]
	CompressedWrite(NameCrc),
	/// a payload blob failed to decode
	#[error("[ResFile::DecodeError] {0}")]
	DecodeError(String),
	/// a payload blob failed to encode
	#[error("[ResFile::EncodeError] {0}")]
	EncodeError(String),
	/// a blob claims a decoded size at or above the configured ceiling
	#[error("[ResFile::SizeCeilingExceeded] Decoded size of {size} bytes reaches the ceiling of {ceiling} bytes")]
	SizeCeilingExceeded {
		/// The claimed decoded size
		size: usize,
		/// The configured ceiling
		ceiling: usize,
	},
	/// a passthrough blob is too small to contain its markers
	#[error("[ResFile::CorruptEntrySize] Corrupt directory entry size: {0}")]
	CorruptEntrySize(usize),
	/// entry payloads are limited to a 24 bit size field
	#[error("[ResFile::EntryTooLarge] Entry size {0} doesn't fit the 24 bit size field")]
	EntryTooLarge(usize),
	/// the archive still has a directory load or entry reads in flight
	#[error("[ResFile::StreamingInProgress] Streaming task is in progress for <{0}>")]
	StreamingInProgress(String),
	/// a streamed read of this entry failed on the I/O side
	#[error("[ResFile::StreamReadFailed] Error during streaming data of entry {0}")]
	StreamReadFailed(NameCrc),
	/// attempted to set a runtime-only flag bit, [`EntryFlags::RESERVED_MASK`](crate::global::flags::EntryFlags::RESERVED_MASK)
	#[error("[ResFile::RestrictedFlagAccessError] Tried to set reserved bit(s)!")]
	RestrictedFlagAccessError,
	/// the id doesn't belong to any archive in this system
	#[error("[ResFile::UnknownArchive] No archive registered under {0}")]
	UnknownArchive(ArchiveId),
}
