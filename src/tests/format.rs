use super::*;
use crate::global::{
	dir_entry::{parse_directory, serialize_directory},
	header::FileHeader,
};

const CODECS: [Codec; 3] = [Codec::Lz4, Codec::Snappy, Codec::Passthrough];

#[test]
fn codec_tags() {
	for codec in CODECS {
		assert_eq!(Codec::from_tag(codec.tag()), Some(codec));
	}

	assert_eq!(Codec::Lz4.tag(), 10);
	assert_eq!(Codec::Snappy.tag(), 11);
	assert_eq!(Codec::Passthrough.tag(), 12);
	assert_eq!(Codec::from_tag(13), None);
}

#[test]
fn codecs_decode_what_they_encode() -> ResResult {
	let ceiling = ResourceConfig::default().max_decompressed_size;

	for codec in CODECS {
		for size in [0usize, 1, 100, 4096, 1 << 20] {
			let data = payload(size as u8, size);

			for endian in [Endian::Little, Endian::Big] {
				let blob = codec.encode(&data, endian)?;
				assert_eq!(codec.decoded_len(&blob, endian)?, size, "{codec} length of {size} bytes");
				assert_eq!(codec.decode(&blob, endian, ceiling)?, data, "{codec} payload of {size} bytes");
			}
		}
	}

	Ok(())
}

#[test]
fn ceiling_rejects_implausible_sizes() -> ResResult {
	let data = payload(3, 1000);

	for codec in CODECS {
		let blob = codec.encode(&data, Endian::Little)?;
		assert!(codec.decode(&blob, Endian::Little, 1001).is_ok());
		assert!(matches!(
			codec.decode(&blob, Endian::Little, 1000),
			Err(ResError::SizeCeilingExceeded { size: 1000, ceiling: 1000 })
		));
	}

	// a forged size prefix is caught before anything is allocated
	let mut forged = Codec::Lz4.encode(&data, Endian::Little)?;
	forged[..4].copy_from_slice(&u32::MAX.to_le_bytes());
	assert!(matches!(
		Codec::Lz4.decode(&forged, Endian::Little, 10_000_000),
		Err(ResError::SizeCeilingExceeded { .. })
	));

	Ok(())
}

#[test]
fn malformed_blobs() {
	assert!(matches!(
		Codec::Passthrough.decode(b">>rawbuf>>", Endian::Little, 100),
		Err(ResError::CorruptEntrySize(10))
	));
	assert!(matches!(
		Codec::Lz4.decode(&[1, 0], Endian::Little, 100),
		Err(ResError::CorruptEntrySize(2))
	));

	// the prefix promises more than the block holds
	let mut blob = Codec::Lz4.encode(&payload(1, 64), Endian::Little).unwrap();
	blob[..4].copy_from_slice(&65u32.to_le_bytes());
	assert!(matches!(
		Codec::Lz4.decode(&blob, Endian::Little, 1000),
		Err(ResError::DecodeError(_))
	));
}

#[test]
fn directory_blocks() -> ResResult {
	let directory = [
		DirEntry::new("a", 0x12_3456, EntryFlags::new().with(EntryFlags::COMPRESS)?)?.at(16),
		DirEntry::new("b", 7, EntryFlags::new().with(EntryFlags::DUPLICATE)?)?.at(16),
	];

	for endian in [Endian::Little, Endian::Big] {
		let bytes = serialize_directory(&directory, endian);
		assert_eq!(bytes.len(), 2 * DirEntry::SIZE);
		assert_eq!(parse_directory(&bytes, 2, endian)?, directory);
		assert!(matches!(
			parse_directory(&bytes, 3, endian),
			Err(ResError::DirectoryReadError(_))
		));
	}

	// size in the low 24 bits, flags in the high 8
	let bytes = serialize_directory(&directory[..1], Endian::Little);
	assert_eq!(&bytes[4..8], &[0x56, 0x34, 0x12, EntryFlags::COMPRESS]);

	// runtime bits are dropped on the way out
	let mut pending = directory[0];
	pending.flags.force_set(EntryFlags::NOT_SAVED | EntryFlags::TEMP_DATA, true);
	let parsed = parse_directory(&serialize_directory(&[pending], Endian::Little), 1, Endian::Little)?;
	assert_eq!(parsed[0].flags.bits(), EntryFlags::COMPRESS);

	Ok(())
}

#[test]
fn headers() -> ResResult {
	let header = FileHeader::new(Codec::Snappy, 3, 1024);

	for endian in [Endian::Little, Endian::Big] {
		let parsed = FileHeader::from_bytes(&header.to_bytes(endian), endian);
		assert_eq!(parsed, header);
		assert_eq!(parsed.validate()?, Codec::Snappy);
	}

	let bytes = header.to_bytes(Endian::Little);
	assert_eq!(&bytes[..4], b"CPCK");

	assert!(matches!(
		FileHeader::fresh(Codec::Lz4).validate(),
		Err(ResError::EmptyArchive)
	));

	Ok(())
}

#[test]
fn name_hashes_ignore_case_and_separators() {
	assert_eq!(NameCrc::new("Shaders\\Blur.FXB"), NameCrc::new("shaders/blur.fxb"));
	assert_ne!(NameCrc::new("shaders/blur.fxb"), NameCrc::new("shaders/blur.fx"));
	assert_eq!(NameCrc::from("ABC"), NameCrc::new("abc"));
	assert_eq!(NameCrc::new("").value(), 0);
}

#[test]
fn flag_restricted_access() {
	let mut flags = EntryFlags::new();

	for reserved in [EntryFlags::NOT_SAVED, EntryFlags::TEMP_DATA] {
		if let Err(error) = flags.set(reserved, true) {
			assert!(matches!(error, ResError::RestrictedFlagAccessError));
		} else {
			panic!("Access to restricted flags has been allowed, this should not be feasible")
		};
	}

	flags.set(EntryFlags::COMPRESS | EntryFlags::COMPRESSED, true).unwrap();
	assert_eq!(flags.bits(), EntryFlags::COMPRESS | EntryFlags::COMPRESSED);

	flags.set(EntryFlags::COMPRESSED, false).unwrap();
	assert_eq!(flags.bits(), EntryFlags::COMPRESS);
	format!("{} {:?}", flags, flags);
}

#[test]
fn access_modes() {
	assert_eq!(AccessMode::read().resolve().unwrap(), OpenMode::Read);
	assert_eq!(AccessMode::read_write().resolve().unwrap(), OpenMode::ReadWrite);
	assert_eq!(AccessMode::create().resolve().unwrap(), OpenMode::Create);
	assert_eq!(
		AccessMode::from_bits(AccessMode::CREATE | AccessMode::READ | AccessMode::WRITE)
			.resolve()
			.unwrap(),
		OpenMode::Create
	);

	assert!(matches!(
		AccessMode::from_bits(AccessMode::WRITE).resolve(),
		Err(ResError::InvalidAccessMode(_))
	));
	assert!(matches!(
		AccessMode::from_bits(0).resolve(),
		Err(ResError::InvalidAccessMode(0))
	));

	let swapped = AccessMode::read().swap_endian(true);
	assert!(swapped.swaps_endian());
	assert!(swapped.is_read_only());
	assert!(swapped.reads());
	assert!(!AccessMode::create().reads());
	assert!(AccessMode::read_write().reads());
	assert!(!AccessMode::read_write().is_read_only());

	assert_eq!(OpenMode::ReadWrite.as_str(), "r+b");
	format!("{:?}", swapped);
}
