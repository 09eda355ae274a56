pub(crate) mod codec;
pub(crate) mod dir_entry;
pub(crate) mod endian;
pub(crate) mod error;
pub(crate) mod flags;
pub(crate) mod header;
