//! Storage layer for mdhist
//!
//! This crate provides:
//! - The IO capability the history core writes through
//! - File system and in-memory implementations of it
//! - Per-file snapshot indexes
//! - Snapshot blob storage

pub mod blob;
pub mod error;
pub mod fs;
pub mod index;
pub mod io;
pub mod memory;

pub use blob::BlobStore;
pub use error::{Result, StorageError};
pub use fs::FsIo;
pub use index::{IndexFile, IndexStore, parse_index, serialize_index};
pub use io::{DirEntry, EntryKind, HistoryIo};
pub use memory::MemoryIo;
