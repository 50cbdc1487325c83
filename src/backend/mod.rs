//! Object storage backends.
//!
//! Snapshots, the selection slot, and rate state all live in one flat
//! key/value namespace behind [`ObjectStore`]. Keys are grouped by string
//! prefix; callers address stored objects by the `url` a backend hands back.

mod fs;
mod memory;
mod object_store;

pub use fs::FsObjectStore;
pub use memory::MemoryObjectStore;
pub use object_store::ObjectStore;
