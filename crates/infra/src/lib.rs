//! Infrastructure layer: access store implementations.

pub mod access_store;


pub use access_store::InMemoryAccessStore;
