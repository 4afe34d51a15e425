//! Access store boundary implementations.
//!
//! The engine's [`opshub_access::AccessStore`] trait makes no storage
//! assumptions; this module provides concrete backends. Currently in-memory
//! only (tests, dev, and desktop-embedded deployments).

pub mod in_memory;

pub use in_memory::InMemoryAccessStore;
