//! Reference in-memory implementations of every hook group, standing
//! in for the real CSP adapter, storage backend, usage producer, and
//! archive location that a production deployment would wire up
//! instead. Bootstrapping and the test suite use these directly; a
//! production build swaps them for real plugins behind the same
//! [`billing_adapter_core::hooks`] traits.

mod demo_csp;
mod memory_archive;
mod memory_storage;
mod sample_usage;

pub use demo_csp::DemoCsp;
pub use memory_archive::MemoryArchive;
pub use memory_storage::MemoryStorage;
pub use sample_usage::SampleUsageSource;
