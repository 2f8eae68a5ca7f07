//! Key allocation module
//!
//! Unique, human-readable entity keys backed by a persisted counter.

mod allocator;
mod error;
mod store;

pub use allocator::{format_key, parse_key, KeyAllocator, KeyPrefix, DEFAULT_COUNTER};
pub use error::AllocationError;
pub use store::CounterStore;
