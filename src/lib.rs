//! Bloom filter with set algebra and two persistence modes.
//!
//! The filter answers "possibly present" or "definitely absent" for set
//! membership. Its geometry, the bit count and the number of hash
//! rounds, is derived from the expected element count and the target
//! false positive rate. The derivation is reproduced bit-for-bit when a
//! persisted filter is loaded, so files written by other
//! implementations of the same format stay readable, and vice versa.
//!
//! Two variants share one engine:
//!     * [`BloomFilter`] keeps its bit array in process memory and can
//!       be exported to and imported from a flat binary or a hex text
//!       encoding.
//!     * [`BloomFilterOnDisk`] maps the backing file directly; every
//!       insertion is flushed through the mapping and the file handle
//!       before `add` returns, so the file is always current. Useful
//!       when the filter is larger than the RAM you want to spend.
//!
//! Both variants support union, intersection and Jaccard similarity
//! against any compatible filter. Compatibility means identical
//! geometry and an identical hash stream over a fixed probe value, so
//! filters built with different hash functions never merge silently.
//!
//! ```no_run
//! use durable_bloom_rs::{BloomConfigBuilder, BloomFilter};
//!
//! let config = BloomConfigBuilder::default()
//!     .estimated_elements(10_000)
//!     .false_positive_rate(0.01)
//!     .build()
//!     .unwrap();
//! let mut filter = BloomFilter::new(config).unwrap();
//! filter.add(b"google").unwrap();
//! assert!(filter.check(b"google").unwrap());
//! ```

mod codec;
pub mod common;
mod config;
mod error;
mod filter;
mod hash;
mod storage;

pub use codec::TRAILER_LEN;
pub use config::{
    BloomConfig, BloomConfigBuilder, BloomConfigBuilderError, FilterParams,
};
pub use error::{BloomError, Result};
pub use filter::{BloomFilter, BloomFilterOnDisk, Filter, FilterStats};
pub use hash::{
    HashFunction, default_hash_function, fnv_1a_64, murmur_hash_function,
    optimal_num_bits, optimal_num_hashes,
};
pub use storage::{BitStore, MemoryBits, MmapBits};
