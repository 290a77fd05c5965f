use fnv::FnvHasher;
use murmur3::murmur3_x64_128;
use std::hash::Hasher;
use std::io::Cursor;

/// A type alias for the hash function used in the Bloom filter.
///
/// This function expands an input item into multiple 64-bit hash values.
/// The filter engine reduces each value modulo its bit count to obtain
/// bit indices, so implementations return raw hashes, not indices.
///
/// **Parameters:**
///
/// - `item: &[u8]`
///   - A byte slice representing the item to be hashed.
/// - `num_hashes: usize`
///   - The number of hash values to compute for the item.
///
/// **Returns:**
///
/// - `Vec<u64>`
///   - An ordered vector of `num_hashes` hash values.
///
/// **Usage:**
///
/// A substitute hash function is injected through
/// [`BloomConfig`](crate::BloomConfig) or the load constructors. The
/// engine does not validate that a substitute is well distributed; it
/// does compare the hash stream of a fixed probe value before any set
/// operation between two filters, so filters built with different hash
/// functions never merge silently.
pub type HashFunction = fn(&[u8], usize) -> Vec<u64>;

const FNV_64_OFFSET_BASIS: u64 = 14695981039346656073;
const FNV_64_PRIME: u64 = 1099511628211;

/// 64-bit FNV-1a over a byte slice.
pub fn fnv_1a_64(key: &[u8]) -> u64 {
    let mut hasher = FnvHasher::with_key(FNV_64_OFFSET_BASIS);
    hasher.write(key);
    hasher.finish()
}

/// The default hash expansion: iterated 64-bit FNV-1a.
///
/// The first value hashes the raw key bytes. Every following value
/// hashes the lowercase hexadecimal text of the previous value, not its
/// raw bytes. Filters persisted by other implementations of this format
/// depend on that exact stream, so the asymmetry must stay.
pub fn default_hash_function(item: &[u8], num_hashes: usize) -> Vec<u64> {
    let mut hashes = Vec::with_capacity(num_hashes);
    let mut value = 0u64;
    for depth in 0..num_hashes {
        value = if depth == 0 {
            fnv_1a_64(item)
        } else {
            fnv_1a_64(format!("{value:x}").as_bytes())
        };
        hashes.push(value);
    }
    hashes
}

/// Alternate expansion built on 128-bit Murmur3 double hashing.
///
/// Faster than the iterated default on long keys, but produces a
/// different stream: filters using it are not compatible with filters
/// built on [`default_hash_function`], and the compatibility probe will
/// reject mixing them.
pub fn murmur_hash_function(item: &[u8], num_hashes: usize) -> Vec<u64> {
    let digest = murmur3_x64_128(&mut Cursor::new(item), 0)
        .expect("Failed to compute Murmur3 hash");
    let h1 = digest as u64;
    let h2 = (digest >> 64) as u64;
    (0..num_hashes as u64)
        .map(|i| h1.wrapping_add(i.wrapping_mul(h2)))
        .collect()
}

// ln(2)^2, written out as the literal every implementation of this
// format sizes with; recomputing it drifts in the last bits.
const LN2_SQUARED: f64 = 0.4804530139182;

pub fn optimal_num_bits(estimated_elements: u64, false_positive_rate: f64) -> u64 {
    ((-(estimated_elements as f64) * false_positive_rate.ln()) / LN2_SQUARED)
        .ceil() as u64
}

pub fn optimal_num_hashes(estimated_elements: u64, num_bits: u64) -> usize {
    (std::f64::consts::LN_2 * num_bits as f64 / estimated_elements as f64)
        .round() as usize
}
