use crate::codec;
use crate::common::bytes2hr;
use crate::config::{BloomConfig, FilterParams};
use crate::error::{BloomError, Result};
use crate::hash::{HashFunction, default_hash_function};
use crate::storage::{BitStore, MemoryBits, MmapBits};
use std::fmt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::info;

/// Bloom filter engine, generic over its bit-array backend.
///
/// The geometry in `params` is immutable for the life of the filter;
/// only the element counter and the bits themselves change. The hash
/// function is a capability handed in at construction, there is no
/// global registry.
pub struct Filter<S> {
    params: FilterParams,
    elements_added: u64,
    hash_function: HashFunction,
    store: S,
}

/// Filter holding its bit array in process memory.
pub type BloomFilter = Filter<MemoryBits>;

/// Filter whose bit array is a mapped window onto its backing file.
/// Every insertion is durable before `add` returns.
pub type BloomFilterOnDisk = Filter<MmapBits>;

impl<S: BitStore> Filter<S> {
    pub fn number_bits(&self) -> u64 {
        self.params.num_bits
    }

    pub fn number_hashes(&self) -> usize {
        self.params.num_hashes
    }

    pub fn estimated_elements(&self) -> u64 {
        self.params.estimated_elements
    }

    /// Elements inserted so far. For merged filters this is an
    /// estimate, see [`union`](Self::union).
    pub fn elements_added(&self) -> u64 {
        self.elements_added
    }

    /// The target rate the filter was sized for, in the single
    /// precision it is persisted with.
    pub fn false_positive_rate(&self) -> f32 {
        self.params.false_positive_rate
    }

    pub fn params(&self) -> &FilterParams {
        &self.params
    }

    /// Expands `key` into this filter's hash stream. The same stream
    /// can be reused with [`add_hashes`](Self::add_hashes) and
    /// [`check_hashes`](Self::check_hashes) across compatible filters
    /// to avoid rehashing.
    pub fn hashes(&self, key: &[u8]) -> Vec<u64> {
        (self.hash_function)(key, self.params.num_hashes)
    }

    pub fn add(&mut self, key: &[u8]) -> Result<()> {
        let hashes = self.hashes(key);
        self.add_hashes(&hashes)
    }

    pub fn add_hashes(&mut self, hashes: &[u64]) -> Result<()> {
        self.ensure_enough_hashes(hashes)?;
        for &hash in &hashes[..self.params.num_hashes] {
            self.store.set_bit(hash % self.params.num_bits)?;
        }
        self.elements_added += 1;
        self.store.record_elements_added(self.elements_added)
    }

    /// True if the key is possibly present, false if it is definitely
    /// absent. A true result can be a false positive; a false result is
    /// never wrong.
    pub fn check(&self, key: &[u8]) -> Result<bool> {
        let hashes = self.hashes(key);
        self.check_hashes(&hashes)
    }

    pub fn check_hashes(&self, hashes: &[u64]) -> Result<bool> {
        self.ensure_enough_hashes(hashes)?;
        for &hash in &hashes[..self.params.num_hashes] {
            if !self.store.get_bit(hash % self.params.num_bits)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn ensure_enough_hashes(&self, hashes: &[u64]) -> Result<()> {
        if hashes.len() < self.params.num_hashes {
            return Err(BloomError::InvalidParameter(format!(
                "expected {} hashes, got {}",
                self.params.num_hashes,
                hashes.len()
            )));
        }
        Ok(())
    }

    /// Zeroes the bit array and resets the element counter.
    pub fn clear(&mut self) -> Result<()> {
        self.store.clear()?;
        self.elements_added = 0;
        self.store.record_elements_added(0)
    }

    pub fn count_set_bits(&self) -> Result<u64> {
        self.store.count_set_bits()
    }

    /// Estimates how many distinct elements the bit population
    /// represents. Returns `u64::MAX` once every bit is set; the
    /// estimate is undefined at full saturation.
    pub fn estimate_elements(&self) -> Result<u64> {
        let set_bits = self.store.count_set_bits()?;
        if set_bits >= self.params.num_bits {
            return Ok(u64::MAX);
        }
        let m = self.params.num_bits as f64;
        let k = self.params.num_hashes as f64;
        let log_n = (1.0 - set_bits as f64 / m).ln();
        Ok((-(m / k) * log_n).round() as u64)
    }

    /// The rate implied by the elements added so far, as opposed to the
    /// rate the filter was sized for.
    pub fn current_false_positive_rate(&self) -> f64 {
        let k = self.params.num_hashes as f64;
        let exponent =
            -k * self.elements_added as f64 / self.params.num_bits as f64;
        (1.0 - exponent.exp()).powf(k)
    }

    /// Whether set operations between the two filters are meaningful:
    /// same hash count, same bit count, and the same expansion of a
    /// fixed probe key. The probe guards against two filters whose
    /// sizes agree but whose hash functions differ.
    pub fn compatible_with<T: BitStore>(&self, other: &Filter<T>) -> bool {
        self.params.num_hashes == other.params.num_hashes
            && self.params.num_bits == other.params.num_bits
            && (self.hash_function)(b"test", self.params.num_hashes)
                == (other.hash_function)(b"test", other.params.num_hashes)
    }

    fn ensure_compatible<T: BitStore>(&self, other: &Filter<T>) -> Result<()> {
        if self.compatible_with(other) {
            return Ok(());
        }
        Err(BloomError::IncompatibleFilters(format!(
            "{} bits / {} hashes vs {} bits / {} hashes, or differing hash functions",
            self.params.num_bits,
            self.params.num_hashes,
            other.params.num_bits,
            other.params.num_hashes
        )))
    }

    /// Returns a new in-memory filter containing the union of the two
    /// bit arrays. The result's element counter is set to its own
    /// population estimate, which approximates but does not equal the
    /// exact union cardinality.
    pub fn union<T: BitStore>(&self, other: &Filter<T>) -> Result<BloomFilter> {
        self.ensure_compatible(other)?;
        let (a, b) = (self.store.bytes()?, other.store.bytes()?);
        let merged = a.iter().zip(b).map(|(x, y)| x | y).collect();
        self.merged_result(merged)
    }

    /// Returns a new in-memory filter containing the intersection of
    /// the two bit arrays. The element counter is an estimate, as with
    /// [`union`](Self::union).
    pub fn intersection<T: BitStore>(
        &self,
        other: &Filter<T>,
    ) -> Result<BloomFilter> {
        self.ensure_compatible(other)?;
        let (a, b) = (self.store.bytes()?, other.store.bytes()?);
        let merged = a.iter().zip(b).map(|(x, y)| x & y).collect();
        self.merged_result(merged)
    }

    fn merged_result(&self, bytes: Vec<u8>) -> Result<BloomFilter> {
        let mut result = Filter {
            params: self.params,
            elements_added: 0,
            hash_function: self.hash_function,
            store: MemoryBits::from_bytes(bytes),
        };
        result.elements_added = result.estimate_elements()?;
        Ok(result)
    }

    /// Jaccard similarity of the two filters, approximated from the
    /// population counts of the bitwise AND and OR of their arrays.
    /// Two entirely empty filters score 1.0.
    pub fn jaccard_index<T: BitStore>(&self, other: &Filter<T>) -> Result<f64> {
        self.ensure_compatible(other)?;
        let (a, b) = (self.store.bytes()?, other.store.bytes()?);
        let mut count_union = 0u64;
        let mut count_intersection = 0u64;
        for (x, y) in a.iter().zip(b) {
            count_union += u64::from((x | y).count_ones());
            count_intersection += u64::from((x & y).count_ones());
        }
        if count_union == 0 {
            return Ok(1.0);
        }
        Ok(count_intersection as f64 / count_union as f64)
    }

    /// Serialized size in bytes: the bit array plus the trailer.
    pub fn export_size(&self) -> usize {
        self.params.byte_length() + codec::TRAILER_LEN
    }

    pub fn export_to<W: Write>(&self, sink: &mut W) -> Result<()> {
        codec::encode(
            sink,
            self.store.bytes()?,
            self.params.estimated_elements,
            self.elements_added,
            self.params.false_positive_rate,
        )
    }

    pub fn export_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        // Exporting an on-disk filter onto its own backing file would
        // truncate the bytes under the live mapping; they are already
        // current there, so this is a no-op.
        if let Some(own) = self.store.path() {
            if own == path.as_ref() {
                return Ok(());
            }
        }
        let mut file = File::create(path)?;
        self.export_to(&mut file)
    }

    pub fn export_hex(&self) -> Result<String> {
        Ok(codec::encode_hex(
            self.store.bytes()?,
            self.params.estimated_elements,
            self.elements_added,
            self.params.false_positive_rate,
        ))
    }

    /// Point-in-time snapshot of geometry and usage.
    pub fn stats(&self) -> Result<FilterStats> {
        Ok(FilterStats {
            number_bits: self.params.num_bits,
            estimated_elements: self.params.estimated_elements,
            number_hashes: self.params.num_hashes,
            false_positive_rate: self.params.false_positive_rate,
            bloom_length: self.params.byte_length(),
            elements_added: self.elements_added,
            estimated_elements_added: self.estimate_elements()?,
            current_false_positive_rate: self.current_false_positive_rate(),
            export_size: self.export_size(),
            bits_set: self.count_set_bits()?,
            on_disk: self.store.is_on_disk(),
        })
    }
}

impl BloomFilter {
    pub fn new(config: BloomConfig) -> Result<Self> {
        config.validate()?;
        let params = FilterParams::derive(
            config.estimated_elements,
            config.false_positive_rate,
        )?;
        Ok(Self {
            params,
            elements_added: 0,
            hash_function: config.hash_function,
            store: MemoryBits::zeroed(params.byte_length()),
        })
    }

    /// Rebuilds a filter from a serialized image, replacing nothing:
    /// the parameters and bits come entirely from the image.
    pub fn from_bytes(
        buf: &[u8],
        hash_function: Option<HashFunction>,
    ) -> Result<Self> {
        Self::from_decoded(codec::decode(buf)?, hash_function)
    }

    pub fn from_reader<R: Read>(
        reader: &mut R,
        hash_function: Option<HashFunction>,
    ) -> Result<Self> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Self::from_bytes(&buf, hash_function)
    }

    pub fn from_file<P: AsRef<Path>>(
        path: P,
        hash_function: Option<HashFunction>,
    ) -> Result<Self> {
        Self::from_decoded(codec::decode_file(path.as_ref())?, hash_function)
    }

    pub fn from_hex(
        hex_string: &str,
        hash_function: Option<HashFunction>,
    ) -> Result<Self> {
        Self::from_decoded(codec::decode_hex(hex_string)?, hash_function)
    }

    fn from_decoded(
        decoded: codec::Decoded,
        hash_function: Option<HashFunction>,
    ) -> Result<Self> {
        Ok(Self {
            params: decoded.params,
            elements_added: decoded.elements_added,
            hash_function: hash_function.unwrap_or(default_hash_function),
            store: MemoryBits::from_bytes(decoded.bits),
        })
    }
}

impl BloomFilterOnDisk {
    /// Creates a fresh filter file, a zeroed bit array followed by the
    /// metadata trailer, then attaches a writable mapping over it.
    pub fn create<P: AsRef<Path>>(
        path: P,
        config: BloomConfig,
    ) -> Result<Self> {
        config.validate()?;
        let params = FilterParams::derive(
            config.estimated_elements,
            config.false_positive_rate,
        )?;
        codec::write_empty_file(path.as_ref(), &params)?;
        info!(
            path = %path.as_ref().display(),
            bits = params.num_bits,
            "created on-disk bloom filter"
        );
        Self::attach(path.as_ref(), params, 0, config.hash_function)
    }

    /// Attaches to a previously created or exported filter file. The
    /// geometry is rederived from the trailer; the bit array itself is
    /// never copied into process memory.
    pub fn open<P: AsRef<Path>>(
        path: P,
        hash_function: Option<HashFunction>,
    ) -> Result<Self> {
        let (params, elements_added) =
            codec::read_file_params(path.as_ref())?;
        Self::attach(
            path.as_ref(),
            params,
            elements_added,
            hash_function.unwrap_or(default_hash_function),
        )
    }

    fn attach(
        path: &Path,
        params: FilterParams,
        elements_added: u64,
        hash_function: HashFunction,
    ) -> Result<Self> {
        let store = MmapBits::open(path, params.byte_length())?;
        Ok(Self {
            params,
            elements_added,
            hash_function,
            store,
        })
    }

    /// Flushes pending writes and releases the mapping and the file
    /// handle. Terminal: any further operation fails with
    /// `ClosedFilter`.
    pub fn close(&mut self) -> Result<()> {
        self.store.close()
    }

    pub fn is_closed(&self) -> bool {
        self.store.is_closed()
    }
}

/// Point-in-time snapshot of a filter's geometry and usage.
#[derive(Debug, Clone)]
pub struct FilterStats {
    pub number_bits: u64,
    pub estimated_elements: u64,
    pub number_hashes: usize,
    pub false_positive_rate: f32,
    pub bloom_length: usize,
    pub elements_added: u64,
    pub estimated_elements_added: u64,
    pub current_false_positive_rate: f64,
    pub export_size: usize,
    pub bits_set: u64,
    pub on_disk: bool,
}

impl fmt::Display for FilterStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "BloomFilter:")?;
        writeln!(f, "\tbits: {}", self.number_bits)?;
        writeln!(f, "\testimated elements: {}", self.estimated_elements)?;
        writeln!(f, "\tnumber hashes: {}", self.number_hashes)?;
        writeln!(
            f,
            "\tmax false positive rate: {:.6}",
            self.false_positive_rate
        )?;
        writeln!(f, "\tbloom length (8 bits): {}", self.bloom_length)?;
        writeln!(f, "\telements added: {}", self.elements_added)?;
        writeln!(
            f,
            "\testimated elements added: {}",
            self.estimated_elements_added
        )?;
        writeln!(
            f,
            "\tcurrent false positive rate: {:.6}",
            self.current_false_positive_rate
        )?;
        writeln!(
            f,
            "\texport size: {}",
            bytes2hr(self.export_size)
        )?;
        writeln!(f, "\tnumber bits set: {}", self.bits_set)?;
        writeln!(f, "\tis on disk: {}", if self.on_disk { "yes" } else { "no" })
    }
}
