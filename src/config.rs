use crate::error::{BloomError, Result};
use crate::hash::{
    HashFunction, default_hash_function, optimal_num_bits, optimal_num_hashes,
};
use derive_builder::Builder;

/// Configuration for both filter variants
#[derive(Clone, Debug, Builder)]
#[builder(pattern = "owned")]
pub struct BloomConfig {
    /// Number of elements the caller intends to insert
    #[builder(default = "10_000")]
    pub estimated_elements: u64,

    /// Target false positive rate (between 0 and 1, exclusive)
    #[builder(default = "0.01")]
    pub false_positive_rate: f64,

    /// Hash function used to expand keys into bit indices
    #[builder(default = "default_hash_function")]
    pub hash_function: HashFunction,
}

impl BloomConfig {
    pub fn validate(&self) -> Result<()> {
        if self.estimated_elements == 0 {
            return Err(BloomError::InvalidParameter(
                "Estimated elements must be > 0".into(),
            ));
        }
        if !(self.false_positive_rate > 0.0 && self.false_positive_rate < 1.0) {
            return Err(BloomError::InvalidParameter(format!(
                "False positive rate must be between 0 and 1, got {}",
                self.false_positive_rate
            )));
        }
        Ok(())
    }
}

/// Derived filter geometry, immutable once set.
///
/// Only `estimated_elements` and the rate are ever persisted; the bit
/// and hash counts are rederived from them on every load, which is why
/// the derivation has to be reproducible down to the last bit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterParams {
    pub estimated_elements: u64,
    /// Held in single precision to match the 32-bit persisted field.
    pub false_positive_rate: f32,
    pub num_bits: u64,
    pub num_hashes: usize,
}

impl FilterParams {
    /// Derives the optimal geometry for the requested capacity and rate.
    ///
    /// The rate passes through `f32` before any sizing math, so a filter
    /// rebuilt from its persisted 32-bit rate field lands on identical
    /// geometry no matter how precise the original input was.
    pub fn derive(
        estimated_elements: u64,
        false_positive_rate: f64,
    ) -> Result<Self> {
        if estimated_elements == 0 {
            return Err(BloomError::InvalidParameter(
                "Estimated elements must be > 0".into(),
            ));
        }
        let rate = false_positive_rate as f32;
        if !(rate > 0.0 && rate < 1.0) {
            return Err(BloomError::InvalidParameter(format!(
                "False positive rate must be between 0 and 1, got {false_positive_rate}"
            )));
        }
        let num_bits = optimal_num_bits(estimated_elements, f64::from(rate));
        let num_hashes = optimal_num_hashes(estimated_elements, num_bits);
        Ok(Self {
            estimated_elements,
            false_positive_rate: rate,
            num_bits,
            num_hashes,
        })
    }

    /// Bytes needed to store the bit array, one byte per 8 bits.
    pub fn byte_length(&self) -> usize {
        self.num_bits.div_ceil(8) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_reference_vector() {
        let params = FilterParams::derive(10, 0.05).unwrap();
        assert_eq!(params.num_bits, 63);
        assert_eq!(params.num_hashes, 4);
        assert_eq!(params.byte_length(), 8);
    }

    #[test]
    fn test_derive_is_stable_through_single_precision() {
        let params = FilterParams::derive(10_000, 0.01).unwrap();
        let reloaded = FilterParams::derive(
            params.estimated_elements,
            f64::from(params.false_positive_rate),
        )
        .unwrap();
        assert_eq!(params, reloaded);
    }

    #[test]
    fn test_derive_rejects_zero_elements() {
        assert!(matches!(
            FilterParams::derive(0, 0.05),
            Err(BloomError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_derive_rejects_out_of_range_rates() {
        for rate in [0.0, 1.0, -0.5, 1.5, f64::NAN] {
            assert!(
                matches!(
                    FilterParams::derive(10, rate),
                    Err(BloomError::InvalidParameter(_))
                ),
                "rate {rate} should be rejected"
            );
        }
    }

    #[test]
    fn test_config_validation() {
        let config = BloomConfigBuilder::default()
            .estimated_elements(1000)
            .false_positive_rate(0.01)
            .build()
            .unwrap();
        assert!(config.validate().is_ok());

        let config = BloomConfigBuilder::default()
            .estimated_elements(0)
            .build()
            .unwrap();
        assert!(config.validate().is_err());

        let config = BloomConfigBuilder::default()
            .false_positive_rate(1.2)
            .build()
            .unwrap();
        assert!(config.validate().is_err());
    }
}
