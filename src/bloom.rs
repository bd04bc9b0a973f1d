//! Fixed-parameter approximate-membership set over message IDs.
//!
//! Double-hashing Bloom filter: two independent 64-bit lanes are derived
//! from a single blake3 digest and combined as `h_i(x) = h1(x) + i*h2(x)`,
//! matching the `blake3`-as-canonical-hash convention used elsewhere in this
//! codebase for content addressing.

use crate::error::{ManagerError, Result};

const WORD_BITS: u64 = 64;
const MAX_BITS_PER_ELEMENT: f64 = 32.0;
const MAX_K_HASHES: u32 = 12;

#[derive(Debug, Clone, PartialEq)]
pub struct BloomFilter {
    pub(crate) capacity: u64,
    pub(crate) error_rate: f64,
    pub(crate) k_hashes: u32,
    pub(crate) m_bits: u64,
    pub(crate) words: Vec<u64>,
}

impl BloomFilter {
    /// Builds a filter sized for `capacity` elements at `error_rate`, deriving
    /// `k_hashes`/`bits_per_element` the standard way.
    pub fn new(capacity: u64, error_rate: f64) -> Result<Self> {
        Self::with_params(capacity, error_rate, None, None)
    }

    pub fn with_params(
        capacity: u64,
        error_rate: f64,
        k_hashes: Option<u32>,
        bits_per_element: Option<f64>,
    ) -> Result<Self> {
        if capacity == 0 {
            return Err(ManagerError::InvalidArgument(
                "bloom filter capacity must be >= 1".into(),
            ));
        }
        if !(error_rate > 0.0 && error_rate < 1.0) {
            return Err(ManagerError::InvalidArgument(
                "bloom filter target error rate must be in (0, 1)".into(),
            ));
        }

        let (k, bpe) = match (k_hashes, bits_per_element) {
            (None, None) => {
                let bpe = (-error_rate.ln() / std::f64::consts::LN_2.powi(2)).ceil();
                let k = (std::f64::consts::LN_2 * bpe).round() as u32;
                (k.max(1), bpe)
            }
            (Some(k), Some(bpe)) => (k, bpe),
            (Some(k), None) => {
                // Solve m/n for the given k at the target error rate:
                // p = (1 - e^{-kn/m})^k  =>  m/n = -k / ln(1 - p^{1/k})
                if k == 0 {
                    return Err(ManagerError::InvalidArgument(
                        "k_hashes must be >= 1".into(),
                    ));
                }
                let p_root = error_rate.powf(1.0 / k as f64);
                if p_root >= 1.0 {
                    return Err(ManagerError::InvalidArgument(
                        "no achievable (k, error_rate) combination".into(),
                    ));
                }
                let bpe = -(k as f64) / (1.0 - p_root).ln();
                (k, bpe)
            }
            (None, Some(bpe)) => {
                let k = (std::f64::consts::LN_2 * bpe).round() as u32;
                (k.max(1), bpe)
            }
        };

        if k > MAX_K_HASHES || bpe > MAX_BITS_PER_ELEMENT || !bpe.is_finite() || bpe <= 0.0 {
            return Err(ManagerError::InvalidArgument(format!(
                "no achievable combination with bitsPerElement <= 32 and kHashes <= 12 (got k={k}, bpe={bpe})"
            )));
        }

        let m_bits = ((capacity as f64) * bpe).ceil().max(WORD_BITS as f64) as u64;
        let word_count = m_bits.div_ceil(WORD_BITS) + 1;

        Ok(Self {
            capacity,
            error_rate,
            k_hashes: k,
            m_bits,
            words: vec![0u64; word_count as usize],
        })
    }

    fn lanes(id: &[u8]) -> (u64, u64) {
        let digest = blake3::hash(id);
        let bytes = digest.as_bytes();
        let h1 = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
        let mut h2 = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
        if h2 == 0 {
            h2 = 1;
        }
        (h1, h2)
    }

    fn bit_index(&self, h1: u64, h2: u64, i: u32) -> u64 {
        h1.wrapping_add((i as u64).wrapping_mul(h2)) % self.m_bits
    }

    pub fn insert(&mut self, id: &[u8]) {
        let (h1, h2) = Self::lanes(id);
        for i in 0..self.k_hashes {
            let bit = self.bit_index(h1, h2, i);
            self.words[(bit / WORD_BITS) as usize] |= 1 << (bit % WORD_BITS);
        }
    }

    pub fn contains(&self, id: &[u8]) -> bool {
        let (h1, h2) = Self::lanes(id);
        for i in 0..self.k_hashes {
            let bit = self.bit_index(h1, h2, i);
            if self.words[(bit / WORD_BITS) as usize] & (1 << (bit % WORD_BITS)) == 0 {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_contains() {
        let mut f = BloomFilter::new(100, 0.01).unwrap();
        f.insert(b"m1");
        assert!(f.contains(b"m1"));
        assert!(!f.contains(b"m2"));
    }

    #[test]
    fn rejects_zero_capacity() {
        assert!(BloomFilter::new(0, 0.01).is_err());
    }

    #[test]
    fn rejects_bad_error_rate() {
        assert!(BloomFilter::new(10, 0.0).is_err());
        assert!(BloomFilter::new(10, 1.0).is_err());
    }

    #[test]
    fn rejects_unachievable_k() {
        assert!(BloomFilter::with_params(10, 1e-12, Some(1), None).is_err());
    }

    #[test]
    fn false_positive_rate_is_roughly_bounded() {
        let mut f = BloomFilter::new(1000, 0.01).unwrap();
        for i in 0..1000u32 {
            f.insert(&i.to_le_bytes());
        }
        let mut false_positives = 0;
        for i in 1000..3000u32 {
            if f.contains(&i.to_le_bytes()) {
                false_positives += 1;
            }
        }
        assert!((false_positives as f64 / 2000.0) < 0.05);
    }
}
