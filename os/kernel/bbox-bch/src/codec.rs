//! A binary, shortened BCH code over GF(2^m).

use crate::BchError;
use crate::gf::{GaloisField, MAX_M, MIN_M};
use alloc::vec;
use bbox_sync::SpinLock;
use log::{error, trace};

/// Largest correction capability supported; parity must fit a `u64` remainder.
pub const MAX_T: u32 = 8;

const MAX_SYNDROMES: usize = 2 * MAX_T as usize;
const MAX_LOCATOR: usize = MAX_SYNDROMES + 1;

/// Per-decode working state. Fixed-size so the decode path never allocates.
struct Scratch {
    syndromes: [u16; MAX_SYNDROMES],
    locator: [u16; MAX_LOCATOR],
    previous: [u16; MAX_LOCATOR],
    error_positions: [usize; MAX_T as usize],
}

impl Scratch {
    const fn new() -> Self {
        Self {
            syndromes: [0; MAX_SYNDROMES],
            locator: [0; MAX_LOCATOR],
            previous: [0; MAX_LOCATOR],
            error_positions: [0; MAX_T as usize],
        }
    }
}

/// Encoder/decoder for one `(m, t)` parameter set.
///
/// A block of `k` data bits plus `ecc_bits` parity bits forms a codeword of a
/// code shortened from length `2^m - 1`. Data bits are taken MSB-first from
/// byte 0; parity bits are stored MSB-first, `ecc_bytes` per block.
pub struct Bch {
    gf: GaloisField,
    m: u32,
    t: u32,
    /// Generator polynomial without its leading `x^ecc_bits` term.
    generator: u64,
    ecc_bits: usize,
    ecc_bytes: usize,
    block_bytes: usize,
    scratch: SpinLock<Scratch>,
}

impl core::fmt::Debug for Bch {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Bch")
            .field("m", &self.m)
            .field("t", &self.t)
            .field("ecc_bits", &self.ecc_bits)
            .field("block_bytes", &self.block_bytes)
            .finish_non_exhaustive()
    }
}

impl Bch {
    /// Build the field tables and generator polynomial.
    ///
    /// The block size is the smaller of [`MAX_BLOCK_BYTES`](crate::MAX_BLOCK_BYTES)
    /// and what the shortened code can carry.
    pub fn new(m: u32, t: u32) -> Result<Self, BchError> {
        let invalid = BchError::InvalidParameters { m, t };
        if !(MIN_M..=MAX_M).contains(&m) || t == 0 || t > MAX_T {
            return Err(invalid);
        }
        let gf = GaloisField::new(m).ok_or(invalid)?;
        let n = gf.order();

        // g(x) = product of (x - α^e) over every cyclotomic coset touching 1..=2t
        let mut coset_seen = vec![false; n];
        let mut g: alloc::vec::Vec<u16> = vec![1];
        for first in 1..=(2 * t as usize) {
            if coset_seen[first] {
                continue;
            }
            let mut e = first;
            loop {
                coset_seen[e] = true;
                let root = gf.pow(e);
                let mut next = vec![0u16; g.len() + 1];
                for (k, &c) in g.iter().enumerate() {
                    next[k + 1] ^= c;
                    next[k] ^= gf.mul(c, root);
                }
                g = next;
                e = (2 * e) % n;
                if e == first {
                    break;
                }
            }
        }

        let ecc_bits = g.len() - 1;
        if ecc_bits > 64 || g.iter().any(|&c| c > 1) {
            return Err(invalid);
        }
        let generator = g[..ecc_bits]
            .iter()
            .enumerate()
            .filter(|&(_, &c)| c == 1)
            .fold(0u64, |acc, (k, _)| acc | (1 << k));

        let block_bytes = crate::MAX_BLOCK_BYTES.min((n - ecc_bits) / 8);
        if block_bytes == 0 {
            return Err(invalid);
        }

        trace!("BCH(m={m}, t={t}): {ecc_bits} parity bits, {block_bytes}-byte blocks");
        Ok(Self {
            gf,
            m,
            t,
            generator,
            ecc_bits,
            ecc_bytes: ecc_bits.div_ceil(8),
            block_bytes,
            scratch: SpinLock::new(Scratch::new()),
        })
    }

    #[inline]
    #[must_use]
    pub const fn t(&self) -> u32 {
        self.t
    }

    #[inline]
    #[must_use]
    pub const fn ecc_bits(&self) -> usize {
        self.ecc_bits
    }

    /// Parity bytes stored per block.
    #[inline]
    #[must_use]
    pub const fn ecc_bytes(&self) -> usize {
        self.ecc_bytes
    }

    #[inline]
    #[must_use]
    pub const fn block_bytes(&self) -> usize {
        self.block_bytes
    }

    /// Parity bytes needed to protect `data_len` bytes.
    #[inline]
    #[must_use]
    pub const fn ecc_len_for(&self, data_len: usize) -> usize {
        data_len.div_ceil(self.block_bytes) * self.ecc_bytes
    }

    fn check_ecc_len(&self, data_len: usize, ecc_len: usize) -> Result<(), BchError> {
        let need = self.ecc_len_for(data_len);
        if ecc_len < need {
            error!("ECC buffer too short: {ecc_len} < {need}");
            return Err(BchError::EccTooShort {
                need,
                have: ecc_len,
            });
        }
        Ok(())
    }

    /// Compute parity for `data`, one [`block_bytes`](Self::block_bytes)
    /// chunk at a time, each into its own slice of `ecc`.
    pub fn encode(&self, data: &[u8], ecc: &mut [u8]) -> Result<(), BchError> {
        self.check_ecc_len(data.len(), ecc.len())?;
        for (chunk, parity) in data
            .chunks(self.block_bytes)
            .zip(ecc.chunks_mut(self.ecc_bytes))
        {
            self.encode_block(chunk, parity);
        }
        Ok(())
    }

    /// Verify `data` against `ecc` and repair it in place.
    ///
    /// Returns the number of corrected bit errors. The first uncorrectable
    /// chunk aborts with [`BchError::Uncorrectable`]; chunks before it keep
    /// their repairs.
    pub fn checkout(&self, data: &mut [u8], ecc: &[u8]) -> Result<u32, BchError> {
        self.check_ecc_len(data.len(), ecc.len())?;
        let mut corrected = 0;
        for (index, (chunk, parity)) in data
            .chunks_mut(self.block_bytes)
            .zip(ecc.chunks(self.ecc_bytes))
            .enumerate()
        {
            match self.decode_block(chunk, parity) {
                Ok(n) => corrected += n,
                Err(e) => {
                    error!("BCH chunk {index} uncorrectable");
                    return Err(e);
                }
            }
        }
        Ok(corrected)
    }

    /// Systematic LFSR encoder: parity = `d(x) * x^ecc_bits mod g(x)`.
    fn encode_block(&self, data: &[u8], parity: &mut [u8]) {
        let r = self.remainder(data);
        parity[..self.ecc_bytes].fill(0);
        for e in 0..self.ecc_bits {
            if (r >> (self.ecc_bits - 1 - e)) & 1 == 1 {
                parity[e / 8] |= 0x80 >> (e % 8);
            }
        }
    }

    fn remainder(&self, data: &[u8]) -> u64 {
        let top = 1u64 << (self.ecc_bits - 1);
        let mask = if self.ecc_bits == 64 {
            u64::MAX
        } else {
            (1u64 << self.ecc_bits) - 1
        };
        let mut r = 0u64;
        for &byte in data {
            for bit in (0..8).rev() {
                let feedback = ((byte >> bit) & 1 == 1) ^ (r & top != 0);
                r = (r << 1) & mask;
                if feedback {
                    r ^= self.generator;
                }
            }
        }
        r
    }

    /// Decode one block. Errors located in the parity bits are counted but the
    /// stored parity is left untouched.
    fn decode_block(&self, data: &mut [u8], parity: &[u8]) -> Result<u32, BchError> {
        let gf = &self.gf;
        let two_t = 2 * self.t as usize;
        let k = data.len() * 8;
        let codeword_bits = k + self.ecc_bits;
        let mut guard = self.scratch.lock();
        let s = &mut *guard;

        // odd syndromes by evaluation, even ones by squaring
        s.syndromes[..two_t].fill(0);
        let data_bits = (0..k).filter(|&q| data[q / 8] & (0x80 >> (q % 8)) != 0);
        let data_degrees = data_bits.map(|q| self.ecc_bits + k - 1 - q);
        let parity_bits = (0..self.ecc_bits).filter(|&e| parity[e / 8] & (0x80 >> (e % 8)) != 0);
        let parity_degrees = parity_bits.map(|e| self.ecc_bits - 1 - e);
        for degree in data_degrees.chain(parity_degrees) {
            for j in (1..=two_t).step_by(2) {
                s.syndromes[j - 1] ^= gf.pow(j * degree);
            }
        }
        for j in (2..=two_t).step_by(2) {
            s.syndromes[j - 1] = gf.square(s.syndromes[j / 2 - 1]);
        }
        if s.syndromes[..two_t].iter().all(|&x| x == 0) {
            return Ok(0);
        }

        // Berlekamp-Massey
        s.locator.fill(0);
        s.previous.fill(0);
        s.locator[0] = 1;
        s.previous[0] = 1;
        let mut degree = 0usize;
        let mut shift = 1usize;
        let mut last_discrepancy = 1u16;
        for r in 0..two_t {
            let mut d = s.syndromes[r];
            for i in 1..=degree {
                d ^= gf.mul(s.locator[i], s.syndromes[r - i]);
            }
            if d == 0 {
                shift += 1;
                continue;
            }
            let coef = gf.div(d, last_discrepancy);
            let before = s.locator;
            for i in 0..MAX_LOCATOR.saturating_sub(shift) {
                s.locator[i + shift] ^= gf.mul(coef, s.previous[i]);
            }
            if 2 * degree <= r {
                degree = r + 1 - degree;
                s.previous = before;
                last_discrepancy = d;
                shift = 1;
            } else {
                shift += 1;
            }
        }
        if degree > self.t as usize || s.locator[degree] == 0 {
            return Err(BchError::Uncorrectable);
        }

        // Chien search restricted to positions the shortened code uses
        let mut found = 0usize;
        for p in 0..codeword_bits {
            let mut sum = 0u16;
            for i in 0..=degree {
                sum ^= gf.mul(s.locator[i], gf.pow_neg(p * i));
            }
            if sum == 0 {
                if found == degree {
                    return Err(BchError::Uncorrectable);
                }
                s.error_positions[found] = p;
                found += 1;
            }
        }
        if found != degree {
            return Err(BchError::Uncorrectable);
        }

        for &p in &s.error_positions[..found] {
            if p >= self.ecc_bits {
                let q = self.ecc_bits + k - 1 - p;
                data[q / 8] ^= 0x80 >> (q % 8);
            }
        }
        #[allow(clippy::cast_possible_truncation)]
        Ok(found as u32)
    }
}
