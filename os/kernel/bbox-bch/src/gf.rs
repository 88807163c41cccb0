//! Arithmetic in GF(2^m) via exponent/logarithm tables.

use alloc::vec;
use alloc::vec::Vec;

/// Primitive polynomials for m = 5..=15, lowest m first.
const PRIMITIVE_POLYS: [u32; 11] = [
    0x25, 0x43, 0x83, 0x11d, 0x211, 0x409, 0x805, 0x1053, 0x201b, 0x402b, 0x8003,
];

pub const MIN_M: u32 = 5;
pub const MAX_M: u32 = 15;

pub struct GaloisField {
    /// Multiplicative group order, `2^m - 1`.
    n: usize,
    /// `exp[i] = α^i`, stored twice over so a sum of two logs needs no modulo.
    exp: Vec<u16>,
    /// `log[α^i] = i`; `log[0]` is unused.
    log: Vec<u16>,
}

impl GaloisField {
    /// Build the tables, or `None` for an unsupported `m`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(m: u32) -> Option<Self> {
        if !(MIN_M..=MAX_M).contains(&m) {
            return None;
        }
        let poly = PRIMITIVE_POLYS[(m - MIN_M) as usize];
        let n = (1usize << m) - 1;
        let mut exp = vec![0u16; 2 * n];
        let mut log = vec![0u16; n + 1];

        let mut x: u32 = 1;
        for i in 0..n {
            if i > 0 && x == 1 {
                // generator cycled early: polynomial is not primitive
                return None;
            }
            exp[i] = x as u16;
            log[x as usize] = i as u16;
            x <<= 1;
            if x & (1 << m) != 0 {
                x ^= poly;
            }
        }
        let (lo, hi) = exp.split_at_mut(n);
        hi.copy_from_slice(lo);

        Some(Self { n, exp, log })
    }

    #[inline]
    pub const fn order(&self) -> usize {
        self.n
    }

    /// `α^e` for any exponent.
    #[inline]
    pub fn pow(&self, e: usize) -> u16 {
        self.exp[e % self.n]
    }

    /// `α^-e`.
    #[inline]
    pub fn pow_neg(&self, e: usize) -> u16 {
        self.exp[(self.n - e % self.n) % self.n]
    }

    #[inline]
    pub fn mul(&self, a: u16, b: u16) -> u16 {
        if a == 0 || b == 0 {
            0
        } else {
            self.exp[self.log[a as usize] as usize + self.log[b as usize] as usize]
        }
    }

    /// `a / b`; `b` must be nonzero.
    #[inline]
    pub fn div(&self, a: u16, b: u16) -> u16 {
        if a == 0 {
            0
        } else {
            self.exp[self.log[a as usize] as usize + self.n - self.log[b as usize] as usize]
        }
    }

    #[inline]
    pub fn square(&self, a: u16) -> u16 {
        self.mul(a, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsupported_degrees() {
        assert!(GaloisField::new(4).is_none());
        assert!(GaloisField::new(16).is_none());
    }

    #[test]
    fn every_nonzero_element_has_an_inverse() {
        let gf = GaloisField::new(5).unwrap();
        for a in 1..=31u16 {
            assert_eq!(gf.mul(a, gf.div(1, a)), 1, "a = {a}");
        }
    }

    #[test]
    fn powers_cycle_with_group_order() {
        for m in MIN_M..=MAX_M {
            let gf = GaloisField::new(m).unwrap();
            assert_eq!(gf.pow(0), 1);
            assert_eq!(gf.pow(gf.order()), 1);
            assert_eq!(gf.mul(gf.pow(3), gf.pow_neg(3)), 1);
        }
    }
}
