//! # Blackbox BCH codec
//!
//! Every directory entry and header the crash recorder persists carries BCH
//! parity so that a handful of bit flips in retained memory does not lose the
//! record. The code is a binary BCH code over GF(2^[`RDR_BCH_M`]) correcting
//! up to [`RDR_BCH_T`] bit errors per block of at most [`MAX_BLOCK_BYTES`]
//! bytes. Each block's parity occupies [`ECC_BYTES_PER_BLOCK`] bytes; longer
//! inputs are split into independent blocks.
//!
//! The parameters are part of the persisted format and must not change
//! between the writer and any reader of a region image.
//!
//! ```
//! let mut data = *b"directory entry";
//! let mut ecc = [0u8; bbox_bch::ECC_BYTES_PER_BLOCK];
//! bbox_bch::encode(&data, &mut ecc).unwrap();
//!
//! data[3] ^= 0x10;
//! assert_eq!(bbox_bch::checkout(&mut data, &ecc), Ok(1));
//! assert_eq!(&data, b"directory entry");
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod codec;
mod gf;

use bbox_sync::{InitCell, InitState};
use log::{error, info};

pub use codec::{Bch, MAX_T};

/// Galois field degree; codewords are at most `2^11 - 1` bits long.
pub const RDR_BCH_M: u32 = 11;
/// Correctable bit errors per block.
pub const RDR_BCH_T: u32 = 4;
/// Largest data block protected by one parity group.
pub const MAX_BLOCK_BYTES: usize = 128;
/// Parity bytes per block for the default parameters (44 parity bits).
pub const ECC_BYTES_PER_BLOCK: usize = 6;

/// Parity bytes required for `data_len` bytes with the default parameters.
#[must_use]
pub const fn ecc_len_for(data_len: usize) -> usize {
    data_len.div_ceil(MAX_BLOCK_BYTES) * ECC_BYTES_PER_BLOCK
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum BchError {
    /// The process-wide codec failed to initialize or was never initialized.
    #[error("BCH codec unavailable")]
    Unavailable,
    #[error("unsupported BCH parameters m={m}, t={t}")]
    InvalidParameters { m: u32, t: u32 },
    #[error("ECC buffer holds {have} bytes, {need} required")]
    EccTooShort { need: usize, have: usize },
    /// More bit errors than the code can correct.
    #[error("uncorrectable bit errors")]
    Uncorrectable,
}

static RDR_BCH: InitCell<Bch> = InitCell::new();

/// Construct the process-wide codec. Idempotent.
///
/// A failed construction is remembered; every later call (and every
/// [`encode`]/[`checkout`]) reports [`BchError::Unavailable`].
pub fn init() -> Result<&'static Bch, BchError> {
    RDR_BCH
        .get_or_try_init(|| {
            Bch::new(RDR_BCH_M, RDR_BCH_T)
                .inspect(|_| info!("BCH codec ready (m={RDR_BCH_M}, t={RDR_BCH_T})"))
                .inspect_err(|e| error!("BCH codec init failed: {e}"))
        })
        .ok_or(BchError::Unavailable)
}

/// The process-wide codec, constructing it on first use.
pub fn rdr_bch() -> Result<&'static Bch, BchError> {
    match RDR_BCH.state() {
        InitState::Ready => RDR_BCH.get().ok_or(BchError::Unavailable),
        InitState::Failed => Err(BchError::Unavailable),
        InitState::Uninit | InitState::Initializing => init(),
    }
}

/// [`Bch::encode`] on the process-wide codec.
pub fn encode(data: &[u8], ecc: &mut [u8]) -> Result<(), BchError> {
    rdr_bch()?.encode(data, ecc)
}

/// [`Bch::checkout`] on the process-wide codec. Nonzero corrections are logged.
pub fn checkout(data: &mut [u8], ecc: &[u8]) -> Result<u32, BchError> {
    let corrected = rdr_bch()?.checkout(data, ecc)?;
    if corrected > 0 {
        info!("BCH corrected {corrected} bit(s)");
    }
    Ok(corrected)
}
