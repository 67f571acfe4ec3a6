use sha2::{Digest, Sha256};
use thiserror::Error;

use super::block::Block;

/// Default number of leading zero bits a block hash must carry
pub const TARGET_BITS: u32 = 24;

/// Upper bound of the nonce search
pub const MAX_NONCE: i64 = i64::MAX;

/// Errors that can occur while solving or setting up a proof of work
#[derive(Debug, Error)]
pub enum PowError {
    #[error("No valid nonce found for difficulty {difficulty} after {attempts} attempts")]
    Exhausted { difficulty: u32, attempts: i64 },

    #[error("Invalid difficulty: {0} (expected 1..=256)")]
    InvalidDifficulty(u32),
}

/// Computes `1 << (256 - difficulty)` as a big-endian 256-bit integer
pub fn target_for(difficulty: u32) -> Result<[u8; 32], PowError> {
    if !(1..=256).contains(&difficulty) {
        return Err(PowError::InvalidDifficulty(difficulty));
    }

    let shift = (256 - difficulty) as usize;
    let mut target = [0u8; 32];
    target[31 - shift / 8] = 1 << (shift % 8);

    Ok(target)
}

/// Counts the leading zero bits of a hash
pub fn leading_zero_bits(hash: &[u8]) -> u32 {
    let mut bits = 0;
    for byte in hash {
        if *byte == 0 {
            bits += 8;
        } else {
            bits += byte.leading_zeros();
            break;
        }
    }
    bits
}

/// Proof-of-work puzzle binding a block header to a difficulty target.
///
/// Fixed-width big-endian byte arrays order the same way as the unsigned
/// integers they encode, so hashes are compared to the target directly.
pub struct ProofOfWork<'a> {
    block: &'a Block,
    difficulty: u32,
    target: [u8; 32],
}

impl<'a> ProofOfWork<'a> {
    /// Creates the puzzle for a block at the given difficulty
    pub fn new(block: &'a Block, difficulty: u32) -> Result<Self, PowError> {
        Ok(ProofOfWork {
            block,
            difficulty,
            target: target_for(difficulty)?,
        })
    }

    /// Header bytes hashed for a given nonce:
    /// prev hash, payload bytes, then timestamp, difficulty and nonce as decimal text.
    pub fn header_bytes(&self, nonce: i64) -> Vec<u8> {
        let mut data = self.header_prefix();
        data.extend_from_slice(nonce.to_string().as_bytes());
        data
    }

    fn header_prefix(&self) -> Vec<u8> {
        let payload = self.block.payload.header_bytes();
        let timestamp = self.block.timestamp.to_string();
        let difficulty = self.difficulty.to_string();

        let mut data = Vec::with_capacity(
            self.block.prev_block_hash.len() + payload.len() + timestamp.len() + difficulty.len() + 20,
        );
        data.extend_from_slice(&self.block.prev_block_hash);
        data.extend_from_slice(&payload);
        data.extend_from_slice(timestamp.as_bytes());
        data.extend_from_slice(difficulty.as_bytes());
        data
    }

    /// Searches nonces from 0 upward for a hash below the target
    pub fn run(&self) -> Result<(i64, [u8; 32]), PowError> {
        self.run_bounded(MAX_NONCE)
    }

    /// Same as [`run`](Self::run) but gives up once `max_nonce` is reached
    pub fn run_bounded(&self, max_nonce: i64) -> Result<(i64, [u8; 32]), PowError> {
        let mut data = self.header_prefix();
        let prefix_len = data.len();
        let mut nonce: i64 = 0;

        while nonce < max_nonce {
            data.truncate(prefix_len);
            data.extend_from_slice(nonce.to_string().as_bytes());

            let hash: [u8; 32] = Sha256::digest(&data).into();
            if hash < self.target {
                return Ok((nonce, hash));
            }
            nonce += 1;
        }

        Err(PowError::Exhausted {
            difficulty: self.difficulty,
            attempts: max_nonce,
        })
    }

    /// Replays the stored nonce once; the recomputed hash must be below the
    /// target and equal to the hash the block carries.
    pub fn validate(&self) -> bool {
        let hash: [u8; 32] = Sha256::digest(self.header_bytes(self.block.nonce)).into();
        hash < self.target && hash[..] == self.block.hash[..]
    }
}
