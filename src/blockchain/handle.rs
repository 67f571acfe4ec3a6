use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use log::debug;

use super::chain::{Blockchain, BlockchainError};
use crate::config::Config;

/// Opens a chain at most once and hands out shared references to it.
///
/// The first successful [`get`](ChainHandle::get) opens the storage and
/// creates genesis if needed, all while holding the slot lock; later and
/// concurrent callers receive the same instance. A failed open leaves the
/// slot empty so the error reaches every caller that races it.
#[derive(Debug)]
pub struct ChainHandle {
    path: PathBuf,
    difficulty: u32,
    chain: Mutex<Option<Arc<Blockchain>>>,
}

impl ChainHandle {
    pub fn new<P: Into<PathBuf>>(path: P, difficulty: u32) -> Self {
        ChainHandle {
            path: path.into(),
            difficulty,
            chain: Mutex::new(None),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.data_dir.clone(), config.difficulty)
    }

    /// Gets the chain, opening it on first use
    pub fn get(&self) -> Result<Arc<Blockchain>, BlockchainError> {
        let mut slot = self
            .chain
            .lock()
            .map_err(|_| BlockchainError::Poisoned("chain handle"))?;

        if let Some(chain) = slot.as_ref() {
            return Ok(Arc::clone(chain));
        }

        debug!("Opening blockchain at {}", self.path.display());
        let chain = Arc::new(Blockchain::open(&self.path, self.difficulty)?);
        *slot = Some(Arc::clone(&chain));
        Ok(chain)
    }
}
