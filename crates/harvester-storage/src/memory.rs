use std::sync::Mutex;

use async_trait::async_trait;
use harvester_common::{HarvesterError, Result, Snapshot};

use crate::traits::Backend;

/// Keeps the last saved snapshot in process memory. Used when no persistence is configured.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    saved: Mutex<Snapshot>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let mut saved = self
            .saved
            .lock()
            .map_err(|_| HarvesterError::InternalError("memory backend lock poisoned".into()))?;
        *saved = snapshot.clone();
        Ok(())
    }

    async fn load(&self) -> Result<Snapshot> {
        self.saved
            .lock()
            .map(|saved| saved.clone())
            .map_err(|_| HarvesterError::InternalError("memory backend lock poisoned".into()))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn is_transient(&self, _err: &HarvesterError) -> bool {
        false
    }
}
