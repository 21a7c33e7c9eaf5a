use crate::compiler::{Decoder, Encoder, RoutineKey, Session};
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;

/// Compiled routines keyed by (record, resolved config, direction).
///
/// Sessions compile without holding any lock and publish afterwards; two
/// sessions racing on one key both publish and the last write wins. The
/// epoch lets `invalidate` discard publications from sessions that started
/// against an older registry.
#[derive(Debug, Default)]
pub struct RoutineCache {
    decoders: DashMap<RoutineKey, Decoder>,
    encoders: DashMap<RoutineKey, Encoder>,
    epoch: RwLock<u64>,
}

impl RoutineCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epoch(&self) -> u64 {
        *self.epoch.read()
    }

    pub fn decoder(&self, key: &RoutineKey) -> Option<Decoder> {
        self.decoders.get(key).map(|entry| entry.value().clone())
    }

    pub fn encoder(&self, key: &RoutineKey) -> Option<Encoder> {
        self.encoders.get(key).map(|entry| entry.value().clone())
    }

    /// Publishes every routine compiled in `session`, unless the cache was
    /// invalidated after `epoch` was read.
    pub fn publish(&self, epoch: u64, session: &Session) -> bool {
        let current = self.epoch.read();
        if *current != epoch {
            debug!(session_epoch = epoch, current = *current, "discarding stale compilation");
            return false;
        }
        let (decoders, encoders) = session.compiled();
        for (key, routine) in decoders {
            self.decoders.insert(key, routine);
        }
        for (key, routine) in encoders {
            self.encoders.insert(key, routine);
        }
        true
    }

    pub fn invalidate(&self) {
        let mut epoch = self.epoch.write();
        *epoch += 1;
        self.decoders.clear();
        self.encoders.clear();
        debug!(epoch = *epoch, "routine cache invalidated");
    }

    pub fn len(&self) -> usize {
        self.decoders.len() + self.encoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
