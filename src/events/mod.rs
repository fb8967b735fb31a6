use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::domain::TelemetryEvent;

/// Default per-tenant event capacity.
pub const DEFAULT_CAPACITY_PER_TENANT: usize = 10_000;

type Buffer = Arc<Mutex<VecDeque<TelemetryEvent>>>;

/// Append-only, tenant-partitioned ring buffers of lifecycle events.
pub struct EventRecorder {
    buffers: RwLock<HashMap<String, Buffer>>,
    capacity: usize,
}

impl EventRecorder {
    pub fn new(capacity: usize) -> Self {
        EventRecorder {
            buffers: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an event to its tenant's buffer, dropping the oldest entry
    /// once the buffer is over capacity.
    pub fn append(&self, event: TelemetryEvent) {
        let buffer = self.buffer_for(&event.tenant_id);
        let mut guard = buffer.lock();
        guard.push_back(event);
        while guard.len() > self.capacity {
            guard.pop_front();
        }
    }

    /// Up to `limit` most recent events for a tenant, newest last.
    pub fn read(&self, tenant_id: &str, limit: usize) -> Vec<TelemetryEvent> {
        let Some(buffer) = self.buffers.read().get(tenant_id).cloned() else {
            return Vec::new();
        };

        let guard = buffer.lock();
        let skip = guard.len().saturating_sub(limit);
        guard.iter().skip(skip).cloned().collect()
    }

    /// Number of events held for a tenant.
    pub fn len(&self, tenant_id: &str) -> usize {
        self.buffers
            .read()
            .get(tenant_id)
            .map_or(0, |b| b.lock().len())
    }

    fn buffer_for(&self, tenant_id: &str) -> Buffer {
        // Fast path: buffer exists
        if let Some(buffer) = self.buffers.read().get(tenant_id) {
            return buffer.clone();
        }

        self.buffers
            .write()
            .entry(tenant_id.to_string())
            .or_default()
            .clone()
    }
}

impl Default for EventRecorder {
    fn default() -> Self {
        EventRecorder::new(DEFAULT_CAPACITY_PER_TENANT)
    }
}
