mod category;
mod gpu_mirror;
mod partition;
mod spatial_index;
mod store;
mod transfer;
mod types;
mod upload;

pub use self::category::{CategoryChain, CategorySnapshot, CategoryWindow, UNALLOCATED_ORDINAL};
pub use self::gpu_mirror::{request_headless_device, WgpuMirror};
pub use self::partition::InstanceState;
pub use self::spatial_index::SpatialIndex;
pub use self::store::InstanceStore;
pub use self::transfer::{CopyRegion, HostMirror, TransferBackend};
pub use self::types::*;
pub use self::upload::{DirtySet, DrainReport, DrainState, PendingUpload, UploadScheduler};

use crate::config::InstanceBufferConfig;
use crate::coordinate::{chunk_coordinates, ChunkPos, Coordinate};
use crate::error::InstanceBufferError;
use bytemuck::{Pod, Zeroable};
use cgmath::{Matrix4, Vector3};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use web_time::Instant;

/// Block instances for one render world.
///
/// World logic mutates through the `on_*` entry points (or a batch under
/// [`lock`](Self::lock)); the renderer reads [`committed`](Self::committed),
/// which only changes once a [`drain`](Self::drain) has fully reached the mirror.
///
/// Lock order is `drain_gate`, then `state`, then `uploads`, and `drain` never
/// holds `state` while it waits for `uploads`. Holding the [`lock`](Self::lock)
/// guard while calling [`with_transfer`](Self::with_transfer) or
/// [`last_drain`](Self::last_drain) is therefore safe.
pub struct BlockInstanceBuffer<T> {
    state: Mutex<InstanceState>,
    uploads: Mutex<UploadScheduler<T>>,
    drain_gate: Mutex<()>,
    draining: AtomicBool,
    committed: RwLock<Arc<CategorySnapshot>>,
}

impl<T: TransferBackend> BlockInstanceBuffer<T> {
    pub fn new(
        config: &InstanceBufferConfig,
        block_ids: &[BlockId],
        transfer: T,
    ) -> Result<Self, InstanceBufferError> {
        config.validate()?;
        let state = InstanceState::new(block_ids, config.total_slots)?;
        let committed = Arc::new(state.categories().snapshot());
        log::info!(
            "block instance buffer: {} slots ({} bytes), {} categories, staging for {} records",
            config.total_slots,
            config.instance_buffer_bytes(),
            block_ids.len(),
            config.staging_records
        );
        Ok(Self {
            state: Mutex::new(state),
            uploads: Mutex::new(UploadScheduler::new(transfer, config.staging_records)),
            drain_gate: Mutex::new(()),
            draining: AtomicBool::new(false),
            committed: RwLock::new(committed),
        })
    }

    /// Holds the state lock so several mutations land atomically.
    pub fn lock(&self) -> MutexGuard<'_, InstanceState> {
        self.state.lock().expect("instance state lock poisoned")
    }

    pub fn on_coordinates_allocated(
        &self,
        coordinates: &[Coordinate],
    ) -> Result<(), InstanceBufferError> {
        self.lock().allocate_coordinates(coordinates)
    }

    pub fn on_coordinates_deallocated(&self, coordinates: &[Coordinate]) {
        self.lock().deallocate_coordinates(coordinates);
    }

    pub fn on_category_changed(
        &self,
        coordinate: Coordinate,
        id: Option<BlockId>,
    ) -> Result<(), InstanceBufferError> {
        self.lock().change_block(&coordinate, id).map(|_| ())
    }

    pub fn on_voxels_changed(
        &self,
        changes: &[(Coordinate, Option<BlockId>)],
    ) -> Result<(), InstanceBufferError> {
        self.lock().apply_block_changes(changes)
    }

    pub fn on_loading_chunk(&self, chunk: ChunkPos) -> Result<(), InstanceBufferError> {
        let coordinates = chunk_coordinates(chunk);
        self.on_coordinates_allocated(&coordinates)?;
        log::info!(
            "allocated instances for chunk <{}, {}, {}>",
            chunk[0],
            chunk[1],
            chunk[2]
        );
        Ok(())
    }

    pub fn on_unloading_chunk(&self, chunk: ChunkPos) {
        self.on_coordinates_deallocated(&chunk_coordinates(chunk));
        log::info!(
            "released instances for chunk <{}, {}, {}>",
            chunk[0],
            chunk[1],
            chunk[2]
        );
    }

    pub fn has_changes(&self) -> bool {
        self.lock().has_changes()
    }

    /// Flushes every dirty record to the mirror, then publishes the category
    /// bounds captured alongside them.
    ///
    /// Drains run one at a time. The state lock is only held while the pending
    /// records are copied out, so producers keep running during the transfer.
    pub fn drain(&self) -> DrainReport {
        let _gate = self.drain_gate.lock().expect("drain gate lock poisoned");
        self.draining.store(true, Ordering::Release);
        let pending = self.lock().take_pending();
        let report = self
            .uploads
            .lock()
            .expect("upload scheduler lock poisoned")
            .drain(&pending.records);
        *self.committed.write().expect("committed snapshot lock poisoned") =
            Arc::new(pending.categories);
        self.draining.store(false, Ordering::Release);
        report
    }

    pub fn drain_state(&self) -> DrainState {
        if self.draining.load(Ordering::Acquire) {
            DrainState::Draining
        } else {
            DrainState::Idle
        }
    }

    pub fn committed(&self) -> Arc<CategorySnapshot> {
        self.committed
            .read()
            .expect("committed snapshot lock poisoned")
            .clone()
    }

    pub fn committed_range_for(&self, id: BlockId) -> Option<CategoryRange> {
        self.committed().range_for(id)
    }

    pub fn last_drain(&self) -> Option<DrainReport> {
        self.uploads
            .lock()
            .expect("upload scheduler lock poisoned")
            .last_report()
    }

    /// Runs `f` against the transfer backend, e.g. to bind the GPU buffer.
    pub fn with_transfer<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let uploads = self.uploads.lock().expect("upload scheduler lock poisoned");
        f(uploads.transfer())
    }
}
