use super::*;

/// CPU-side copy of every instance record, plus the slots written since the
/// last drain.
#[derive(Clone, Debug)]
pub struct InstanceStore {
    records: Vec<BlockInstance>,
    dirty: DirtySet,
}

impl InstanceStore {
    pub const RECORD_SIZE: usize = RECORD_SIZE;

    pub fn new(total_slots: usize) -> Self {
        Self {
            records: vec![BlockInstance::zeroed(); total_slots],
            dirty: DirtySet::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn read(&self, slot: usize) -> BlockInstance {
        self.records[slot]
    }

    pub fn write(&mut self, slot: usize, record: BlockInstance) {
        self.records[slot] = record;
        self.dirty.insert(slot);
    }

    pub fn copy(&mut self, src: usize, dst: usize) {
        let record = self.read(src);
        self.write(dst, record);
    }

    pub fn set_face_visibility(&mut self, slot: usize, axis: u8, direction: u8, visible: bool) {
        let mut record = self.read(slot);
        record.set_face_visible(axis, direction, visible);
        self.write(slot, record);
    }

    pub fn has_changes(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub fn dirty_len(&self) -> usize {
        self.dirty.len()
    }

    pub fn dirty(&self) -> &DirtySet {
        &self.dirty
    }

    /// Copies out every dirty record in slot order and clears the dirty set.
    pub fn take_pending(&mut self) -> Vec<(usize, BlockInstance)> {
        let dirty = std::mem::take(&mut self.dirty);
        dirty
            .into_iter()
            .map(|slot| (slot, self.records[slot]))
            .collect()
    }

    pub fn records(&self) -> &[BlockInstance] {
        &self.records
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(seed: f32) -> BlockInstance {
        let mut record = BlockInstance::zeroed();
        record.chunk_offset = [seed, seed + 1.0, seed + 2.0, 0.0];
        record
    }

    #[test]
    fn write_then_read_returns_the_record() {
        let mut store = InstanceStore::new(8);
        store.write(5, record(3.0));
        assert_eq!(store.read(5), record(3.0));
        assert_eq!(store.dirty_len(), 1);
    }

    #[test]
    fn repeated_writes_collapse_into_one_dirty_slot() {
        let mut store = InstanceStore::new(8);
        for i in 0..5 {
            store.write(2, record(i as f32));
        }
        let pending = store.take_pending();
        assert_eq!(pending, vec![(2, record(4.0))]);
        assert!(!store.has_changes());
    }

    #[test]
    fn pending_records_are_in_slot_order() {
        let mut store = InstanceStore::new(8);
        store.write(6, record(6.0));
        store.write(1, record(1.0));
        store.copy(1, 3);
        let slots: Vec<usize> = store.take_pending().iter().map(|(slot, _)| *slot).collect();
        assert_eq!(slots, vec![1, 3, 6]);
        assert_eq!(store.read(3), record(1.0));
    }

    #[test]
    fn face_visibility_goes_through_dirty_tracking() {
        let mut store = InstanceStore::new(2);
        store.set_face_visibility(1, 1, 0, true);
        assert!(store.read(1).is_face_visible(1, 0));
        assert_eq!(store.dirty().iter().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn byte_view_covers_every_slot() {
        let store = InstanceStore::new(3);
        assert_eq!(store.as_bytes().len(), 3 * InstanceStore::RECORD_SIZE);
    }
}
