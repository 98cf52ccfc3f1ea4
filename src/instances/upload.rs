use super::*;

// A drain needing this many staging rounds means the staging area is undersized.
const MANY_SUBMISSIONS_WARN: usize = 8;

/// Slots written since the last drain, ascending and without duplicates.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirtySet {
    slots: BTreeSet<usize>,
}

impl DirtySet {
    pub fn insert(&mut self, slot: usize) -> bool {
        self.slots.insert(slot)
    }

    pub fn pop_first(&mut self) -> Option<usize> {
        self.slots.pop_first()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots.iter().copied()
    }
}

impl IntoIterator for DirtySet {
    type Item = usize;
    type IntoIter = std::collections::btree_set::IntoIter<usize>;

    fn into_iter(self) -> Self::IntoIter {
        self.slots.into_iter()
    }
}

/// Everything a drain needs, copied out while the state lock was held.
#[derive(Clone, Debug)]
pub struct PendingUpload {
    pub records: Vec<(usize, BlockInstance)>,
    pub categories: CategorySnapshot,
}

/// Whether a drain is between taking its pending records and publishing them.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum DrainState {
    #[default]
    Idle,
    Draining,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub records: usize,
    pub regions: usize,
    pub submissions: usize,
    pub elapsed: Duration,
}

/// Streams dirty records through a fixed-size staging area into the mirror.
pub struct UploadScheduler<T> {
    transfer: T,
    staging: Vec<u8>,
    staging_records: usize,
    regions: Vec<CopyRegion>,
    last_report: Option<DrainReport>,
}

impl<T: TransferBackend> UploadScheduler<T> {
    pub fn new(transfer: T, staging_records: usize) -> Self {
        assert!(staging_records > 0, "staging area must hold at least one record");
        Self {
            transfer,
            staging: Vec::with_capacity(staging_records * RECORD_SIZE),
            staging_records,
            regions: Vec::new(),
            last_report: None,
        }
    }

    pub fn transfer(&self) -> &T {
        &self.transfer
    }

    pub fn last_report(&self) -> Option<DrainReport> {
        self.last_report
    }

    pub fn staging_records(&self) -> usize {
        self.staging_records
    }

    /// Uploads `records` (ascending by slot) and returns once all of them have
    /// been submitted, in as many staging rounds as needed.
    pub fn drain(&mut self, records: &[(usize, BlockInstance)]) -> DrainReport {
        debug_assert!(records.windows(2).all(|pair| pair[0].0 < pair[1].0));
        let started = Instant::now();
        let mut report = DrainReport::default();
        let staging_capacity = self.staging_records * RECORD_SIZE;
        let mut prev_slot: Option<usize> = None;

        for (slot, record) in records {
            if self.staging.len() + RECORD_SIZE > staging_capacity {
                self.submit(&mut report);
                prev_slot = None;
            }

            let contiguous = prev_slot.map_or(false, |prev| *slot == prev + 1);
            if contiguous {
                if let Some(region) = self.regions.last_mut() {
                    region.size += RECORD_SIZE as u64;
                }
            } else {
                self.regions.push(CopyRegion {
                    src_offset: self.staging.len() as u64,
                    dst_offset: (*slot * RECORD_SIZE) as u64,
                    size: RECORD_SIZE as u64,
                });
            }
            self.staging.extend_from_slice(bytemuck::bytes_of(record));
            prev_slot = Some(*slot);
            report.records += 1;
        }
        if !self.regions.is_empty() {
            self.submit(&mut report);
        }

        report.elapsed = started.elapsed();
        self.last_report = Some(report);
        if report.submissions >= MANY_SUBMISSIONS_WARN {
            log::warn!(
                "instance drain needed {} staging rounds for {} records (staging holds {})",
                report.submissions,
                report.records,
                self.staging_records
            );
        }
        if report.records > 0 {
            log::debug!(
                "drained {} instance records as {} regions in {} submissions ({:?})",
                report.records,
                report.regions,
                report.submissions,
                report.elapsed
            );
        }
        report
    }

    fn submit(&mut self, report: &mut DrainReport) {
        log::trace!(
            "submitting {} copy regions ({} staging bytes)",
            self.regions.len(),
            self.staging.len()
        );
        self.transfer.submit(&self.staging, &self.regions);
        report.submissions += 1;
        report.regions += self.regions.len();
        self.regions.clear();
        self.staging.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Host mirror that also remembers every submitted batch.
    struct RecordingMirror {
        mirror: HostMirror,
        batches: Vec<Vec<CopyRegion>>,
    }

    impl TransferBackend for RecordingMirror {
        fn submit(&mut self, staging: &[u8], regions: &[CopyRegion]) {
            assert!(!regions.is_empty());
            self.batches.push(regions.to_vec());
            self.mirror.submit(staging, regions);
        }
    }

    fn scheduler(total_slots: usize, staging_records: usize) -> UploadScheduler<RecordingMirror> {
        UploadScheduler::new(
            RecordingMirror {
                mirror: HostMirror::new(total_slots),
                batches: Vec::new(),
            },
            staging_records,
        )
    }

    fn record(tag: u32) -> BlockInstance {
        let mut record = BlockInstance::zeroed();
        record.flags = [tag, tag, tag, tag];
        record
    }

    fn region(slot: usize, count: usize, staging_index: usize) -> CopyRegion {
        CopyRegion {
            src_offset: (staging_index * RECORD_SIZE) as u64,
            dst_offset: (slot * RECORD_SIZE) as u64,
            size: (count * RECORD_SIZE) as u64,
        }
    }

    #[test]
    fn twenty_five_records_with_room_for_ten_take_three_submissions() {
        let mut store = InstanceStore::new(100);
        for slot in 0..25 {
            store.write(slot * 3, record(slot as u32));
        }
        let pending = store.take_pending();
        let mut scheduler = scheduler(100, 10);
        let report = scheduler.drain(&pending);

        assert_eq!(report.submissions, 3);
        assert_eq!(report.records, 25);
        let batch_sizes: Vec<usize> = scheduler.transfer().batches.iter().map(Vec::len).collect();
        assert_eq!(batch_sizes, vec![10, 10, 5]);
        assert!(!store.has_changes());
        assert_eq!(scheduler.transfer().mirror.record(72), record(24));
    }

    #[test]
    fn contiguous_slots_coalesce_into_one_region() {
        let mut store = InstanceStore::new(32);
        for slot in [4, 5, 6, 10, 11, 20] {
            store.write(slot, record(slot as u32));
        }
        let mut scheduler = scheduler(32, 16);
        let report = scheduler.drain(&store.take_pending());

        assert_eq!(report.submissions, 1);
        assert_eq!(
            scheduler.transfer().batches[0],
            vec![region(4, 3, 0), region(10, 2, 3), region(20, 1, 5)]
        );
    }

    #[test]
    fn a_run_split_by_a_full_staging_area_starts_a_new_region() {
        let mut store = InstanceStore::new(16);
        for slot in 0..5 {
            store.write(slot, record(slot as u32));
        }
        let mut scheduler = scheduler(16, 3);
        scheduler.drain(&store.take_pending());

        let batches = &scheduler.transfer().batches;
        assert_eq!(batches[0], vec![region(0, 3, 0)]);
        assert_eq!(batches[1], vec![region(3, 2, 0)]);
    }

    #[test]
    fn a_slot_written_many_times_uploads_once_with_the_latest_value() {
        let mut store = InstanceStore::new(8);
        for tag in 0..6 {
            store.write(3, record(tag));
        }
        let mut scheduler = scheduler(8, 4);
        let report = scheduler.drain(&store.take_pending());

        assert_eq!(report.records, 1);
        assert_eq!(scheduler.transfer().batches, vec![vec![region(3, 1, 0)]]);
        assert_eq!(scheduler.transfer().mirror.record(3), record(5));
    }

    #[test]
    fn nothing_dirty_submits_nothing() {
        let mut scheduler = scheduler(8, 4);
        let report = scheduler.drain(&[]);
        assert_eq!(report.submissions, 0);
        assert!(scheduler.transfer().batches.is_empty());
        assert_eq!(scheduler.last_report(), Some(report));
    }

    #[test]
    fn mirror_matches_store_after_drain() {
        let mut store = InstanceStore::new(40);
        for slot in (0..40).filter(|slot| slot % 7 != 0) {
            store.write(slot, record(slot as u32 * 11));
        }
        let mut scheduler = scheduler(40, 6);
        scheduler.drain(&store.take_pending());
        assert_eq!(scheduler.transfer().mirror.bytes(), store.as_bytes());
    }
}
