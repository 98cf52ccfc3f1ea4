use super::*;

/// One staging-to-mirror copy, in bytes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CopyRegion {
    pub src_offset: u64,
    pub dst_offset: u64,
    pub size: u64,
}

/// Destination of coalesced instance uploads.
///
/// `submit` must have finished copying `staging` into the mirror by the time it
/// returns; the staging bytes are reused for the next batch.
pub trait TransferBackend {
    fn submit(&mut self, staging: &[u8], regions: &[CopyRegion]);
}

/// Mirror kept in host memory. Used when running without a GPU.
#[derive(Clone, Debug)]
pub struct HostMirror {
    bytes: Vec<u8>,
    submissions: usize,
}

impl HostMirror {
    pub fn new(total_slots: usize) -> Self {
        Self {
            bytes: vec![0; total_slots * RECORD_SIZE],
            submissions: 0,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn record(&self, slot: usize) -> BlockInstance {
        let start = slot * RECORD_SIZE;
        bytemuck::pod_read_unaligned(&self.bytes[start..start + RECORD_SIZE])
    }

    pub fn submissions(&self) -> usize {
        self.submissions
    }
}

impl TransferBackend for HostMirror {
    fn submit(&mut self, staging: &[u8], regions: &[CopyRegion]) {
        for region in regions {
            let src = region.src_offset as usize;
            let dst = region.dst_offset as usize;
            let size = region.size as usize;
            self.bytes[dst..dst + size].copy_from_slice(&staging[src..src + size]);
        }
        self.submissions += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_mirror_applies_each_region() {
        let mut mirror = HostMirror::new(4);
        let mut record = BlockInstance::zeroed();
        record.flags = [9, 0, 0, 0];
        let staging = bytemuck::bytes_of(&record).to_vec();
        mirror.submit(
            &staging,
            &[CopyRegion {
                src_offset: 0,
                dst_offset: (2 * RECORD_SIZE) as u64,
                size: RECORD_SIZE as u64,
            }],
        );
        assert_eq!(mirror.record(2), record);
        assert_eq!(mirror.record(1), BlockInstance::zeroed());
        assert_eq!(mirror.submissions(), 1);
    }
}
