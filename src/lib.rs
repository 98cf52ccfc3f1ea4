pub mod config;
pub mod coordinate;
pub mod error;
pub mod instances;

use std::sync::Arc;

pub use crate::config::InstanceBufferConfig;
pub use crate::coordinate::{ChunkPos, Coordinate, CHUNK_SIDE_LENGTH, CHUNK_VOLUME};
pub use crate::error::InstanceBufferError;
pub use crate::instances::{
    BlockId, BlockInstance, BlockInstanceBuffer, CategoryRange, CategorySnapshot, DrainReport,
    HostMirror, TransferBackend, WgpuMirror,
};

const STONE: BlockId = BlockId(1);
const DIRT: BlockId = BlockId(2);
const GRASS: BlockId = BlockId(3);
const DEMO_BLOCKS: [BlockId; 3] = [STONE, DIRT, GRASS];

const DEMO_CHUNK_RADIUS: i32 = 1;
const DEMO_FRAMES: usize = 30;
const DEMO_EDITS_PER_FRAME: usize = 64;

struct DemoRng {
    state: u64,
}

impl DemoRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u32(&mut self) -> u32 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.state >> 32) as u32
    }

    fn below(&mut self, bound: u32) -> u32 {
        self.next_u32() % bound
    }
}

fn layered_terrain(chunk: ChunkPos) -> Vec<(Coordinate, Option<BlockId>)> {
    coordinate::chunk_coordinates(chunk)
        .into_iter()
        .filter_map(|c| {
            let id = match c.local()[1] {
                0..=3 => STONE,
                4..=5 => DIRT,
                6 => GRASS,
                _ => return None,
            };
            Some((c, Some(id)))
        })
        .collect()
}

fn log_committed(frame: usize, snapshot: &CategorySnapshot) {
    for (id, range) in snapshot.draw_ranges() {
        log::debug!(
            "frame {frame}: block {} draws instances {:?}",
            id.0,
            range.instances()
        );
    }
    log::debug!(
        "frame {frame}: empty {:?}, unallocated {:?}",
        snapshot.empty_range(),
        snapshot.unallocated_range()
    );
}

async fn arun() -> Result<(), InstanceBufferError> {
    let config = InstanceBufferConfig::from_env();
    config.validate()?;

    let (device, queue) = instances::request_headless_device().await?;
    let mirror = WgpuMirror::new(Arc::new(device), Arc::new(queue), &config)?;
    let buffer = BlockInstanceBuffer::new(&config, &DEMO_BLOCKS, mirror)?;

    let mut loaded = Vec::new();
    for x in -DEMO_CHUNK_RADIUS..=DEMO_CHUNK_RADIUS {
        for z in -DEMO_CHUNK_RADIUS..=DEMO_CHUNK_RADIUS {
            let chunk = [x, 0, z];
            if let Err(error) = buffer.on_loading_chunk(chunk) {
                log::warn!("stopped loading chunks: {error}");
                break;
            }
            buffer.on_voxels_changed(&layered_terrain(chunk))?;
            loaded.push(chunk);
        }
    }
    let report = buffer.drain();
    log::info!(
        "uploaded {} chunks: {} records in {} submissions",
        loaded.len(),
        report.records,
        report.submissions
    );
    log_committed(0, &buffer.committed());

    if loaded.is_empty() {
        return Ok(());
    }
    let mut rng = DemoRng::new(0x5eed);
    for frame in 1..=DEMO_FRAMES {
        let edits: Vec<(Coordinate, Option<BlockId>)> = (0..DEMO_EDITS_PER_FRAME)
            .map(|_| {
                let chunk = loaded[rng.below(loaded.len() as u32) as usize];
                let local = [
                    rng.below(CHUNK_SIDE_LENGTH as u32) as i32,
                    rng.below(CHUNK_SIDE_LENGTH as u32) as i32,
                    rng.below(CHUNK_SIDE_LENGTH as u32) as i32,
                ];
                let choice = rng.below(DEMO_BLOCKS.len() as u32 + 1) as usize;
                (Coordinate::new(chunk, local), DEMO_BLOCKS.get(choice).copied())
            })
            .collect();
        buffer.on_voxels_changed(&edits)?;
        let report = buffer.drain();
        log::info!(
            "frame {frame}: {} records, {} regions, {} submissions in {:?}",
            report.records,
            report.regions,
            report.submissions,
            report.elapsed
        );
        log_committed(frame, &buffer.committed());
    }

    if let Some(&chunk) = loaded.last() {
        buffer.on_unloading_chunk(chunk);
        buffer.drain();
        log_committed(DEMO_FRAMES + 1, &buffer.committed());
    }
    Ok(())
}

pub fn run() {
    env_logger::init();
    if let Err(error) = pollster::block_on(arun()) {
        log::error!("block instance demo failed: {error}");
    }
}
