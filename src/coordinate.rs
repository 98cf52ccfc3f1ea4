use std::cmp::Ordering;
use std::fmt;

pub const CHUNK_SIDE_LENGTH: i32 = 16;
pub const CHUNK_VOLUME: usize =
    (CHUNK_SIDE_LENGTH * CHUNK_SIDE_LENGTH * CHUNK_SIDE_LENGTH) as usize;

pub type ChunkPos = [i32; 3];

/// A block position split into its chunk and the block offset inside that chunk.
///
/// `local` is always kept inside `[0, CHUNK_SIDE_LENGTH)` on every axis.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Coordinate {
    chunk: ChunkPos,
    local: [i32; 3],
}

impl Coordinate {
    /// Builds a coordinate, carrying any out-of-range local component into the chunk.
    pub fn new(chunk: ChunkPos, local: [i32; 3]) -> Self {
        let mut result = Self {
            chunk,
            local: [0; 3],
        };
        for axis in 0..3 {
            result.chunk[axis] += local[axis].div_euclid(CHUNK_SIDE_LENGTH);
            result.local[axis] = local[axis].rem_euclid(CHUNK_SIDE_LENGTH);
        }
        result
    }

    pub fn from_global(global: [i64; 3]) -> Self {
        let side = CHUNK_SIDE_LENGTH as i64;
        let mut chunk = [0i32; 3];
        let mut local = [0i32; 3];
        for axis in 0..3 {
            chunk[axis] = global[axis].div_euclid(side) as i32;
            local[axis] = global[axis].rem_euclid(side) as i32;
        }
        Self { chunk, local }
    }

    pub fn to_global(&self) -> [i64; 3] {
        let side = CHUNK_SIDE_LENGTH as i64;
        [
            self.chunk[0] as i64 * side + self.local[0] as i64,
            self.chunk[1] as i64 * side + self.local[1] as i64,
            self.chunk[2] as i64 * side + self.local[2] as i64,
        ]
    }

    pub fn chunk(&self) -> ChunkPos {
        self.chunk
    }

    pub fn local(&self) -> [i32; 3] {
        self.local
    }

    pub fn offset(&self, delta: [i32; 3]) -> Self {
        Self::new(
            self.chunk,
            [
                self.local[0] + delta[0],
                self.local[1] + delta[1],
                self.local[2] + delta[2],
            ],
        )
    }

    /// The adjacent block along `axis`; direction 0 is negative, 1 is positive.
    pub fn neighbor(&self, axis: usize, direction: u8) -> Self {
        debug_assert!(axis < 3 && direction < 2);
        let mut delta = [0; 3];
        delta[axis] = if direction == 0 { -1 } else { 1 };
        self.offset(delta)
    }
}

// Sorted by chunk then block, each compared y, z, x.
impl Ord for Coordinate {
    fn cmp(&self, other: &Self) -> Ordering {
        let key = |c: &Coordinate| {
            (
                c.chunk[1], c.chunk[2], c.chunk[0], c.local[1], c.local[2], c.local[0],
            )
        };
        key(self).cmp(&key(other))
    }
}

impl PartialOrd for Coordinate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{}, {}, {}>:<{}, {}, {}>",
            self.chunk[0], self.chunk[1], self.chunk[2], self.local[0], self.local[1], self.local[2]
        )
    }
}

/// Every block coordinate of a chunk, iterated y, z, x.
pub fn chunk_coordinates(chunk: ChunkPos) -> Vec<Coordinate> {
    let mut coordinates = Vec::with_capacity(CHUNK_VOLUME);
    for y in 0..CHUNK_SIDE_LENGTH {
        for z in 0..CHUNK_SIDE_LENGTH {
            for x in 0..CHUNK_SIDE_LENGTH {
                coordinates.push(Coordinate { chunk, local: [x, y, z] });
            }
        }
    }
    coordinates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_carries_local_overflow_into_chunk() {
        let c = Coordinate::new([0, 0, 0], [-1, 16, 35]);
        assert_eq!(c.chunk(), [-1, 1, 2]);
        assert_eq!(c.local(), [15, 0, 3]);
    }

    #[test]
    fn global_round_trip_handles_negatives() {
        let global = [-17, 5, 33];
        let c = Coordinate::from_global(global);
        assert_eq!(c.chunk(), [-2, 0, 2]);
        assert_eq!(c.local(), [15, 5, 1]);
        assert_eq!(c.to_global(), global);
    }

    #[test]
    fn neighbor_crosses_chunk_boundary() {
        let c = Coordinate::new([0, 0, 0], [15, 0, 7]);
        let right = c.neighbor(0, 1);
        assert_eq!(right.chunk(), [1, 0, 0]);
        assert_eq!(right.local(), [0, 0, 7]);
        let below = c.neighbor(1, 0);
        assert_eq!(below.chunk(), [0, -1, 0]);
        assert_eq!(below.local(), [15, 15, 7]);
        assert_eq!(right.neighbor(0, 0), c);
    }

    #[test]
    fn ordering_compares_chunk_before_local_and_y_first() {
        let low_chunk_high_local = Coordinate::new([0, 0, 0], [15, 15, 15]);
        let high_chunk = Coordinate::new([0, 1, 0], [0, 0, 0]);
        assert!(low_chunk_high_local < high_chunk);

        let x_bigger = Coordinate::new([0, 0, 0], [9, 0, 0]);
        let y_bigger = Coordinate::new([0, 0, 0], [0, 1, 0]);
        assert!(x_bigger < y_bigger);

        let chunk_x_bigger = Coordinate::new([5, 0, 0], [0, 0, 0]);
        let chunk_z_bigger = Coordinate::new([0, 0, 1], [0, 0, 0]);
        assert!(chunk_x_bigger < chunk_z_bigger);
    }

    #[test]
    fn chunk_coordinates_cover_the_chunk_in_sorted_order() {
        let coordinates = chunk_coordinates([2, -1, 3]);
        assert_eq!(coordinates.len(), CHUNK_VOLUME);
        assert!(coordinates.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(coordinates.iter().all(|c| c.chunk() == [2, -1, 3]));
    }
}
