use super::*;

/// Identity of a block type that owns an instance category.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

/// Stable arena handle of a category window.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CategoryHandle(pub(super) usize);

impl CategoryHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Half-open range of instance slots `[start, start + len)`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CategoryRange {
    pub start: usize,
    pub len: usize,
}

impl CategoryRange {
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, slot: usize) -> bool {
        self.start <= slot && slot < self.end()
    }

    /// Instance range for an instanced draw call.
    pub fn instances(&self) -> std::ops::Range<u32> {
        self.start as u32..self.end() as u32
    }
}

pub const RECORD_SIZE: usize = std::mem::size_of::<BlockInstance>();

// wgpu copies must be 4-byte aligned.
const _: () = assert!(RECORD_SIZE % wgpu::COPY_BUFFER_ALIGNMENT as usize == 0);

pub const fn face_bit_mask(axis: u8, direction: u8) -> u32 {
    1u32 << ((axis * 2) + direction)
}

/// Per-instance data for one block, laid out for an instance-rate vertex buffer.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct BlockInstance {
    /// Chunk position (xyz) padded to a vec4.
    pub chunk_offset: [f32; 4],
    /// Column-major local transform of the block inside its chunk.
    pub model: [[f32; 4]; 4],
    /// `flags[0]` is the face visibility mask, see [`face_bit_mask`].
    pub flags: [u32; 4],
}

impl Default for BlockInstance {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl BlockInstance {
    pub fn at(coordinate: &Coordinate) -> Self {
        let chunk = coordinate.chunk();
        let local = coordinate.local();
        let model = Matrix4::from_translation(Vector3::new(
            local[0] as f32,
            local[1] as f32,
            local[2] as f32,
        ));
        Self {
            chunk_offset: [chunk[0] as f32, chunk[1] as f32, chunk[2] as f32, 0.0],
            model: model.into(),
            flags: [0; 4],
        }
    }

    pub fn face_visibility(&self) -> u32 {
        self.flags[0]
    }

    pub fn is_face_visible(&self, axis: u8, direction: u8) -> bool {
        self.flags[0] & face_bit_mask(axis, direction) != 0
    }

    pub fn set_face_visible(&mut self, axis: u8, direction: u8, visible: bool) {
        let mask = face_bit_mask(axis, direction);
        if visible {
            self.flags[0] |= mask;
        } else {
            self.flags[0] &= !mask;
        }
    }

    /// Instance attributes starting at `first_location`: chunk offset, four model
    /// columns, then the flags.
    pub fn vertex_attributes(first_location: u32) -> [wgpu::VertexAttribute; 6] {
        let model = std::mem::offset_of!(BlockInstance, model) as wgpu::BufferAddress;
        let column = std::mem::size_of::<[f32; 4]>() as wgpu::BufferAddress;
        [
            wgpu::VertexAttribute {
                format: wgpu::VertexFormat::Float32x3,
                offset: std::mem::offset_of!(BlockInstance, chunk_offset) as wgpu::BufferAddress,
                shader_location: first_location,
            },
            wgpu::VertexAttribute {
                format: wgpu::VertexFormat::Float32x4,
                offset: model,
                shader_location: first_location + 1,
            },
            wgpu::VertexAttribute {
                format: wgpu::VertexFormat::Float32x4,
                offset: model + column,
                shader_location: first_location + 2,
            },
            wgpu::VertexAttribute {
                format: wgpu::VertexFormat::Float32x4,
                offset: model + 2 * column,
                shader_location: first_location + 3,
            },
            wgpu::VertexAttribute {
                format: wgpu::VertexFormat::Float32x4,
                offset: model + 3 * column,
                shader_location: first_location + 4,
            },
            wgpu::VertexAttribute {
                format: wgpu::VertexFormat::Uint32x4,
                offset: std::mem::offset_of!(BlockInstance, flags) as wgpu::BufferAddress,
                shader_location: first_location + 5,
            },
        ]
    }

    pub fn vertex_layout(attributes: &[wgpu::VertexAttribute]) -> wgpu::VertexBufferLayout<'_> {
        wgpu::VertexBufferLayout {
            array_stride: RECORD_SIZE as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_is_96_bytes() {
        assert_eq!(RECORD_SIZE, 96);
    }

    #[test]
    fn instance_at_places_block_inside_chunk() {
        let instance = BlockInstance::at(&Coordinate::new([1, -2, 3], [4, 5, 6]));
        assert_eq!(instance.chunk_offset, [1.0, -2.0, 3.0, 0.0]);
        assert_eq!(instance.model[3], [4.0, 5.0, 6.0, 1.0]);
        assert_eq!(instance.model[0], [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(instance.face_visibility(), 0);
    }

    #[test]
    fn face_bits_toggle_independently() {
        let mut instance = BlockInstance::default();
        instance.set_face_visible(0, 1, true);
        instance.set_face_visible(2, 0, true);
        assert_eq!(instance.face_visibility(), 0b01_00_10);
        instance.set_face_visible(0, 1, false);
        assert!(!instance.is_face_visible(0, 1));
        assert!(instance.is_face_visible(2, 0));
    }

    #[test]
    fn vertex_attributes_follow_record_layout() {
        let attributes = BlockInstance::vertex_attributes(2);
        let offsets: Vec<u64> = attributes.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 16, 32, 48, 64, 80]);
        assert_eq!(attributes[5].shader_location, 7);
        let layout = BlockInstance::vertex_layout(&attributes);
        assert_eq!(layout.array_stride, 96);
        assert_eq!(layout.step_mode, wgpu::VertexStepMode::Instance);
    }
}
