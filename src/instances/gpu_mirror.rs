use super::*;

/// GPU-resident instance buffer fed through a dedicated staging buffer.
pub struct WgpuMirror {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    staging_buffer: wgpu::Buffer,
    instance_buffer: wgpu::Buffer,
}

impl WgpuMirror {
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        config: &InstanceBufferConfig,
    ) -> Result<Self, InstanceBufferError> {
        let limit = device.limits().max_buffer_size;
        for bytes in [config.instance_buffer_bytes(), config.staging_bytes()] {
            if bytes > limit {
                return Err(InstanceBufferError::BufferTooLarge { bytes, limit });
            }
        }

        let staging_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Block Instance Staging Buffer"),
            size: config.staging_bytes(),
            usage: wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let instance_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Block Instance Buffer"),
            size: config.instance_buffer_bytes(),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(Self {
            device,
            queue,
            staging_buffer,
            instance_buffer,
        })
    }

    /// Instance-rate vertex buffer to bind with [`BlockInstance::vertex_layout`].
    pub fn instance_buffer(&self) -> &wgpu::Buffer {
        &self.instance_buffer
    }
}

impl TransferBackend for WgpuMirror {
    fn submit(&mut self, staging: &[u8], regions: &[CopyRegion]) {
        self.queue.write_buffer(&self.staging_buffer, 0, staging);
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Block Instance Upload"),
            });
        for region in regions {
            encoder.copy_buffer_to_buffer(
                &self.staging_buffer,
                region.src_offset,
                &self.instance_buffer,
                region.dst_offset,
                region.size,
            );
        }
        let submission = self.queue.submit(Some(encoder.finish()));
        // Staging is rewritten by the next batch, so wait for these copies.
        let result = self.device.poll(wgpu::Maintain::wait_for(submission));
        report_poll(result, regions.len());
    }
}

/// Returns whether the queue came back empty, logging when other work is
/// still queued behind this upload.
fn report_poll(result: wgpu::MaintainResult, regions: usize) -> bool {
    let queue_empty = result.is_queue_empty();
    if !queue_empty {
        log::debug!("instance upload of {regions} regions finished with other work still queued");
    }
    queue_empty
}

/// Device and queue without a surface, for uploading and testing off-screen.
pub async fn request_headless_device() -> Result<(wgpu::Device, wgpu::Queue), InstanceBufferError>
{
    let instance = wgpu::Instance::default();
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface: None,
        })
        .await
        .ok_or(InstanceBufferError::AdapterUnavailable)?;

    let mut required_limits = wgpu::Limits::downlevel_defaults();
    required_limits.max_buffer_size = adapter.limits().max_buffer_size;

    let (device, queue) = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Block Instance Device"),
                required_features: wgpu::Features::empty(),
                required_limits,
                memory_hints: wgpu::MemoryHints::MemoryUsage,
            },
            None,
        )
        .await
        .map_err(|error| InstanceBufferError::RequestDevice(error.to_string()))?;
    log::info!("using adapter {:?}", adapter.get_info().name);
    Ok((device, queue))
}
