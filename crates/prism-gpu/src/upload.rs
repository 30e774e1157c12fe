//! Host-to-device buffer transfer through staging buffers.
//!
//! The upload path is written against [`BufferDevice`] so the staging protocol
//! (allocate, fill, copy, wait for queue idle, release) can be checked without a
//! GPU. [`VulkanTransfer`] is the real implementation.

use crate::command::{execute_single_time_commands, CommandPool};
use crate::context::DeviceContext;
use crate::error::{GpuError, Result};
use crate::memory::{GpuAllocator, GpuBuffer};
use ash::vk;
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;

/// The buffer operations the staging protocol needs.
pub trait BufferDevice {
    type Buffer;

    /// Allocate a buffer of exactly `size` bytes.
    fn create_buffer(
        &mut self,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<Self::Buffer>;

    /// Byte size of a buffer.
    fn buffer_size(&self, buffer: &Self::Buffer) -> u64;

    /// Write into a host-visible buffer.
    fn write(&mut self, buffer: &Self::Buffer, data: &[u8]) -> Result<()>;

    /// Read `len` bytes out of a host-visible buffer.
    fn read(&mut self, buffer: &Self::Buffer, len: usize) -> Result<Vec<u8>>;

    /// Copy `size` bytes between buffers and block until the queue is idle.
    fn copy_and_wait(&mut self, src: &Self::Buffer, dst: &Self::Buffer, size: u64) -> Result<()>;

    /// Release a buffer.
    fn destroy(&mut self, buffer: Self::Buffer) -> Result<()>;
}

/// Allocate a host-visible staging buffer already filled with `data`.
pub fn create_staging<D: BufferDevice>(device: &mut D, data: &[u8], name: &str) -> Result<D::Buffer> {
    let staging = device.create_buffer(
        data.len() as u64,
        vk::BufferUsageFlags::TRANSFER_SRC,
        MemoryLocation::CpuToGpu,
        name,
    )?;
    if let Err(e) = device.write(&staging, data) {
        device.destroy(staging)?;
        return Err(e);
    }
    Ok(staging)
}

/// Upload `data` into a new device-local buffer with `usage`.
///
/// The staging buffer is released only after the copy has completed.
#[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
pub fn upload_buffer<D: BufferDevice>(
    device: &mut D,
    data: &[u8],
    usage: vk::BufferUsageFlags,
    name: &str,
) -> Result<D::Buffer> {
    if data.is_empty() {
        return Err(GpuError::InvalidState(format!("{name}: empty upload")));
    }
    let size = data.len() as u64;

    let staging = create_staging(device, data, &format!("{name} staging"))?;

    let destination = match device.create_buffer(
        size,
        usage | vk::BufferUsageFlags::TRANSFER_DST,
        MemoryLocation::GpuOnly,
        name,
    ) {
        Ok(buffer) => buffer,
        Err(e) => {
            device.destroy(staging)?;
            return Err(e);
        }
    };

    if let Err(e) = device.copy_and_wait(&staging, &destination, size) {
        device.destroy(staging)?;
        device.destroy(destination)?;
        return Err(e);
    }

    device.destroy(staging)?;
    tracing::debug!("Uploaded {name}: {size} bytes");

    Ok(destination)
}

/// Copy the first `len` bytes of a device buffer back to the host.
///
/// `source` must have been created with `TRANSFER_SRC` usage.
pub fn read_back<D: BufferDevice>(device: &mut D, source: &D::Buffer, len: usize) -> Result<Vec<u8>> {
    let staging = device.create_buffer(
        len as u64,
        vk::BufferUsageFlags::TRANSFER_DST,
        MemoryLocation::GpuToCpu,
        "readback staging",
    )?;

    let result = device
        .copy_and_wait(source, &staging, len as u64)
        .and_then(|()| device.read(&staging, len));
    device.destroy(staging)?;
    result
}

/// Transfer context over the graphics queue with a transient command pool.
pub struct VulkanTransfer<'a> {
    device: &'a ash::Device,
    allocator: &'a Mutex<GpuAllocator>,
    queue: vk::Queue,
    pool: CommandPool,
}

impl<'a> VulkanTransfer<'a> {
    /// Create a transfer context for a device.
    pub fn new(context: &'a DeviceContext) -> Result<Self> {
        let device = context.device();
        let pool = unsafe {
            CommandPool::new(
                device,
                context.queue_families().graphics,
                vk::CommandPoolCreateFlags::TRANSIENT,
            )?
        };

        Ok(Self {
            device,
            allocator: context.allocator(),
            queue: context.graphics_queue(),
            pool,
        })
    }

    /// Record commands with `f`, submit them and wait for the queue to drain.
    pub fn run_once<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer) -> R,
    {
        unsafe {
            execute_single_time_commands(self.device, &self.pool, self.queue, |cmd| {
                f(self.device, cmd)
            })
        }
    }

    pub fn allocator(&self) -> &Mutex<GpuAllocator> {
        self.allocator
    }
}

impl Drop for VulkanTransfer<'_> {
    fn drop(&mut self) {
        unsafe { self.pool.destroy(self.device) };
    }
}

impl BufferDevice for VulkanTransfer<'_> {
    type Buffer = GpuBuffer;

    fn create_buffer(
        &mut self,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<GpuBuffer> {
        self.allocator.lock().create_buffer(size, usage, location, name)
    }

    fn buffer_size(&self, buffer: &GpuBuffer) -> u64 {
        buffer.size
    }

    fn write(&mut self, buffer: &GpuBuffer, data: &[u8]) -> Result<()> {
        buffer.write_bytes(0, data)
    }

    fn read(&mut self, buffer: &GpuBuffer, len: usize) -> Result<Vec<u8>> {
        buffer.read_bytes(0, len)
    }

    fn copy_and_wait(&mut self, src: &GpuBuffer, dst: &GpuBuffer, size: u64) -> Result<()> {
        let region = vk::BufferCopy::default().size(size);
        self.run_once(|device, cmd| unsafe {
            device.cmd_copy_buffer(cmd, src.buffer, dst.buffer, &[region]);
        })
    }

    fn destroy(&mut self, mut buffer: GpuBuffer) -> Result<()> {
        self.allocator.lock().free_buffer(&mut buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::{MeshData, Vertex};
    use std::collections::HashMap;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Create { id: u32, size: u64, location: MemoryLocation },
        Copy { src: u32, dst: u32 },
        QueueIdle,
        Destroy { id: u32 },
    }

    #[derive(Debug)]
    struct MockBuffer {
        id: u32,
        size: u64,
    }

    #[derive(Default)]
    struct MockDevice {
        next_id: u32,
        memory: HashMap<u32, Vec<u8>>,
        events: Vec<Event>,
        fail_copy: bool,
    }

    impl MockDevice {
        fn live(&self) -> usize {
            self.memory.len()
        }
    }

    impl BufferDevice for MockDevice {
        type Buffer = MockBuffer;

        fn create_buffer(
            &mut self,
            size: u64,
            _usage: vk::BufferUsageFlags,
            location: MemoryLocation,
            _name: &str,
        ) -> Result<MockBuffer> {
            self.next_id += 1;
            let id = self.next_id;
            self.memory.insert(id, vec![0; size as usize]);
            self.events.push(Event::Create { id, size, location });
            Ok(MockBuffer { id, size })
        }

        fn buffer_size(&self, buffer: &MockBuffer) -> u64 {
            buffer.size
        }

        fn write(&mut self, buffer: &MockBuffer, data: &[u8]) -> Result<()> {
            self.memory.get_mut(&buffer.id).unwrap()[..data.len()].copy_from_slice(data);
            Ok(())
        }

        fn read(&mut self, buffer: &MockBuffer, len: usize) -> Result<Vec<u8>> {
            Ok(self.memory[&buffer.id][..len].to_vec())
        }

        fn copy_and_wait(&mut self, src: &MockBuffer, dst: &MockBuffer, size: u64) -> Result<()> {
            if self.fail_copy {
                return Err(GpuError::Vulkan(vk::Result::ERROR_DEVICE_LOST));
            }
            let bytes = self.memory[&src.id][..size as usize].to_vec();
            self.memory.get_mut(&dst.id).unwrap()[..size as usize].copy_from_slice(&bytes);
            self.events.push(Event::Copy {
                src: src.id,
                dst: dst.id,
            });
            self.events.push(Event::QueueIdle);
            Ok(())
        }

        fn destroy(&mut self, buffer: MockBuffer) -> Result<()> {
            self.memory.remove(&buffer.id);
            self.events.push(Event::Destroy { id: buffer.id });
            Ok(())
        }
    }

    #[test]
    fn upload_then_read_back_matches() {
        let mut device = MockDevice::default();
        let data: Vec<u8> = (0..=255).collect();

        let buffer = upload_buffer(
            &mut device,
            &data,
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_SRC,
            "round trip",
        )
        .unwrap();
        let back = read_back(&mut device, &buffer, data.len()).unwrap();

        assert_eq!(back, data);
        // Only the destination survives; both staging buffers are gone.
        assert_eq!(device.live(), 1);
    }

    #[test]
    fn mesh_buffers_sized_exactly() {
        let vertices: Vec<Vertex> = (0..1000)
            .map(|i| Vertex::new([i as f32, 0.0, 0.0], [1.0; 3], [0.0; 2]))
            .collect();
        let indices: Vec<u32> = (0..3000).map(|i| i % 1000).collect();
        let mesh = MeshData::new(vertices, indices).unwrap();

        let mut device = MockDevice::default();
        let vertex_buffer = upload_buffer(
            &mut device,
            mesh.vertex_bytes(),
            vk::BufferUsageFlags::VERTEX_BUFFER,
            "vertices",
        )
        .unwrap();
        let index_buffer = upload_buffer(
            &mut device,
            mesh.index_bytes(),
            vk::BufferUsageFlags::INDEX_BUFFER,
            "indices",
        )
        .unwrap();

        assert_eq!(
            device.buffer_size(&vertex_buffer),
            1000 * std::mem::size_of::<Vertex>() as u64
        );
        assert_eq!(
            device.buffer_size(&index_buffer),
            3000 * std::mem::size_of::<u32>() as u64
        );
        assert_eq!(device.live(), 2);
    }

    #[test]
    fn staging_released_after_queue_idle() {
        let mut device = MockDevice::default();
        let dst = upload_buffer(&mut device, &[1, 2, 3, 4], vk::BufferUsageFlags::INDEX_BUFFER, "idx")
            .unwrap();

        let staging_id = device
            .events
            .iter()
            .find_map(|e| match e {
                Event::Create {
                    id,
                    location: MemoryLocation::CpuToGpu,
                    ..
                } => Some(*id),
                _ => None,
            })
            .unwrap();

        let idle_at = device.events.iter().position(|e| *e == Event::QueueIdle).unwrap();
        let destroyed_at = device
            .events
            .iter()
            .position(|e| *e == Event::Destroy { id: staging_id })
            .unwrap();
        let copy_at = device
            .events
            .iter()
            .position(|e| {
                *e == Event::Copy {
                    src: staging_id,
                    dst: dst.id,
                }
            })
            .unwrap();

        assert!(copy_at < idle_at);
        assert!(idle_at < destroyed_at);
    }

    #[test]
    fn failed_copy_releases_everything() {
        let mut device = MockDevice {
            fail_copy: true,
            ..Default::default()
        };
        let err = upload_buffer(&mut device, &[0; 16], vk::BufferUsageFlags::VERTEX_BUFFER, "v");
        assert!(err.is_err());
        assert_eq!(device.live(), 0);
    }

    #[test]
    fn empty_upload_rejected() {
        let mut device = MockDevice::default();
        let err = upload_buffer(&mut device, &[], vk::BufferUsageFlags::VERTEX_BUFFER, "empty");
        assert!(matches!(err, Err(GpuError::InvalidState(_))));
        assert!(device.events.is_empty());
    }
}
