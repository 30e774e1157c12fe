//! Device-resident meshes and the vertex input layout.

use ash::vk;
use prism_core::{MeshData, Vertex};
use prism_gpu::upload::{upload_buffer, BufferDevice};
use prism_gpu::{GpuBuffer, ReleaseToken, Result};

/// Vertex buffer binding for [`Vertex`].
pub fn vertex_bindings() -> [vk::VertexInputBindingDescription; 1] {
    [vk::VertexInputBindingDescription::default()
        .binding(0)
        .stride(std::mem::size_of::<Vertex>() as u32)
        .input_rate(vk::VertexInputRate::VERTEX)]
}

/// Attribute locations: 0 position, 1 colour, 2 texture coordinate.
pub fn vertex_attributes() -> [vk::VertexInputAttributeDescription; 3] {
    [
        vk::VertexInputAttributeDescription::default()
            .location(0)
            .binding(0)
            .format(vk::Format::R32G32B32_SFLOAT)
            .offset(std::mem::offset_of!(Vertex, position) as u32),
        vk::VertexInputAttributeDescription::default()
            .location(1)
            .binding(0)
            .format(vk::Format::R32G32B32_SFLOAT)
            .offset(std::mem::offset_of!(Vertex, color) as u32),
        vk::VertexInputAttributeDescription::default()
            .location(2)
            .binding(0)
            .format(vk::Format::R32G32_SFLOAT)
            .offset(std::mem::offset_of!(Vertex, tex_coord) as u32),
    ]
}

/// Vertex and index buffers for one mesh.
#[derive(Debug)]
pub struct MeshBuffers<B> {
    pub vertex_buffer: B,
    pub index_buffer: B,
    pub vertex_count: u32,
    pub index_count: u32,
}

/// A mesh living in device-local memory.
pub type GpuMesh = MeshBuffers<GpuBuffer>;

/// Upload a mesh's vertices and indices through staging buffers.
pub fn upload_mesh_buffers<D: BufferDevice>(
    device: &mut D,
    mesh: &MeshData,
    name: &str,
) -> Result<MeshBuffers<D::Buffer>> {
    let vertex_buffer = upload_buffer(
        device,
        mesh.vertex_bytes(),
        vk::BufferUsageFlags::VERTEX_BUFFER,
        &format!("{name} vertices"),
    )?;
    let index_buffer = match upload_buffer(
        device,
        mesh.index_bytes(),
        vk::BufferUsageFlags::INDEX_BUFFER,
        &format!("{name} indices"),
    ) {
        Ok(buffer) => buffer,
        Err(e) => {
            device.destroy(vertex_buffer)?;
            return Err(e);
        }
    };

    Ok(MeshBuffers {
        vertex_buffer,
        index_buffer,
        vertex_count: mesh.vertices.len() as u32,
        index_count: mesh.index_count(),
    })
}

impl GpuMesh {
    /// Raw buffer handles for binding.
    pub fn handles(&self) -> (vk::Buffer, vk::Buffer) {
        (self.vertex_buffer.buffer, self.index_buffer.buffer)
    }

    pub fn into_release_tokens(self) -> [ReleaseToken; 2] {
        [
            ReleaseToken::Buffer(self.vertex_buffer),
            ReleaseToken::Buffer(self.index_buffer),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpu_allocator::MemoryLocation;

    #[derive(Default)]
    struct CountingDevice {
        live: Vec<(u32, u64, vk::BufferUsageFlags)>,
        next: u32,
    }

    impl BufferDevice for CountingDevice {
        type Buffer = u32;

        fn create_buffer(
            &mut self,
            size: u64,
            usage: vk::BufferUsageFlags,
            _location: MemoryLocation,
            _name: &str,
        ) -> Result<u32> {
            self.next += 1;
            self.live.push((self.next, size, usage));
            Ok(self.next)
        }

        fn buffer_size(&self, buffer: &u32) -> u64 {
            self.live.iter().find(|(id, ..)| id == buffer).map_or(0, |b| b.1)
        }

        fn write(&mut self, _buffer: &u32, _data: &[u8]) -> Result<()> {
            Ok(())
        }

        fn read(&mut self, _buffer: &u32, len: usize) -> Result<Vec<u8>> {
            Ok(vec![0; len])
        }

        fn copy_and_wait(&mut self, _src: &u32, _dst: &u32, _size: u64) -> Result<()> {
            Ok(())
        }

        fn destroy(&mut self, buffer: u32) -> Result<()> {
            self.live.retain(|(id, ..)| *id != buffer);
            Ok(())
        }
    }

    #[test]
    fn attribute_offsets_match_vertex() {
        let attributes = vertex_attributes();
        assert_eq!(attributes[0].offset, 0);
        assert_eq!(attributes[1].offset, 12);
        assert_eq!(attributes[2].offset, 24);
        assert_eq!(vertex_bindings()[0].stride, 32);
    }

    #[test]
    fn cube_upload_sizes_and_usage() {
        let mesh = MeshData::cube();
        let mut device = CountingDevice::default();
        let buffers = upload_mesh_buffers(&mut device, &mesh, "cube").unwrap();

        assert_eq!(buffers.index_count, 36);
        assert_eq!(buffers.vertex_count, 24);
        assert_eq!(device.buffer_size(&buffers.vertex_buffer), 24 * 32);
        assert_eq!(device.buffer_size(&buffers.index_buffer), 36 * 4);
        // Staging buffers are gone; only the two destinations remain.
        assert_eq!(device.live.len(), 2);
        assert!(device
            .live
            .iter()
            .any(|(_, _, usage)| usage.contains(vk::BufferUsageFlags::INDEX_BUFFER)));
    }
}
