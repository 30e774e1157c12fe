//! Scene-lifetime GPU resources: meshes, textures and materials.

use crate::draw::{MaterialId, MeshId, PipelineId, TextureId};
use crate::mesh::GpuMesh;
use ash::vk;
use hashbrown::HashMap;
use prism_gpu::descriptors::DescriptorPool;
use prism_gpu::{GpuAllocator, Texture};

/// A texture bound for sampling through a pipeline.
#[derive(Debug, Clone, Copy)]
pub struct Material {
    pub pipeline: PipelineId,
    pub texture: TextureId,
    pub set: vk::DescriptorSet,
}

/// Everything uploaded for the scene, keyed by handle.
pub struct SceneResources {
    pub(crate) meshes: HashMap<MeshId, GpuMesh>,
    pub(crate) textures: HashMap<TextureId, Texture>,
    pub(crate) materials: HashMap<MaterialId, Material>,
    pub(crate) material_pool: DescriptorPool,
    pub(crate) max_materials: u32,
    next_id: u32,
}

impl SceneResources {
    pub(crate) fn new(material_pool: DescriptorPool, max_materials: u32) -> Self {
        Self {
            meshes: HashMap::new(),
            textures: HashMap::new(),
            materials: HashMap::new(),
            material_pool,
            max_materials,
            next_id: 0,
        }
    }

    /// Handles are unique across all resource kinds.
    pub(crate) fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn mesh(&self, id: MeshId) -> Option<&GpuMesh> {
        self.meshes.get(&id)
    }

    pub fn texture(&self, id: TextureId) -> Option<&Texture> {
        self.textures.get(&id)
    }

    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(&id)
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    /// Destroy everything. Descriptor sets go with the pool.
    ///
    /// # Safety
    /// The device must be idle.
    pub(crate) unsafe fn destroy(
        &mut self,
        device: &ash::Device,
        allocator: &mut GpuAllocator,
    ) -> prism_gpu::Result<()> {
        self.materials.clear();
        device.destroy_descriptor_pool(self.material_pool.handle(), None);

        for (_, texture) in self.textures.drain() {
            texture.destroy(device, allocator)?;
        }
        for (_, mesh) in self.meshes.drain() {
            for token in mesh.into_release_tokens() {
                token.release(device, allocator)?;
            }
        }
        Ok(())
    }
}
