//! What the renderer consumes from the scene: a stream of draws, each with a
//! transform, a material set and mesh buffers. No entity identity or hierarchy.

use ash::vk;
use glam::{Mat3, Mat4};
use crate::renderer::resources::mesh::GpuMesh;
use crate::renderer::resources::pipeline::GraphicsPipeline;
use crate::renderer::shader_data::PushConstants;

/// Handles to buffers owned elsewhere, used for binding only and never destroyed
/// through this struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshBuffers {
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: vk::Buffer,
    pub index_count: u32,
}

impl From<&GpuMesh> for MeshBuffers {
    fn from(mesh: &GpuMesh) -> Self {
        Self {
            vertex_buffer: mesh.vertex_buffer.buffer,
            index_buffer: mesh.index_buffer.buffer,
            index_count: mesh.index_count,
        }
    }
}

pub trait Renderable {
    fn model_matrix(&self) -> Mat4;

    /// Inverse-transpose of the model matrix's upper 3x3 by default
    fn normal_matrix(&self) -> Mat3 {
        Mat3::from_mat4(self.model_matrix()).inverse().transpose()
    }

    fn material_set(&self) -> vk::DescriptorSet;

    fn mesh(&self) -> MeshBuffers;
}

/// Push-constant stages used by [`record_draws`]
pub const PUSH_CONSTANT_STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::from_raw(
    vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw(),
);

pub fn push_constant_range() -> vk::PushConstantRange {
    vk::PushConstantRange {
        stage_flags: PUSH_CONSTANT_STAGES,
        offset: 0,
        size: size_of::<PushConstants>() as u32,
    }
}

/// Binds `pipeline` and the global set (set 0) once, then for every renderable
/// binds its material set (set 1), pushes its matrices and draws it indexed.
/// Renderables with no indices are skipped.
pub fn record_draws<'a>(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    pipeline: &GraphicsPipeline,
    global_set: vk::DescriptorSet,
    renderables: impl IntoIterator<Item = &'a dyn Renderable>,
) -> u32 {
    pipeline.bind(cmd);
    pipeline.bind_descriptor_sets(cmd, 0, &[global_set]);

    let mut draws = 0;
    for renderable in renderables {
        let mesh = renderable.mesh();
        if mesh.index_count == 0 {
            continue;
        }
        let push = PushConstants::new(renderable.model_matrix(), renderable.normal_matrix());

        pipeline.bind_descriptor_sets(cmd, 1, &[renderable.material_set()]);
        pipeline.push_constants(cmd, PUSH_CONSTANT_STAGES, push.as_bytes());
        unsafe {
            device.cmd_bind_vertex_buffers(cmd, 0, &[mesh.vertex_buffer], &[0]);
            device.cmd_bind_index_buffer(cmd, mesh.index_buffer, 0, vk::IndexType::UINT32);
            device.cmd_draw_indexed(cmd, mesh.index_count, 1, 0, 0, 0);
        }
        draws += 1;
    }
    log::trace!("Recorded {} draws", draws);
    draws
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    struct Scaled(Vec3);

    impl Renderable for Scaled {
        fn model_matrix(&self) -> Mat4 {
            Mat4::from_scale(self.0)
        }

        fn material_set(&self) -> vk::DescriptorSet {
            vk::DescriptorSet::null()
        }

        fn mesh(&self) -> MeshBuffers {
            MeshBuffers {
                vertex_buffer: vk::Buffer::null(),
                index_buffer: vk::Buffer::null(),
                index_count: 0,
            }
        }
    }

    #[test]
    fn test_default_normal_matrix_inverts_scale() {
        let normal = Scaled(Vec3::new(2.0, 4.0, 1.0)).normal_matrix();
        assert!(normal.abs_diff_eq(Mat3::from_diagonal(Vec3::new(0.5, 0.25, 1.0)), 1e-6));
    }

    #[test]
    fn test_push_constant_range_covers_both_matrices() {
        let range = push_constant_range();
        assert_eq!(range.size, 128);
        assert_eq!(range.offset, 0);
        assert!(range.stage_flags.contains(vk::ShaderStageFlags::VERTEX));
        assert!(range.stage_flags.contains(vk::ShaderStageFlags::FRAGMENT));
    }
}
