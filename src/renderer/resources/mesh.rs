use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use glam::{Vec2, Vec3};
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::resources::buffer::Buffer;
use crate::renderer::resources::vertex::Vertex;

/// CPU-side indexed geometry
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Result<Self> {
        if let Some(bad) = indices.iter().find(|i| **i as usize >= vertices.len()) {
            return Err(eyre!("Index {} out of range for {} vertices", bad, vertices.len()));
        }
        Ok(Self { vertices, indices })
    }

    pub fn new_triangle() -> Self {
        let vertex = |position: [f32; 3], color: [f32; 3], uv: [f32; 2]| Vertex {
            position: position.into(),
            color: color.into(),
            normal: Vec3::Z,
            uv: uv.into(),
        };
        Self {
            vertices: vec![
                vertex([-0.5, -0.5, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0]),
                vertex([0.5, -0.5, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0]),
                vertex([0.0, 0.5, 0.0], [0.0, 0.0, 1.0], [0.5, 0.0]),
            ],
            indices: vec![0, 1, 2],
        }
    }

    /// Covers clip space; counter-clockwise winding
    pub fn new_quad() -> Self {
        let vertex = |x: f32, y: f32| Vertex {
            position: Vec3::new(x, y, 0.0),
            color: Vec3::ONE,
            normal: Vec3::Z,
            uv: Vec2::new((x + 1.0) * 0.5, (1.0 - y) * 0.5),
        };
        Self {
            vertices: vec![
                vertex(-1.0, 1.0),
                vertex(-1.0, -1.0),
                vertex(1.0, 1.0),
                vertex(1.0, -1.0),
            ],
            indices: vec![0, 1, 2, 2, 1, 3],
        }
    }
}

/// A mesh uploaded into device-local vertex and index buffers
pub struct GpuMesh {
    pub vertex_buffer: Buffer,
    pub index_buffer: Buffer,
    pub index_count: u32,
}

impl GpuMesh {
    pub fn upload(mesh: &Mesh, name: &str, dev: &RenderDevice) -> Result<Self> {
        if mesh.indices.is_empty() {
            return Err(eyre!("Mesh '{}' has no indices", name));
        }
        let vertex_buffer = Buffer::new_device_local_with_data(
            &mesh.vertices,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            &format!("{} vertices", name),
            dev,
        )?;
        let index_buffer = Buffer::new_device_local_with_data(
            &mesh.indices,
            vk::BufferUsageFlags::INDEX_BUFFER,
            &format!("{} indices", name),
            dev,
        )?;

        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.indices.len() as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_uvs_span_the_unit_square() {
        let quad = Mesh::new_quad();
        assert_eq!(quad.vertices[0].uv, Vec2::new(0.0, 0.0));
        assert_eq!(quad.vertices[3].uv, Vec2::new(1.0, 1.0));
        assert_eq!(quad.indices.len(), 6);
    }

    #[test]
    fn test_out_of_range_index_is_rejected() {
        let triangle = Mesh::new_triangle();
        assert!(Mesh::new(triangle.vertices.clone(), vec![0, 1, 3]).is_err());
        assert!(Mesh::new(triangle.vertices, vec![2, 1, 0]).is_ok());
    }
}
