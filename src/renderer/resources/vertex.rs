use std::mem::offset_of;
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub color: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}

impl Vertex {
    /// One interleaved binding, locations 0..=3 in field order
    pub fn input_description() -> VertexInputDescription {
        let binding = vk::VertexInputBindingDescription::default()
            .binding(0)
            .stride(size_of::<Vertex>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX);

        let attribute = |location: u32, format: vk::Format, offset: usize| {
            vk::VertexInputAttributeDescription::default()
                .binding(0)
                .location(location)
                .format(format)
                .offset(offset as u32)
        };

        VertexInputDescription {
            bindings: vec![binding],
            attributes: vec![
                attribute(0, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, position)),
                attribute(1, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, color)),
                attribute(2, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, normal)),
                attribute(3, vk::Format::R32G32_SFLOAT, offset_of!(Vertex, uv)),
            ],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct VertexInputDescription {
    pub bindings: Vec<vk::VertexInputBindingDescription>,
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
}

impl VertexInputDescription {
    /// For full-screen passes that generate vertices in the shader
    pub fn empty() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layout_is_tightly_packed() {
        assert_eq!(size_of::<Vertex>(), 44);
        let desc = Vertex::input_description();
        assert_eq!(desc.bindings[0].stride, 44);
        let offsets = desc.attributes.iter().map(|a| a.offset).collect::<Vec<_>>();
        assert_eq!(offsets, vec![0, 12, 24, 36]);
        let locations = desc.attributes.iter().map(|a| a.location).collect::<Vec<_>>();
        assert_eq!(locations, vec![0, 1, 2, 3]);
    }
}
