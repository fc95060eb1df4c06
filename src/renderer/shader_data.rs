use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec4};

/// Data unique to each frame passed into the global uniform buffer (set 0, binding 0)
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct GlobalUniforms {
    pub projection: Mat4,
    pub view: Mat4,
    pub inverse_view: Mat4,
    /// rgb is the color, w the intensity
    pub ambient_light: Vec4,
}

impl Default for GlobalUniforms {
    fn default() -> Self {
        Self {
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            inverse_view: Mat4::IDENTITY,
            ambient_light: Vec4::new(1.0, 1.0, 1.0, 0.02),
        }
    }
}

impl GlobalUniforms {
    pub fn new(projection: Mat4, view: Mat4) -> Self {
        Self {
            projection,
            view,
            inverse_view: view.inverse(),
            ..Default::default()
        }
    }
}

/// Data unique to each draw call passed as a push constant
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct PushConstants {
    pub model: Mat4,
    /// The 3x3 normal matrix in the upper-left corner; std140/std430 would pad a
    /// mat3 column to 16 bytes anyway.
    pub normal: Mat4,
}

impl PushConstants {
    pub fn new(model: Mat4, normal: Mat3) -> Self {
        Self {
            model,
            normal: Mat4::from_mat3(normal),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_sizes_match_shader_layouts() {
        assert_eq!(size_of::<GlobalUniforms>(), 3 * 64 + 16);
        // Vulkan guarantees at least 128 bytes of push constants
        assert_eq!(size_of::<PushConstants>(), 128);
    }

    #[test]
    fn test_normal_matrix_is_padded_into_mat4() {
        let normal = Mat3::from_diagonal(Vec3::new(2.0, 3.0, 4.0));
        let push = PushConstants::new(Mat4::IDENTITY, normal);
        assert_eq!(push.normal.x_axis, Vec4::new(2.0, 0.0, 0.0, 0.0));
        assert_eq!(push.normal.z_axis, Vec4::new(0.0, 0.0, 4.0, 0.0));
        assert_eq!(push.normal.w_axis, Vec4::W);
        assert_eq!(push.as_bytes().len(), 128);
    }

    #[test]
    fn test_inverse_view_is_derived() {
        let view = Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0));
        let globals = GlobalUniforms::new(Mat4::IDENTITY, view);
        assert!(globals.inverse_view.abs_diff_eq(Mat4::from_translation(Vec3::new(0.0, 0.0, 5.0)), 1e-6));
    }
}
