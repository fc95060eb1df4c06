use ash::vk;
use glam::{Mat4, Vec3};
use strata::renderer::shader_data::GlobalUniforms;

/// Circles a pivot at a fixed distance, always looking at it
pub struct OrbitCamera {
    pivot: Vec3,
    distance: f32,
    yaw: f32,
    pitch: f32,
    fov_y_deg: f32,
    near: f32,
    far: f32,
}

impl OrbitCamera {
    const DEFAULT_FOV_Y_DEG: f32 = 45.0;

    pub fn new(pivot: Vec3, distance: f32) -> Self {
        Self {
            pivot,
            distance,
            yaw: 0.0,
            pitch: 0.3,
            fov_y_deg: Self::DEFAULT_FOV_Y_DEG,
            near: 0.1,
            far: 100.0,
        }
    }

    pub fn orbit(&mut self, delta_yaw: f32) {
        self.yaw = (self.yaw + delta_yaw) % std::f32::consts::TAU;
    }

    pub fn position(&self) -> Vec3 {
        let offset = Vec3::new(
            self.pitch.cos() * self.yaw.sin(),
            self.pitch.sin(),
            self.pitch.cos() * self.yaw.cos(),
        );
        self.pivot + offset * self.distance
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position(), self.pivot, Vec3::Y)
    }

    /// Vulkan clip space has y pointing down
    pub fn projection(&self, extent: vk::Extent2D) -> Mat4 {
        let aspect_ratio = extent.width.max(1) as f32 / extent.height.max(1) as f32;
        let mut proj = Mat4::perspective_rh(
            self.fov_y_deg.to_radians(),
            aspect_ratio,
            self.near,
            self.far,
        );
        proj.y_axis.y *= -1.0;
        proj
    }

    pub fn uniforms(&self, extent: vk::Extent2D) -> GlobalUniforms {
        GlobalUniforms::new(self.projection(extent), self.view())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_keeps_distance_while_orbiting() {
        let mut camera = OrbitCamera::new(Vec3::new(1.0, 0.0, 0.0), 5.0);
        for _ in 0..8 {
            camera.orbit(0.9);
            let distance = camera.position().distance(Vec3::new(1.0, 0.0, 0.0));
            assert!((distance - 5.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_projection_flips_y() {
        let camera = OrbitCamera::new(Vec3::ZERO, 3.0);
        let proj = camera.projection(vk::Extent2D { width: 800, height: 600 });
        assert!(proj.y_axis.y < 0.0);
        assert!(proj.x_axis.x > 0.0);
    }

    #[test]
    fn test_pivot_projects_to_screen_center() {
        let camera = OrbitCamera::new(Vec3::ZERO, 3.0);
        let globals = camera.uniforms(vk::Extent2D { width: 640, height: 480 });
        let clip = globals.projection * globals.view * glam::Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert!((clip.x / clip.w).abs() < 1e-5);
        assert!((clip.y / clip.w).abs() < 1e-5);
    }
}
