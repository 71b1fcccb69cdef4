use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

/// One frustum plane in normal + distance form: a point `p` is on the
/// visible side when `dot(normal, p) + d >= 0`.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, Default, PartialEq)]
pub struct Plane {
    pub normal: [f32; 3],
    pub d: f32,
}

impl Plane {
    fn from_vec4(v: Vec4) -> Self {
        let normal = Vec3::new(v.x, v.y, v.z);
        let length = normal.length();
        // Degenerate rows only occur for a singular projection; keep the
        // unnormalized plane rather than dividing by zero.
        if length <= f32::EPSILON {
            return Self {
                normal: normal.to_array(),
                d: v.w,
            };
        }
        Self {
            normal: (normal / length).to_array(),
            d: v.w / length,
        }
    }

    pub fn signed_distance(&self, point: Vec3) -> f32 {
        Vec3::from(self.normal).dot(point) + self.d
    }
}

/// Six view-frustum planes, extracted once per frame from projection x view.
/// The array is fixed-size and updated in place; extraction never allocates.
#[derive(Clone, Copy, Debug, Default)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Standard Gribb-Hartmann plane extraction from a column-major
    /// view-projection matrix. Order: left, right, bottom, top, near, far.
    /// Clip depth is [0, 1] (wgpu/D3D), so the near plane is row 2 alone
    /// rather than the GL-style row3 + row2.
    pub fn update_from_matrix(&mut self, view_proj: Mat4) {
        let row0 = view_proj.row(0);
        let row1 = view_proj.row(1);
        let row2 = view_proj.row(2);
        let row3 = view_proj.row(3);

        self.planes[0] = Plane::from_vec4(row3 + row0);
        self.planes[1] = Plane::from_vec4(row3 - row0);
        self.planes[2] = Plane::from_vec4(row3 + row1);
        self.planes[3] = Plane::from_vec4(row3 - row1);
        self.planes[4] = Plane::from_vec4(row2);
        self.planes[5] = Plane::from_vec4(row3 - row2);
    }

    pub fn from_matrix(view_proj: Mat4) -> Self {
        let mut frustum = Self::default();
        frustum.update_from_matrix(view_proj);
        frustum
    }

    /// Inclusive sphere test: a sphere exactly tangent to a plane counts as
    /// visible, which keeps instances from popping at frustum edges.
    pub fn sphere_visible(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.signed_distance(center) >= -radius)
    }
}

/// Uniform scale applied to every bounding-sphere radius, derived from the
/// global transform once on the host. Uses the largest column scale so a
/// non-uniformly scaled world still gets a conservative sphere.
pub fn global_scale_factor(global_transform: Mat4) -> f32 {
    let x = global_transform.x_axis.truncate().length();
    let y = global_transform.y_axis.truncate().length();
    let z = global_transform.z_axis.truncate().length();
    x.max(y).max(z)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_frustum() -> Frustum {
        let proj = Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.1, 100.0);
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        Frustum::from_matrix(proj * view)
    }

    #[test]
    fn plane_is_16_bytes() {
        assert_eq!(std::mem::size_of::<Plane>(), 16);
    }

    #[test]
    fn sphere_inside_all_planes_is_visible() {
        let frustum = test_frustum();
        assert!(frustum.sphere_visible(Vec3::new(0.0, 0.0, -10.0), 1.0));
    }

    #[test]
    fn sphere_strictly_outside_one_plane_is_excluded() {
        let frustum = test_frustum();
        // Behind the camera, outside the near plane.
        assert!(!frustum.sphere_visible(Vec3::new(0.0, 0.0, 5.0), 1.0));
        // Far off to the side.
        assert!(!frustum.sphere_visible(Vec3::new(500.0, 0.0, -10.0), 1.0));
        // Beyond the far plane.
        assert!(!frustum.sphere_visible(Vec3::new(0.0, 0.0, -200.0), 1.0));
    }

    #[test]
    fn tangent_sphere_is_inclusive() {
        let frustum = test_frustum();
        // The far plane sits at z = -100; a unit sphere centered one radius
        // past it touches the plane exactly and must still be visible.
        let far = &frustum.planes[5];
        let center = Vec3::new(0.0, 0.0, -101.0);
        let distance = far.signed_distance(center);
        assert!((distance + 1.0).abs() < 1e-4, "distance {}", distance);
        assert!(frustum.sphere_visible(center, 1.0));
        // Nudged strictly past tangency it drops out.
        assert!(!frustum.sphere_visible(Vec3::new(0.0, 0.0, -101.01), 1.0));
    }

    #[test]
    fn planes_are_normalized() {
        let frustum = test_frustum();
        for plane in &frustum.planes {
            let length = Vec3::from(plane.normal).length();
            assert!((length - 1.0).abs() < 1e-5, "plane normal length {}", length);
        }
    }

    #[test]
    fn scale_factor_takes_largest_axis() {
        let m = Mat4::from_scale(Vec3::new(2.0, 0.5, 1.0));
        assert!((global_scale_factor(m) - 2.0).abs() < 1e-6);
        assert!((global_scale_factor(Mat4::IDENTITY) - 1.0).abs() < 1e-6);
    }
}
