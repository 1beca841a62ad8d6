//! Perspective camera with frustum culling

use xengine_core::{BoundingBox, Mat3, Mat4, Vec2, Vec3, Vec4};

/// A perspective camera. Set the public fields, then call [`Camera::update`]
/// once per frame before any visibility query.
#[derive(Clone, Debug)]
pub struct Camera {
    pub origin: Vec3,
    /// Viewing direction (normalized by `update`)
    pub look: Vec3,
    pub up: Vec3,
    /// Vertical field of view in degrees
    pub fov: f32,
    /// Aspect ratio (width / height)
    pub aspect: f32,
    pub near: f32,
    pub far: f32,

    delta_origin: Vec3,
    previous_origin: Option<Vec3>,
    view: Mat4,
    projection: Mat4,
    view_projection: Mat4,
    /// left, right, bottom, top, near, far; normals point inward
    planes: [Vec4; 6],
}

impl Default for Camera {
    fn default() -> Self {
        let mut camera = Self {
            origin: Vec3::ZERO,
            look: Vec3::NEG_UNIT_Z,
            up: Vec3::UNIT_Y,
            fov: 60.0,
            aspect: 1.5,
            near: 1.0,
            far: 1000.0,
            delta_origin: Vec3::ZERO,
            previous_origin: None,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            view_projection: Mat4::IDENTITY,
            planes: [Vec4::default(); 6],
        };
        camera.update();
        camera
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize the direction vectors, rebuild the matrices and extract
    /// the frustum planes.
    pub fn update(&mut self) {
        self.look = self.look.normalized();
        self.up = self.up.normalized();

        self.delta_origin = match self.previous_origin {
            Some(previous) => self.origin - previous,
            None => Vec3::ZERO,
        };
        self.previous_origin = Some(self.origin);

        self.view = Mat4::look_to(self.origin, self.look, self.up);
        self.projection = Mat4::perspective(self.fov, self.aspect, self.near, self.far);
        self.view_projection = self.projection * self.view;

        let m = &self.view_projection;
        let (r0, r1, r2, r3) = (m.row(0), m.row(1), m.row(2), m.row(3));
        let add = |a: Vec4, b: Vec4| Vec4::new(a.x + b.x, a.y + b.y, a.z + b.z, a.w + b.w);
        let sub = |a: Vec4, b: Vec4| Vec4::new(a.x - b.x, a.y - b.y, a.z - b.z, a.w - b.w);
        self.planes = [
            add(r3, r0).normalized_plane(),
            sub(r3, r0).normalized_plane(),
            add(r3, r1).normalized_plane(),
            sub(r3, r1).normalized_plane(),
            add(r3, r2).normalized_plane(),
            sub(r3, r2).normalized_plane(),
        ];
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.view
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    pub fn view_projection(&self) -> Mat4 {
        self.view_projection
    }

    /// Origin change between the last two `update` calls
    pub fn delta_origin(&self) -> Vec3 {
        self.delta_origin
    }

    pub fn frustum_planes(&self) -> &[Vec4; 6] {
        &self.planes
    }

    /// False iff the sphere is entirely behind one of the frustum planes
    pub fn is_visible_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.plane_distance(&center) >= -radius)
    }

    pub fn is_visible_box(&self, bounds: &BoundingBox) -> bool {
        self.is_visible_box_corners(&bounds.corners())
    }

    /// Box test for a box in local space placed at `offset` with `rotation`
    pub fn is_visible_box_transformed(&self, bounds: &BoundingBox, offset: Vec3, rotation: &Mat3) -> bool {
        self.is_visible_box_corners(&bounds.transformed_corners(offset, rotation))
    }

    /// False iff all 8 corners lie behind the same frustum plane
    pub fn is_visible_box_corners(&self, corners: &[Vec3; 8]) -> bool {
        self.planes.iter().all(|plane| {
            corners
                .iter()
                .any(|corner| plane.plane_distance(corner) >= 0.0)
        })
    }

    pub fn distance_to(&self, point: Vec3) -> f32 {
        self.origin.distance(&point)
    }

    pub fn distance_squared_to(&self, point: Vec3) -> f32 {
        (self.origin - point).length_squared()
    }

    /// Project `point` to normalized device coordinates. `None` if it is
    /// behind the camera or outside the [-1, 1] viewport.
    pub fn screen_position(&self, point: Vec3) -> Option<Vec2> {
        let clip = self.view_projection.transform_point4(point);
        if clip.w <= 0.0 {
            return None;
        }
        let ndc = Vec2::new(clip.x / clip.w, clip.y / clip.w);
        if ndc.x.abs() > 1.0 || ndc.y.abs() > 1.0 {
            return None;
        }
        Some(ndc)
    }
}
