//! Minimal analytic scene used by the CPU reference device.
//!
//! Ground plane, spheres, one distant sun light, a constant sky and
//! optional homogeneous fog. Enough to drive every wavefront stage with
//! real data, nothing more.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Offset applied to secondary ray origins to avoid self intersection.
pub const RAY_EPSILON: f32 = 1e-4;

/// Pinhole camera description.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraParams {
    pub position: Vec3,
    pub look_at: Vec3,
    pub up: Vec3,
    /// Vertical field of view.
    pub fov_degrees: f32,
}

impl Default for CameraParams {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 1.0, 4.0),
            look_at: Vec3::new(0.0, 0.6, 0.0),
            up: Vec3::Y,
            fov_degrees: 45.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SphereParams {
    pub center: Vec3,
    pub radius: f32,
    pub albedo: Vec3,
    /// Mean free path of the subsurface walk; zero disables subsurface.
    #[serde(default)]
    pub subsurface_radius: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundParams {
    pub height: f32,
    pub albedo: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SunParams {
    /// Direction the light travels in.
    pub direction: Vec3,
    pub color: Vec3,
    pub strength: f32,
}

impl Default for SunParams {
    fn default() -> Self {
        Self {
            direction: Vec3::new(-0.4, -1.0, -0.3),
            color: Vec3::new(1.0, 0.95, 0.9),
            strength: 3.0,
        }
    }
}

/// Serializable scene description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneParams {
    pub camera: CameraParams,
    pub spheres: Vec<SphereParams>,
    pub ground: Option<GroundParams>,
    pub sun: SunParams,
    pub sky_color: Vec3,
    /// Extinction coefficient of the fog, zero disables the volume.
    pub fog_density: f32,
    /// Distance fog is integrated over for rays escaping to the sky.
    pub fog_distance: f32,
    pub max_bounces: u32,
    pub seed: u32,
}

impl Default for SceneParams {
    fn default() -> Self {
        Self {
            camera: CameraParams::default(),
            spheres: vec![
                SphereParams {
                    center: Vec3::new(-0.6, 0.5, 0.0),
                    radius: 0.5,
                    albedo: Vec3::new(0.8, 0.3, 0.2),
                    subsurface_radius: 0.0,
                },
                SphereParams {
                    center: Vec3::new(0.6, 0.5, 0.0),
                    radius: 0.5,
                    albedo: Vec3::new(0.9, 0.8, 0.7),
                    subsurface_radius: 0.1,
                },
            ],
            ground: Some(GroundParams {
                height: 0.0,
                albedo: Vec3::splat(0.5),
            }),
            sun: SunParams::default(),
            sky_color: Vec3::new(0.5, 0.7, 1.0),
            fog_density: 0.0,
            fog_distance: 20.0,
            max_bounces: 4,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction }
    }

    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// What a ray hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectId {
    Ground,
    Sphere(usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub t: f32,
    pub position: Vec3,
    pub normal: Vec3,
    pub object: ObjectId,
}

/// Surface response at a hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub albedo: Vec3,
    pub subsurface_radius: f32,
}

impl Material {
    #[inline]
    pub fn has_subsurface(&self) -> bool {
        self.subsurface_radius > 0.0
    }
}

/// Scene prepared for intersection.
#[derive(Debug, Clone)]
pub struct Scene {
    params: SceneParams,
    sun_to_light: Vec3,
    camera_forward: Vec3,
    camera_right: Vec3,
    camera_up: Vec3,
    tan_half_fov: f32,
}

impl Scene {
    pub fn new(params: SceneParams) -> Self {
        let camera = &params.camera;
        let camera_forward = (camera.look_at - camera.position).normalize_or(Vec3::NEG_Z);
        let camera_right = camera_forward.cross(camera.up).normalize_or(Vec3::X);
        let camera_up = camera_right.cross(camera_forward);
        let tan_half_fov = (camera.fov_degrees.to_radians() * 0.5).tan();
        let sun_to_light = (-params.sun.direction).normalize_or(Vec3::Y);

        Self {
            params,
            sun_to_light,
            camera_forward,
            camera_right,
            camera_up,
            tan_half_fov,
        }
    }

    #[inline]
    pub fn params(&self) -> &SceneParams {
        &self.params
    }

    /// Whether the fog volume contributes anything.
    #[inline]
    pub fn has_volume(&self) -> bool {
        self.params.fog_density > 0.0
    }

    /// Primary ray through normalized film coordinates, `v` growing downwards.
    pub fn camera_ray(&self, u: f32, v: f32, aspect: f32) -> Ray {
        let sx = (2.0 * u - 1.0) * self.tan_half_fov * aspect;
        let sy = (1.0 - 2.0 * v) * self.tan_half_fov;
        let direction =
            (self.camera_forward + self.camera_right * sx + self.camera_up * sy).normalize();
        Ray::new(self.params.camera.position, direction)
    }

    /// Closest hit along the ray.
    pub fn intersect(&self, ray: &Ray) -> Option<Hit> {
        let mut closest: Option<Hit> = None;
        let mut t_max = f32::INFINITY;

        if let Some(ground) = &self.params.ground {
            if let Some(t) = intersect_plane(ray, ground.height) {
                if t < t_max {
                    t_max = t;
                    closest = Some(Hit {
                        t,
                        position: ray.at(t),
                        normal: Vec3::Y,
                        object: ObjectId::Ground,
                    });
                }
            }
        }

        for (index, sphere) in self.params.spheres.iter().enumerate() {
            if let Some(t) = intersect_sphere(ray, sphere.center, sphere.radius) {
                if t < t_max {
                    t_max = t;
                    let position = ray.at(t);
                    closest = Some(Hit {
                        t,
                        position,
                        normal: (position - sphere.center) / sphere.radius,
                        object: ObjectId::Sphere(index),
                    });
                }
            }
        }

        closest
    }

    /// Any hit closer than `t_max`.
    pub fn occluded(&self, ray: &Ray, t_max: f32) -> bool {
        if let Some(ground) = &self.params.ground {
            if intersect_plane(ray, ground.height).is_some_and(|t| t < t_max) {
                return true;
            }
        }
        self.params
            .spheres
            .iter()
            .any(|s| intersect_sphere(ray, s.center, s.radius).is_some_and(|t| t < t_max))
    }

    pub fn material(&self, object: ObjectId) -> Material {
        match object {
            ObjectId::Ground => Material {
                albedo: self.params.ground.map(|g| g.albedo).unwrap_or(Vec3::ZERO),
                subsurface_radius: 0.0,
            },
            ObjectId::Sphere(index) => {
                let sphere = &self.params.spheres[index];
                Material {
                    albedo: sphere.albedo,
                    subsurface_radius: sphere.subsurface_radius,
                }
            }
        }
    }

    /// Snap a point back onto the surface of an object, returning position and normal.
    pub fn project_to_surface(&self, object: ObjectId, point: Vec3) -> (Vec3, Vec3) {
        match object {
            ObjectId::Ground => {
                let height = self.params.ground.map(|g| g.height).unwrap_or(0.0);
                (Vec3::new(point.x, height, point.z), Vec3::Y)
            }
            ObjectId::Sphere(index) => {
                let sphere = &self.params.spheres[index];
                let normal = (point - sphere.center).normalize_or(Vec3::Y);
                (sphere.center + normal * sphere.radius, normal)
            }
        }
    }

    /// Unit vector pointing towards the sun.
    #[inline]
    pub fn sun_direction(&self) -> Vec3 {
        self.sun_to_light
    }

    /// Sun irradiance on a surface facing the light.
    #[inline]
    pub fn sun_irradiance(&self) -> Vec3 {
        self.params.sun.color * self.params.sun.strength
    }

    #[inline]
    pub fn background(&self, _direction: Vec3) -> Vec3 {
        self.params.sky_color
    }
}

fn intersect_plane(ray: &Ray, height: f32) -> Option<f32> {
    if ray.direction.y.abs() < 1e-8 {
        return None;
    }
    let t = (height - ray.origin.y) / ray.direction.y;
    (t > RAY_EPSILON).then_some(t)
}

fn intersect_sphere(ray: &Ray, center: Vec3, radius: f32) -> Option<f32> {
    let oc = ray.origin - center;
    let b = oc.dot(ray.direction);
    let c = oc.length_squared() - radius * radius;
    let disc = b * b - c;
    if disc < 0.0 {
        return None;
    }
    let sq = disc.sqrt();
    let t0 = -b - sq;
    if t0 > RAY_EPSILON {
        return Some(t0);
    }
    let t1 = -b + sq;
    (t1 > RAY_EPSILON).then_some(t1)
}

/// Cosine-weighted direction around `normal`.
pub fn sample_cosine_hemisphere(normal: Vec3, u: f32, v: f32) -> Vec3 {
    let r = u.sqrt();
    let phi = 2.0 * std::f32::consts::PI * v;
    let (tangent, bitangent) = normal.any_orthonormal_pair();
    let local_z = (1.0 - u).max(0.0).sqrt();
    (tangent * (r * phi.cos()) + bitangent * (r * phi.sin()) + normal * local_z).normalize()
}
