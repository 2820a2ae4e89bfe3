//! CPU implementations of the wavefront stages.
//!
//! Every stage walks the wavefront and processes only the states queued for
//! it, re-queueing them for whichever stage has to see them next.

use std::f32::consts::FRAC_1_PI;

use glam::Vec3;

use super::state::{PathState, ShadowPathState};
use crate::device::{DeviceKernel, KernelFeatures};
use crate::integrator::WorkTile;
use crate::render::scene::{sample_cosine_hemisphere, Ray, Scene, RAY_EPSILON};
use crate::render::{BufferView, PassType};
use crate::util::PathRng;

/// Read-only inputs shared by all stages of one enqueue.
pub(super) struct KernelContext<'a, 'b> {
    pub scene: &'a Scene,
    pub features: &'a KernelFeatures,
    pub buffers: &'a BufferView<'b>,
}

/// Seed one path per (pixel, sample) of the tile.
pub(super) fn generate_camera_rays(
    ctx: &KernelContext<'_, '_>,
    tile: &WorkTile,
    states: &mut Vec<PathState>,
    shadow_states: &mut Vec<ShadowPathState>,
) {
    states.clear();
    shadow_states.clear();

    let params = ctx.buffers.params();
    let aspect = params.width as f32 / params.height as f32;
    let seed = ctx.scene.params().seed;

    for sample in tile.samples() {
        for (x, y) in tile.pixels() {
            let pixel_index = tile.buffer_index(x, y);
            let mut rng = PathRng::new(pixel_index as u32, sample, seed);
            let (jx, jy) = rng.next_2d();
            let u = ((x - params.full_x) as f32 + jx) / params.width as f32;
            let v = ((y - params.full_y) as f32 + jy) / params.height as f32;

            states.push(PathState {
                queued_kernel: Some(DeviceKernel::IntersectClosest),
                pixel_index,
                sample,
                ray: ctx.scene.camera_ray(u, v, aspect),
                throughput: Vec3::ONE,
                bounce: 0,
                hit: None,
                rng,
            });
        }
    }
}

pub(super) fn intersect_closest(ctx: &KernelContext<'_, '_>, states: &mut [PathState]) {
    let volume = ctx.features.volume && ctx.scene.has_volume();

    for state in queued(states, DeviceKernel::IntersectClosest) {
        state.hit = ctx.scene.intersect(&state.ray);
        state.queued_kernel = Some(if volume {
            DeviceKernel::Volume
        } else if state.hit.is_some() {
            DeviceKernel::Surface
        } else {
            DeviceKernel::Background
        });
    }
}

/// Homogeneous fog: attenuate along the segment, then hand the path to the
/// surface or background stage.
pub(super) fn volume(ctx: &KernelContext<'_, '_>, states: &mut [PathState]) {
    let params = ctx.scene.params();

    for state in queued(states, DeviceKernel::Volume) {
        let distance = state.hit.map_or(params.fog_distance, |hit| hit.t);
        state.throughput *= (-params.fog_density * distance).exp();
        state.queued_kernel = Some(if state.hit.is_some() {
            DeviceKernel::Surface
        } else {
            DeviceKernel::Background
        });
    }
}

pub(super) fn background(ctx: &KernelContext<'_, '_>, states: &mut [PathState]) {
    for state in queued(states, DeviceKernel::Background) {
        let radiance = state.throughput * ctx.scene.background(state.ray.direction);
        write_radiance(ctx, state.pixel_index, radiance);
        finish_path(ctx, state);
    }
}

pub(super) fn surface(
    ctx: &KernelContext<'_, '_>,
    states: &mut [PathState],
    shadow_states: &mut Vec<ShadowPathState>,
) {
    for state in queued(states, DeviceKernel::Surface) {
        let Some(hit) = state.hit else {
            finish_path(ctx, state);
            continue;
        };

        let material = ctx.scene.material(hit.object);
        if material.has_subsurface() && ctx.features.subsurface {
            state.queued_kernel = Some(DeviceKernel::Subsurface);
            continue;
        }

        emit_direct_light(ctx, state, hit.position, hit.normal, material.albedo, shadow_states);
        continue_path(ctx, state, hit.position, hit.normal, material.albedo);
    }
}

/// Stand-in for a random walk: exit at a jittered point near the entry,
/// light the exit point and bounce from there.
pub(super) fn subsurface(
    ctx: &KernelContext<'_, '_>,
    states: &mut [PathState],
    shadow_states: &mut Vec<ShadowPathState>,
) {
    for state in queued(states, DeviceKernel::Subsurface) {
        let Some(hit) = state.hit else {
            finish_path(ctx, state);
            continue;
        };

        let material = ctx.scene.material(hit.object);
        let (u, v) = state.rng.next_2d();
        let (tangent, bitangent) = hit.normal.any_orthonormal_pair();
        let offset = (tangent * (2.0 * u - 1.0) + bitangent * (2.0 * v - 1.0))
            * material.subsurface_radius;
        let (position, normal) = ctx.scene.project_to_surface(hit.object, hit.position + offset);

        let tint = material.albedo.powf(0.5);
        emit_direct_light(ctx, state, position, normal, tint, shadow_states);
        continue_path(ctx, state, position, normal, tint);
    }
}

pub(super) fn intersect_shadow(ctx: &KernelContext<'_, '_>, shadow_states: &mut [ShadowPathState]) {
    for shadow in shadow_states
        .iter_mut()
        .filter(|s| s.is_queued(DeviceKernel::IntersectShadow))
    {
        shadow.queued_kernel = if ctx.scene.occluded(&shadow.ray, shadow.t_max) {
            None
        } else {
            Some(DeviceKernel::Shadow)
        };
    }
}

pub(super) fn shadow(ctx: &KernelContext<'_, '_>, shadow_states: &mut Vec<ShadowPathState>) {
    for shadow in shadow_states
        .iter_mut()
        .filter(|s| s.is_queued(DeviceKernel::Shadow))
    {
        write_radiance(ctx, shadow.pixel_index, shadow.contribution);
        shadow.queued_kernel = None;
    }
    shadow_states.retain(|s| s.queued_kernel.is_some());
}

fn queued(states: &mut [PathState], kernel: DeviceKernel) -> impl Iterator<Item = &mut PathState> {
    states.iter_mut().filter(move |s| s.is_queued(kernel))
}

fn write_radiance(ctx: &KernelContext<'_, '_>, pixel_index: usize, radiance: Vec3) {
    ctx.buffers.accumulate(
        pixel_index,
        PassType::Combined,
        &[radiance.x, radiance.y, radiance.z, 0.0],
    );
}

/// Terminate a path; it counts as one finished sample of its pixel.
fn finish_path(ctx: &KernelContext<'_, '_>, state: &mut PathState) {
    ctx.buffers.accumulate(state.pixel_index, PassType::Combined, &[0.0, 0.0, 0.0, 1.0]);
    ctx.buffers.accumulate(state.pixel_index, PassType::SampleCount, &[1.0]);
    state.queued_kernel = None;
    state.hit = None;
}

/// Queue a shadow ray towards the sun carrying the Lambertian contribution.
fn emit_direct_light(
    ctx: &KernelContext<'_, '_>,
    state: &PathState,
    position: Vec3,
    normal: Vec3,
    albedo: Vec3,
    shadow_states: &mut Vec<ShadowPathState>,
) {
    if !ctx.features.shadows {
        return;
    }

    let to_light = ctx.scene.sun_direction();
    let cos_theta = normal.dot(to_light);
    if cos_theta <= 0.0 {
        return;
    }

    shadow_states.push(ShadowPathState {
        queued_kernel: Some(DeviceKernel::IntersectShadow),
        pixel_index: state.pixel_index,
        ray: Ray::new(position + normal * RAY_EPSILON, to_light),
        t_max: f32::INFINITY,
        contribution: state.throughput * albedo * FRAC_1_PI * ctx.scene.sun_irradiance() * cos_theta,
    });
}

/// Diffuse bounce, or termination once the bounce limit is reached.
fn continue_path(
    ctx: &KernelContext<'_, '_>,
    state: &mut PathState,
    position: Vec3,
    normal: Vec3,
    albedo: Vec3,
) {
    state.throughput *= albedo;
    if state.bounce >= ctx.scene.params().max_bounces || state.throughput.max_element() <= 0.0 {
        finish_path(ctx, state);
        return;
    }

    let (u, v) = state.rng.next_2d();
    state.ray = Ray::new(position + normal * RAY_EPSILON, sample_cosine_hemisphere(normal, u, v));
    state.bounce += 1;
    state.hit = None;
    state.queued_kernel = Some(DeviceKernel::IntersectClosest);
}
