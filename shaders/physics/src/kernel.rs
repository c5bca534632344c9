//! SPH smoothing kernels. Poly6 for densities, the gradient of Spiky for pressure-like terms.

use core::f32::consts::PI;

use pbf_cpu_gpu_shared::glam::Vec3;

/// Below this separation the Spiky gradient has no defined direction.
const MIN_SEPARATION: f32 = 1.0e-6;

/// Precomputed scales for a given smoothing radius.
#[derive(Clone, Copy)]
#[cfg_attr(not(target_arch = "spirv"), derive(Debug))]
pub struct SmoothingKernel {
    radius: f32,
    radius_squared: f32,
    poly6_scale: f32,
    spiky_gradient_scale: f32,
}

impl SmoothingKernel {
    /// Instantiate
    pub fn new(radius: f32) -> Self {
        let radius_squared = radius * radius;
        let radius_6 = radius_squared * radius_squared * radius_squared;
        Self {
            radius,
            radius_squared,
            poly6_scale: 315.0 / (64.0 * PI * radius_6 * radius_squared * radius),
            spiky_gradient_scale: -45.0 / (PI * radius_6),
        }
    }

    /// Poly6, taking the squared distance so callers can skip a square root.
    pub fn poly6(&self, distance_squared: f32) -> f32 {
        if distance_squared >= self.radius_squared {
            return 0.0;
        }
        let difference = self.radius_squared - distance_squared;
        self.poly6_scale * difference * difference * difference
    }

    /// Gradient of Spiky with respect to the first particle, `offset` is `x_i - x_j`.
    pub fn spiky_gradient(&self, offset: Vec3) -> Vec3 {
        let distance = offset.length();
        if distance <= MIN_SEPARATION || distance >= self.radius {
            return Vec3::ZERO;
        }
        let falloff = self.radius - distance;
        offset * (self.spiky_gradient_scale * falloff * falloff / distance)
    }
}
