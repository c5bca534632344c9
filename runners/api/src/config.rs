//! Simulation parameters

use pbf_cpu_gpu_shared::{
    glam::Vec3, hash_size, workgroup_count, BoxSettings, NeighbourSearchSettings,
    SimulationSettings,
};
use pbf_physics_shaders::kernel::SmoothingKernel;

use crate::{device::FrameUniforms, Error};

/// Everything that tunes a simulation. Fixed once the simulation is built.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub struct FluidConfig {
    /// Number of frame-in-flight slots, at least 2
    pub frames_in_flight: usize,
    /// SPH kernel radius, also the grid cell size
    pub smoothing_radius: f32,
    /// Distance between particles of a resting lattice
    pub particle_spacing: f32,
    /// Mass of each particle
    pub particle_mass: f32,
    /// Target density. Calibrated from a lattice at `particle_spacing` when `None`.
    pub rest_density: Option<f32>,
    /// Constraint force mixing, keeps lambdas bounded when a particle has few neighbours
    pub relaxation: f32,
    /// Artificial pressure strength
    pub tensile_k: f32,
    /// Artificial pressure reference distance as a fraction of the smoothing radius
    pub tensile_delta_q: f32,
    /// XSPH viscosity coefficient
    pub viscosity: f32,
    /// Vorticity confinement strength
    pub vorticity: f32,
    /// Acceleration applied to every particle
    pub gravity: Vec3,
    /// Lowest corner of the container
    pub box_min: Vec3,
    /// Highest corner of the container
    pub box_max: Vec3,
    /// Capacity of each neighbour list
    pub max_neighbours: u32,
    /// Time step the binary advances by each frame
    pub time_step: f32,
}

impl Default for FluidConfig {
    #[inline]
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            smoothing_radius: 0.1,
            particle_spacing: 0.05,
            particle_mass: 1.0,
            rest_density: None,
            relaxation: 600.0,
            tensile_k: 0.0001,
            tensile_delta_q: 0.2,
            viscosity: 0.01,
            vorticity: 0.01,
            gravity: Vec3::new(0.0, -9.81, 0.0),
            box_min: Vec3::new(-1.0, 0.0, -1.0),
            box_max: Vec3::new(1.0, 2.0, 1.0),
            max_neighbours: 64,
            time_step: 1.0 / 60.0,
        }
    }
}

/// Largest `smoothing_radius / particle_spacing`. Calibration walks a lattice cube of
/// `(2 * ratio + 1)³` points.
pub const MAX_RADIUS_TO_SPACING: f32 = 16.0;

/// The density a particle sees inside an infinite cubic lattice.
#[must_use]
pub fn calibrated_rest_density(smoothing_radius: f32, spacing: f32, mass: f32) -> f32 {
    let kernel = SmoothingKernel::new(smoothing_radius);
    #[expect(
        clippy::cast_possible_truncation,
        reason = "The ratio is a handful of lattice steps"
    )]
    let reach = (smoothing_radius / spacing).ceil() as i32;

    let mut density = 0.0;
    for z in -reach..=reach {
        for y in -reach..=reach {
            for x in -reach..=reach {
                let offset = Vec3::new(x as f32, y as f32, z as f32) * spacing;
                density += mass * kernel.poly6(offset.length_squared());
            }
        }
    }
    density
}

/// Check a value is finite and strictly positive.
fn positive(name: &'static str, value: f32) -> Result<(), Error> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::invalid(name, format!("must be positive, got {value}")))
    }
}

/// Check a value is finite and not negative.
fn non_negative(name: &'static str, value: f32) -> Result<(), Error> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(Error::invalid(name, format!("can't be negative, got {value}")))
    }
}

impl FluidConfig {
    /// Check every parameter is usable.
    ///
    /// # Errors
    /// The first parameter found out of range.
    #[inline]
    pub fn validate(&self) -> Result<(), Error> {
        if self.frames_in_flight < 2 {
            return Err(Error::FramesInFlight {
                requested: self.frames_in_flight,
            });
        }

        positive("smoothing_radius", self.smoothing_radius)?;
        positive("particle_spacing", self.particle_spacing)?;
        positive("particle_mass", self.particle_mass)?;
        let ratio = self.smoothing_radius / self.particle_spacing;
        if ratio > MAX_RADIUS_TO_SPACING {
            return Err(Error::invalid(
                "particle_spacing",
                format!(
                    "the smoothing radius spans {ratio} spacings, at most {MAX_RADIUS_TO_SPACING} are allowed"
                ),
            ));
        }
        if let Some(rest_density) = self.rest_density {
            positive("rest_density", rest_density)?;
        }
        positive("relaxation", self.relaxation)?;
        non_negative("tensile_k", self.tensile_k)?;
        positive("tensile_delta_q", self.tensile_delta_q)?;
        if self.tensile_delta_q >= 1.0 {
            return Err(Error::invalid(
                "tensile_delta_q",
                "must be inside the smoothing radius",
            ));
        }
        non_negative("viscosity", self.viscosity)?;
        non_negative("vorticity", self.vorticity)?;
        positive("time_step", self.time_step)?;

        if !self.gravity.is_finite() {
            return Err(Error::invalid("gravity", "must be finite"));
        }
        if !(self.box_min.is_finite() && self.box_max.is_finite())
            || self.box_min.cmpge(self.box_max).any()
        {
            return Err(Error::invalid(
                "box_min",
                format!("{} isn't below {}", self.box_min, self.box_max),
            ));
        }
        if self.max_neighbours == 0 {
            return Err(Error::invalid("max_neighbours", "must be at least 1"));
        }

        Ok(())
    }

    /// The configured or calibrated rest density.
    #[inline]
    #[must_use]
    pub fn rest_density(&self) -> f32 {
        self.rest_density.unwrap_or_else(|| {
            calibrated_rest_density(
                self.smoothing_radius,
                self.particle_spacing,
                self.particle_mass,
            )
        })
    }

    /// A copy with the rest density calibrated, so building uniforms stays cheap.
    #[inline]
    #[must_use]
    pub fn resolved(&self) -> Self {
        Self {
            rest_density: Some(self.rest_density()),
            ..self.clone()
        }
    }

    /// Uniform for the solver kernels.
    #[inline]
    #[must_use]
    pub fn simulation_settings(
        &self,
        particle_count: u32,
        dt: f32,
        accumulated_time: f32,
    ) -> SimulationSettings {
        SimulationSettings {
            dt,
            accumulated_time,
            particle_count,
            padding_0: 0,
            gravity: self.gravity.extend(0.0),
            smoothing_radius: self.smoothing_radius,
            rest_density: self.rest_density(),
            particle_mass: self.particle_mass,
            relaxation: self.relaxation,
            tensile_k: self.tensile_k,
            tensile_delta_q: self.tensile_delta_q,
            viscosity: self.viscosity,
            vorticity: self.vorticity,
        }
    }

    /// Uniform for the neighbour search kernels.
    #[inline]
    #[must_use]
    pub fn neighbour_search_settings(&self, particle_count: u32) -> NeighbourSearchSettings {
        NeighbourSearchSettings {
            particle_count,
            workgroup_count: workgroup_count(particle_count),
            hash_size: hash_size(particle_count),
            max_neighbours: self.max_neighbours,
            cell_size: self.smoothing_radius,
            smoothing_radius: self.smoothing_radius,
            padding: [0.0; 2],
        }
    }

    /// Uniform for the container.
    #[inline]
    #[must_use]
    pub fn box_settings(&self) -> BoxSettings {
        BoxSettings {
            min: self.box_min.extend(0.0),
            max: self.box_max.extend(0.0),
        }
    }

    /// All three uniforms for one frame.
    #[inline]
    #[must_use]
    pub fn uniforms(&self, particle_count: u32, dt: f32, accumulated_time: f32) -> FrameUniforms {
        FrameUniforms {
            simulation: self.simulation_settings(particle_count, dt, accumulated_time),
            search: self.neighbour_search_settings(particle_count),
            bounds: self.box_settings(),
        }
    }
}
