//! Configuration for a soft body simulation.
//!
//! [`SimulationConfig`] gathers every tunable parameter: sampling,
//! spring network, integration, ground and contact response. All values
//! are plain inputs with documented defaults; only physically required
//! quantities are clamped when used.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::collision::{ContactConfig, GroundPlane, ResponseMode};
use crate::error::{Result, SoftBodyError};
use crate::integrator::IntegratorConfig;
use crate::material::Material;
use crate::network::NetworkConfig;
use crate::sampler::SamplerConfig;

/// Main configuration for a soft body simulation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SimulationConfig {
    /// Fixed timestep (seconds).
    pub timestep: f64,
    /// Integration substeps per tick; contact between bodies runs once per tick.
    pub substeps: u32,
    /// Mass shared evenly by all particles of a body (kg).
    pub total_mass: f64,
    /// Mesh sampling.
    pub sampler: SamplerConfig,
    /// Spring network construction.
    pub network: NetworkConfig,
    /// Force integration.
    pub integrator: IntegratorConfig,
    /// Ground plane, or `None` for no ground.
    pub ground: Option<GroundPlane>,
    /// Inter-body contact response.
    pub contact: ContactConfig,
    /// Whether bodies collide with each other.
    pub enable_body_contacts: bool,
    /// Material given to new bodies.
    pub material: Material,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let sampler = SamplerConfig::default();
        Self {
            timestep: 1.0 / 60.0,
            substeps: 4,
            total_mass: 10.0,
            sampler,
            network: NetworkConfig::for_spacing(sampler.point_spacing),
            integrator: IntegratorConfig::default(),
            ground: Some(GroundPlane::default()),
            contact: ContactConfig::default(),
            enable_body_contacts: true,
            material: Material::default(),
        }
    }
}

impl SimulationConfig {
    /// Real-time configuration (60 Hz, default springs).
    #[must_use]
    pub fn realtime() -> Self {
        Self::default()
    }

    /// Stiff bodies that hold their shape: strong springs, heavier damping,
    /// more substeps.
    #[must_use]
    pub fn stiff() -> Self {
        let defaults = Self::default();
        Self {
            substeps: 8,
            network: defaults.network.with_stiffness(150.0).with_damping(0.5),
            contact: defaults.contact.with_mode(ResponseMode::Inelastic),
            ..defaults
        }
    }

    /// Soft, jelly-like bodies: weak springs and elastic contacts.
    #[must_use]
    pub fn soft() -> Self {
        let defaults = Self::default();
        Self {
            network: defaults.network.with_stiffness(15.0).with_damping(0.05),
            contact: defaults.contact.with_mode(ResponseMode::Elastic),
            ..defaults
        }
    }

    /// Set the timestep.
    #[must_use]
    pub const fn with_timestep(mut self, timestep: f64) -> Self {
        self.timestep = timestep;
        self
    }

    /// Set the number of integration substeps per tick.
    #[must_use]
    pub const fn with_substeps(mut self, substeps: u32) -> Self {
        self.substeps = substeps;
        self
    }

    /// Set the total mass per body.
    #[must_use]
    pub const fn with_total_mass(mut self, total_mass: f64) -> Self {
        self.total_mass = total_mass;
        self
    }

    /// Set the sampler configuration and rescale the network to its spacing.
    ///
    /// Stiffness and damping of the current network configuration are kept.
    #[must_use]
    pub fn with_sampler(mut self, sampler: SamplerConfig) -> Self {
        let network = NetworkConfig::for_spacing(sampler.point_spacing);
        self.network = NetworkConfig {
            base_stiffness: self.network.base_stiffness,
            damping: self.network.damping,
            ..network
        };
        self.sampler = sampler;
        self
    }

    /// Set the network configuration.
    #[must_use]
    pub const fn with_network(mut self, network: NetworkConfig) -> Self {
        self.network = network;
        self
    }

    /// Set the integrator configuration.
    #[must_use]
    pub const fn with_integrator(mut self, integrator: IntegratorConfig) -> Self {
        self.integrator = integrator;
        self
    }

    /// Set the ground plane.
    #[must_use]
    pub const fn with_ground(mut self, ground: GroundPlane) -> Self {
        self.ground = Some(ground);
        self
    }

    /// Remove the ground plane.
    #[must_use]
    pub const fn without_ground(mut self) -> Self {
        self.ground = None;
        self
    }

    /// Disable gravity.
    #[must_use]
    pub const fn zero_gravity(mut self) -> Self {
        self.integrator.gravity_enabled = false;
        self
    }

    /// Set the contact configuration.
    #[must_use]
    pub const fn with_contact(mut self, contact: ContactConfig) -> Self {
        self.contact = contact;
        self
    }

    /// Disable body-body contact.
    #[must_use]
    pub const fn without_body_contacts(mut self) -> Self {
        self.enable_body_contacts = false;
        self
    }

    /// Set the material for new bodies.
    #[must_use]
    pub const fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SoftBodyError::InvalidConfig`] for a non-positive or
    /// non-finite timestep, total mass, point spacing or cell size, zero
    /// substeps, or an inverted rest-length band.
    pub fn validate(&self) -> Result<()> {
        if self.substeps == 0 {
            return Err(SoftBodyError::invalid_config("substeps must be at least 1"));
        }
        let positive = [
            ("timestep", self.timestep),
            ("total_mass", self.total_mass),
            ("point_spacing", self.sampler.point_spacing),
            ("min_cell_size", self.sampler.min_cell_size),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(SoftBodyError::invalid_config(format!(
                    "{name} must be positive and finite, got {value}"
                )));
            }
        }
        if self.network.min_rest_length > self.network.max_rest_length {
            return Err(SoftBodyError::invalid_config(
                "min_rest_length exceeds max_rest_length",
            ));
        }
        Ok(())
    }

    /// Simulation frequency in Hz.
    #[must_use]
    pub fn frequency(&self) -> f64 {
        1.0 / self.timestep
    }
}
