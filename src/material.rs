//! Contact material properties.
//!
//! A material controls how a body responds to contact:
//!
//! - **Bounciness**: fraction of approach speed returned after an impact (0-1)
//! - **Friction**: Coulomb coefficient for tangential impulses

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Material preset for common soft materials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MaterialPreset {
    /// Soft rubber (like silicone).
    Rubber,
    /// Gelatin/jelly.
    Gelatin,
    /// Foam/sponge.
    Foam,
    /// Soft tissue (biological).
    SoftTissue,
}

/// Contact material of a body or collider.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Material {
    /// Coefficient of restitution contributed by this material (0-1).
    pub bounciness: f64,
    /// Coulomb friction coefficient.
    pub friction: f64,
}

impl Default for Material {
    fn default() -> Self {
        Self::preset(MaterialPreset::Rubber)
    }
}

impl Material {
    /// Create a material, clamping bounciness to `[0, 1]` and friction to `>= 0`.
    #[must_use]
    pub fn new(bounciness: f64, friction: f64) -> Self {
        Self {
            bounciness: bounciness.clamp(0.0, 1.0),
            friction: friction.max(0.0),
        }
    }

    /// Create a material from a preset.
    #[must_use]
    pub const fn preset(preset: MaterialPreset) -> Self {
        match preset {
            MaterialPreset::Rubber => Self {
                bounciness: 0.8,
                friction: 0.9,
            },
            MaterialPreset::Gelatin => Self {
                bounciness: 0.3,
                friction: 0.5,
            },
            MaterialPreset::Foam => Self {
                bounciness: 0.1,
                friction: 0.7,
            },
            MaterialPreset::SoftTissue => Self {
                bounciness: 0.2,
                friction: 0.2,
            },
        }
    }

    /// Arithmetic mean of two bouncinesses.
    #[must_use]
    pub fn average_bounciness(&self, other: &Self) -> f64 {
        0.5 * (self.bounciness + other.bounciness)
    }

    /// Geometric mean of two bouncinesses.
    #[must_use]
    pub fn combined_bounciness(&self, other: &Self) -> f64 {
        (self.bounciness * other.bounciness).max(0.0).sqrt()
    }

    /// Arithmetic mean of two friction coefficients.
    #[must_use]
    pub fn average_friction(&self, other: &Self) -> f64 {
        0.5 * (self.friction + other.friction)
    }
}
