//! Impulse-based contact response between two particles.
//!
//! For a pair of touching particles this computes, from a snapshot of both
//! particles, the velocity change, position correction and separation force
//! for each side. Nothing is written here: the caller applies the returned
//! [`ContactResponse`] so that many pairs can be evaluated concurrently.
//!
//! # Response modes
//!
//! | Mode      | Restitution                     | Friction                       |
//! |-----------|---------------------------------|--------------------------------|
//! | Elastic   | mean bounciness, or 1.0         | mean friction, or configured   |
//! | Inelastic | 0, then 10% velocity damping    | 0.7 × mean, or 1.5 × configured |
//! | Mixed     | sqrt(b1·b2), or configured      | mean friction, or configured   |
//!
//! The first option applies when material properties are enabled.

use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::material::Material;

/// Contact normals are undefined for particles closer than this.
const NORMAL_EPSILON: f64 = 1e-12;

/// Velocity scale applied after an inelastic impulse.
const INELASTIC_DAMPING: f64 = 0.9;

/// How restitution and friction are chosen for a contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ResponseMode {
    /// Bodies bounce apart.
    Elastic,
    /// Bodies stick; approach velocity is absorbed.
    Inelastic,
    /// Restitution from configuration or combined materials.
    #[default]
    Mixed,
}

/// Contact response parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactConfig {
    /// Response mode.
    pub mode: ResponseMode,
    /// Restitution used by [`ResponseMode::Mixed`] without materials.
    pub restitution: f64,
    /// Friction coefficient used without materials.
    pub friction: f64,
    /// Derive restitution and friction from the bodies' materials.
    pub use_material_properties: bool,
    /// Extra distance beyond the radius sum at which particles count as touching.
    pub contact_margin: f64,
    /// Minimum penetration for a slow contact to be resolved.
    pub penetration_threshold: f64,
    /// Minimum relative speed for a shallow contact to be resolved.
    pub velocity_threshold: f64,
    /// Fraction of the penetration removed per contact (0-1).
    pub correction_factor: f64,
    /// Penetration, as a fraction of the radius sum, beyond which both
    /// particles are also backed out symmetrically.
    pub backtrack_threshold: f64,
    /// Repulsive force per unit penetration (N/m), applied over every
    /// substep of the following tick.
    pub separation_force: f64,
    /// Velocity scale applied to both particles while penetrating.
    pub damping_factor: f64,
}

impl Default for ContactConfig {
    fn default() -> Self {
        Self {
            mode: ResponseMode::Mixed,
            restitution: 0.5,
            friction: 0.5,
            use_material_properties: false,
            contact_margin: 0.01,
            penetration_threshold: 1e-4,
            velocity_threshold: 1e-3,
            correction_factor: 0.8,
            backtrack_threshold: 0.5,
            separation_force: 100.0,
            damping_factor: 0.98,
        }
    }
}

impl ContactConfig {
    /// Elastic contacts.
    #[must_use]
    pub fn elastic() -> Self {
        Self {
            mode: ResponseMode::Elastic,
            ..Self::default()
        }
    }

    /// Inelastic contacts.
    #[must_use]
    pub fn inelastic() -> Self {
        Self {
            mode: ResponseMode::Inelastic,
            ..Self::default()
        }
    }

    /// Set the response mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: ResponseMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the restitution coefficient.
    #[must_use]
    pub const fn with_restitution(mut self, restitution: f64) -> Self {
        self.restitution = restitution;
        self
    }

    /// Set the friction coefficient.
    #[must_use]
    pub const fn with_friction(mut self, friction: f64) -> Self {
        self.friction = friction;
        self
    }

    /// Derive coefficients from materials.
    #[must_use]
    pub const fn with_materials(mut self, enabled: bool) -> Self {
        self.use_material_properties = enabled;
        self
    }

    /// Restitution and friction for a pair of materials.
    #[must_use]
    pub fn coefficients(&self, a: &Material, b: &Material) -> (f64, f64) {
        let materials = self.use_material_properties;
        match self.mode {
            ResponseMode::Elastic if materials => (a.average_bounciness(b), a.average_friction(b)),
            ResponseMode::Elastic => (1.0, self.friction),
            ResponseMode::Inelastic if materials => (0.0, a.average_friction(b) * 0.7),
            ResponseMode::Inelastic => (0.0, self.friction * 1.5),
            ResponseMode::Mixed if materials => (a.combined_bounciness(b), a.average_friction(b)),
            ResponseMode::Mixed => (self.restitution, self.friction),
        }
    }
}

/// Read-only snapshot of one particle taking part in a contact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactPoint {
    /// Position.
    pub position: Point3<f64>,
    /// Velocity.
    pub velocity: Vector3<f64>,
    /// Inverse mass, 0 for fixed particles.
    pub inverse_mass: f64,
    /// Contact radius.
    pub radius: f64,
}

/// Changes to apply to both particles of a resolved contact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactResponse {
    /// Unit normal from the first particle toward the second.
    pub normal: Vector3<f64>,
    /// Radius sum minus center distance (negative inside the margin).
    pub penetration: f64,
    /// Velocity change of the first particle.
    pub delta_velocity_a: Vector3<f64>,
    /// Velocity change of the second particle.
    pub delta_velocity_b: Vector3<f64>,
    /// Position change of the first particle.
    pub delta_position_a: Vector3<f64>,
    /// Position change of the second particle.
    pub delta_position_b: Vector3<f64>,
    /// Separation force for the first particle's next tick.
    pub force_a: Vector3<f64>,
    /// Separation force for the second particle's next tick.
    pub force_b: Vector3<f64>,
}

impl ContactResponse {
    fn new(normal: Vector3<f64>, penetration: f64) -> Self {
        Self {
            normal,
            penetration,
            delta_velocity_a: Vector3::zeros(),
            delta_velocity_b: Vector3::zeros(),
            delta_position_a: Vector3::zeros(),
            delta_position_b: Vector3::zeros(),
            force_a: Vector3::zeros(),
            force_b: Vector3::zeros(),
        }
    }
}

/// Whether two particles are close enough, and deep or fast enough, to resolve.
#[must_use]
pub fn in_contact(config: &ContactConfig, a: &ContactPoint, b: &ContactPoint) -> bool {
    let distance = (b.position - a.position).norm();
    let radius_sum = a.radius + b.radius;
    if distance >= radius_sum + config.contact_margin {
        return false;
    }
    let penetration = radius_sum - distance;
    let relative_speed = (b.velocity - a.velocity).norm();
    penetration >= config.penetration_threshold || relative_speed >= config.velocity_threshold
}

/// Resolve a contact between two particles.
///
/// Returns `None` if the particles are not in contact or both are fixed.
#[must_use]
pub fn resolve_contact(
    config: &ContactConfig,
    a: &ContactPoint,
    b: &ContactPoint,
    material_a: &Material,
    material_b: &Material,
) -> Option<ContactResponse> {
    if !in_contact(config, a, b) {
        return None;
    }
    let inverse_mass_sum = a.inverse_mass + b.inverse_mass;
    if inverse_mass_sum <= 0.0 {
        return None;
    }

    let delta = b.position - a.position;
    let distance = delta.norm();
    let radius_sum = a.radius + b.radius;
    let penetration = radius_sum - distance;
    let normal = if distance > NORMAL_EPSILON {
        delta / distance
    } else {
        Vector3::y()
    };

    let mut response = ContactResponse::new(normal, penetration);

    let relative_velocity = b.velocity - a.velocity;
    let normal_speed = relative_velocity.dot(&normal);

    // Skip the impulse when already separating
    if normal_speed < 0.0 {
        let (restitution, friction) = config.coefficients(material_a, material_b);
        let j = -(1.0 + restitution) * normal_speed / inverse_mass_sum;
        response.delta_velocity_a -= normal * (j * a.inverse_mass);
        response.delta_velocity_b += normal * (j * b.inverse_mass);

        // Coulomb friction on the post-impulse tangential velocity
        let relative_after =
            (b.velocity + response.delta_velocity_b) - (a.velocity + response.delta_velocity_a);
        let tangential = relative_after - normal * relative_after.dot(&normal);
        let tangential_speed = tangential.norm();
        if tangential_speed > NORMAL_EPSILON {
            let tangent = tangential / tangential_speed;
            let jt = (tangential_speed / inverse_mass_sum).min(j.abs() * friction);
            response.delta_velocity_a += tangent * (jt * a.inverse_mass);
            response.delta_velocity_b -= tangent * (jt * b.inverse_mass);
        }

        if config.mode == ResponseMode::Inelastic {
            damp(&mut response.delta_velocity_a, &a.velocity, a.inverse_mass, INELASTIC_DAMPING);
            damp(&mut response.delta_velocity_b, &b.velocity, b.inverse_mass, INELASTIC_DAMPING);
        }
    }

    if penetration > 0.0 {
        let correction = normal * (penetration * config.correction_factor / inverse_mass_sum);
        response.delta_position_a -= correction * a.inverse_mass;
        response.delta_position_b += correction * b.inverse_mass;

        let backtrack_threshold = config.backtrack_threshold * radius_sum;
        if penetration > backtrack_threshold {
            let backtrack = normal * (0.5 * (penetration - backtrack_threshold));
            if a.inverse_mass > 0.0 {
                response.delta_position_a -= backtrack;
            }
            if b.inverse_mass > 0.0 {
                response.delta_position_b += backtrack;
            }
        }

        let force = normal * (config.separation_force * penetration);
        if a.inverse_mass > 0.0 {
            response.force_a = -force;
        }
        if b.inverse_mass > 0.0 {
            response.force_b = force;
        }

        damp(
            &mut response.delta_velocity_a,
            &a.velocity,
            a.inverse_mass,
            config.damping_factor,
        );
        damp(
            &mut response.delta_velocity_b,
            &b.velocity,
            b.inverse_mass,
            config.damping_factor,
        );
    }

    Some(response)
}

/// Fold a velocity scale into a velocity delta: `v + dv -> (v + dv) * factor`.
fn damp(delta: &mut Vector3<f64>, velocity: &Vector3<f64>, inverse_mass: f64, factor: f64) {
    if inverse_mass > 0.0 {
        *delta = (velocity + *delta) * factor - velocity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn point(x: f64, vx: f64) -> ContactPoint {
        ContactPoint {
            position: Point3::new(x, 0.0, 0.0),
            velocity: Vector3::new(vx, 0.0, 0.0),
            inverse_mass: 1.0,
            radius: 0.5,
        }
    }

    fn resolve(config: &ContactConfig, a: &ContactPoint, b: &ContactPoint) -> ContactResponse {
        let m = Material::default();
        resolve_contact(config, a, b, &m, &m).unwrap_or_else(|| ContactResponse::new(Vector3::zeros(), 0.0))
    }

    #[test]
    fn test_inelastic_head_on_does_not_gain_speed() {
        let config = ContactConfig::inelastic();
        let a = point(0.0, 1.0);
        let b = point(0.9, -1.0);
        let r = resolve(&config, &a, &b);

        let va = a.velocity + r.delta_velocity_a;
        let vb = b.velocity + r.delta_velocity_b;
        assert!(va.norm() <= 1.0);
        assert!(vb.norm() <= 1.0);
        assert_relative_eq!(va, Vector3::zeros(), epsilon = 1e-12);
        assert_relative_eq!(vb, Vector3::zeros(), epsilon = 1e-12);
    }

    #[test]
    fn test_elastic_swaps_velocities() {
        let config = ContactConfig {
            damping_factor: 1.0,
            ..ContactConfig::elastic()
        };
        let a = point(0.0, 1.0);
        let b = point(0.95, -1.0);
        let r = resolve(&config, &a, &b);

        assert_relative_eq!(a.velocity + r.delta_velocity_a, Vector3::new(-1.0, 0.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(b.velocity + r.delta_velocity_b, Vector3::new(1.0, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_separating_pair_gets_no_impulse() {
        let config = ContactConfig {
            damping_factor: 1.0,
            ..ContactConfig::default()
        };
        let a = point(0.0, -1.0);
        let b = point(0.9, 1.0);
        let r = resolve(&config, &a, &b);

        assert_relative_eq!(r.delta_velocity_a, Vector3::zeros());
        assert_relative_eq!(r.delta_velocity_b, Vector3::zeros());
        // Still de-penetrated
        assert!(r.delta_position_a.x < 0.0);
        assert!(r.delta_position_b.x > 0.0);
    }

    #[test]
    fn test_out_of_range_pair_ignored() {
        let m = Material::default();
        let a = point(0.0, 1.0);
        let b = point(2.0, -1.0);
        assert!(resolve_contact(&ContactConfig::default(), &a, &b, &m, &m).is_none());
    }

    #[test]
    fn test_slow_shallow_contact_ignored() {
        let m = Material::default();
        let a = point(0.0, 0.0);
        // Inside the margin but not penetrating, and at rest
        let b = point(1.005, 0.0);
        assert!(resolve_contact(&ContactConfig::default(), &a, &b, &m, &m).is_none());
    }

    #[test]
    fn test_both_fixed_ignored() {
        let m = Material::default();
        let mut a = point(0.0, 1.0);
        let mut b = point(0.5, -1.0);
        a.inverse_mass = 0.0;
        b.inverse_mass = 0.0;
        assert!(resolve_contact(&ContactConfig::default(), &a, &b, &m, &m).is_none());
    }

    #[test]
    fn test_fixed_side_does_not_move() {
        let config = ContactConfig::default();
        let mut a = point(0.0, 0.0);
        a.inverse_mass = 0.0;
        let b = point(0.5, -1.0);
        let r = resolve(&config, &a, &b);

        assert_eq!(r.delta_velocity_a, Vector3::zeros());
        assert_eq!(r.delta_position_a, Vector3::zeros());
        assert_eq!(r.force_a, Vector3::zeros());
        assert!(r.delta_position_b.x > 0.0);
        assert!(b.velocity.x + r.delta_velocity_b.x > 0.0);
    }

    #[test]
    fn test_correction_and_backtrack() {
        let config = ContactConfig {
            correction_factor: 0.5,
            backtrack_threshold: 0.5,
            ..ContactConfig::default()
        };
        // Radius sum 1.0, penetration 0.8, backtrack threshold 0.5
        let a = point(0.0, 0.0);
        let b = point(0.2, 0.0);
        let r = resolve(&config, &a, &b);

        // 0.8 * 0.5 / 2 = 0.2 correction each, plus 0.5 * (0.8 - 0.5) = 0.15 backtrack
        assert_relative_eq!(r.delta_position_a.x, -0.35, epsilon = 1e-12);
        assert_relative_eq!(r.delta_position_b.x, 0.35, epsilon = 1e-12);
        assert_relative_eq!(r.force_b.x, 80.0, epsilon = 1e-9);
        assert_relative_eq!(r.force_a, -r.force_b);
    }

    #[test]
    fn test_friction_clamped_by_cone() {
        let config = ContactConfig {
            damping_factor: 1.0,
            friction: 0.1,
            ..ContactConfig::inelastic().with_mode(ResponseMode::Mixed)
        }
        .with_restitution(0.0);
        let a = ContactPoint {
            velocity: Vector3::new(0.2, 0.0, 5.0),
            ..point(0.0, 0.0)
        };
        let b = point(0.95, 0.0);
        let r = resolve(&config, &a, &b);

        // j = 0.2 / 2 = 0.1, friction impulse <= 0.01
        let tangential_change = r.delta_velocity_a.z.abs();
        assert!(tangential_change <= 0.01 + 1e-12);
        assert!(tangential_change > 0.0);
    }

    #[test]
    fn test_coincident_particles_use_up_normal() {
        let a = point(0.0, 0.0);
        let b = point(0.0, 0.0);
        let r = resolve(&ContactConfig::default(), &a, &b);
        assert_eq!(r.normal, Vector3::y());
    }

    #[test]
    fn test_material_coefficients() {
        let rubber = Material::new(0.8, 0.9);
        let foam = Material::new(0.2, 0.3);

        let mixed = ContactConfig::default().with_materials(true);
        let (e, mu) = mixed.coefficients(&rubber, &foam);
        assert_relative_eq!(e, 0.4, epsilon = 1e-12);
        assert_relative_eq!(mu, 0.6, epsilon = 1e-12);

        let elastic = ContactConfig::elastic();
        assert_relative_eq!(elastic.coefficients(&rubber, &foam).0, 1.0);

        let inelastic = ContactConfig::inelastic().with_friction(0.4);
        assert_relative_eq!(inelastic.coefficients(&rubber, &foam).1, 0.6, epsilon = 1e-12);
        let inelastic = inelastic.with_materials(true);
        assert_relative_eq!(inelastic.coefficients(&rubber, &foam).1, 0.42, epsilon = 1e-12);
    }
}
