//! Contact between two soft bodies.
//!
//! # Phases
//!
//! ```text
//! broad:   body bounds (expanded by the contact margin) overlap?
//!   │ no  -> done
//!   ▼
//! narrow:  surface(A) × surface(B), parallel, read-only snapshots
//!   │      -> candidate (i, j, ContactResponse)
//!   ▼
//! filter:  drop pairs already resolved this tick (PairSet)
//!   │
//!   ▼
//! apply:   velocity/position deltas accumulated per particle, reduced,
//!          then added; separation forces queued for the next tick
//! ```
//!
//! Interior particles never take part. A pair is recorded in the
//! [`PairSet`] under both orderings' key, so it is resolved at most once per
//! tick; the set is cleared at the start of every tick.

use hashbrown::HashSet;
use nalgebra::Vector3;
use rayon::prelude::*;
use tracing::debug;

use super::response::{resolve_contact, ContactConfig, ContactPoint, ContactResponse};
use crate::accumulator::Accumulator;
use crate::body::SoftBody;
use crate::types::{BodyId, ParticleFlags};

/// A particle identified by its body and index.
pub type ParticleKey = (BodyId, usize);

/// Particle pairs already resolved in the current tick.
#[derive(Debug, Clone, Default)]
pub struct PairSet {
    pairs: HashSet<(ParticleKey, ParticleKey)>,
}

impl PairSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the pair was recorded, in either order.
    #[must_use]
    pub fn contains(&self, a: ParticleKey, b: ParticleKey) -> bool {
        self.pairs.contains(&(a, b)) || self.pairs.contains(&(b, a))
    }

    /// Record a pair. Returns `false` if it was already recorded in either order.
    pub fn insert(&mut self, a: ParticleKey, b: ParticleKey) -> bool {
        if self.contains(a, b) {
            return false;
        }
        self.pairs.insert((a, b))
    }

    /// Number of recorded pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether no pair is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Forget all pairs. Called once per tick.
    pub fn clear(&mut self) {
        self.pairs.clear();
    }
}

fn contact_points(body: &SoftBody, indices: &[usize], min_mass: f64) -> Vec<ContactPoint> {
    let store = body.particles();
    indices
        .iter()
        .map(|&i| ContactPoint {
            position: store.positions()[i],
            velocity: store.velocities()[i],
            inverse_mass: store.inverse_mass(i, min_mass),
            radius: store.radii()[i],
        })
        .collect()
}

/// Whether the two bodies' bounds, expanded by `margin`, overlap.
#[must_use]
pub fn bounds_overlap(a: &SoftBody, b: &SoftBody, margin: f64) -> bool {
    if a.is_inert() || b.is_inert() {
        return false;
    }
    a.bounding_box()
        .expanded(margin)
        .overlaps(&b.bounding_box().expanded(margin))
}

/// Resolve contacts between the surface particles of two bodies.
///
/// `min_mass` is the floor used when inverting particle masses. Returns
/// the number of particle pairs resolved.
pub fn collide_bodies(
    a: &mut SoftBody,
    b: &mut SoftBody,
    config: &ContactConfig,
    min_mass: f64,
    pairs: &mut PairSet,
) -> usize {
    if !bounds_overlap(a, b, config.contact_margin) {
        return 0;
    }

    let surface_a = a.surface_indices();
    let surface_b = b.surface_indices();
    let points_a = contact_points(a, &surface_a, min_mass);
    let points_b = contact_points(b, &surface_b, min_mass);
    let material_a = *a.material();
    let material_b = *b.material();

    // Narrow phase: read-only over both snapshots
    let candidates: Vec<(usize, usize, ContactResponse)> = (0..points_a.len())
        .into_par_iter()
        .flat_map_iter(|i| {
            let pa = &points_a[i];
            points_b.iter().enumerate().filter_map(move |(j, pb)| {
                resolve_contact(config, pa, pb, &material_a, &material_b).map(|r| (i, j, r))
            })
        })
        .collect();

    let (id_a, id_b) = (a.id(), b.id());
    let mut resolved = Vec::with_capacity(candidates.len());
    for (i, j, response) in candidates {
        let (ia, ib) = (surface_a[i], surface_b[j]);
        if pairs.insert((id_a, ia), (id_b, ib)) {
            resolved.push((ia, ib, response));
        }
    }
    if resolved.is_empty() {
        return 0;
    }

    apply_side(a, resolved.iter().map(|(ia, _, r)| {
        (*ia, r.delta_velocity_a, r.delta_position_a, r.force_a)
    }));
    apply_side(b, resolved.iter().map(|(_, ib, r)| {
        (*ib, r.delta_velocity_b, r.delta_position_b, r.force_b)
    }));

    resolved.len()
}

/// Sum one body's contact changes per particle and apply them.
fn apply_side<I>(body: &mut SoftBody, changes: I)
where
    I: Iterator<Item = (usize, Vector3<f64>, Vector3<f64>, Vector3<f64>)>,
{
    let mut velocity = Accumulator::new();
    let mut position = Accumulator::new();

    for (index, dv, dp, force) in changes {
        velocity.push(index, dv);
        position.push(index, dp);
        if force != Vector3::zeros() {
            body.queue_force(index, force);
        }
        if let Err(err) = body
            .particles_mut()
            .set_flag(index, ParticleFlags::COLLIDING, true)
        {
            debug!(error = %err, index, "Contact flag not set");
        }
    }

    let n = body.num_particles();
    velocity.reduce(n);
    position.reduce(n);
    body.particles_mut()
        .apply_deltas(velocity.totals(), position.totals());
}
