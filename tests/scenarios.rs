//! End-to-end scenarios: primitive tests, octree subdivision, ground
//! contact, body construction and multi-body stepping.

use approx::assert_relative_eq;
use nalgebra::{Point3, Similarity3, Translation3, UnitQuaternion, Vector3};

use sim_softbody::collision::{resolve_contact, ContactPoint};
use sim_softbody::{
    intersects, Aabb, ContactConfig, ConvexShape, GroundPlane, Material, OctreeNode,
    ParticleFlags, ParticleStore, SamplerConfig, SimulationConfig, SoftBody, TriangleMesh, World,
};

fn placed(x: f64, y: f64, z: f64) -> Similarity3<f64> {
    Similarity3::from_parts(
        Translation3::new(x, y, z),
        UnitQuaternion::identity(),
        1.0,
    )
}

#[test]
fn spheres_overlapping_at_distance_1_5() {
    let a = ConvexShape::sphere(Point3::origin(), 1.0);
    let b = ConvexShape::sphere(Point3::new(1.5, 0.0, 0.0), 1.0);
    assert!(intersects(&a, &b));
}

#[test]
fn sphere_against_unit_box() {
    let unit = ConvexShape::cuboid(Point3::origin(), Vector3::new(1.0, 1.0, 1.0));
    // Closest point (1,0,0): distance 0.5 > 0.4
    assert!(!intersects(
        &unit,
        &ConvexShape::sphere(Point3::new(1.5, 0.0, 0.0), 0.4)
    ));
    // Distance 0.3 < 0.4
    assert!(intersects(
        &unit,
        &ConvexShape::sphere(Point3::new(1.3, 0.0, 0.0), 0.4)
    ));
}

#[test]
fn octree_half_unit_cells_divide_once() {
    let root = Aabb::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
    let mut node = OctreeNode::new(root, root);
    let mut leaves = 0;

    let count = node.build(0.5, &mut |_| leaves += 1);

    assert_eq!(count, 8);
    assert_eq!(leaves, 8);
    assert_eq!(node.depth(), 1);
    for leaf in node.leaves() {
        assert_relative_eq!(leaf.world_bounds().size(), Vector3::new(0.5, 0.5, 0.5));
        assert!(leaf.is_leaf());
    }
}

#[test]
fn ground_bounce_scales_by_bounce_coefficient() {
    let mut store = ParticleStore::new();
    store.push(
        Point3::origin(),
        1.0,
        0.05,
        ParticleFlags::empty(),
        Aabb::from_point(Point3::origin()),
    );
    store.velocities_mut()[0] = Vector3::new(0.0, -2.0, 0.0);

    GroundPlane::new(0.0, 0.5, 0.8).resolve(&mut store);

    assert_relative_eq!(store.velocities()[0], Vector3::new(0.0, 1.0, 0.0));
}

#[test]
fn inelastic_head_on_collision_loses_speed() {
    let config = ContactConfig::inelastic();
    let material = Material::default();
    let a = ContactPoint {
        position: Point3::origin(),
        velocity: Vector3::new(3.0, 0.0, 0.0),
        inverse_mass: 0.5,
        radius: 0.1,
    };
    let b = ContactPoint {
        position: Point3::new(0.15, 0.0, 0.0),
        velocity: Vector3::new(-3.0, 0.0, 0.0),
        ..a
    };

    let response = resolve_contact(&config, &a, &b, &material, &material);
    assert!(response.is_some());
    if let Some(r) = response {
        assert!((a.velocity + r.delta_velocity_a).norm() <= a.velocity.norm());
        assert!((b.velocity + r.delta_velocity_b).norm() <= b.velocity.norm());
    }
}

#[test]
fn spring_at_rest_produces_no_motion() {
    let mut world = World::new(SimulationConfig::default().zero_gravity().without_ground());
    let mesh = TriangleMesh::cuboid(Vector3::new(0.25, 0.25, 0.25));
    let id = world.spawn_from_mesh("rest", &mesh, &placed(0.0, 0.0, 0.0));
    assert!(id.is_ok());

    let before: Vec<Point3<f64>> = world
        .bodies()
        .iter()
        .flat_map(|b| b.positions().to_vec())
        .collect();
    let stats = world.step();
    assert_relative_eq!(stats.kinetic_energy, 0.0, epsilon = 1e-18);

    let after: Vec<Point3<f64>> = world
        .bodies()
        .iter()
        .flat_map(|b| b.positions().to_vec())
        .collect();
    for (p, q) in before.iter().zip(&after) {
        assert_relative_eq!(p, q, epsilon = 1e-12);
    }
}

#[test]
fn sampled_body_conserves_mass_after_insertions() {
    let config = SimulationConfig::default().with_total_mass(3.0);
    let mesh = TriangleMesh::cuboid(Vector3::new(0.3, 0.3, 0.3));
    let body = SoftBody::from_mesh("cube", &mesh, &placed(0.0, 0.0, 0.0), &config);
    assert!(body.is_ok());
    let Ok(mut body) = body else { return };

    for i in 0..5 {
        body.insert_particle(Point3::new(0.01 * f64::from(i), 0.02, -0.01));
        assert_relative_eq!(body.total_mass(), 3.0, epsilon = 1e-9);
    }
}

#[test]
fn rotated_scaled_mesh_samples_inside_bounds() {
    let mesh = TriangleMesh::cuboid(Vector3::new(0.5, 0.25, 0.5));
    let transform = Similarity3::from_parts(
        Translation3::new(1.0, 2.0, -1.0),
        UnitQuaternion::from_euler_angles(0.3, 0.5, 0.1),
        0.8,
    );
    let config = SimulationConfig::default().with_sampler(SamplerConfig::coarse());
    let body = SoftBody::from_mesh("rotated", &mesh, &transform, &config);
    assert!(body.as_ref().is_ok_and(|b| !b.is_inert()));

    if let Ok(body) = body {
        let bounds = mesh.world_bounds(&transform).expanded(1e-9);
        for p in body.positions() {
            assert!(bounds.contains(p));
        }
    }
}

#[test]
fn two_cubes_dropped_stay_above_ground() {
    let mut world = World::new(SimulationConfig::default());
    let mesh = TriangleMesh::cuboid(Vector3::new(0.25, 0.25, 0.25));
    assert!(world.spawn_from_mesh("low", &mesh, &placed(0.0, 0.5, 0.0)).is_ok());
    assert!(world.spawn_from_mesh("high", &mesh, &placed(0.1, 1.2, 0.0)).is_ok());

    let mut contacts = 0;
    for _ in 0..90 {
        let stats = world.step();
        contacts += stats.body_contacts;
        assert_eq!(stats.numerical_faults, 0);
    }

    assert!(contacts > 0, "upper cube should land on the lower one");
    for body in world.bodies().iter() {
        assert!(body
            .positions()
            .iter()
            .all(|p| p.y >= 0.0 && p.coords.iter().all(|c| c.is_finite())));
    }
}

#[test]
fn unregistered_body_no_longer_steps() {
    let mut world = World::new(SimulationConfig::default());
    let mesh = TriangleMesh::cuboid(Vector3::new(0.25, 0.25, 0.25));
    let id = world.spawn_from_mesh("gone", &mesh, &placed(0.0, 1.0, 0.0));
    let Ok(id) = id else {
        panic!("spawn failed");
    };

    let removed = world.remove_body(id);
    assert!(removed.is_ok());
    assert!(world.body(id).is_none());
    assert_eq!(world.step().particles, 0);
}

#[test]
fn empty_mesh_body_is_inert_in_world() {
    let mut world = World::new(SimulationConfig::default());
    let id = world.spawn_from_mesh("empty", &TriangleMesh::default(), &placed(0.0, 1.0, 0.0));
    assert!(id.is_ok());

    let stats = world.step();
    assert_eq!(stats.particles, 0);
    assert_eq!(stats.edges, 0);
}
