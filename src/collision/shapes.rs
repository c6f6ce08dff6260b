//! Narrow-phase intersection tests for convex primitives.
//!
//! Supported pairs:
//!
//! | Pair          | Test                                         |
//! |---------------|----------------------------------------------|
//! | sphere–sphere | squared center distance vs. squared radii    |
//! | sphere–box    | closest point on the box in box-local space  |
//! | box–box       | separating-axis theorem over 15 axes         |
//!
//! Every other pair (anything involving a cylinder or cone) reports no
//! intersection. Use [`is_supported_pair`] to check coverage up front.

use nalgebra::{Matrix3, Point3, UnitQuaternion, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::material::Material;

/// Cross-product axes with a squared norm below this are skipped (parallel edges).
const SAT_AXIS_EPSILON: f64 = 1e-12;

/// Discriminant of a [`ConvexShape`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ShapeKind {
    /// Sphere.
    Sphere,
    /// Oriented box.
    Box,
    /// Cylinder.
    Cylinder,
    /// Cone.
    Cone,
}

/// Convex collision primitive in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConvexShape {
    /// Sphere.
    Sphere {
        /// Center.
        center: Point3<f64>,
        /// Radius.
        radius: f64,
    },
    /// Oriented box.
    Box {
        /// Center.
        center: Point3<f64>,
        /// Rotation from box-local to world.
        orientation: UnitQuaternion<f64>,
        /// Half-extents along the local axes.
        half_extents: Vector3<f64>,
    },
    /// Cylinder along the local Y axis.
    Cylinder {
        /// Center.
        center: Point3<f64>,
        /// Rotation from cylinder-local to world.
        orientation: UnitQuaternion<f64>,
        /// Radius.
        radius: f64,
        /// Full height.
        height: f64,
    },
    /// Cone with its apex on the local +Y axis.
    Cone {
        /// Apex.
        apex: Point3<f64>,
        /// Rotation from cone-local to world.
        orientation: UnitQuaternion<f64>,
        /// Radius of the base.
        base_radius: f64,
        /// Apex-to-base height.
        height: f64,
    },
}

impl ConvexShape {
    /// Create a sphere.
    #[must_use]
    pub const fn sphere(center: Point3<f64>, radius: f64) -> Self {
        Self::Sphere { center, radius }
    }

    /// Create an axis-aligned box.
    #[must_use]
    pub fn cuboid(center: Point3<f64>, half_extents: Vector3<f64>) -> Self {
        Self::Box {
            center,
            orientation: UnitQuaternion::identity(),
            half_extents,
        }
    }

    /// Create an oriented box.
    #[must_use]
    pub const fn oriented_box(
        center: Point3<f64>,
        orientation: UnitQuaternion<f64>,
        half_extents: Vector3<f64>,
    ) -> Self {
        Self::Box {
            center,
            orientation,
            half_extents,
        }
    }

    /// The shape's kind.
    #[must_use]
    pub const fn kind(&self) -> ShapeKind {
        match self {
            Self::Sphere { .. } => ShapeKind::Sphere,
            Self::Box { .. } => ShapeKind::Box,
            Self::Cylinder { .. } => ShapeKind::Cylinder,
            Self::Cone { .. } => ShapeKind::Cone,
        }
    }
}

/// A convex shape with contact material and mass.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Collider {
    /// Geometry.
    pub shape: ConvexShape,
    /// Contact material.
    pub material: Material,
    /// Mass (kg).
    pub mass: f64,
}

impl Collider {
    /// Create a collider with the default material and unit mass.
    #[must_use]
    pub fn new(shape: ConvexShape) -> Self {
        Self {
            shape,
            material: Material::default(),
            mass: 1.0,
        }
    }

    /// Set the material.
    #[must_use]
    pub const fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    /// Set the mass.
    #[must_use]
    pub const fn with_mass(mut self, mass: f64) -> Self {
        self.mass = mass;
        self
    }

    /// Test intersection with another collider.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        intersects(&self.shape, &other.shape)
    }
}

/// Whether [`intersects`] has a real test for this pair of kinds.
#[must_use]
pub const fn is_supported_pair(a: ShapeKind, b: ShapeKind) -> bool {
    matches!(
        (a, b),
        (ShapeKind::Sphere | ShapeKind::Box, ShapeKind::Sphere | ShapeKind::Box)
    )
}

/// Narrow-phase intersection test.
///
/// Unsupported pairs return `false`.
#[must_use]
pub fn intersects(a: &ConvexShape, b: &ConvexShape) -> bool {
    match (a, b) {
        (
            ConvexShape::Sphere {
                center: c1,
                radius: r1,
            },
            ConvexShape::Sphere {
                center: c2,
                radius: r2,
            },
        ) => sphere_sphere(c1, *r1, c2, *r2),
        (
            ConvexShape::Sphere { center, radius },
            ConvexShape::Box {
                center: box_center,
                orientation,
                half_extents,
            },
        )
        | (
            ConvexShape::Box {
                center: box_center,
                orientation,
                half_extents,
            },
            ConvexShape::Sphere { center, radius },
        ) => sphere_box(center, *radius, box_center, orientation, half_extents),
        (
            ConvexShape::Box {
                center: c1,
                orientation: o1,
                half_extents: h1,
            },
            ConvexShape::Box {
                center: c2,
                orientation: o2,
                half_extents: h2,
            },
        ) => box_box(c1, o1, h1, c2, o2, h2),
        _ => false,
    }
}

/// Sphere-sphere test: touching spheres intersect.
#[must_use]
pub fn sphere_sphere(c1: &Point3<f64>, r1: f64, c2: &Point3<f64>, r2: f64) -> bool {
    let radii = r1 + r2;
    (c2 - c1).norm_squared() <= radii * radii
}

/// Sphere-box test via the closest point on the box to the sphere center.
#[must_use]
pub fn sphere_box(
    sphere_center: &Point3<f64>,
    radius: f64,
    box_center: &Point3<f64>,
    orientation: &UnitQuaternion<f64>,
    half_extents: &Vector3<f64>,
) -> bool {
    // Transform sphere center to box local coordinates
    let local = orientation.inverse_transform_vector(&(sphere_center - box_center));

    let closest_local = Vector3::new(
        local.x.clamp(-half_extents.x, half_extents.x),
        local.y.clamp(-half_extents.y, half_extents.y),
        local.z.clamp(-half_extents.z, half_extents.z),
    );
    let closest_world = box_center + orientation.transform_vector(&closest_local);

    (sphere_center - closest_world).norm_squared() <= radius * radius
}

/// Box-box test using the separating-axis theorem.
///
/// Tests the 3 face normals of each box and the 9 edge-edge cross
/// products. Cross products of (nearly) parallel edges are skipped.
#[must_use]
pub fn box_box(
    c1: &Point3<f64>,
    o1: &UnitQuaternion<f64>,
    h1: &Vector3<f64>,
    c2: &Point3<f64>,
    o2: &UnitQuaternion<f64>,
    h2: &Vector3<f64>,
) -> bool {
    let axes1 = box_axes(o1);
    let axes2 = box_axes(o2);
    let center_diff = c2 - c1;

    let separated = |axis: &Vector3<f64>| {
        let r1 = project_half_extents(axis, &axes1, h1);
        let r2 = project_half_extents(axis, &axes2, h2);
        center_diff.dot(axis).abs() > r1 + r2
    };

    if axes1.iter().chain(axes2.iter()).any(separated) {
        return false;
    }

    for a in &axes1 {
        for b in &axes2 {
            let axis = a.cross(b);
            if axis.norm_squared() < SAT_AXIS_EPSILON {
                continue;
            }
            if separated(&axis) {
                return false;
            }
        }
    }
    true
}

fn box_axes(orientation: &UnitQuaternion<f64>) -> [Vector3<f64>; 3] {
    let mat: Matrix3<f64> = orientation.to_rotation_matrix().into_inner();
    [
        mat.column(0).into_owned(),
        mat.column(1).into_owned(),
        mat.column(2).into_owned(),
    ]
}

/// Projected radius of a box onto an axis.
fn project_half_extents(
    axis: &Vector3<f64>,
    box_axes: &[Vector3<f64>; 3],
    half_extents: &Vector3<f64>,
) -> f64 {
    box_axes
        .iter()
        .zip(half_extents.iter())
        .map(|(local, h)| axis.dot(local).abs() * h)
        .sum()
}
