//! Contact handling: ground plane, convex primitives, and body-body contact.
//!
//! - [`ground`]: per-particle clamp and bounce against a horizontal plane
//! - [`shapes`]: stateless narrow-phase tests for convex primitives
//! - [`response`]: impulse, friction and de-penetration for one particle pair
//! - [`inter_body`]: broad and narrow phase between two soft bodies

pub mod ground;
pub mod inter_body;
pub mod response;
pub mod shapes;

pub use ground::GroundPlane;
pub use inter_body::{collide_bodies, PairSet};
pub use response::{resolve_contact, ContactConfig, ContactPoint, ContactResponse, ResponseMode};
pub use shapes::{intersects, Collider, ConvexShape, ShapeKind};
