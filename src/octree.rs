//! Octree subdivision of a mesh's bounding volume.
//!
//! Each node carries two boxes: its world-space cell and the matching cell
//! of the mesh's local bounding box. Both are split with the same octant
//! index so a leaf can test mesh vertices in local space while sampling in
//! world space.
//!
//! A node is either a leaf or divided into exactly eight children:
//!
//! ```text
//! index bits:  z y x
//!              │ │ └─ 0 = -X half, 1 = +X half
//!              │ └─── 0 = -Y half, 1 = +Y half
//!              └───── 0 = -Z half, 1 = +Z half
//! ```

use crate::bounds::Aabb;

/// Number of children of a divided node.
pub const CHILD_COUNT: usize = 8;

/// A node of the sampling octree.
#[derive(Debug, Clone, PartialEq)]
pub struct OctreeNode {
    world: Aabb,
    local: Aabb,
    children: Option<Box<[OctreeNode; CHILD_COUNT]>>,
}

impl OctreeNode {
    /// Create an undivided node.
    #[must_use]
    pub const fn new(world: Aabb, local: Aabb) -> Self {
        Self {
            world,
            local,
            children: None,
        }
    }

    /// World-space cell.
    #[must_use]
    pub const fn world_bounds(&self) -> &Aabb {
        &self.world
    }

    /// Mesh-local cell.
    #[must_use]
    pub const fn local_bounds(&self) -> &Aabb {
        &self.local
    }

    /// Whether this node has been split into children.
    #[must_use]
    pub const fn is_divided(&self) -> bool {
        self.children.is_some()
    }

    /// Whether this node is a leaf.
    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    /// The eight children, if divided.
    #[must_use]
    pub fn children(&self) -> Option<&[OctreeNode; CHILD_COUNT]> {
        self.children.as_deref()
    }

    /// Split this node into eight children.
    ///
    /// Returns `false` (and stays a leaf) when every axis of the world cell
    /// is already at most `min_size`, or when the node is already divided.
    pub fn divide(&mut self, min_size: f64) -> bool {
        if self.is_divided() {
            return false;
        }
        let size = self.world.size();
        if size.x <= min_size && size.y <= min_size && size.z <= min_size {
            return false;
        }
        let children: [Self; CHILD_COUNT] =
            std::array::from_fn(|i| Self::new(self.world.octant(i), self.local.octant(i)));
        self.children = Some(Box::new(children));
        true
    }

    /// Depth-first construction pass.
    ///
    /// Divides wherever possible and calls `on_leaf` for every node that
    /// stays undivided. Returns 1 when this node stays a leaf, otherwise the
    /// number of nodes created below it: eight for the direct children plus
    /// whatever each divided child created in turn.
    pub fn build<F>(&mut self, min_size: f64, on_leaf: &mut F) -> usize
    where
        F: FnMut(&OctreeNode),
    {
        if !self.divide(min_size) && self.is_leaf() {
            on_leaf(self);
            return 1;
        }

        let mut count = CHILD_COUNT;
        if let Some(children) = self.children.as_deref_mut() {
            for child in children.iter_mut() {
                let below = child.build(min_size, on_leaf);
                // Undivided children are already part of the eight.
                if child.is_divided() {
                    count += below;
                }
            }
        }
        count
    }

    /// Collect references to every leaf below (or at) this node.
    #[must_use]
    pub fn leaves(&self) -> Vec<&OctreeNode> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a OctreeNode>) {
        match self.children.as_deref() {
            Some(children) => {
                for child in children {
                    child.collect_leaves(out);
                }
            }
            None => out.push(self),
        }
    }

    /// Maximum depth below this node (0 for a leaf).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.children.as_deref().map_or(0, |children| {
            1 + children.iter().map(Self::depth).max().unwrap_or(0)
        })
    }
}
