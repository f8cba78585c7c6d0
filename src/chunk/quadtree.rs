use std::collections::HashMap;

use bevy::math::Vec3;

use crate::terrain::sphere::{face_axes, CubeFace};

/// One leaf handed to the mesh builder. Rebuilt from scratch every update.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChunkDescriptor {
    /// Chunk centre: world XY for planar chunks, a point on the cube for
    /// planet chunks.
    pub offset: Vec3,
    /// Half the chunk edge length.
    pub radius: f32,
    pub resolution: u32,
    pub detail_level: usize,
    pub face: Option<CubeFace>,
}

impl ChunkDescriptor {
    pub fn size(&self) -> f32 {
        self.radius * 2.0
    }

    pub fn local_up(&self) -> Vec3 {
        self.face.map_or(Vec3::Z, CubeFace::local_up)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct QuadTreeNode {
    pub position: Vec3,
    pub radius: f32,
    pub detail_level: usize,
    pub local_up: Vec3,
    pub axis_a: Vec3,
    pub axis_b: Vec3,
    pub children: Vec<QuadTreeNode>,
}

impl QuadTreeNode {
    pub fn root(position: Vec3, radius: f32, local_up: Vec3) -> Self {
        Self::new(position, radius, 0, local_up)
    }

    fn new(position: Vec3, radius: f32, detail_level: usize, local_up: Vec3) -> Self {
        let (axis_a, axis_b) = face_axes(local_up);
        Self {
            position,
            radius,
            detail_level,
            local_up,
            axis_a,
            axis_b,
            children: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Splits or collapses this subtree for a viewer at `viewer`.
    ///
    /// `anchor` maps a node to the world-space point its distance is measured
    /// from. A node at level `l` splits while that distance is within
    /// `distances[l]`; nodes at level `distances.len()` never split.
    pub fn update_chunk<F>(&mut self, viewer: Vec3, distances: &[f32], anchor: &F)
    where
        F: Fn(&QuadTreeNode) -> Vec3,
    {
        let Some(&threshold) = distances.get(self.detail_level) else {
            self.children.clear();
            return;
        };

        if anchor(self).distance(viewer) > threshold {
            self.children.clear();
            return;
        }

        if self.children.is_empty() {
            self.split();
        }
        for child in &mut self.children {
            child.update_chunk(viewer, distances, anchor);
        }
    }

    fn split(&mut self) {
        let half = self.radius / 2.0;
        let a = self.axis_a * half;
        let b = self.axis_b * half;
        self.children = [a + b, a - b, -a + b, -a - b]
            .into_iter()
            .map(|shift| {
                QuadTreeNode::new(
                    self.position + shift,
                    half,
                    self.detail_level + 1,
                    self.local_up,
                )
            })
            .collect();
    }

    pub fn visible_children(&self) -> Vec<&QuadTreeNode> {
        let mut leaves = Vec::new();
        self.collect_leaves(&mut leaves);
        leaves
    }

    fn collect_leaves<'a>(&'a self, leaves: &mut Vec<&'a QuadTreeNode>) {
        if self.children.is_empty() {
            leaves.push(self);
        } else {
            for child in &self.children {
                child.collect_leaves(leaves);
            }
        }
    }
}

/// Infinite z-up plane tiled by square roots of edge `root_size`; roots
/// further than `view_distance` from the viewer in XY are dropped.
#[derive(Clone, Debug)]
pub struct PlanarQuadTree {
    root_size: f32,
    view_distance: f32,
    distances: Vec<f32>,
    roots: HashMap<(i32, i32), QuadTreeNode>,
}

impl PlanarQuadTree {
    pub fn new(root_size: f32, view_distance: f32, distances: Vec<f32>) -> Self {
        Self {
            root_size,
            view_distance,
            distances,
            roots: HashMap::default(),
        }
    }

    pub fn update(&mut self, viewer: Vec3) {
        let size = self.root_size;
        let reach = (self.view_distance / size).ceil() as i32 + 1;
        let cell_x = (viewer.x / size).round() as i32;
        let cell_y = (viewer.y / size).round() as i32;

        let mut wanted = Vec::new();
        for dy in -reach..=reach {
            for dx in -reach..=reach {
                let cell = (cell_x + dx, cell_y + dy);
                let centre = Vec3::new(cell.0 as f32 * size, cell.1 as f32 * size, 0.0);
                // Nearest point of the tile, so tiles straddling the edge stay.
                let gap_x = ((viewer.x - centre.x).abs() - size / 2.0).max(0.0);
                let gap_y = ((viewer.y - centre.y).abs() - size / 2.0).max(0.0);
                if gap_x.hypot(gap_y) <= self.view_distance {
                    wanted.push((cell, centre));
                }
            }
        }

        self.roots
            .retain(|cell, _| wanted.iter().any(|(kept, _)| kept == cell));
        for (cell, centre) in wanted {
            self.roots
                .entry(cell)
                .or_insert_with(|| QuadTreeNode::root(centre, size / 2.0, Vec3::Z));
        }

        let anchor = |node: &QuadTreeNode| node.position;
        for root in self.roots.values_mut() {
            root.update_chunk(viewer, &self.distances, &anchor);
        }
    }

    pub fn roots(&self) -> impl Iterator<Item = &QuadTreeNode> {
        self.roots.values()
    }

    pub fn chunks(&self, resolution: u32) -> Vec<ChunkDescriptor> {
        self.roots
            .values()
            .flat_map(QuadTreeNode::visible_children)
            .map(|leaf| ChunkDescriptor {
                offset: leaf.position,
                radius: leaf.radius,
                resolution,
                detail_level: leaf.detail_level,
                face: None,
            })
            .collect()
    }
}

/// Six face quadtrees covering a cube of half-extent `radius`; distances are
/// measured to the node's projection on the planet surface.
#[derive(Clone, Debug)]
pub struct CubeQuadTree {
    radius: f32,
    origin: Vec3,
    distances: Vec<f32>,
    faces: Vec<(CubeFace, QuadTreeNode)>,
}

impl CubeQuadTree {
    pub fn new(radius: f32, origin: Vec3, distances: Vec<f32>) -> Self {
        let faces = CubeFace::ALL
            .into_iter()
            .map(|face| {
                let up = face.local_up();
                (face, QuadTreeNode::root(up * radius, radius, up))
            })
            .collect();
        Self {
            radius,
            origin,
            distances,
            faces,
        }
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    pub fn update(&mut self, viewer: Vec3) {
        let (radius, origin) = (self.radius, self.origin);
        let anchor = move |node: &QuadTreeNode| origin + node.position.normalize_or_zero() * radius;
        for (_, root) in &mut self.faces {
            root.update_chunk(viewer, &self.distances, &anchor);
        }
    }

    pub fn faces(&self) -> impl Iterator<Item = (CubeFace, &QuadTreeNode)> {
        self.faces.iter().map(|(face, root)| (*face, root))
    }

    pub fn chunks(&self, resolution: u32) -> Vec<ChunkDescriptor> {
        self.faces
            .iter()
            .flat_map(|(face, root)| {
                root.visible_children()
                    .into_iter()
                    .map(move |leaf| ChunkDescriptor {
                        offset: leaf.position,
                        radius: leaf.radius,
                        resolution,
                        detail_level: leaf.detail_level,
                        face: Some(*face),
                    })
            })
            .collect()
    }
}

#[derive(Clone, Debug)]
pub enum QuadTree {
    Planar(PlanarQuadTree),
    Cube(CubeQuadTree),
}

impl QuadTree {
    pub fn update(&mut self, viewer: Vec3) {
        match self {
            QuadTree::Planar(tree) => tree.update(viewer),
            QuadTree::Cube(tree) => tree.update(viewer),
        }
    }

    pub fn chunks(&self, resolution: u32) -> Vec<ChunkDescriptor> {
        match self {
            QuadTree::Planar(tree) => tree.chunks(resolution),
            QuadTree::Cube(tree) => tree.chunks(resolution),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::lod::{DETAIL_LEVEL_DISTANCES, PLANET_RADIUS};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn assert_split_invariant(node: &QuadTreeNode) {
        assert!(node.children.is_empty() || node.children.len() == 4);
        for child in &node.children {
            assert_eq!(child.radius, node.radius / 2.0);
            assert_eq!(child.detail_level, node.detail_level + 1);
            assert_split_invariant(child);
        }
    }

    fn sorted(mut chunks: Vec<ChunkDescriptor>) -> Vec<ChunkDescriptor> {
        chunks.sort_by(|a, b| {
            (a.face.map(|f| f as u8), a.offset.to_array(), a.radius)
                .partial_cmp(&(b.face.map(|f| f as u8), b.offset.to_array(), b.radius))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        chunks
    }

    #[test]
    fn far_viewer_leaves_root_unsplit() {
        let mut root = QuadTreeNode::root(Vec3::ZERO, 100.0, Vec3::Z);
        root.update_chunk(Vec3::new(1.0e6, 0.0, 0.0), &[500.0], &|n: &QuadTreeNode| n.position);
        assert!(root.is_leaf());
        assert_eq!(root.visible_children().len(), 1);
    }

    #[test]
    fn children_follow_creation_order() {
        let mut root = QuadTreeNode::root(Vec3::ZERO, 100.0, Vec3::Z);
        root.update_chunk(Vec3::ZERO, &[1000.0], &|n: &QuadTreeNode| n.position);
        assert_eq!(root.children.len(), 4);
        let a = root.axis_a * 50.0;
        let b = root.axis_b * 50.0;
        let positions: Vec<Vec3> = root.children.iter().map(|c| c.position).collect();
        assert_eq!(positions, vec![a + b, a - b, -a + b, -a - b]);
        assert!(root.children.iter().all(QuadTreeNode::is_leaf));
    }

    #[test]
    fn moving_away_collapses_children() {
        let mut root = QuadTreeNode::root(Vec3::ZERO, 100.0, Vec3::Z);
        let anchor = |n: &QuadTreeNode| n.position;
        root.update_chunk(Vec3::ZERO, &[1000.0, 1000.0], &anchor);
        assert_eq!(root.visible_children().len(), 16);
        root.update_chunk(Vec3::new(5000.0, 0.0, 0.0), &[1000.0, 1000.0], &anchor);
        assert!(root.is_leaf());
    }

    #[test]
    fn cube_tree_keeps_split_invariant_for_random_viewers() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut tree = CubeQuadTree::new(PLANET_RADIUS, Vec3::ZERO, DETAIL_LEVEL_DISTANCES.to_vec());
        for _ in 0..20 {
            let direction = Vec3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            )
            .normalize_or_zero();
            let altitude = rng.gen_range(5.0..3000.0);
            tree.update(direction * (PLANET_RADIUS + altitude));
            for (_, root) in tree.faces() {
                assert_split_invariant(root);
                assert!(root.detail_level == 0);
            }
        }
    }

    #[test]
    fn update_is_idempotent() {
        let viewer = Vec3::new(0.0, PLANET_RADIUS + 20.0, 0.0);
        let mut tree = CubeQuadTree::new(PLANET_RADIUS, Vec3::ZERO, DETAIL_LEVEL_DISTANCES.to_vec());
        tree.update(viewer);
        let first = sorted(tree.chunks(16));
        tree.update(viewer);
        assert_eq!(first, sorted(tree.chunks(16)));

        let mut planar = PlanarQuadTree::new(1000.0, 2000.0, vec![1500.0, 600.0, 200.0]);
        let viewer = Vec3::new(120.0, -40.0, 30.0);
        planar.update(viewer);
        let first = sorted(planar.chunks(8));
        planar.update(viewer);
        assert_eq!(first, sorted(planar.chunks(8)));
    }

    #[test]
    fn detail_concentrates_near_the_viewer() {
        let viewer = Vec3::new(0.0, PLANET_RADIUS + 20.0, 0.0);
        let distances = vec![5000.0, 3000.0, 1500.0, 800.0, 400.0];
        let mut tree = CubeQuadTree::new(PLANET_RADIUS, Vec3::ZERO, distances);
        tree.update(viewer);
        let chunks = tree.chunks(16);
        let finest = chunks
            .iter()
            .max_by_key(|c| c.detail_level)
            .expect("at least one chunk");
        assert_eq!(finest.face, Some(CubeFace::PosY));
        assert_eq!(finest.detail_level, 5);
        let far_side = chunks
            .iter()
            .filter(|c| c.face == Some(CubeFace::NegY))
            .collect::<Vec<_>>();
        assert_eq!(far_side.len(), 1);
        assert_eq!(far_side[0].detail_level, 0);
    }

    #[test]
    fn planar_roots_follow_the_viewer() {
        let mut planar = PlanarQuadTree::new(1000.0, 1500.0, vec![]);
        planar.update(Vec3::ZERO);
        let before: Vec<Vec3> = planar.roots().map(|r| r.position).collect();
        assert!(before.contains(&Vec3::ZERO));
        assert!(planar.roots().all(QuadTreeNode::is_leaf));

        planar.update(Vec3::new(10_000.0, 0.0, 0.0));
        assert!(!planar.roots().any(|r| r.position == Vec3::ZERO));
        assert!(planar.roots().any(|r| r.position == Vec3::new(10_000.0, 0.0, 0.0)));
    }
}
