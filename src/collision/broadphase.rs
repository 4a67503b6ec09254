//! Broad phase built on a dynamic AABB tree.
//!
//! Leaves hold fat AABBs keyed by stable proxy ids; internal nodes hold the
//! union of their children. Insertion descends by minimum perimeter cost and
//! the tree is height-balanced with rotations on the way back up.

use glam::Vec2;

use crate::collision::aabb::Aabb;
use crate::collision::RayCastInput;
use crate::config::{AABB_EXTENSION, AABB_MULTIPLIER};

/// Stable identifier of a leaf in the tree.
pub type ProxyId = usize;

const NULL_NODE: usize = usize::MAX;

#[derive(Debug, Clone, Copy)]
struct TreeNode<T> {
    aabb: Aabb,
    user_data: Option<T>,
    parent: usize,
    child1: usize,
    child2: usize,
    /// 0 for leaves, NULL_NODE sentinel is not used here; free nodes
    /// carry usize::MAX.
    height: usize,
}

impl<T> TreeNode<T> {
    fn is_leaf(&self) -> bool {
        self.child1 == NULL_NODE
    }
}

/// Dynamic AABB tree with free-list node pooling.
pub struct DynamicTree<T> {
    nodes: Vec<TreeNode<T>>,
    root: usize,
    free_list: usize,
    node_count: usize,
    /// Fat-AABB margin applied on insert and re-insert.
    margin: f32,
}

impl<T: Copy> Default for DynamicTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> DynamicTree<T> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            root: NULL_NODE,
            free_list: NULL_NODE,
            node_count: 0,
            margin: AABB_EXTENSION,
        }
    }

    pub fn set_margin(&mut self, margin: f32) {
        self.margin = margin;
    }

    fn allocate_node(&mut self) -> usize {
        if self.free_list != NULL_NODE {
            let index = self.free_list;
            self.free_list = self.nodes[index].parent;
            let node = &mut self.nodes[index];
            node.parent = NULL_NODE;
            node.child1 = NULL_NODE;
            node.child2 = NULL_NODE;
            node.height = 0;
            node.user_data = None;
            self.node_count += 1;
            return index;
        }

        self.nodes.push(TreeNode {
            aabb: Aabb::new(Vec2::ZERO, Vec2::ZERO),
            user_data: None,
            parent: NULL_NODE,
            child1: NULL_NODE,
            child2: NULL_NODE,
            height: 0,
        });
        self.node_count += 1;
        self.nodes.len() - 1
    }

    fn free_node(&mut self, index: usize) {
        self.nodes[index].parent = self.free_list;
        self.nodes[index].height = usize::MAX;
        self.nodes[index].user_data = None;
        self.free_list = index;
        self.node_count -= 1;
    }

    /// Creates a leaf with a fat AABB and returns its stable id.
    pub fn create_proxy(&mut self, aabb: Aabb, user_data: T) -> ProxyId {
        let index = self.allocate_node();
        self.nodes[index].aabb = aabb.fattened(self.margin);
        self.nodes[index].user_data = Some(user_data);
        self.nodes[index].height = 0;
        self.insert_leaf(index);
        index
    }

    pub fn destroy_proxy(&mut self, proxy: ProxyId) {
        assert!(self.nodes[proxy].is_leaf(), "destroy_proxy on internal node");
        self.remove_leaf(proxy);
        self.free_node(proxy);
    }

    /// Re-homes the proxy when its tight AABB escapes the stored fat one.
    /// Returns whether the proxy was re-inserted.
    pub fn update_proxy(&mut self, proxy: ProxyId, aabb: Aabb, displacement: Vec2) -> bool {
        assert!(self.nodes[proxy].is_leaf(), "update_proxy on internal node");
        if self.nodes[proxy].aabb.contains(&aabb) {
            return false;
        }

        self.remove_leaf(proxy);
        self.nodes[proxy].aabb = aabb
            .fattened(self.margin)
            .displaced(AABB_MULTIPLIER * displacement);
        self.insert_leaf(proxy);
        true
    }

    pub fn user_data(&self, proxy: ProxyId) -> T {
        self.nodes[proxy].user_data.expect("live proxy")
    }

    pub fn fat_aabb(&self, proxy: ProxyId) -> Aabb {
        self.nodes[proxy].aabb
    }

    pub fn height(&self) -> usize {
        if self.root == NULL_NODE {
            0
        } else {
            self.nodes[self.root].height
        }
    }

    pub fn proxy_count(&self) -> usize {
        // Internal nodes come in one-per-extra-leaf, so count leaves.
        (self.node_count + 1) / 2
    }

    /// Subtracts `delta` from every stored AABB.
    pub fn shift_origin(&mut self, delta: Vec2) {
        for node in &mut self.nodes {
            if node.height != usize::MAX {
                node.aabb = node.aabb.translated(-delta);
            }
        }
    }

    /// Visits every leaf whose fat AABB overlaps `aabb`. The visitor
    /// returns false to abort the walk.
    pub fn query(&self, aabb: &Aabb, mut visitor: impl FnMut(ProxyId) -> bool) {
        let mut stack = Vec::with_capacity(64);
        if self.root != NULL_NODE {
            stack.push(self.root);
        }

        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if !node.aabb.overlaps(aabb) {
                continue;
            }
            if node.is_leaf() {
                if !visitor(index) {
                    return;
                }
            } else {
                stack.push(node.child1);
                stack.push(node.child2);
            }
        }
    }

    /// Casts a segment through the tree. The visitor receives the current
    /// input and a leaf id, and returns a new max fraction: `<= 0`
    /// terminates, positive values clip the remaining segment.
    pub fn ray_cast(
        &self,
        input: &RayCastInput,
        mut visitor: impl FnMut(&RayCastInput, ProxyId) -> f32,
    ) {
        let p1 = input.p1;
        let p2 = input.p2;
        let r = (p2 - p1).normalize_or_zero();
        if r == Vec2::ZERO {
            return;
        }

        // Perpendicular to the ray; used for a fast segment/AABB reject.
        let v = Vec2::new(-r.y, r.x);
        let abs_v = v.abs();

        let mut max_fraction = input.max_fraction;
        let mut segment_aabb = segment_bounds(p1, p2, max_fraction);

        let mut stack = Vec::with_capacity(64);
        if self.root != NULL_NODE {
            stack.push(self.root);
        }

        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if !node.aabb.overlaps(&segment_aabb) {
                continue;
            }

            // Separating axis: |dot(v, p1 - center)| > dot(|v|, extents)
            let c = node.aabb.center();
            let h = node.aabb.extents();
            let separation = v.dot(p1 - c).abs() - abs_v.dot(h);
            if separation > 0.0 {
                continue;
            }

            if node.is_leaf() {
                let sub_input = RayCastInput {
                    p1,
                    p2,
                    max_fraction,
                };
                let value = visitor(&sub_input, index);
                if value <= 0.0 {
                    return;
                }
                // The returned fraction replaces the search bound; it may
                // grow again when a visitor resets the ray.
                if value != max_fraction {
                    max_fraction = value;
                    segment_aabb = segment_bounds(p1, p2, max_fraction);
                }
            } else {
                stack.push(node.child1);
                stack.push(node.child2);
            }
        }
    }

    fn insert_leaf(&mut self, leaf: usize) {
        if self.root == NULL_NODE {
            self.root = leaf;
            self.nodes[leaf].parent = NULL_NODE;
            return;
        }

        // Descend to the sibling whose union with the leaf costs least.
        let leaf_aabb = self.nodes[leaf].aabb;
        let mut index = self.root;
        while !self.nodes[index].is_leaf() {
            let child1 = self.nodes[index].child1;
            let child2 = self.nodes[index].child2;

            let area = self.nodes[index].aabb.perimeter();
            let combined = self.nodes[index].aabb.combine(&leaf_aabb);
            let combined_area = combined.perimeter();

            // Cost of making a new parent for this node and the leaf.
            let cost = 2.0 * combined_area;
            // Minimum cost of pushing the leaf further down the tree.
            let inheritance_cost = 2.0 * (combined_area - area);

            let descend_cost = |tree: &Self, child: usize| {
                let child_aabb = tree.nodes[child].aabb;
                let merged = leaf_aabb.combine(&child_aabb).perimeter();
                if tree.nodes[child].is_leaf() {
                    merged + inheritance_cost
                } else {
                    merged - child_aabb.perimeter() + inheritance_cost
                }
            };

            let cost1 = descend_cost(self, child1);
            let cost2 = descend_cost(self, child2);

            if cost < cost1 && cost < cost2 {
                break;
            }
            index = if cost1 < cost2 { child1 } else { child2 };
        }

        let sibling = index;

        // Splice a fresh parent above the sibling.
        let old_parent = self.nodes[sibling].parent;
        let new_parent = self.allocate_node();
        self.nodes[new_parent].parent = old_parent;
        self.nodes[new_parent].aabb = leaf_aabb.combine(&self.nodes[sibling].aabb);
        self.nodes[new_parent].height = self.nodes[sibling].height + 1;

        if old_parent != NULL_NODE {
            if self.nodes[old_parent].child1 == sibling {
                self.nodes[old_parent].child1 = new_parent;
            } else {
                self.nodes[old_parent].child2 = new_parent;
            }
        } else {
            self.root = new_parent;
        }

        self.nodes[new_parent].child1 = sibling;
        self.nodes[new_parent].child2 = leaf;
        self.nodes[sibling].parent = new_parent;
        self.nodes[leaf].parent = new_parent;

        // Re-fit and re-balance ancestors.
        let mut index = self.nodes[leaf].parent;
        while index != NULL_NODE {
            index = self.balance(index);

            let child1 = self.nodes[index].child1;
            let child2 = self.nodes[index].child2;
            self.nodes[index].height =
                1 + self.nodes[child1].height.max(self.nodes[child2].height);
            self.nodes[index].aabb = self.nodes[child1].aabb.combine(&self.nodes[child2].aabb);

            index = self.nodes[index].parent;
        }
    }

    fn remove_leaf(&mut self, leaf: usize) {
        if leaf == self.root {
            self.root = NULL_NODE;
            return;
        }

        let parent = self.nodes[leaf].parent;
        let grand_parent = self.nodes[parent].parent;
        let sibling = if self.nodes[parent].child1 == leaf {
            self.nodes[parent].child2
        } else {
            self.nodes[parent].child1
        };

        if grand_parent != NULL_NODE {
            if self.nodes[grand_parent].child1 == parent {
                self.nodes[grand_parent].child1 = sibling;
            } else {
                self.nodes[grand_parent].child2 = sibling;
            }
            self.nodes[sibling].parent = grand_parent;
            self.free_node(parent);

            let mut index = grand_parent;
            while index != NULL_NODE {
                index = self.balance(index);

                let child1 = self.nodes[index].child1;
                let child2 = self.nodes[index].child2;
                self.nodes[index].aabb =
                    self.nodes[child1].aabb.combine(&self.nodes[child2].aabb);
                self.nodes[index].height =
                    1 + self.nodes[child1].height.max(self.nodes[child2].height);

                index = self.nodes[index].parent;
            }
        } else {
            self.root = sibling;
            self.nodes[sibling].parent = NULL_NODE;
            self.free_node(parent);
        }
    }

    /// Performs a left or right rotation if node `a` is imbalanced.
    /// Returns the new subtree root.
    fn balance(&mut self, a: usize) -> usize {
        if self.nodes[a].is_leaf() || self.nodes[a].height < 2 {
            return a;
        }

        let b = self.nodes[a].child1;
        let c = self.nodes[a].child2;
        let balance = self.nodes[c].height as isize - self.nodes[b].height as isize;

        // Rotate C up.
        if balance > 1 {
            let f = self.nodes[c].child1;
            let g = self.nodes[c].child2;

            self.nodes[c].child1 = a;
            self.nodes[c].parent = self.nodes[a].parent;
            self.nodes[a].parent = c;

            let c_parent = self.nodes[c].parent;
            if c_parent != NULL_NODE {
                if self.nodes[c_parent].child1 == a {
                    self.nodes[c_parent].child1 = c;
                } else {
                    self.nodes[c_parent].child2 = c;
                }
            } else {
                self.root = c;
            }

            // Swap the taller grandchild up.
            if self.nodes[f].height > self.nodes[g].height {
                self.nodes[c].child2 = f;
                self.nodes[a].child2 = g;
                self.nodes[g].parent = a;
                self.refit_pair(a, b, g);
                self.refit_pair(c, a, f);
            } else {
                self.nodes[c].child2 = g;
                self.nodes[a].child2 = f;
                self.nodes[f].parent = a;
                self.refit_pair(a, b, f);
                self.refit_pair(c, a, g);
            }
            return c;
        }

        // Rotate B up.
        if balance < -1 {
            let d = self.nodes[b].child1;
            let e = self.nodes[b].child2;

            self.nodes[b].child1 = a;
            self.nodes[b].parent = self.nodes[a].parent;
            self.nodes[a].parent = b;

            let b_parent = self.nodes[b].parent;
            if b_parent != NULL_NODE {
                if self.nodes[b_parent].child1 == a {
                    self.nodes[b_parent].child1 = b;
                } else {
                    self.nodes[b_parent].child2 = b;
                }
            } else {
                self.root = b;
            }

            if self.nodes[d].height > self.nodes[e].height {
                self.nodes[b].child2 = d;
                self.nodes[a].child1 = e;
                self.nodes[e].parent = a;
                self.refit_pair(a, c, e);
                self.refit_pair(b, a, d);
            } else {
                self.nodes[b].child2 = e;
                self.nodes[a].child1 = d;
                self.nodes[d].parent = a;
                self.refit_pair(a, c, d);
                self.refit_pair(b, a, e);
            }
            return b;
        }

        a
    }

    fn refit_pair(&mut self, parent: usize, left: usize, right: usize) {
        self.nodes[parent].aabb = self.nodes[left].aabb.combine(&self.nodes[right].aabb);
        self.nodes[parent].height =
            1 + self.nodes[left].height.max(self.nodes[right].height);
    }
}

fn segment_bounds(p1: Vec2, p2: Vec2, fraction: f32) -> Aabb {
    let t = p1 + fraction * (p2 - p1);
    Aabb::new(p1.min(t), p1.max(t))
}

/// Broad phase pairing layer: tracks which proxies moved since the last
/// pair sweep and enumerates new overlapping pairs.
pub struct BroadPhase<T> {
    tree: DynamicTree<T>,
    moved: Vec<ProxyId>,
}

impl<T: Copy> Default for BroadPhase<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> BroadPhase<T> {
    pub fn new() -> Self {
        Self {
            tree: DynamicTree::new(),
            moved: Vec::new(),
        }
    }

    pub fn create_proxy(&mut self, aabb: Aabb, user_data: T) -> ProxyId {
        let proxy = self.tree.create_proxy(aabb, user_data);
        self.moved.push(proxy);
        proxy
    }

    pub fn destroy_proxy(&mut self, proxy: ProxyId) {
        self.moved.retain(|&moved| moved != proxy);
        self.tree.destroy_proxy(proxy);
    }

    pub fn update_proxy(&mut self, proxy: ProxyId, aabb: Aabb, displacement: Vec2) -> bool {
        let reinserted = self.tree.update_proxy(proxy, aabb, displacement);
        if reinserted {
            self.touch_proxy(proxy);
        }
        reinserted
    }

    /// Marks a proxy for re-pairing without moving it.
    pub fn touch_proxy(&mut self, proxy: ProxyId) {
        if !self.moved.contains(&proxy) {
            self.moved.push(proxy);
        }
    }

    /// Sets the fat-AABB margin used for subsequent insertions.
    pub fn set_margin(&mut self, margin: f32) {
        self.tree.set_margin(margin);
    }

    pub fn user_data(&self, proxy: ProxyId) -> T {
        self.tree.user_data(proxy)
    }

    pub fn fat_aabb(&self, proxy: ProxyId) -> Aabb {
        self.tree.fat_aabb(proxy)
    }

    pub fn proxies_overlap(&self, a: ProxyId, b: ProxyId) -> bool {
        self.tree.fat_aabb(a).overlaps(&self.tree.fat_aabb(b))
    }

    pub fn proxy_count(&self) -> usize {
        self.tree.proxy_count()
    }

    pub fn tree_height(&self) -> usize {
        self.tree.height()
    }

    pub fn shift_origin(&mut self, delta: Vec2) {
        self.tree.shift_origin(delta);
    }

    pub fn query(&self, aabb: &Aabb, visitor: impl FnMut(ProxyId) -> bool) {
        self.tree.query(aabb, visitor);
    }

    pub fn ray_cast(
        &self,
        input: &RayCastInput,
        visitor: impl FnMut(&RayCastInput, ProxyId) -> f32,
    ) {
        self.tree.ray_cast(input, visitor);
    }

    /// Collects every overlapping pair formed by a proxy that moved
    /// since the previous sweep. Pairs are reported once with `a < b`.
    pub fn update_pairs(&mut self) -> Vec<(ProxyId, ProxyId)> {
        let mut pairs: Vec<(ProxyId, ProxyId)> = Vec::new();

        for &moved in &self.moved {
            let fat = self.tree.fat_aabb(moved);
            self.tree.query(&fat, |other| {
                if other != moved {
                    let pair = if moved < other {
                        (moved, other)
                    } else {
                        (other, moved)
                    };
                    pairs.push(pair);
                }
                true
            });
        }
        self.moved.clear();

        pairs.sort_unstable();
        pairs.dedup();
        pairs
    }
}
