use serde::{Deserialize, Serialize};

use crate::collision::broadphase::ProxyId;
use crate::core::body::BodyId;
use crate::core::shapes::Shape;
use crate::utils::arena::Handle;

pub type FixtureId = Handle<Fixture>;

/// Collision filtering data: category/mask bits plus a group index.
///
/// Two fixtures collide when each one's mask admits the other's category.
/// A shared non-zero group index overrides the bits: positive always
/// collides, negative never collides.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Filter {
    pub category_bits: u16,
    pub mask_bits: u16,
    pub group_index: i16,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            category_bits: 0x0001,
            mask_bits: 0xFFFF,
            group_index: 0,
        }
    }
}

impl Filter {
    /// The body-independent part of the §4.2 filter rule.
    pub fn should_collide(&self, other: &Filter) -> bool {
        if self.group_index == other.group_index && self.group_index != 0 {
            return self.group_index > 0;
        }
        (self.mask_bits & other.category_bits) != 0
            && (self.category_bits & other.mask_bits) != 0
    }
}

/// Description used to create a fixture on a body.
#[derive(Debug, Clone)]
pub struct FixtureDef {
    pub shape: Shape,
    pub density: f32,
    pub friction: f32,
    pub restitution: f32,
    pub is_sensor: bool,
    pub filter: Filter,
}

impl FixtureDef {
    pub fn new(shape: Shape) -> Self {
        Self {
            shape,
            density: 1.0,
            friction: 0.2,
            restitution: 0.0,
            is_sensor: false,
            filter: Filter::default(),
        }
    }

    pub fn with_density(mut self, density: f32) -> Self {
        self.density = density;
        self
    }

    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = friction;
        self
    }

    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution;
        self
    }

    pub fn as_sensor(mut self) -> Self {
        self.is_sensor = true;
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }
}

/// Binds a shape to a body with surface material, filtering, and one
/// broad-phase proxy per shape child.
#[derive(Debug)]
pub struct Fixture {
    pub(crate) body: BodyId,
    pub(crate) shape: Shape,
    pub(crate) density: f32,
    pub(crate) friction: f32,
    pub(crate) restitution: f32,
    pub(crate) is_sensor: bool,
    pub(crate) filter: Filter,
    /// One entry per shape child, indexed by child.
    pub(crate) proxies: Vec<ProxyId>,
}

impl Fixture {
    pub(crate) fn new(body: BodyId, def: FixtureDef) -> Self {
        Self {
            body,
            shape: def.shape,
            density: def.density,
            friction: def.friction,
            restitution: def.restitution,
            is_sensor: def.is_sensor,
            filter: def.filter,
            proxies: Vec::new(),
        }
    }

    pub fn body(&self) -> BodyId {
        self.body
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn density(&self) -> f32 {
        self.density
    }

    pub fn friction(&self) -> f32 {
        self.friction
    }

    pub fn restitution(&self) -> f32 {
        self.restitution
    }

    pub fn is_sensor(&self) -> bool {
        self.is_sensor
    }

    pub fn filter(&self) -> Filter {
        self.filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_bits_must_admit_both_sides() {
        let a = Filter {
            category_bits: 0x0001,
            mask_bits: 0x0002,
            group_index: 0,
        };
        let b = Filter {
            category_bits: 0x0002,
            mask_bits: 0x0001,
            group_index: 0,
        };
        let deaf = Filter {
            category_bits: 0x0001,
            mask_bits: 0x0000,
            group_index: 0,
        };
        assert!(a.should_collide(&b));
        assert!(!a.should_collide(&deaf));
        assert!(!deaf.should_collide(&a));
    }

    #[test]
    fn group_index_overrides_bits() {
        let base = Filter {
            category_bits: 0x0001,
            mask_bits: 0x0000,
            group_index: 3,
        };
        assert!(base.should_collide(&base));

        let negative = Filter {
            group_index: -3,
            mask_bits: 0xFFFF,
            category_bits: 0x0001,
        };
        assert!(!negative.should_collide(&negative));
    }
}
