use approx::assert_relative_eq;
use impulse2d::*;

fn three_disks_world() -> (World, Vec<FixtureId>) {
    let mut world = World::new(Vec2::ZERO);
    let mut fixtures = Vec::new();
    for x in [2.0, 4.0, 6.0] {
        let body = world
            .create_body(&BodyDef::default().at(Vec2::new(x, 0.0)))
            .expect("body");
        let fixture = world
            .create_fixture(body, FixtureDef::new(Shape::circle(0.5)))
            .expect("fixture");
        fixtures.push(fixture);
    }
    (world, fixtures)
}

#[test]
fn clipping_converges_on_the_closest_hit() {
    let (world, fixtures) = three_disks_world();
    let input = RayCastInput {
        p1: Vec2::ZERO,
        p2: Vec2::new(10.0, 0.0),
        max_fraction: 1.0,
    };

    let mut closest: Option<(FixtureId, f32)> = None;
    world.ray_cast(&input, |fixture, _child, _point, _normal, fraction| {
        closest = Some((fixture, fraction));
        RayCastBehavior::ClipRay(fraction)
    });

    let (fixture, fraction) = closest.expect("ray hit something");
    assert_eq!(fixture, fixtures[0]);
    // First surface at x = 1.5 along a 10-unit segment.
    assert_relative_eq!(fraction, 0.15, epsilon = 1e-4);
}

#[test]
fn terminate_stops_after_the_first_hit() {
    let (world, _) = three_disks_world();
    let input = RayCastInput {
        p1: Vec2::ZERO,
        p2: Vec2::new(10.0, 0.0),
        max_fraction: 1.0,
    };

    let mut visits = 0;
    world.ray_cast(&input, |_, _, _, _, _| {
        visits += 1;
        RayCastBehavior::Terminate
    });
    assert_eq!(visits, 1);
}

#[test]
fn reset_ray_visits_every_fixture_on_the_segment() {
    let (world, _) = three_disks_world();
    let input = RayCastInput {
        p1: Vec2::ZERO,
        p2: Vec2::new(10.0, 0.0),
        max_fraction: 1.0,
    };

    let mut visits = Vec::new();
    world.ray_cast(&input, |_, _, point, normal, fraction| {
        visits.push((point, normal, fraction));
        RayCastBehavior::ResetRay
    });
    assert_eq!(visits.len(), 3);
    for (point, normal, fraction) in visits {
        // Entry hits face the ray origin.
        assert!(normal.x < 0.0);
        assert_relative_eq!(point.x, fraction * 10.0, epsilon = 1e-5);
    }
}

#[test]
fn clip_fraction_prunes_farther_fixtures() {
    let (world, _) = three_disks_world();
    let input = RayCastInput {
        p1: Vec2::ZERO,
        p2: Vec2::new(10.0, 0.0),
        max_fraction: 1.0,
    };

    // Clip everything past x = 3: only the first disk can report.
    let mut fractions = Vec::new();
    world.ray_cast(&input, |_, _, _, _, fraction| {
        fractions.push(fraction);
        RayCastBehavior::ClipRay(0.3)
    });
    assert_eq!(fractions.len(), 1);
    assert!(fractions[0] <= 0.3);
}

#[test]
fn short_rays_see_nothing() {
    let (world, _) = three_disks_world();
    let input = RayCastInput {
        p1: Vec2::ZERO,
        p2: Vec2::new(10.0, 0.0),
        max_fraction: 0.1,
    };

    let mut visits = 0;
    world.ray_cast(&input, |_, _, _, _, _| {
        visits += 1;
        RayCastBehavior::ResetRay
    });
    assert_eq!(visits, 0);
}

#[test]
fn aabb_query_visits_overlapping_fixtures_only() {
    let (world, fixtures) = three_disks_world();

    let mut hits = Vec::new();
    world.query_aabb(
        &Aabb::new(Vec2::new(1.0, -1.0), Vec2::new(4.5, 1.0)),
        |fixture, _child| {
            hits.push(fixture);
            true
        },
    );
    hits.sort();
    let mut expected = vec![fixtures[0], fixtures[1]];
    expected.sort();
    assert_eq!(hits, expected);

    // Early abort stops the traversal.
    let mut count = 0;
    world.query_aabb(
        &Aabb::new(Vec2::new(0.0, -1.0), Vec2::new(10.0, 1.0)),
        |_, _| {
            count += 1;
            false
        },
    );
    assert_eq!(count, 1);
}
