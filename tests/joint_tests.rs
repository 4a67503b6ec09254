use approx::assert_relative_eq;
use impulse2d::*;

fn anchor_error(world: &World, body: BodyId, local_anchor: Vec2, pivot: Vec2) -> f32 {
    let body = world.body(body).expect("jointed body");
    body.world_point(local_anchor).distance(pivot)
}

#[test]
fn revolute_joint_keeps_anchors_coincident_under_load() {
    let mut world = World::new(Vec2::new(0.0, -10.0));

    let anchor = world.create_body(&BodyDef::default()).expect("anchor");
    let pendulum = world
        .create_body(&BodyDef::dynamic().at(Vec2::new(2.0, 0.0)))
        .expect("pendulum");
    world
        .create_fixture(
            pendulum,
            FixtureDef::new(Shape::circle(0.25)).with_density(5.0),
        )
        .expect("pendulum fixture");

    world
        .create_revolute_joint(anchor, pendulum, Vec2::ZERO)
        .expect("revolute joint");

    let conf = StepConf::default();
    let mut lowest = f32::MAX;
    for _ in 0..300 {
        world.step(&conf);
        // The pendulum's local anchor is the world origin seen from its
        // start pose: (-2, 0).
        let error = anchor_error(&world, pendulum, Vec2::new(-2.0, 0.0), Vec2::ZERO);
        assert!(error < 0.01, "anchor drifted by {error}");
        lowest = lowest.min(world.body(pendulum).expect("pendulum").position().y);
    }

    // It actually swings instead of hanging frozen.
    assert!(lowest < -1.0, "pendulum never fell: lowest y {lowest}");
}

#[test]
fn struck_jointed_disk_rotates_about_its_pivot() {
    let mut world = World::new(Vec2::ZERO);

    let anchor = world.create_body(&BodyDef::default()).expect("anchor");
    let rotor = world
        .create_body(&BodyDef::dynamic().at(Vec2::new(1.5, 0.0)))
        .expect("rotor");
    world
        .create_fixture(rotor, FixtureDef::new(Shape::circle(0.5)).with_density(1.0))
        .expect("rotor fixture");
    world
        .create_revolute_joint(anchor, rotor, Vec2::ZERO)
        .expect("pivot");

    // Strike it sideways; the pivot converts the hit into circular motion.
    world
        .body_mut(rotor)
        .expect("rotor")
        .apply_linear_impulse(Vec2::new(0.0, 3.0), Vec2::new(1.5, 0.0));

    let conf = StepConf::default();
    for _ in 0..240 {
        world.step(&conf);
        let radius = world.body(rotor).expect("rotor").position().length();
        assert_relative_eq!(radius, 1.5, epsilon = 0.02);
    }
}

#[test]
fn distance_joint_holds_its_length() {
    let mut world = World::new(Vec2::new(0.0, -10.0));

    let anchor = world
        .create_body(&BodyDef::default().at(Vec2::new(0.0, 5.0)))
        .expect("anchor");
    let bob = world
        .create_body(&BodyDef::dynamic().at(Vec2::new(3.0, 5.0)))
        .expect("bob");
    world
        .create_fixture(bob, FixtureDef::new(Shape::circle(0.3)).with_density(2.0))
        .expect("bob fixture");

    world
        .create_distance_joint(anchor, bob, Vec2::new(0.0, 5.0), Vec2::new(3.0, 5.0))
        .expect("distance joint");

    let conf = StepConf::default();
    for _ in 0..300 {
        world.step(&conf);
    }

    let separation = world
        .body(bob)
        .expect("bob")
        .position()
        .distance(Vec2::new(0.0, 5.0));
    assert!(
        (separation - 3.0).abs() < 0.02,
        "rod length drifted to {separation}"
    );
}

#[test]
fn jointed_bodies_do_not_collide_by_default() {
    let mut world = World::new(Vec2::ZERO);

    let a = world.create_body(&BodyDef::dynamic()).expect("a");
    world
        .create_fixture(a, FixtureDef::new(Shape::circle(1.0)).with_density(1.0))
        .expect("fixture a");
    let b = world
        .create_body(&BodyDef::dynamic().at(Vec2::new(1.0, 0.0)))
        .expect("b");
    world
        .create_fixture(b, FixtureDef::new(Shape::circle(1.0)).with_density(1.0))
        .expect("fixture b");

    // Deeply overlapping, but pinned together: no contact may form.
    world
        .create_revolute_joint(a, b, Vec2::new(0.5, 0.0))
        .expect("joint");

    for _ in 0..60 {
        world.step(&StepConf::default());
    }
    assert_eq!(world.contact_count(), 0);

    // The pair never pushed apart.
    let distance = world
        .body(a)
        .expect("a")
        .position()
        .distance(world.body(b).expect("b").position());
    assert!((distance - 1.0).abs() < 1e-3);
}

#[test]
fn joint_reactions_balance_the_hanging_weight() {
    let mut world = World::new(Vec2::new(0.0, -10.0));

    let ceiling = world
        .create_body(&BodyDef::default().at(Vec2::new(0.0, 4.0)))
        .expect("ceiling");
    let weight = world
        .create_body(&BodyDef::dynamic().at(Vec2::new(0.0, 2.0)))
        .expect("weight");
    world
        .create_fixture(weight, FixtureDef::new(Shape::circle(0.5)).with_density(1.0))
        .expect("weight fixture");

    let joint_id = world
        .create_distance_joint(weight, ceiling, Vec2::new(0.0, 2.0), Vec2::new(0.0, 4.0))
        .expect("rope");

    let conf = StepConf::default();
    for _ in 0..300 {
        world.step(&conf);
    }

    let mass = world.body(weight).expect("weight").mass();
    let reaction = world
        .joint(joint_id)
        .expect("rope")
        .reaction_force(conf.inv_dt);
    // The rod pulls the weight (body A here) up against gravity.
    assert_relative_eq!(reaction.length(), mass * 10.0, epsilon = mass * 0.5);
}
