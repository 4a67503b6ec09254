use impulse2d::*;

/// A fast bullet bouncing between two walls must never tunnel, no
/// matter how many steps run.
#[test]
fn bullet_stays_between_walls() {
    let mut world = World::new(Vec2::ZERO);

    for x in [-10.0, 10.0] {
        let wall = world.create_body(&BodyDef::default()).expect("wall");
        world
            .create_fixture(
                wall,
                FixtureDef::new(Shape::edge(
                    Vec2::new(x, -10.0),
                    Vec2::new(x, 10.0),
                ))
                .with_restitution(1.0),
            )
            .expect("wall fixture");
    }

    let bullet = world
        .create_body(
            &BodyDef::dynamic()
                .with_linear_velocity(Vec2::new(1.0e3, 0.0))
                .as_bullet(),
        )
        .expect("bullet");
    world
        .create_fixture(
            bullet,
            FixtureDef::new(Shape::circle(1.0))
                .with_density(1.0)
                .with_friction(0.0)
                .with_restitution(1.0),
        )
        .expect("bullet fixture");

    let conf = StepConf::new(0.01);
    for step in 0..400 {
        world.step(&conf);
        let x = world.body(bullet).expect("bullet").position().x;
        assert!(
            x.abs() <= 9.0 + 0.05,
            "bullet tunneled to x = {x} on step {step}"
        );
    }

    // It keeps bouncing rather than sticking to a wall.
    let velocity = world.body(bullet).expect("bullet").linear_velocity();
    assert!(velocity.x.abs() > 1.0);
}

/// Without the bullet flag the same configuration tunnels straight
/// through, which is what the flag exists to prevent.
#[test]
fn non_bullet_disk_tunnels_through_thin_wall() {
    let mut world = World::new(Vec2::ZERO);

    let wall = world.create_body(&BodyDef::default()).expect("wall");
    world
        .create_fixture(
            wall,
            FixtureDef::new(Shape::edge(Vec2::new(5.0, -10.0), Vec2::new(5.0, 10.0))),
        )
        .expect("wall fixture");

    let disk = world
        .create_body(&BodyDef::dynamic().with_linear_velocity(Vec2::new(1.0e3, 0.0)))
        .expect("disk");
    world
        .create_fixture(
            disk,
            FixtureDef::new(Shape::circle(0.1)).with_density(1.0),
        )
        .expect("disk fixture");

    let conf = StepConf::new(0.01);
    for _ in 0..40 {
        world.step(&conf);
    }
    assert!(
        world.body(disk).expect("disk").position().x > 6.0,
        "expected the discrete-only disk to pass the wall"
    );
}

/// TOI bookkeeping: resolving an impact must not leave stale cached
/// times behind (a second, later impact in the same step chain still
/// resolves).
#[test]
fn bullet_resolves_impacts_against_both_walls_in_sequence() {
    let mut world = World::new(Vec2::ZERO);

    for x in [-3.0, 3.0] {
        let wall = world.create_body(&BodyDef::default()).expect("wall");
        world
            .create_fixture(
                wall,
                FixtureDef::new(Shape::edge(Vec2::new(x, -5.0), Vec2::new(x, 5.0)))
                    .with_restitution(1.0),
            )
            .expect("wall fixture");
    }

    let bullet = world
        .create_body(
            &BodyDef::dynamic()
                .with_linear_velocity(Vec2::new(300.0, 0.0))
                .as_bullet(),
        )
        .expect("bullet");
    world
        .create_fixture(
            bullet,
            FixtureDef::new(Shape::circle(0.5))
                .with_density(1.0)
                .with_friction(0.0)
                .with_restitution(1.0),
        )
        .expect("bullet fixture");

    let mut total_toi_islands = 0;
    let conf = StepConf::new(0.01);
    for _ in 0..200 {
        let stats = world.step(&conf);
        total_toi_islands += stats.toi_islands;
        let x = world.body(bullet).expect("bullet").position().x;
        assert!(x.abs() <= 2.5 + 0.05, "bullet escaped to {x}");
    }
    assert!(total_toi_islands > 0, "the TOI sub-stepper never ran");
}
