use approx::assert_relative_eq;
use impulse2d::*;

#[test]
fn head_on_elastic_disks_swap_velocities() {
    let mut world = World::new(Vec2::ZERO);

    let make_disk = |world: &mut World, x: f32, vx: f32| {
        let body = world
            .create_body(
                &BodyDef::dynamic()
                    .at(Vec2::new(x, 0.0))
                    .with_linear_velocity(Vec2::new(vx, 0.0)),
            )
            .expect("disk body");
        world
            .create_fixture(
                body,
                FixtureDef::new(Shape::circle(1.0))
                    .with_density(1.0)
                    .with_friction(0.0)
                    .with_restitution(1.0),
            )
            .expect("disk fixture");
        body
    };

    let left = make_disk(&mut world, -11.0, 10.0);
    let right = make_disk(&mut world, 11.0, -10.0);

    let conf = StepConf::new(0.01);
    for _ in 0..150 {
        world.step(&conf);
    }

    let v_left = world.body(left).expect("left").linear_velocity();
    let v_right = world.body(right).expect("right").linear_velocity();

    // Equal masses, restitution one: velocities swap.
    assert!(
        (v_left.x + 10.0).abs() < 0.1,
        "left velocity {v_left:?} should approach (-10, 0)"
    );
    assert!(
        (v_right.x - 10.0).abs() < 0.1,
        "right velocity {v_right:?} should approach (10, 0)"
    );

    // Momentum stays balanced and motion stays on the axis.
    assert!((v_left + v_right).length() < 1e-3);
    assert!(v_left.y.abs() < 1e-4);
    assert!(v_right.y.abs() < 1e-4);
}

#[test]
fn overlapping_disks_separate_to_within_slop() {
    let mut world = World::new(Vec2::ZERO);

    let make_disk = |world: &mut World, x: f32| {
        let body = world
            .create_body(&BodyDef::dynamic().at(Vec2::new(x, 0.0)))
            .expect("disk body");
        world
            .create_fixture(
                body,
                FixtureDef::new(Shape::circle(0.5))
                    .with_density(1.0)
                    .with_restitution(0.0),
            )
            .expect("disk fixture");
        body
    };

    let a = make_disk(&mut world, 0.0);
    let b = make_disk(&mut world, 0.6);

    let mut conf = StepConf::default();
    conf.allow_sleep = false;
    for _ in 0..240 {
        world.step(&conf);
    }

    let center_a = world.body(a).expect("a").position();
    let center_b = world.body(b).expect("b").position();
    let distance = center_a.distance(center_b);
    assert!(
        distance >= 1.0 - config::LINEAR_SLOP - 5.0e-4,
        "distance {distance} still overlapping beyond slop"
    );
}

struct CountingListener {
    begins: std::sync::Arc<std::sync::atomic::AtomicUsize>,
}

impl ContactListener for CountingListener {
    fn begin_contact(&mut self, _id: ContactId, _contact: &mut Contact) {
        self.begins
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }
}

#[test]
fn mask_zero_fixtures_never_begin_contact() {
    let begins = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let mut world = World::new(Vec2::ZERO);
    world.set_contact_listener(Box::new(CountingListener {
        begins: begins.clone(),
    }));

    let deaf_filter = Filter {
        category_bits: 0x0001,
        mask_bits: 0x0000,
        group_index: 0,
    };
    for x in [0.0, 0.5] {
        let body = world
            .create_body(&BodyDef::dynamic().at(Vec2::new(x, 0.0)))
            .expect("body");
        world
            .create_fixture(
                body,
                FixtureDef::new(Shape::circle(0.5))
                    .with_density(1.0)
                    .with_filter(deaf_filter),
            )
            .expect("fixture");
    }

    for _ in 0..30 {
        world.step(&StepConf::default());
    }

    assert_eq!(begins.load(std::sync::atomic::Ordering::Relaxed), 0);
    assert_eq!(world.contact_count(), 0);
}

#[test]
fn sensors_report_touching_but_apply_no_impulse() {
    let begins = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let mut world = World::new(Vec2::ZERO);
    world.set_contact_listener(Box::new(CountingListener {
        begins: begins.clone(),
    }));

    let zone = world.create_body(&BodyDef::default()).expect("zone");
    world
        .create_fixture(zone, FixtureDef::new(Shape::box_shape(1.0, 1.0)).as_sensor())
        .expect("sensor fixture");

    let probe = world
        .create_body(
            &BodyDef::dynamic()
                .at(Vec2::new(-3.0, 0.0))
                .with_linear_velocity(Vec2::new(2.0, 0.0)),
        )
        .expect("probe");
    world
        .create_fixture(probe, FixtureDef::new(Shape::circle(0.2)).with_density(1.0))
        .expect("probe fixture");

    for _ in 0..120 {
        world.step(&StepConf::default());
    }

    // The probe sailed straight through the sensor zone.
    assert!(begins.load(std::sync::atomic::Ordering::Relaxed) >= 1);
    let velocity = world.body(probe).expect("probe").linear_velocity();
    assert_relative_eq!(velocity.x, 2.0, epsilon = 1e-4);
    assert!(world.body(probe).expect("probe").position().x > 0.5);
}

#[test]
fn negative_group_suppresses_collision_between_members() {
    let mut world = World::new(Vec2::ZERO);
    let grouped = Filter {
        category_bits: 0x0001,
        mask_bits: 0xFFFF,
        group_index: -7,
    };

    let mover = world
        .create_body(
            &BodyDef::dynamic()
                .at(Vec2::new(-2.0, 0.0))
                .with_linear_velocity(Vec2::new(1.0, 0.0)),
        )
        .expect("mover");
    world
        .create_fixture(
            mover,
            FixtureDef::new(Shape::circle(0.5))
                .with_density(1.0)
                .with_filter(grouped),
        )
        .expect("fixture");

    let blocker = world.create_body(&BodyDef::dynamic()).expect("blocker");
    world
        .create_fixture(
            blocker,
            FixtureDef::new(Shape::circle(0.5))
                .with_density(1.0)
                .with_filter(grouped),
        )
        .expect("fixture");

    for _ in 0..240 {
        world.step(&StepConf::default());
    }

    // The mover passes through its group-mate unimpeded.
    assert!(world.body(mover).expect("mover").position().x > 1.0);
}
