use impulse2d::*;

fn build_stack(count: usize) -> (World, Vec<BodyId>) {
    let mut world = World::new(Vec2::new(0.0, -10.0));

    let ground = world
        .create_body(&BodyDef::default().at(Vec2::new(0.0, -0.5)))
        .expect("ground");
    world
        .create_fixture(
            ground,
            FixtureDef::new(Shape::box_shape(20.0, 0.5)).with_friction(0.5),
        )
        .expect("ground fixture");

    let mut boxes = Vec::new();
    for i in 0..count {
        let body = world
            .create_body(&BodyDef::dynamic().at(Vec2::new(0.0, 0.5 + i as f32)))
            .expect("box body");
        world
            .create_fixture(
                body,
                FixtureDef::new(Shape::box_shape(0.5, 0.5))
                    .with_density(1.0)
                    .with_friction(0.5),
            )
            .expect("box fixture");
        boxes.push(body);
    }
    (world, boxes)
}

#[test]
fn box_stack_settles_upright_and_sleeps() {
    let (mut world, boxes) = build_stack(5);
    let conf = StepConf::default();

    for _ in 0..900 {
        world.step(&conf);
    }

    let mut previous_y = None;
    for &id in &boxes {
        let body = world.body(id).expect("box");
        assert!(
            body.angle().abs() < 0.05,
            "box tilted to {} rad",
            body.angle()
        );
        assert!(
            body.position().x.abs() < 0.05,
            "box drifted to x = {}",
            body.position().x
        );
        if let Some(previous) = previous_y {
            let spacing = body.position().y - previous;
            assert!(
                spacing >= 1.0 - 0.02,
                "boxes interpenetrate: spacing {spacing}"
            );
        }
        previous_y = Some(body.position().y);
    }

    // A settled stack stops consuming solver time.
    assert!(
        boxes
            .iter()
            .all(|&id| !world.body(id).expect("box").is_awake()),
        "stack should be asleep after settling"
    );
}

#[test]
fn stack_is_stationary_between_late_steps() {
    let (mut world, boxes) = build_stack(4);
    let conf = StepConf::default();

    for _ in 0..600 {
        world.step(&conf);
    }
    let marks: Vec<f32> = boxes
        .iter()
        .map(|&id| world.body(id).expect("box").position().y)
        .collect();

    for _ in 0..120 {
        world.step(&conf);
    }
    for (&id, &mark) in boxes.iter().zip(marks.iter()) {
        let y = world.body(id).expect("box").position().y;
        assert!(
            (y - mark).abs() < 1.0e-3,
            "box drifted from {mark} to {y} after settling"
        );
    }
}

#[test]
fn idle_body_sleeps_within_the_documented_bound() {
    let mut world = World::new(Vec2::ZERO);
    let body = world.create_body(&BodyDef::dynamic()).expect("body");
    world
        .create_fixture(body, FixtureDef::new(Shape::circle(0.5)).with_density(1.0))
        .expect("fixture");

    let dt = 1.0 / 60.0;
    let conf = StepConf::new(dt);
    let bound = (config::TIME_TO_SLEEP / dt).ceil() as usize + 1;

    let mut slept_at = None;
    for i in 0..bound + 5 {
        world.step(&conf);
        if !world.body(body).expect("body").is_awake() {
            slept_at = Some(i + 1);
            break;
        }
    }

    let slept_at = slept_at.expect("body never slept");
    assert!(
        slept_at <= bound,
        "body slept after {slept_at} steps, bound was {bound}"
    );
}

#[test]
fn waking_one_body_of_a_sleeping_pile_wakes_its_island() {
    let (mut world, boxes) = build_stack(3);
    let conf = StepConf::default();
    for _ in 0..900 {
        world.step(&conf);
    }
    assert!(!world.body(boxes[0]).expect("box").is_awake());

    // Kick the top box; the contact graph must carry wakefulness down.
    world
        .body_mut(boxes[2])
        .expect("box")
        .apply_linear_impulse(Vec2::new(2.0, 0.0), Vec2::ZERO);
    world.step(&conf);

    assert!(world.body(boxes[0]).expect("box").is_awake());
}
