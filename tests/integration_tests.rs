use approx::assert_relative_eq;
use impulse2d::*;

fn ball_world(gravity: Vec2) -> (World, BodyId) {
    let mut world = World::new(gravity);
    let body = world
        .create_body(&BodyDef::dynamic().at(Vec2::new(0.0, 1.0)))
        .expect("create body");
    world
        .create_fixture(body, FixtureDef::new(Shape::circle(1.0)).with_density(1.0))
        .expect("create fixture");
    (world, body)
}

#[test]
fn falling_disk_tracks_semi_implicit_euler() {
    let (mut world, body) = ball_world(Vec2::new(0.0, -10.0));
    let conf = StepConf::new(0.01);

    world.step(&conf);
    {
        let body = world.body(body).expect("body");
        assert_relative_eq!(body.position().y, 0.999, epsilon = 1e-5);
        assert_relative_eq!(body.linear_velocity().y, -0.1, epsilon = 1e-5);
    }

    world.step(&conf);
    {
        let body = world.body(body).expect("body");
        assert_relative_eq!(body.position().y, 0.997, epsilon = 1e-5);
        assert_relative_eq!(body.linear_velocity().y, -0.2, epsilon = 1e-5);
    }
}

#[test]
fn zero_dt_step_is_a_motion_noop() {
    let (mut world, body) = ball_world(Vec2::new(0.0, -10.0));
    {
        let body = world.body_mut(body).expect("body");
        body.set_linear_velocity(Vec2::new(3.0, 4.0));
        body.set_angular_velocity(0.5);
    }
    let before_position = world.body(body).expect("body").position();
    let before_velocity = world.body(body).expect("body").linear_velocity();
    let before_angle = world.body(body).expect("body").angle();

    world.step(&StepConf::new(0.0));

    let body = world.body(body).expect("body");
    assert_eq!(body.position(), before_position);
    assert_eq!(body.linear_velocity(), before_velocity);
    assert_eq!(body.angle(), before_angle);
}

#[test]
fn free_fall_matches_closed_form_within_tolerance() {
    let gravity = -10.0;
    let (mut world, body) = ball_world(Vec2::new(0.0, gravity));
    let dt = 1.0e-3;
    let conf = StepConf::new(dt);

    let steps = 5_000; // five simulated seconds
    for _ in 0..steps {
        world.step(&conf);
    }

    let t = steps as f32 * dt;
    let expected = 1.0 + 0.5 * gravity * t * t;
    let actual = world.body(body).expect("body").position().y;
    let relative_error = ((actual - expected) / expected).abs();
    assert!(
        relative_error < 1.0e-3,
        "relative error {relative_error} (actual {actual}, expected {expected})"
    );
}

#[test]
fn step_reports_island_and_contact_stats() {
    let mut world = World::new(Vec2::new(0.0, -10.0));
    let ground = world.create_body(&BodyDef::default()).expect("ground");
    world
        .create_fixture(ground, FixtureDef::new(Shape::box_shape(10.0, 0.5)))
        .expect("ground fixture");
    let ball = world
        .create_body(&BodyDef::dynamic().at(Vec2::new(0.0, 1.0)))
        .expect("ball");
    world
        .create_fixture(ball, FixtureDef::new(Shape::circle(0.5)).with_density(1.0))
        .expect("ball fixture");

    let conf = StepConf::default();
    let first = world.step(&conf);
    assert_eq!(first.contacts_created, 1);
    assert!(first.islands >= 1);

    for _ in 0..10 {
        world.step(&conf);
    }
    assert_eq!(world.contact_count(), 1);
}

#[test]
fn world_rejects_invalid_definitions() {
    let mut world = World::new(Vec2::ZERO);
    let body = world.create_body(&BodyDef::dynamic()).expect("body");

    let negative_density = FixtureDef::new(Shape::circle(1.0)).with_density(-1.0);
    assert!(matches!(
        world.create_fixture(body, negative_density),
        Err(WorldError::InvalidArgument(_))
    ));

    assert!(matches!(
        world.destroy_body(BodyId::default()),
        Err(WorldError::InvalidArgument(_))
    ));
}

struct RecordingDestruction {
    events: std::sync::Arc<std::sync::Mutex<Vec<&'static str>>>,
}

impl DestructionListener for RecordingDestruction {
    fn fixture_destroyed(&mut self, _fixture: FixtureId) {
        self.events.lock().unwrap().push("fixture");
    }

    fn joint_destroyed(&mut self, _joint: JointId) {
        self.events.lock().unwrap().push("joint");
    }
}

#[test]
fn destroying_a_body_reports_implicit_destructions_in_order() {
    let events = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let mut world = World::new(Vec2::ZERO);
    world.set_destruction_listener(Box::new(RecordingDestruction {
        events: events.clone(),
    }));

    let anchor = world.create_body(&BodyDef::default()).expect("anchor");
    let body = world
        .create_body(&BodyDef::dynamic().at(Vec2::new(2.0, 0.0)))
        .expect("body");
    world
        .create_fixture(body, FixtureDef::new(Shape::circle(0.5)).with_density(1.0))
        .expect("fixture");
    world
        .create_revolute_joint(anchor, body, Vec2::ZERO)
        .expect("joint");

    world.destroy_body(body).expect("destroy");

    let events = events.lock().unwrap();
    assert_eq!(events.as_slice(), &["joint", "fixture"]);
    assert_eq!(world.body_count(), 1);
    assert_eq!(world.joint_count(), 0);
}
