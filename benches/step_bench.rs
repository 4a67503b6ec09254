use criterion::{black_box, criterion_group, criterion_main, Criterion};
use impulse2d::*;

fn pyramid_world(rows: usize) -> World {
    let mut world = World::new(Vec2::new(0.0, -10.0));
    let ground = world
        .create_body(&BodyDef::default().at(Vec2::new(0.0, -0.5)))
        .expect("ground");
    world
        .create_fixture(ground, FixtureDef::new(Shape::box_shape(50.0, 0.5)))
        .expect("ground fixture");

    for row in 0..rows {
        for column in 0..(rows - row) {
            let x = (column as f32 - (rows - row) as f32 * 0.5) * 1.05;
            let y = 0.5 + row as f32 * 1.05;
            let body = world
                .create_body(&BodyDef::dynamic().at(Vec2::new(x, y)))
                .expect("box body");
            world
                .create_fixture(
                    body,
                    FixtureDef::new(Shape::box_shape(0.5, 0.5))
                        .with_density(1.0)
                        .with_friction(0.5),
                )
                .expect("box fixture");
        }
    }
    world
}

fn bench_pyramid_step(c: &mut Criterion) {
    c.bench_function("pyramid_10_rows_step", |b| {
        let mut world = pyramid_world(10);
        let conf = StepConf::default();
        b.iter(|| {
            world.step(black_box(&conf));
        })
    });
}

fn bench_broad_phase_churn(c: &mut Criterion) {
    c.bench_function("broad_phase_200_movers", |b| {
        let mut world = World::new(Vec2::ZERO);
        for i in 0..200 {
            let body = world
                .create_body(
                    &BodyDef::dynamic()
                        .at(Vec2::new((i % 20) as f32 * 2.0, (i / 20) as f32 * 2.0))
                        .with_linear_velocity(Vec2::new(if i % 2 == 0 { 1.0 } else { -1.0 }, 0.5)),
                )
                .expect("body");
            world
                .create_fixture(body, FixtureDef::new(Shape::circle(0.4)).with_density(1.0))
                .expect("fixture");
        }
        let mut conf = StepConf::default();
        conf.allow_sleep = false;
        b.iter(|| {
            world.step(black_box(&conf));
        })
    });
}

criterion_group!(benches, bench_pyramid_step, bench_broad_phase_churn);
criterion_main!(benches);
