//! # Actuator Mixing Benchmark

use std::time::Instant;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use mech_lib::{
    cam_ctrl::CamCtrl,
    drive::joystick_to_motors,
    params::CamParams,
    servo_ctrl::SimServoDriver,
};

fn mixing_benchmark(c: &mut Criterion) {
    c.bench_function("joystick_to_motors", |b| {
        b.iter(|| joystick_to_motors(black_box(0.37), black_box(-0.81)))
    });

    // Camera update with the stick held, so outputs are rate limited once the servo saturates
    let mut cam = CamCtrl::new(SimServoDriver::new(), [0, 1], CamParams::default());
    let now = Instant::now();

    c.bench_function("cam_ctrl_update", |b| {
        b.iter(|| cam.update(black_box(0.6), black_box(0.2), now))
    });
}

criterion_group!(benches, mixing_benchmark);
criterion_main!(benches);
