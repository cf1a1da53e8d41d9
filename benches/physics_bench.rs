use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use grainflow::*;
use std::hint::black_box;

/// A loose cubic lattice of spheres dropped onto a floor.
fn prepare_bed(side: usize, parallel: bool) -> Scene {
    let config = SceneConfig::default()
        .with_gravity(Vec3::new(0.0, 0.0, -10.0))
        .with_damping(0.3)
        .with_parallel(parallel);
    let mut scene = Scene::new(config).expect("valid config");
    let mat = scene
        .add_material(Material::new("grain").with_young(1e6).with_damping_ratio(0.2))
        .expect("valid material");
    scene
        .add_particle(ParticleBuilder::wall(2, 1, Vec3::ZERO, mat))
        .expect("floor");
    for i in 0..side {
        for j in 0..side {
            for k in 0..side {
                let position = Vec3::new(i as f64, j as f64, k as f64 + 0.6) * 0.0205;
                scene
                    .add_particle(ParticleBuilder::sphere(0.01, mat).at(position))
                    .expect("sphere");
            }
        }
    }
    scene.run(50).expect("warm-up");
    scene
}

fn bench_scene_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("scene_step");
    for &side in &[6usize, 10, 14] {
        let count = side * side * side;
        group.bench_with_input(BenchmarkId::new("serial", count), &side, |b, &side| {
            let mut scene = prepare_bed(side, false);
            b.iter(|| black_box(scene.step().expect("step")))
        });
        group.bench_with_input(BenchmarkId::new("parallel", count), &side, |b, &side| {
            let mut scene = prepare_bed(side, true);
            b.iter(|| black_box(scene.step().expect("step")))
        });
    }
    group.finish();
}

fn bench_factory_fill(c: &mut Criterion) {
    c.bench_function("factory_fill_200", |b| {
        b.iter(|| {
            let mut scene =
                Scene::new(SceneConfig::default().with_gravity(Vec3::ZERO)).expect("config");
            let mat = scene.add_material(Material::new("grain")).expect("material");
            scene
                .add_factory(
                    FactoryConfig::new(
                        "fill",
                        SpawnVolume::Box {
                            min: Vec3::ZERO,
                            max: Vec3::splat(0.2),
                        },
                        Generator::PsdSphere(factory::PsdSphereGenerator::new(vec![
                            (0.008, 0.0),
                            (0.012, 1.0),
                        ])),
                        mat,
                    )
                    .with_max_num(200),
                )
                .expect("factory");
            black_box(scene.step().expect("step"))
        })
    });
}

criterion_group!(benches, bench_scene_step, bench_factory_fill);
criterion_main!(benches);
