use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use approx::assert_relative_eq;
use grainflow::{
    factory::{PharmaCapsuleGenerator, PsdSphereGenerator},
    *,
};

fn sphere_mass(diameter: f64, density: f64) -> f64 {
    density * std::f64::consts::PI * diameter.powi(3) / 6.0
}

/// A spout barely wider than one particle, firing every 200 steps; each
/// particle leaves it quickly so exactly one fits per firing.
fn spout(mat: MaterialId, max_mass: f64) -> FactoryConfig {
    FactoryConfig::new(
        "spout",
        SpawnVolume::Box {
            min: Vec3::new(-0.006, -0.006, -0.006),
            max: Vec3::new(0.006, 0.006, 0.006),
        },
        Generator::PsdSphere(PsdSphereGenerator::mono(0.01)),
        mat,
    )
    .every_steps(200)
    .with_max_mass(max_mass)
    .with_initial_velocity(Vec3::new(0.0, 0.0, -5.0))
    .with_hook("done")
}

#[test]
fn budget_is_never_exceeded_and_hook_fires_once() {
    let mut scene = Scene::new(SceneConfig::default()).unwrap();
    let mat = scene.add_material(Material::new("pellet")).unwrap();
    let m = sphere_mass(0.01, 1000.0);
    let factory = scene.add_factory(spout(mat, 2.5 * m)).unwrap();

    let mut exhausted_at = Vec::new();
    let mut spawned = 0;
    for _ in 0..1000 {
        let report = scene.step().unwrap();
        spawned += report.spawned.len();
        if report.exhausted_factories.contains(&factory) {
            exhausted_at.push(report.step);
        }
    }

    assert_eq!(spawned, 2);
    assert_eq!(scene.particle_count(), 2);
    assert_eq!(exhausted_at, vec![399]);

    let state = &scene.factory(factory).unwrap().state;
    assert!(state.mass <= 2.5 * m);
    assert_relative_eq!(state.mass, 2.0 * m, max_relative = 1e-12);
    assert!(state.exhausted);

    let hooks = scene.drain_hooks();
    assert_eq!(hooks.len(), 1);
    assert_eq!(hooks[0].hook, "done");
    assert_eq!(hooks[0].factory, factory);
    assert!(scene.drain_hooks().is_empty());
}

#[test]
fn congested_volume_retries_next_period() {
    let mut scene = Scene::new(SceneConfig::default()).unwrap();
    let mat = scene.add_material(Material::new("pellet")).unwrap();
    let factory = scene
        .add_factory(spout(mat, 1.0).with_max_num(4).with_attempts(5))
        .unwrap();

    scene.run(200).unwrap();
    assert_eq!(scene.particle_count(), 1);
    scene.run(200).unwrap();
    assert_eq!(scene.particle_count(), 2);
    assert!(!scene.factory(factory).unwrap().is_exhausted());
}

#[test]
fn engine_dispatches_completion_hooks() {
    let mut engine = DemEngine::new(SceneConfig::default()).unwrap();
    let mat = engine
        .scene_mut()
        .add_material(Material::new("pellet"))
        .unwrap();
    let lid = engine
        .scene_mut()
        .add_particle(
            ParticleBuilder::sphere(0.02, mat)
                .at(Vec3::new(0.0, 0.0, 1.0))
                .with_motion(Motion::Static),
        )
        .unwrap();
    let lid_node = engine.scene().particle(lid).unwrap().node;
    let m = sphere_mass(0.01, 1000.0);
    engine
        .scene_mut()
        .add_factory(spout(mat, 1.5 * m))
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    engine.register_hook("done", move |scene, call| {
        counter.fetch_add(1, Ordering::SeqCst);
        let start = scene.node(lid_node).map(|n| n.pose.position).unwrap_or_default();
        let motion = InterpolatedMotion::new(
            call.time,
            vec![start, start + Vec3::new(0.0, 0.0, 0.1)],
            vec![Quat::IDENTITY, Quat::IDENTITY],
            vec![0.0, 0.5],
        )?;
        scene.set_motion(lid_node, Motion::Imposed(motion))
    });

    engine.run(600).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let node = engine.scene().node(lid_node).unwrap();
    assert!(matches!(node.motion, Motion::Imposed(_)));
    assert!(node.pose.position.z > 1.0);
}

#[test]
fn placement_is_reproducible_per_seed() {
    fn positions(seed: u64) -> Vec<Vec3> {
        let mut config = SceneConfig::default().with_gravity(Vec3::ZERO);
        config.seed = seed;
        let mut scene = Scene::new(config).unwrap();
        let mat = scene.add_material(Material::new("pellet")).unwrap();
        scene
            .add_factory(
                FactoryConfig::new(
                    "cloud",
                    SpawnVolume::Box {
                        min: Vec3::ZERO,
                        max: Vec3::splat(0.2),
                    },
                    Generator::PsdSphere(PsdSphereGenerator::new(vec![(0.008, 0.0), (0.012, 1.0)])),
                    mat,
                )
                .with_max_num(20),
            )
            .unwrap();
        scene.step().unwrap();
        scene.particles().map(|p| p.pose.position).collect()
    }

    let first = positions(7);
    assert_eq!(first.len(), 20);
    assert_eq!(first, positions(7));
    assert_ne!(first, positions(8));
}

#[test]
fn spawned_particles_never_overlap() {
    let mut scene = Scene::new(SceneConfig::default().with_gravity(Vec3::ZERO)).unwrap();
    let mat = scene.add_material(Material::new("pellet")).unwrap();
    scene
        .add_factory(
            FactoryConfig::new(
                "dense",
                SpawnVolume::Box {
                    min: Vec3::ZERO,
                    max: Vec3::splat(0.05),
                },
                Generator::PsdSphere(PsdSphereGenerator::mono(0.01)),
                mat,
            )
            .with_max_num(40),
        )
        .unwrap();
    scene.step().unwrap();

    let spheres: Vec<Vec3> = scene.particles().map(|p| p.pose.position).collect();
    assert!(!spheres.is_empty());
    for (i, a) in spheres.iter().enumerate() {
        for b in &spheres[i + 1..] {
            assert!(a.distance(*b) >= 0.01 - 1e-12);
        }
    }
}

#[test]
fn cylinder_factory_builds_pharma_capsule_clumps() {
    let mut scene = Scene::new(SceneConfig::default().with_gravity(Vec3::ZERO)).unwrap();
    let mat = scene.add_material(Material::gelatin()).unwrap();
    let axis = Quat::from_rotation_y(std::f64::consts::FRAC_PI_2);
    let factory = scene
        .add_factory(
            FactoryConfig::new(
                "pills",
                SpawnVolume::Cylinder {
                    pose: Pose::new(Vec3::new(0.0, 0.0, 0.17), axis),
                    radius: 0.018,
                    height: 0.05,
                },
                Generator::PharmaCapsule(PharmaCapsuleGenerator::default()),
                mat,
            )
            .with_max_num(3),
        )
        .unwrap();
    let report = scene.step().unwrap();

    assert_eq!(report.spawned.len(), 6);
    assert!(scene.factory(factory).unwrap().is_exhausted());
    for id in &report.spawned {
        let particle = scene.particle(*id).unwrap();
        assert!(particle.is_clumped());
        assert!(matches!(particle.shape, Shape::Capsule { .. }));
        let position = particle.pose.position;
        assert!((position.z - 0.17).abs() < 0.025 + 0.0125);
    }
}
