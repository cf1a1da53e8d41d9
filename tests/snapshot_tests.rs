use grainflow::{factory::PsdSphereGenerator, *};

fn hopper() -> Scene {
    let mut config = SceneConfig::default()
        .with_gravity(Vec3::new(0.0, 0.0, -10.0))
        .with_damping(0.2);
    config.seed = 42;
    let mut scene = Scene::new(config).unwrap();
    let mat = scene
        .add_material(
            Material::new("sand")
                .with_young(1e6)
                .with_damping_ratio(0.3)
                .with_friction_angle(0.5),
        )
        .unwrap();
    scene
        .add_particle(ParticleBuilder::wall(2, 1, Vec3::ZERO, mat))
        .unwrap();
    scene
        .add_factory(
            FactoryConfig::new(
                "hopper",
                SpawnVolume::Box {
                    min: Vec3::new(-0.03, -0.03, 0.0),
                    max: Vec3::new(0.03, 0.03, 0.06),
                },
                Generator::PsdSphere(PsdSphereGenerator::new(vec![(0.008, 0.0), (0.012, 1.0)])),
                mat,
            )
            .every_steps(40)
            .with_max_num(30),
        )
        .unwrap();
    scene
}

fn round_trip(state: &SceneState) -> SceneState {
    let mut bytes = Vec::new();
    ciborium::into_writer(state, &mut bytes).unwrap();
    ciborium::from_reader(bytes.as_slice()).unwrap()
}

#[test]
fn restored_scene_continues_bit_for_bit() {
    let mut original = hopper();
    original.run(150).unwrap();

    let state = round_trip(&original.snapshot().unwrap());
    let mut restored = Scene::from_state(state).unwrap();
    assert_eq!(restored.step_count(), original.step_count());
    assert_eq!(restored.time(), original.time());

    for _ in 0..200 {
        let a = original.step().unwrap();
        let b = restored.step().unwrap();
        assert_eq!(a, b);
    }
    assert_eq!(original.render_view(), restored.render_view());
    assert_eq!(original.kinetic_energy(), restored.kinetic_energy());
}

#[test]
fn contact_history_survives_the_round_trip() {
    let mut scene = hopper();
    scene.run(400).unwrap();

    let state = round_trip(&scene.snapshot().unwrap());
    let restored = Scene::from_state(state).unwrap();

    assert_eq!(scene.contacts().len(), restored.contacts().len());
    for contact in scene.contacts().iter() {
        let twin = restored
            .contact_between(contact.pair.first(), contact.pair.second())
            .unwrap();
        assert_eq!(twin.id, contact.id);
        assert_eq!(twin.phys, contact.phys);
    }
    let factory = scene.factory(EntityId::from_index(0)).unwrap();
    let twin = restored.factory(EntityId::from_index(0)).unwrap();
    assert_eq!(factory.state, twin.state);
}

#[test]
fn restore_into_an_existing_scene_replaces_everything() {
    let mut source = hopper();
    source.run(100).unwrap();
    let state = source.snapshot().unwrap();

    let mut target = Scene::new(SceneConfig::default()).unwrap();
    target.restore(state).unwrap();
    assert_eq!(target.particle_count(), source.particle_count());
    assert_eq!(target.config().seed, 42);
    source.step().unwrap();
    target.step().unwrap();
    assert_eq!(source.render_view(), target.render_view());
}
