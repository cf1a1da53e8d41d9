use grainflow::{factory::PsdSphereGenerator, *};

fn main() -> DemResult<()> {
    let config = SceneConfig::default()
        .with_gravity(Vec3::new(0.0, 0.0, -9.81))
        .with_damping(0.3);
    let mut scene = Scene::new(config)?;
    scene.set_step_budget(Some(5.0));
    let sand = scene.add_material(
        Material::new("sand")
            .with_young(5e6)
            .with_friction_angle(0.5)
            .with_damping_ratio(0.3),
    )?;

    scene.add_particle(ParticleBuilder::wall(2, 1, Vec3::ZERO, sand))?;
    for (axis, sense, offset) in [(0, 1, -0.05), (0, -1, 0.05), (1, 1, -0.05), (1, -1, 0.05)] {
        let mut position = Vec3::ZERO;
        position[axis] = offset;
        scene.add_particle(ParticleBuilder::wall(axis, sense, position, sand))?;
    }
    scene.add_factory(
        FactoryConfig::new(
            "hopper",
            SpawnVolume::Box {
                min: Vec3::new(-0.045, -0.045, 0.05),
                max: Vec3::new(0.045, 0.045, 0.1),
            },
            Generator::PsdSphere(PsdSphereGenerator::new(vec![(0.006, 0.0), (0.01, 1.0)])),
            sand,
        )
        .every_seconds(0.05)
        .with_max_num(400),
    )?;

    let steps = scene.run_until(1.5)?;
    println!(
        "{} particles after {steps} steps, kinetic energy {:.3e} J",
        scene.particle_count(),
        scene.kinetic_energy()
    );
    let profile = scene.profiler();
    println!(
        "last step: {} contacts ({} real), {:.3} ms",
        profile.contact_count,
        profile.real_contact_count,
        profile.total_step_time.as_secs_f64() * 1000.0
    );
    Ok(())
}
