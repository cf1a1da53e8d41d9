//! Capsules poured into a bottle which is then tipped over a table.

use std::f64::consts::PI;

use grainflow::{factory::PharmaCapsuleGenerator, *};

const CAPS_MASK: u32 = 0b0001;
const LONE_MASK: u32 = 0b0010;
const WALL_MASK: u32 = 0b0011;

/// Open-top faceted cylinder in the bottle frame.
fn bottle(mat: MaterialId, radius: f64, bottom: f64, top: f64, segments: usize) -> ClumpBuilder {
    let rim = |i: usize, z: f64| {
        let angle = 2.0 * PI * i as f64 / segments as f64;
        Vec3::new(radius * angle.cos(), radius * angle.sin(), z)
    };
    let mut builder = ClumpBuilder::new();
    for i in 0..segments {
        let j = (i + 1) % segments;
        let faces = [
            [rim(i, bottom), rim(j, bottom), rim(j, top)],
            [rim(i, bottom), rim(j, top), rim(i, top)],
            [Vec3::new(0.0, 0.0, bottom), rim(j, bottom), rim(i, bottom)],
        ];
        for vertices in faces {
            builder = builder.member(Shape::facet(vertices), mat, Pose::default());
        }
    }
    builder
}

fn main() -> DemResult<()> {
    let config = SceneConfig::default()
        .with_gravity(Vec3::new(0.0, 0.0, -10.0))
        .with_lone_mask(LONE_MASK)
        .with_dt_safety(0.5)
        .with_damping(0.4);
    let mut engine = DemEngine::new(config)?;
    let scene = engine.scene_mut();
    let mat = scene.add_material(Material::new("default"))?;

    scene.add_particle(ParticleBuilder::wall(2, 1, Vec3::ZERO, mat).with_mask(WALL_MASK))?;
    let bottle = scene.add_clump(
        bottle(mat, 0.03, 0.005, 0.12, 16)
            .centered_at(Vec3::new(0.0, 0.0, 0.04))
            .with_mask(WALL_MASK)
            .with_motion(Motion::Static),
    )?;
    let bottle_node = scene
        .clump(bottle)
        .map(|c| c.node)
        .ok_or_else(|| ConfigError::inconsistent_clump("bottle has no node"))?;

    scene.add_factory(
        FactoryConfig::new(
            "feed",
            SpawnVolume::Cylinder {
                pose: Pose::new(Vec3::new(0.0, 0.0, 0.17), Quat::from_rotation_y(PI / 2.0)),
                radius: 0.018,
                height: 0.05,
            },
            Generator::PharmaCapsule(PharmaCapsuleGenerator::default()),
            mat,
        )
        .every_steps(100)
        .with_mask(CAPS_MASK)
        .with_max_mass(0.12)
        .with_attempts(100)
        .with_hook("pillsDone"),
    )?;

    // Wait another 0.2 s, then tip the bottle.
    engine.register_hook("pillsDone", move |scene, call| {
        let start = scene
            .node(bottle_node)
            .map(|node| node.pose.position)
            .unwrap_or_default();
        println!("feed done at t = {:.3} s, tipping the bottle", call.time);
        let motion = InterpolatedMotion::new(
            scene.time() + 0.2,
            vec![
                start,
                Vec3::new(0.0, 0.05, 0.08),
                Vec3::new(0.0, 0.05, 0.09),
                Vec3::new(0.0, 0.04, 0.13),
            ],
            vec![
                Quat::IDENTITY,
                Quat::from_rotation_x(0.666 * PI),
                Quat::from_rotation_x(0.85 * PI),
                Quat::from_rotation_x(0.9 * PI),
            ],
            vec![0.0, 0.3, 0.8, 1.6],
        )?;
        scene.set_motion(bottle_node, Motion::Imposed(motion))
    });

    let mut next_report = 0.0;
    while engine.scene().time() < 4.0 {
        let report = engine.step()?;
        if report.time >= next_report {
            println!(
                "t = {:.3} s  dt = {:.2e}  particles = {}  real contacts = {}",
                report.time,
                report.dt,
                engine.scene().particle_count(),
                report.real_contacts
            );
            next_report += 0.25;
        }
    }
    Ok(())
}
