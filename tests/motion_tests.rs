use approx::{assert_abs_diff_eq, assert_relative_eq};
use grainflow::*;

const DT: f64 = 1e-3;

/// Soft, large spheres so that a millisecond step stays below the bound.
fn soft_scene() -> (Scene, MaterialId) {
    let config = SceneConfig::default()
        .with_gravity(Vec3::new(0.0, 0.0, -10.0))
        .with_timestep(TimestepMode::Fixed(DT));
    let mut scene = Scene::new(config).unwrap();
    let mat = scene
        .add_material(Material::new("foam").with_young(1e4).with_damping_ratio(0.2))
        .unwrap();
    (scene, mat)
}

fn lift() -> InterpolatedMotion {
    InterpolatedMotion::new(
        0.0,
        vec![
            Vec3::ZERO,
            Vec3::new(0.0, 0.0, 0.1),
            Vec3::new(0.1, 0.0, 0.1),
        ],
        vec![
            Quat::IDENTITY,
            Quat::from_rotation_x(0.5),
            Quat::from_rotation_x(1.0),
        ],
        vec![0.0, 0.3, 0.8],
    )
    .unwrap()
}

#[test]
fn imposed_node_hits_every_breakpoint_despite_contacts() {
    let (mut scene, mat) = soft_scene();
    let carrier = scene
        .add_particle(ParticleBuilder::sphere(0.05, mat).with_motion(Motion::Imposed(lift())))
        .unwrap();
    let rider = scene
        .add_particle(ParticleBuilder::sphere(0.05, mat).at(Vec3::new(0.0, 0.0, 0.105)))
        .unwrap();

    let mut pushed = false;
    for _ in 0..300 {
        scene.step().unwrap();
        pushed |= scene.contact_between(carrier, rider).is_some_and(|c| c.is_real());
    }
    assert!(pushed, "the rider never landed on the carrier");
    assert_relative_eq!(scene.time(), 0.3, epsilon = 1e-12);
    let node = scene.node_of(carrier).unwrap();
    assert_eq!(node.pose.position, Vec3::new(0.0, 0.0, 0.1));
    assert_abs_diff_eq!(node.pose.orientation, Quat::from_rotation_x(0.5), epsilon = 1e-12);

    scene.run(500).unwrap();
    let node = scene.node_of(carrier).unwrap();
    assert_eq!(node.pose.position, Vec3::new(0.1, 0.0, 0.1));
    assert_abs_diff_eq!(node.pose.orientation, Quat::from_rotation_x(1.0), epsilon = 1e-12);
}

#[test]
fn imposed_velocity_is_the_trajectory_derivative() {
    let (mut scene, mat) = soft_scene();
    let carrier = scene
        .add_particle(ParticleBuilder::sphere(0.05, mat).with_motion(Motion::Imposed(lift())))
        .unwrap();

    scene.run(150).unwrap();
    let node = scene.node_of(carrier).unwrap();
    assert_relative_eq!(node.pose.position.z, 0.05, epsilon = 1e-9);
    assert_relative_eq!(node.velocity, Vec3::new(0.0, 0.0, 0.1 / 0.3), epsilon = 1e-9);
    assert_relative_eq!(node.angular_velocity, Vec3::new(0.5 / 0.3, 0.0, 0.0), epsilon = 1e-9);

    scene.run(350).unwrap();
    let node = scene.node_of(carrier).unwrap();
    assert_relative_eq!(node.velocity, Vec3::new(0.1 / 0.5, 0.0, 0.0), epsilon = 1e-9);
}

#[test]
fn trajectory_holds_before_start_and_after_end() {
    let (mut scene, mat) = soft_scene();
    let delayed = InterpolatedMotion::new(
        0.5,
        vec![Vec3::new(1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.2)],
        vec![Quat::IDENTITY, Quat::IDENTITY],
        vec![0.0, 0.1],
    )
    .unwrap();
    let carrier = scene
        .add_particle(
            ParticleBuilder::sphere(0.05, mat)
                .at(Vec3::new(1.0, 0.0, 0.0))
                .with_motion(Motion::Imposed(delayed)),
        )
        .unwrap();

    scene.run(200).unwrap();
    let node = scene.node_of(carrier).unwrap();
    assert_eq!(node.pose.position, Vec3::new(1.0, 0.0, 0.0));
    assert_eq!(node.velocity, Vec3::ZERO);

    scene.run(600).unwrap();
    let node = scene.node_of(carrier).unwrap();
    assert_eq!(node.pose.position, Vec3::new(1.0, 0.0, 0.2));
    assert_eq!(node.velocity, Vec3::ZERO);
    assert_eq!(node.angular_velocity, Vec3::ZERO);
}

#[test]
fn malformed_trajectories_are_rejected() {
    let unsorted = InterpolatedMotion::new(
        0.0,
        vec![Vec3::ZERO, Vec3::X],
        vec![Quat::IDENTITY, Quat::IDENTITY],
        vec![0.5, 0.1],
    );
    assert!(matches!(unsorted, Err(ConfigError::MalformedTrajectory(_))));

    let mismatched = InterpolatedMotion::new(
        0.0,
        vec![Vec3::ZERO, Vec3::X],
        vec![Quat::IDENTITY],
        vec![0.0, 0.1],
    );
    assert!(mismatched.is_err());
}

#[test]
fn static_clump_can_be_driven_after_setup() {
    let (mut scene, mat) = soft_scene();
    let clump = scene
        .add_clump(
            ClumpBuilder::new()
                .member(Shape::sphere(0.05), mat, Pose::from_position(Vec3::new(-0.1, 0.0, 0.0)))
                .member(Shape::sphere(0.05), mat, Pose::from_position(Vec3::new(0.1, 0.0, 0.0)))
                .with_motion(Motion::Static),
        )
        .unwrap();
    let node_id = scene.clump(clump).unwrap().node;
    scene.run(10).unwrap();
    assert_eq!(scene.node(node_id).unwrap().pose.position, Vec3::ZERO);

    let motion = InterpolatedMotion::new(
        scene.time(),
        vec![Vec3::ZERO, Vec3::new(0.0, 0.0, 0.1)],
        vec![Quat::IDENTITY, Quat::from_rotation_z(std::f64::consts::FRAC_PI_2)],
        vec![0.0, 0.1],
    )
    .unwrap();
    scene.set_motion(node_id, Motion::Imposed(motion)).unwrap();
    scene.run(100).unwrap();

    let members = scene.clump(clump).unwrap().members.clone();
    let right = scene.particle(members[1]).unwrap().pose.position;
    assert_relative_eq!(right, Vec3::new(0.0, 0.1, 0.1), epsilon = 1e-9);
}
