use std::{sync::Arc, thread};

use grainflow::*;
use parking_lot::Mutex;

#[test]
fn scene_and_engine_are_send_and_sync() {
    fn assert_sync_send<T: Sync + Send>() {}
    fn assert_send<T: Send>() {}
    assert_sync_send::<Scene>();
    assert_sync_send::<SceneState>();
    assert_sync_send::<HookQueue>();
    assert_send::<DemEngine>();
}

fn pile(parallel: bool) -> Scene {
    let config = SceneConfig::default()
        .with_gravity(Vec3::new(0.0, 0.0, -10.0))
        .with_damping(0.3)
        .with_parallel(parallel);
    let mut scene = Scene::new(config).unwrap();
    let mat = scene
        .add_material(Material::new("grain").with_young(1e6).with_damping_ratio(0.2))
        .unwrap();
    scene
        .add_particle(ParticleBuilder::wall(2, 1, Vec3::ZERO, mat))
        .unwrap();
    for i in 0..4 {
        for j in 0..4 {
            for k in 0..3 {
                let jitter = 1e-4 * ((i + 2 * j + 3 * k) % 5) as f64;
                let position = Vec3::new(
                    0.021 * i as f64 + jitter,
                    0.021 * j as f64,
                    0.015 + 0.021 * k as f64,
                );
                scene
                    .add_particle(ParticleBuilder::sphere(0.01, mat).at(position))
                    .unwrap();
            }
        }
    }
    scene
}

#[test]
fn parallel_and_serial_steps_agree_exactly() {
    let mut serial = pile(false);
    let mut parallel = pile(true);
    let mut touched = false;
    for _ in 0..300 {
        let a = serial.step().unwrap();
        let b = parallel.step().unwrap();
        touched |= a.real_contacts > 0;
        assert_eq!(a, b);
    }
    assert!(touched, "the pile never reached the floor");
    assert_eq!(serial.render_view(), parallel.render_view());
}

#[test]
fn scenes_step_on_worker_threads() {
    let handles: Vec<_> = (0..4)
        .map(|_| {
            thread::spawn(|| {
                let mut scene = pile(true);
                scene.run(50).unwrap();
                scene.render_view()
            })
        })
        .collect();
    let views: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(views.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn shared_scene_behind_a_mutex() {
    let scene = Arc::new(Mutex::new(pile(false)));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let scene = Arc::clone(&scene);
            thread::spawn(move || {
                for _ in 0..10 {
                    scene.lock().step().unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(scene.lock().step_count(), 40);
}

#[test]
fn hook_queue_is_shared_across_threads() {
    let queue = HookQueue::new();
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let queue = queue.clone();
            thread::spawn(move || {
                queue.push(HookCall {
                    hook: format!("worker{i}"),
                    factory: EntityId::from_index(i),
                    time: 0.0,
                });
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    let mut calls = queue.drain();
    calls.sort_by_key(|c| c.factory);
    assert_eq!(calls.len(), 4);
    assert_eq!(calls[3].hook, "worker3");
    assert!(queue.is_empty());
}
