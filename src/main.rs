use glam::Vec3;
use instant::Instant;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use grabcarry::feedback::ShakeFeedback;
use grabcarry::{GrabEvent, GrabTuning, HandId, HandSide, Simulation};

const DT: f32 = 1.0 / 60.0;
const STEPS: u32 = 600;
const CRATES: usize = 6;

fn load_tuning() -> GrabTuning {
    let Some(path) = std::env::args().nth(1) else {
        return GrabTuning::default();
    };
    match std::fs::read_to_string(&path) {
        Ok(text) => match GrabTuning::from_json(&text) {
            Ok(tuning) => {
                log::info!("Loaded tuning from {}", path);
                tuning
            }
            Err(e) => {
                log::warn!("Bad tuning file {}: {}, using defaults", path, e);
                GrabTuning::default()
            }
        },
        Err(e) => {
            log::warn!("Cannot read {}: {}, using defaults", path, e);
            GrabTuning::default()
        }
    }
}

/// Scripted stick and button for a player at step `i`.
fn script(i: u32, player: usize) -> ((f32, f32), bool, bool) {
    let t = i as f32 * DT;
    match player {
        // Walk to the pile, grab with both hands, carry it back, drop it.
        0 => match t {
            t if t < 1.0 => ((0.0, 1.0), false, false),
            t if t < 1.2 => ((0.0, 0.0), true, true),
            t if t < 4.0 => ((0.0, -1.0), true, true),
            _ => ((0.0, 0.0), false, false),
        },
        // Comes from the other side and shares the load for a while.
        _ => match t {
            t if t < 1.0 => ((0.0, -1.0), false, false),
            t if t < 3.0 => ((0.0, 0.0), true, false),
            _ => ((1.0, 0.0), false, false),
        },
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let tuning = load_tuning();
    let mut sim = Simulation::new(tuning).with_feedback(Box::new(ShakeFeedback::new()));
    sim.physics.spawn_ground(50.0);

    let alice = sim.spawn_actor(0, Vec3::new(0.0, 0.0, -4.0));
    let bob = sim.spawn_actor(1, Vec3::new(0.0, 0.0, 4.0));
    sim.add_assist([
        HandId { actor: alice, side: HandSide::Right },
        HandId { actor: bob, side: HandSide::Left },
    ]);

    let mut rng = SmallRng::seed_from_u64(2026);
    for _ in 0..CRATES {
        let position = Vec3::new(rng.gen_range(-1.5..1.5), 0.5, rng.gen_range(-1.0..1.0));
        let mass = rng.gen_range(1.0..120.0);
        let body = sim.spawn_crate(position, Vec3::splat(0.3), mass);
        log::info!("Crate {:?} ({:.1} kg) at {:.2?}", body, mass, position);
    }

    let start = Instant::now();
    let mut latches = 0;
    let mut breaks = 0;
    for i in 0..STEPS {
        for player in 0..2 {
            let (axis, left, right) = script(i, player);
            if let Some(input) = sim.input_mut(player) {
                input.move_axis = axis;
                input.left.activate.set(left);
                input.right.activate.set(right);
            }
        }
        for event in sim.fixed_step(DT) {
            match event {
                GrabEvent::Latched { .. } => latches += 1,
                GrabEvent::Released { cause, .. } if *cause == grabcarry::ReleaseCause::Broken => breaks += 1,
                GrabEvent::Released { .. } => {}
            }
        }
    }

    let elapsed = start.elapsed();
    log::info!(
        "{} steps ({:.1}s simulated) in {:.2?}: {} latches, {} breaks",
        STEPS,
        sim.time(),
        elapsed,
        latches,
        breaks
    );
    for actor in &sim.actors {
        if let Some(frame) = actor.frame(&sim.physics) {
            log::info!("Actor {:?} ended at {:.2?}", actor.id, frame.position);
        }
    }
}
