//! Two hands carrying one object: extra drag so the shared body settles,
//! plus a small push along the carrier's facing to make up for it.

use glam::Vec3;

use crate::config::AssistTuning;
use crate::grab::HandId;
use crate::physics::{BodyId, PhysicsBackend};

#[derive(Clone, Copy, Debug)]
struct Engaged {
    body: BodyId,
    /// Damping the body had before the assist touched it.
    original: (f32, f32),
}

pub struct TwoActorCarryAssist {
    /// The pair of hands this assist watches.
    pub hands: [HandId; 2],
    tuning: AssistTuning,
    engaged: Option<Engaged>,
}

impl TwoActorCarryAssist {
    pub fn new(hands: [HandId; 2], tuning: AssistTuning) -> Self {
        Self {
            hands,
            tuning,
            engaged: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.engaged.is_some()
    }

    pub fn engaged_body(&self) -> Option<BodyId> {
        self.engaged.map(|e| e.body)
    }

    /// `held` is what each watched hand is latched to this step. `forward` is
    /// the carrying actor's facing.
    pub fn fixed_update(&mut self, physics: &mut dyn PhysicsBackend, held: [Option<BodyId>; 2], forward: Vec3, dt: f32) {
        let shared = match held {
            [Some(a), Some(b)] if a == b => Some(a),
            _ => None,
        };

        if let Some(engaged) = self.engaged
            && shared != Some(engaged.body)
        {
            self.disengage(physics);
        }

        let Some(body) = shared else {
            return;
        };
        let Some(state) = physics.body(body) else {
            self.engaged = None;
            return;
        };

        let original = match self.engaged {
            Some(engaged) => engaged.original,
            None => {
                let original = (state.linear_damping, state.angular_damping);
                self.engaged = Some(Engaged { body, original });
                log::debug!("Two-hand assist on {:?} (damping {:?})", body, original);
                original
            }
        };
        physics.set_damping(
            body,
            original.0 + self.tuning.extra_linear_damping,
            original.1 + self.tuning.extra_angular_damping,
        );

        let planar_forward = Vec3::new(forward.x, 0.0, forward.z).normalize_or_zero();
        let planar_speed = Vec3::new(state.linear_velocity.x, 0.0, state.linear_velocity.z).length();
        if planar_forward != Vec3::ZERO && planar_speed < self.tuning.max_planar_speed && self.tuning.forward_force > 0.0 {
            physics.apply_impulse(body, planar_forward * self.tuning.forward_force * dt);
        }
    }

    /// Puts the cached damping back. Safe to call when not engaged.
    pub fn disengage(&mut self, physics: &mut dyn PhysicsBackend) {
        if let Some(engaged) = self.engaged.take() {
            physics.set_damping(engaged.body, engaged.original.0, engaged.original.1);
            log::debug!("Two-hand assist off {:?}", engaged.body);
        }
    }
}
