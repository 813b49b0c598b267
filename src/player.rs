use glam::{Quat, Vec3};

use crate::anchor::HandAnchor;
use crate::carry::CarryCostModel;
use crate::config::{GrabTuning, MoverTuning};
use crate::feedback::GrabFeedback;
use crate::grab::{ActorId, GrabContext, GrabController, GrabEvent, HandId, HandSide};
use crate::grabbable::{CarryLoad, GrabbableRegistry};
use crate::ik::{LimbPose, LimbSolution, Rig};
use crate::input::PlayerInput;
use crate::physics::{BodyId, Frame, JointId, PhysicsBackend};

// Rest pose of the arms in actor space (+Z forward, +X to the right).
const SHOULDER: Vec3 = Vec3::new(0.25, 0.4, 0.0);
const ELBOW: Vec3 = Vec3::new(0.3, 0.1, 0.15);
const PALM: Vec3 = Vec3::new(0.3, 0.0, 0.45);
const MIN_TURN_SPEED: f32 = 0.1;

fn side_index(side: HandSide) -> usize {
    match side {
        HandSide::Left => 0,
        HandSide::Right => 1,
    }
}

fn mirrored(local: Vec3, side: HandSide) -> Vec3 {
    match side {
        HandSide::Left => Vec3::new(-local.x, local.y, local.z),
        HandSide::Right => local,
    }
}

fn move_towards(current: Vec3, target: Vec3, max_delta: f32) -> Vec3 {
    let delta = target - current;
    let len = delta.length();
    if len <= max_delta || len == 0.0 {
        target
    } else {
        current + delta / len * max_delta
    }
}

fn inverse_lerp(a: f32, b: f32, v: f32) -> f32 {
    if a == b { 0.0 } else { ((v - a) / (b - a)).clamp(0.0, 1.0) }
}

/// Top-down planar locomotion on a physics body.
pub struct Mover {
    pub tuning: MoverTuning,
}

impl Mover {
    pub fn new(tuning: MoverTuning) -> Self {
        Self { tuning }
    }

    /// Radial deadzone that keeps analog magnitude: the stick is rescaled so
    /// the deadzone edge maps to zero and full tilt to one.
    pub fn wish_direction(&self, axis: (f32, f32)) -> Vec3 {
        let raw = Vec3::new(axis.0, 0.0, axis.1);
        let mag = raw.length();
        if mag < self.tuning.input_deadzone {
            return Vec3::ZERO;
        }
        let wish = raw.normalize_or_zero() * inverse_lerp(self.tuning.input_deadzone, 1.0, mag);
        if wish.length_squared() > 1.0 { wish.normalize() } else { wish }
    }

    /// New velocity for this step. Only the planar part is steered; vertical
    /// velocity is left to the physics. A locked carrier can only slow down.
    pub fn step(&self, velocity: Vec3, axis: (f32, f32), speed_multiplier: f32, locked: bool, dt: f32) -> Vec3 {
        let planar = Vec3::new(velocity.x, 0.0, velocity.z);

        if locked {
            let v = move_towards(planar, Vec3::ZERO, self.tuning.deceleration * dt);
            return Vec3::new(v.x, velocity.y, v.z);
        }

        let wish = self.wish_direction(axis);
        let target = wish * (self.tuning.max_speed * speed_multiplier);

        let rate = if wish.length_squared() > 0.0 {
            let mut dot = 1.0;
            if planar.length_squared() > 0.01 && target.length_squared() > 0.01 {
                dot = planar.normalize().dot(target.normalize());
            }
            // Reversing direction accelerates harder than speeding up.
            let boost = inverse_lerp(1.0, -1.0, dot);
            let a = self.tuning.acceleration;
            a + (a * self.tuning.turn_assist_multiplier - a) * boost
        } else {
            self.tuning.deceleration
        };

        let v = move_towards(planar, target, rate * dt);
        Vec3::new(v.x, velocity.y, v.z)
    }
}

/// Procedural two-arm rig. Rebuilt from the actor frame every step, then bent
/// by the grab controllers in the late phase.
pub struct ArmRig {
    frame: Frame,
    limbs: [LimbPose; 2],
    solved: [Option<LimbSolution>; 2],
}

impl ArmRig {
    pub fn new(frame: Frame) -> Self {
        let mut rig = Self {
            frame,
            limbs: [LimbPose {
                root: Vec3::ZERO,
                mid: Vec3::ZERO,
                end: Vec3::ZERO,
            }; 2],
            solved: [None; 2],
        };
        rig.reset(frame);
        rig
    }

    /// Back to the rest pose around `frame`.
    pub fn reset(&mut self, frame: Frame) {
        self.frame = frame;
        for side in HandSide::BOTH {
            self.limbs[side_index(side)] = LimbPose {
                root: frame.transform_point(mirrored(SHOULDER, side)),
                mid: frame.transform_point(mirrored(ELBOW, side)),
                end: frame.transform_point(mirrored(PALM, side)),
            };
            self.solved[side_index(side)] = None;
        }
    }

    /// Where the hand is, oriented like the wrist when solved, else like the actor.
    pub fn palm(&self, side: HandSide) -> Frame {
        let i = side_index(side);
        let rotation = self.solved[i]
            .and_then(|s| s.end_rotation)
            .unwrap_or(self.frame.rotation);
        Frame::new(self.limbs[i].end, rotation)
    }

    /// Palm frame of the rest pose; this is what the hands search from.
    pub fn rest_palm(&self, side: HandSide) -> Frame {
        Frame::new(self.frame.transform_point(mirrored(PALM, side)), self.frame.rotation)
    }

    pub fn solution(&self, side: HandSide) -> Option<&LimbSolution> {
        self.solved[side_index(side)].as_ref()
    }
}

impl Rig for ArmRig {
    fn limb(&self, side: HandSide) -> Option<LimbPose> {
        Some(self.limbs[side_index(side)])
    }

    fn apply_limb(&mut self, side: HandSide, solution: &LimbSolution) {
        let i = side_index(side);
        self.limbs[i].mid = solution.mid_position;
        self.limbs[i].end = solution.end_position;
        self.solved[i] = Some(*solution);
    }
}

/// Everything a step needs from the world, shared by all actors.
pub struct ActorStep<'a> {
    pub physics: &'a mut dyn PhysicsBackend,
    pub registry: &'a mut GrabbableRegistry,
    pub feedback: &'a mut dyn GrabFeedback,
    pub broken_joints: &'a [JointId],
    pub now: f32,
    pub dt: f32,
}

/// A player-controlled character with two grabbing hands.
pub struct Actor {
    pub id: ActorId,
    pub player_index: usize,
    pub body: BodyId,
    pub yaw: f32,
    pub mover: Mover,
    pub carry: CarryCostModel,
    pub hands: [GrabController; 2],
    pub arms: ArmRig,
}

impl Actor {
    /// `anchors` are the kinematic hand-anchor bodies, left then right.
    pub fn new(
        id: ActorId,
        player_index: usize,
        body: BodyId,
        anchors: [BodyId; 2],
        baseline_damping: f32,
        tuning: &GrabTuning,
    ) -> Self {
        let hand = |side: HandSide, anchor: BodyId| {
            GrabController::new(HandId { actor: id, side }, HandAnchor::new(anchor), tuning.hand)
        };
        Self {
            id,
            player_index,
            body,
            yaw: 0.0,
            mover: Mover::new(tuning.mover),
            carry: CarryCostModel::new(body, baseline_damping, tuning.carry),
            hands: [hand(HandSide::Left, anchors[0]), hand(HandSide::Right, anchors[1])],
            arms: ArmRig::new(Frame::IDENTITY),
        }
    }

    pub fn hand(&self, side: HandSide) -> &GrabController {
        &self.hands[side_index(side)]
    }

    pub fn hand_mut(&mut self, side: HandSide) -> &mut GrabController {
        &mut self.hands[side_index(side)]
    }

    pub fn rotation(&self) -> Quat {
        Quat::from_rotation_y(self.yaw)
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation() * Vec3::Z
    }

    pub fn frame(&self, physics: &dyn PhysicsBackend) -> Option<Frame> {
        physics
            .body(self.body)
            .map(|state| Frame::new(state.pose.position, self.rotation()))
    }

    pub fn fixed_update(&mut self, step: &mut ActorStep, input: &PlayerInput) -> Vec<GrabEvent> {
        let Some(state) = step.physics.body(self.body) else {
            log::warn!("Actor {:?} has no body, skipping", self.id);
            return Vec::new();
        };

        let velocity = self.mover.step(
            state.linear_velocity,
            input.move_axis,
            self.carry.speed_multiplier(),
            self.carry.movement_locked(),
            step.dt,
        );
        step.physics.set_velocity(self.body, velocity, Vec3::ZERO);
        let planar = Vec3::new(velocity.x, 0.0, velocity.z);
        if planar.length() > MIN_TURN_SPEED {
            self.yaw = planar.x.atan2(planar.z);
        }

        self.arms.reset(Frame::new(state.pose.position, self.rotation()));

        let owner = [self.body];
        let mut events = Vec::new();
        for hand in &mut self.hands {
            let mut signal = *input.hand(hand.id.side);
            if signal.frame.is_none() {
                signal.frame = Some(self.arms.rest_palm(hand.id.side));
            }
            let mut ctx = GrabContext {
                physics: &mut *step.physics,
                registry: &mut *step.registry,
                carry: &mut self.carry,
                feedback: &mut *step.feedback,
                owner_bodies: &owner,
                broken_joints: step.broken_joints,
                now: step.now,
                dt: step.dt,
            };
            events.extend(hand.fixed_update(&mut ctx, &signal));
        }

        if !events.is_empty() {
            self.refresh_carry(step.physics);
        }
        events
    }

    /// One hand letting go resets the carry cost, so recompute it from
    /// whatever is still held. The heaviest load wins.
    fn refresh_carry(&mut self, physics: &mut dyn PhysicsBackend) {
        let heaviest = self
            .hands
            .iter()
            .filter_map(|h| h.state().held_load())
            .max_by_key(|load| self.carry.classify(*load));
        match heaviest {
            Some(load) => self.carry.apply(physics, load),
            None => self.carry.clear(physics),
        }
    }

    /// Loads currently held, left then right.
    pub fn held_loads(&self) -> [Option<CarryLoad>; 2] {
        [self.hands[0].state().held_load(), self.hands[1].state().held_load()]
    }

    /// Late phase: arms reach for what the hands are holding or reaching for.
    pub fn late_update(&mut self, physics: &dyn PhysicsBackend, registry: &GrabbableRegistry) {
        for hand in &self.hands {
            hand.late_update(physics, registry, &mut self.arms);
        }
    }

    /// Releases everything and clears highlights; call before removing the actor.
    pub fn despawn(&mut self, step: &mut ActorStep) -> Vec<GrabEvent> {
        let owner = [self.body];
        let mut events = Vec::new();
        for hand in &mut self.hands {
            let mut ctx = GrabContext {
                physics: &mut *step.physics,
                registry: &mut *step.registry,
                carry: &mut self.carry,
                feedback: &mut *step.feedback,
                owner_bodies: &owner,
                broken_joints: &[],
                now: step.now,
                dt: step.dt,
            };
            events.extend(hand.reset(&mut ctx));
        }
        self.carry.clear(step.physics);
        events
    }
}
