//! Per-hand grab state machine.
//!
//! Each step a hand either searches for something to pick up (overlap query,
//! filtering, nearest-wins, sticky memory, highlighting), reaches for the
//! chosen object, or holds it through a joint into its [`HandAnchor`].
//! Every way a hold can end (letting go, the joint breaking, the object
//! vanishing) goes through the same release path.

use glam::Vec3;

use crate::anchor::{AnchorTarget, HandAnchor};
use crate::carry::CarryCostModel;
use crate::config::{GrabMode, HandTuning, ReleaseMode};
use crate::feedback::GrabFeedback;
use crate::grabbable::{CarryLoad, GrabbableRegistry};
use crate::ik::{self, Rig};
use crate::input::HandSignal;
use crate::physics::{BodyId, BodyState, Frame, JointDrive, JointId, JointSpec, PhysicsBackend};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ActorId(pub u32);

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum HandSide {
    Left,
    Right,
}

impl HandSide {
    pub const BOTH: [HandSide; 2] = [HandSide::Left, HandSide::Right];

    pub fn other(self) -> HandSide {
        match self {
            HandSide::Left => HandSide::Right,
            HandSide::Right => HandSide::Left,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct HandId {
    pub actor: ActorId,
    pub side: HandSide,
}

/// What the hand is currently interested in.
#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub enum Candidate {
    #[default]
    None,
    Tracked {
        body: BodyId,
        /// Last time the body overlapped the search volume.
        last_seen: f32,
        /// Number of the body's volumes overlapping right now.
        overlap_count: u32,
    },
}

impl Candidate {
    pub fn body(&self) -> Option<BodyId> {
        match *self {
            Candidate::None => None,
            Candidate::Tracked { body, .. } => Some(body),
        }
    }

    pub fn overlap_count(&self) -> u32 {
        match *self {
            Candidate::None => 0,
            Candidate::Tracked { overlap_count, .. } => overlap_count,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum GrabState {
    Idle,
    Seeking,
    Reaching,
    Latched,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ReleaseCause {
    /// The player let go.
    Input,
    /// The joint exceeded its break force or torque.
    Broken,
    /// The held body or its grabbable entry disappeared.
    Lost,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum GrabEvent {
    Latched { hand: HandId, body: BodyId, load: CarryLoad },
    Released { hand: HandId, body: BodyId, cause: ReleaseCause },
}

#[derive(Clone, Copy, Debug)]
struct Reach {
    body: BodyId,
    elapsed: f32,
}

/// Live hold plus what has to be undone when it ends.
#[derive(Clone, Debug)]
struct Latch {
    body: BodyId,
    joint: JointId,
    load: CarryLoad,
    ignored_with: Vec<BodyId>,
    /// Gravity was off on account of the holders when this hand latched.
    /// Only used if the grabbable entry vanishes before release.
    restore_gravity: bool,
}

/// Mutable per-hand state.
#[derive(Clone, Debug, Default)]
pub struct HandState {
    candidate: Candidate,
    highlighted: Option<BodyId>,
    reach: Option<Reach>,
    latch: Option<Latch>,
}

impl HandState {
    pub fn candidate(&self) -> Candidate {
        self.candidate
    }

    pub fn joint(&self) -> Option<JointId> {
        self.latch.as_ref().map(|l| l.joint)
    }

    pub fn held_body(&self) -> Option<BodyId> {
        self.latch.as_ref().map(|l| l.body)
    }

    pub fn held_load(&self) -> Option<CarryLoad> {
        self.latch.as_ref().map(|l| l.load)
    }

    pub fn grab_state(&self) -> GrabState {
        if self.latch.is_some() {
            GrabState::Latched
        } else if self.reach.is_some() {
            GrabState::Reaching
        } else if self.candidate != Candidate::None {
            GrabState::Seeking
        } else {
            GrabState::Idle
        }
    }
}

/// Everything a hand touches during a step, borrowed from the simulation.
pub struct GrabContext<'a> {
    pub physics: &'a mut dyn PhysicsBackend,
    pub registry: &'a mut GrabbableRegistry,
    pub carry: &'a mut CarryCostModel,
    pub feedback: &'a mut dyn GrabFeedback,
    /// Bodies making up the owning actor.
    pub owner_bodies: &'a [BodyId],
    /// Joints the physics world reported broken this step.
    pub broken_joints: &'a [JointId],
    pub now: f32,
    pub dt: f32,
}

pub struct GrabController {
    pub id: HandId,
    pub tuning: HandTuning,
    pub anchor: HandAnchor,
    state: HandState,
    ik_active: bool,
    palm: Option<Frame>,
}

impl GrabController {
    pub fn new(id: HandId, anchor: HandAnchor, tuning: HandTuning) -> Self {
        Self {
            id,
            tuning,
            anchor,
            state: HandState::default(),
            ik_active: false,
            palm: None,
        }
    }

    pub fn state(&self) -> &HandState {
        &self.state
    }

    pub fn grab_state(&self) -> GrabState {
        self.state.grab_state()
    }

    pub fn candidate(&self) -> Candidate {
        self.state.candidate
    }

    pub fn held_body(&self) -> Option<BodyId> {
        self.state.held_body()
    }

    pub fn is_latched(&self) -> bool {
        self.state.latch.is_some()
    }

    pub fn ik_active(&self) -> bool {
        self.ik_active
    }

    /// Whether this hand's highlight is currently showing on its candidate.
    pub fn highlight_active(&self, registry: &GrabbableRegistry) -> bool {
        self.state
            .highlighted
            .is_some_and(|body| registry.is_highlighted_by(body, self.id))
    }

    /// One physics step.
    pub fn fixed_update(&mut self, ctx: &mut GrabContext, signal: &HandSignal) -> Option<GrabEvent> {
        if signal.frame.is_some() {
            self.palm = signal.frame;
        }
        let event = self.step_state(ctx, signal);
        self.anchor.update(ctx.physics, signal.frame);
        event
    }

    fn step_state(&mut self, ctx: &mut GrabContext, signal: &HandSignal) -> Option<GrabEvent> {
        if let Some(latch) = &self.state.latch {
            let cause = if ctx.physics.body(latch.body).is_none() || !ctx.registry.contains(latch.body) {
                Some(ReleaseCause::Lost)
            } else if ctx.broken_joints.contains(&latch.joint) || !ctx.physics.joint_exists(latch.joint) {
                Some(ReleaseCause::Broken)
            } else if self.wants_release(signal) {
                Some(ReleaseCause::Input)
            } else {
                None
            };
            return cause.and_then(|cause| self.release(ctx, cause));
        }

        if let Some(reach) = self.state.reach {
            return self.step_reach(ctx, signal, reach);
        }

        self.search(ctx, signal.frame.map(|f| f.position));

        if signal.activate.down() {
            return self.activate(ctx);
        }
        None
    }

    fn wants_release(&self, signal: &HandSignal) -> bool {
        match self.tuning.release_mode {
            ReleaseMode::OnRelease => !signal.activate.held(),
            ReleaseMode::Toggle => signal.activate.down(),
        }
    }

    fn step_reach(&mut self, ctx: &mut GrabContext, signal: &HandSignal, mut reach: Reach) -> Option<GrabEvent> {
        let cancelled = self.wants_release(signal);
        if self.eligible(ctx, reach.body).is_none() {
            log::debug!("{:?} lost reach target {:?}", self.id, reach.body);
            self.abort_reach();
            self.forget_candidate(ctx);
            return None;
        }
        if cancelled {
            self.abort_reach();
            return None;
        }

        reach.elapsed += ctx.dt;
        if reach.elapsed >= self.tuning.reach_time {
            return self.latch(ctx, reach.body);
        }
        self.state.reach = Some(reach);
        None
    }

    fn abort_reach(&mut self) {
        self.state.reach = None;
        self.anchor.clear_override();
        self.ik_active = false;
    }

    /// Refreshes the candidate from an overlap query around `origin`.
    /// Without a hand frame nothing overlaps, so sticky memory just runs down.
    fn search(&mut self, ctx: &mut GrabContext, origin: Option<Vec3>) {
        let hits = match origin {
            Some(origin) => ctx.physics.overlap_sphere(origin, self.tuning.grab_radius),
            None => Vec::new(),
        };

        // Per-body volume counts, in first-encountered order.
        let mut counts: Vec<(BodyId, u32)> = Vec::new();
        for body in hits {
            match counts.iter_mut().find(|(b, _)| *b == body) {
                Some((_, n)) => *n += 1,
                None => counts.push((body, 1)),
            }
        }

        let mut best: Option<(BodyId, u32, f32)> = None;
        if let Some(origin) = origin {
            for (body, count) in counts {
                let Some(state) = self.eligible(ctx, body) else {
                    continue;
                };
                let Some(grabbable) = ctx.registry.get(body) else {
                    continue;
                };
                let dist = origin.distance(grabbable.grab_frame(&state).position);
                if best.is_none_or(|(_, _, d)| dist < d) {
                    best = Some((body, count, dist));
                }
            }
        }

        let now = ctx.now;
        match (best, self.state.candidate) {
            (Some((body, count, _)), Candidate::Tracked { body: current, .. }) if body == current => {
                self.state.candidate = Candidate::Tracked {
                    body,
                    last_seen: now,
                    overlap_count: count,
                };
                self.show_highlight(ctx, body);
            }
            (Some((body, count, _)), previous) => {
                self.clear_highlight(ctx);
                if let Some(old) = previous.body() {
                    log::debug!("{:?} switched candidate {:?} -> {:?}", self.id, old, body);
                }
                self.state.candidate = Candidate::Tracked {
                    body,
                    last_seen: now,
                    overlap_count: count,
                };
                self.show_highlight(ctx, body);
            }
            (None, Candidate::Tracked { body, last_seen, .. }) => {
                self.clear_highlight(ctx);
                if self.eligible(ctx, body).is_none() {
                    self.forget_candidate(ctx);
                } else if now - last_seen > self.tuning.target_keep_time {
                    log::debug!("{:?} forgot {:?} after {:.2}s", self.id, body, now - last_seen);
                    self.forget_candidate(ctx);
                } else {
                    self.state.candidate = Candidate::Tracked {
                        body,
                        last_seen,
                        overlap_count: 0,
                    };
                }
            }
            (None, Candidate::None) => {}
        }
    }

    /// Filters a body for this hand; returns its state when grabbable.
    fn eligible(&self, ctx: &GrabContext, body: BodyId) -> Option<BodyState> {
        let grabbable = ctx.registry.get(body)?;
        let state = ctx.physics.body(body)?;
        if !state.is_dynamic() {
            return None;
        }
        if ctx.owner_bodies.contains(&body) || grabbable.owner == Some(self.id.actor) {
            return None;
        }
        if grabbable.required_strength > self.tuning.strength {
            return None;
        }
        if ctx.carry.classify(grabbable.load(&state)) > self.tuning.max_weight_class {
            return None;
        }
        if !grabbable.allow_shared_hold && ctx.registry.is_held_by_other(body, self.id) {
            return None;
        }
        Some(state)
    }

    fn show_highlight(&mut self, ctx: &mut GrabContext, body: BodyId) {
        ctx.registry
            .highlight(body, self.id, self.tuning.highlight_tint, ctx.now + self.tuning.highlight_lifetime);
        self.state.highlighted = Some(body);
    }

    fn clear_highlight(&mut self, ctx: &mut GrabContext) {
        if let Some(body) = self.state.highlighted.take() {
            ctx.registry.clear_highlight(body, self.id);
        }
    }

    fn forget_candidate(&mut self, ctx: &mut GrabContext) {
        self.clear_highlight(ctx);
        self.state.candidate = Candidate::None;
    }

    fn activate(&mut self, ctx: &mut GrabContext) -> Option<GrabEvent> {
        let body = self.state.candidate.body()?;
        let state = self.eligible(ctx, body)?;
        let palm = self.palm?;
        let (grab_frame, local) = {
            let grabbable = ctx.registry.get(body)?;
            (grabbable.grab_frame(&state), grabbable.local_grab_frame(&state))
        };

        match self.tuning.mode {
            GrabMode::SpringTether => self.latch(ctx, body),
            GrabMode::ReachThenSnap => {
                let dist = palm.position.distance(grab_frame.position);
                if dist <= self.tuning.snap_distance || self.tuning.reach_time <= 0.0 {
                    return self.latch(ctx, body);
                }
                self.anchor.set_override(AnchorTarget::OnBody { body, local });
                self.state.reach = Some(Reach { body, elapsed: 0.0 });
                self.ik_active = true;
                log::debug!("{:?} reaching for {:?} ({:.2} away)", self.id, body, dist);
                None
            }
        }
    }

    /// Latches onto the current candidate right away. No-op while already
    /// latched or when there is no valid candidate.
    pub fn try_latch(&mut self, ctx: &mut GrabContext) -> Option<GrabEvent> {
        let body = self.state.candidate.body()?;
        self.latch(ctx, body)
    }

    fn latch(&mut self, ctx: &mut GrabContext, body: BodyId) -> Option<GrabEvent> {
        if self.state.latch.is_some() {
            return None;
        }
        let state = self.eligible(ctx, body)?;
        let grabbable = ctx.registry.get(body)?.clone();
        let Some(palm) = self.palm else {
            log::warn!("{:?} has no palm frame, cannot latch", self.id);
            return None;
        };
        let local = grabbable.local_grab_frame(&state);
        // A body someone already holds stays where it is; this hand's joint
        // is built around the current offset so both holds start satisfied.
        let shared = !ctx.registry.holders(body).is_empty();
        let anchor_frame = if shared {
            state.pose.compose(&local).relative_to(&palm)
        } else {
            Frame::IDENTITY
        };

        let drive = match self.tuning.mode {
            GrabMode::ReachThenSnap if shared => JointDrive::Rigid,
            GrabMode::ReachThenSnap => {
                let rotation = if self.tuning.snap_rotation && grabbable.handle.is_some() {
                    (palm.rotation * local.rotation.inverse()).normalize()
                } else {
                    state.pose.rotation
                };
                let position = palm.position - rotation * local.position;
                ctx.physics.set_pose(body, Frame::new(position, rotation));
                ctx.physics.set_velocity(body, Vec3::ZERO, Vec3::ZERO);
                JointDrive::Rigid
            }
            GrabMode::SpringTether => JointDrive::Spring {
                linear_slack: self.tuning.linear_slack,
                angular_slack: self.tuning.angular_slack,
                stiffness: self.tuning.stiffness,
                damping: self.tuning.damping,
                angular_stiffness: self.tuning.angular_stiffness,
                angular_damping: self.tuning.angular_damping,
                max_force: self.tuning.max_force,
                max_torque: self.tuning.max_torque,
            },
        };
        let spec = JointSpec {
            object_frame: local,
            anchor_frame,
            drive,
            break_force: self.tuning.break_force,
            break_torque: self.tuning.break_torque,
        };
        let Some(joint) = ctx.physics.create_joint(body, self.anchor.body, &spec) else {
            log::warn!("{:?} could not joint {:?} to its anchor", self.id, body);
            return None;
        };

        if !shared && grabbable.disable_gravity_while_held && state.gravity_enabled {
            ctx.physics.set_gravity_enabled(body, false);
            ctx.registry.mark_gravity_suspended(body);
        }
        let restore_gravity = ctx.registry.is_gravity_suspended(body);

        let mut ignored_with = Vec::new();
        if self.tuning.ignore_owner_collision && grabbable.ignore_owner_collision_while_held {
            for &own in ctx.owner_bodies {
                ctx.physics.set_collision_ignored(body, own, true);
                ignored_with.push(own);
            }
        }

        let load = grabbable.load(&state);
        ctx.carry.apply(ctx.physics, load);

        self.clear_highlight(ctx);
        ctx.registry.add_holder(body, self.id);
        self.state.reach = None;
        self.anchor.clear_override();
        self.ik_active = true;
        self.state.candidate = Candidate::Tracked {
            body,
            last_seen: ctx.now,
            overlap_count: self.state.candidate.overlap_count(),
        };
        self.state.latch = Some(Latch {
            body,
            joint,
            load,
            ignored_with,
            restore_gravity,
        });

        ctx.feedback.on_latch(self.id, body);
        log::info!("{:?} latched {:?} ({:?})", self.id, body, load);
        Some(GrabEvent::Latched { hand: self.id, body, load })
    }

    /// Ends the current hold, whatever the reason, and returns the hand to idle.
    pub fn release(&mut self, ctx: &mut GrabContext, cause: ReleaseCause) -> Option<GrabEvent> {
        let latch = self.state.latch.take()?;

        ctx.physics.remove_joint(latch.joint);
        ctx.registry.remove_holder(latch.body, self.id);

        // Shared holds: the owner's bodies keep ignoring the object while
        // another hand of the same actor holds it, and gravity comes back
        // with the last holder. A vanished entry means every holder is
        // letting go.
        let (same_actor_holds, restore_gravity) = if ctx.registry.contains(latch.body) {
            let holders = ctx.registry.holders(latch.body);
            let same_actor = holders.iter().any(|h| h.actor == self.id.actor);
            let last = holders.is_empty();
            (same_actor, last && ctx.registry.take_gravity_suspended(latch.body))
        } else {
            (false, latch.restore_gravity)
        };
        if !same_actor_holds {
            for own in &latch.ignored_with {
                ctx.physics.set_collision_ignored(latch.body, *own, false);
            }
        }
        if restore_gravity {
            ctx.physics.set_gravity_enabled(latch.body, true);
        }
        ctx.carry.clear(ctx.physics);

        self.abort_reach();
        self.forget_candidate(ctx);

        if cause == ReleaseCause::Broken {
            ctx.feedback.on_break(self.id, latch.body);
        }
        log::info!("{:?} released {:?} ({:?})", self.id, latch.body, cause);
        Some(GrabEvent::Released {
            hand: self.id,
            body: latch.body,
            cause,
        })
    }

    /// Drops everything this hand holds or shows; used when the actor despawns.
    pub fn reset(&mut self, ctx: &mut GrabContext) -> Option<GrabEvent> {
        let event = self.release(ctx, ReleaseCause::Lost);
        self.abort_reach();
        self.forget_candidate(ctx);
        event
    }

    /// Frame the arm should reach for this step, if any.
    pub fn ik_target(&self, physics: &dyn PhysicsBackend, registry: &GrabbableRegistry) -> Option<Frame> {
        if !self.ik_active {
            return None;
        }
        let body = self
            .state
            .latch
            .as_ref()
            .map(|l| l.body)
            .or(self.state.reach.map(|r| r.body))?;
        let state = physics.body(body)?;
        Some(registry.get(body)?.grab_frame(&state))
    }

    /// Late phase: bends the rig's arm toward the grab target. Runs after the
    /// physics step and before the pose is committed.
    pub fn late_update(&self, physics: &dyn PhysicsBackend, registry: &GrabbableRegistry, rig: &mut dyn Rig) {
        let Some(target) = self.ik_target(physics, registry) else {
            return;
        };
        let Some(pose) = rig.limb(self.id.side) else {
            return;
        };
        let end_rotation = self.tuning.snap_rotation.then_some(target.rotation);
        let solution = ik::solve(&pose, target.position, Some(pose.mid), end_rotation, self.tuning.reach_padding);
        rig.apply_limb(self.id.side, &solution);
    }
}
