//! Interface to the rigid-body engine.
//!
//! The grab code never talks to rapier directly; it goes through
//! [`PhysicsBackend`] so the same state machine runs against the real world
//! ([`crate::collision::PhysicsWorld`]) or a deterministic fake in tests.

use glam::{Quat, Vec3};

/// Opaque rigid body reference.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct BodyId(pub u64);

/// Opaque joint reference.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct JointId(pub u64);

/// Position + orientation.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Frame {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Frame {
    pub const IDENTITY: Frame = Frame {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self::new(position, Quat::IDENTITY)
    }

    /// Local point -> world point.
    pub fn transform_point(&self, local: Vec3) -> Vec3 {
        self.position + self.rotation * local
    }

    /// World point -> local point.
    pub fn inverse_transform_point(&self, world: Vec3) -> Vec3 {
        self.rotation.inverse() * (world - self.position)
    }

    /// Compose a child frame expressed in this frame's local space.
    pub fn compose(&self, local: &Frame) -> Frame {
        Frame::new(
            self.transform_point(local.position),
            (self.rotation * local.rotation).normalize(),
        )
    }

    /// This frame expressed in `parent`'s local space; the inverse of
    /// `parent.compose(..)`.
    pub fn relative_to(&self, parent: &Frame) -> Frame {
        Frame::new(
            parent.inverse_transform_point(self.position),
            (parent.rotation.inverse() * self.rotation).normalize(),
        )
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::Z
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BodyKind {
    Dynamic,
    Kinematic,
    Fixed,
}

/// Snapshot of a body as seen by the grab code.
#[derive(Clone, Copy, Debug)]
pub struct BodyState {
    pub pose: Frame,
    /// World-space center of mass.
    pub center_of_mass: Vec3,
    pub mass: f32,
    pub kind: BodyKind,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub gravity_enabled: bool,
}

impl BodyState {
    pub fn is_dynamic(&self) -> bool {
        self.kind == BodyKind::Dynamic
    }
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum JointDrive {
    /// Full 6-DOF lock.
    Rigid,
    /// Position/orientation drive with a little free play and clamped output.
    Spring {
        linear_slack: f32,
        angular_slack: f32,
        stiffness: f32,
        damping: f32,
        angular_stiffness: f32,
        angular_damping: f32,
        max_force: f32,
        max_torque: f32,
    },
}

/// Coupling between a held object and a hand anchor.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct JointSpec {
    /// Attachment frame in the object's local space.
    pub object_frame: Frame,
    /// Attachment frame in the anchor's local space.
    pub anchor_frame: Frame,
    pub drive: JointDrive,
    /// `f32::INFINITY` never breaks.
    pub break_force: f32,
    pub break_torque: f32,
}

/// Everything the grab subsystem needs from the rigid-body engine.
pub trait PhysicsBackend {
    /// One entry per collision volume overlapping the sphere, so a body with
    /// several overlapping sub-volumes shows up several times.
    fn overlap_sphere(&self, center: Vec3, radius: f32) -> Vec<BodyId>;

    fn body(&self, id: BodyId) -> Option<BodyState>;

    fn set_pose(&mut self, id: BodyId, pose: Frame);

    fn set_velocity(&mut self, id: BodyId, linear: Vec3, angular: Vec3);

    fn set_damping(&mut self, id: BodyId, linear: f32, angular: f32);

    fn set_gravity_enabled(&mut self, id: BodyId, enabled: bool);

    fn apply_impulse(&mut self, id: BodyId, impulse: Vec3);

    /// Kinematic bodies only: pose to reach at the end of the next step.
    fn move_kinematic(&mut self, id: BodyId, pose: Frame);

    fn create_joint(&mut self, object: BodyId, anchor: BodyId, spec: &JointSpec) -> Option<JointId>;

    /// Removing a joint that no longer exists is a no-op.
    fn remove_joint(&mut self, id: JointId);

    fn joint_exists(&self, id: JointId) -> bool;

    fn set_collision_ignored(&mut self, a: BodyId, b: BodyId, ignored: bool);

    /// Joints that exceeded their break thresholds since the last call. They
    /// are already gone from the world when reported.
    fn drain_broken_joints(&mut self) -> Vec<JointId>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Deterministic stand-in for the physics engine.

    use super::*;
    use std::collections::{BTreeMap, HashSet};

    pub struct FakeBody {
        pub state: BodyState,
        /// Sphere volumes as (local center, radius).
        pub volumes: Vec<(Vec3, f32)>,
        pub impulses: Vec<Vec3>,
        pub kinematic_target: Option<Frame>,
    }

    #[derive(Default)]
    pub struct FakePhysics {
        pub bodies: BTreeMap<BodyId, FakeBody>,
        pub joints: BTreeMap<JointId, (BodyId, BodyId, JointSpec)>,
        pub ignored: HashSet<(BodyId, BodyId)>,
        broken: Vec<JointId>,
        next_id: u64,
    }

    fn pair(a: BodyId, b: BodyId) -> (BodyId, BodyId) {
        if a <= b { (a, b) } else { (b, a) }
    }

    impl FakePhysics {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_body(&mut self, position: Vec3, mass: f32, kind: BodyKind, volumes: Vec<(Vec3, f32)>) -> BodyId {
            self.next_id += 1;
            let id = BodyId(self.next_id);
            let state = BodyState {
                pose: Frame::from_position(position),
                center_of_mass: position,
                mass,
                kind,
                linear_damping: 0.0,
                angular_damping: 0.05,
                linear_velocity: Vec3::ZERO,
                angular_velocity: Vec3::ZERO,
                gravity_enabled: kind == BodyKind::Dynamic,
            };
            self.bodies.insert(
                id,
                FakeBody {
                    state,
                    volumes,
                    impulses: Vec::new(),
                    kinematic_target: None,
                },
            );
            id
        }

        pub fn add_ball(&mut self, position: Vec3, radius: f32, mass: f32) -> BodyId {
            self.add_body(position, mass, BodyKind::Dynamic, vec![(Vec3::ZERO, radius)])
        }

        pub fn add_kinematic(&mut self, position: Vec3) -> BodyId {
            self.add_body(position, 1.0, BodyKind::Kinematic, vec![(Vec3::ZERO, 0.05)])
        }

        pub fn move_body(&mut self, id: BodyId, position: Vec3) {
            if let Some(b) = self.bodies.get_mut(&id) {
                b.state.pose.position = position;
                b.state.center_of_mass = position;
            }
        }

        pub fn remove_body(&mut self, id: BodyId) {
            self.bodies.remove(&id);
            self.joints.retain(|_, (a, b, _)| *a != id && *b != id);
        }

        /// Simulates the engine tripping a joint's break threshold.
        pub fn break_joint(&mut self, id: JointId) {
            if self.joints.remove(&id).is_some() {
                self.broken.push(id);
            }
        }

        pub fn is_ignored(&self, a: BodyId, b: BodyId) -> bool {
            self.ignored.contains(&pair(a, b))
        }

        pub fn damping(&self, id: BodyId) -> (f32, f32) {
            let s = &self.bodies[&id].state;
            (s.linear_damping, s.angular_damping)
        }
    }

    impl PhysicsBackend for FakePhysics {
        fn overlap_sphere(&self, center: Vec3, radius: f32) -> Vec<BodyId> {
            let mut hits = Vec::new();
            for (id, body) in &self.bodies {
                for (local, r) in &body.volumes {
                    let c = body.state.pose.transform_point(*local);
                    if c.distance(center) <= r + radius {
                        hits.push(*id);
                    }
                }
            }
            hits
        }

        fn body(&self, id: BodyId) -> Option<BodyState> {
            self.bodies.get(&id).map(|b| b.state)
        }

        fn set_pose(&mut self, id: BodyId, pose: Frame) {
            if let Some(b) = self.bodies.get_mut(&id) {
                let com_local = b.state.pose.inverse_transform_point(b.state.center_of_mass);
                b.state.pose = pose;
                b.state.center_of_mass = pose.transform_point(com_local);
            }
        }

        fn set_velocity(&mut self, id: BodyId, linear: Vec3, angular: Vec3) {
            if let Some(b) = self.bodies.get_mut(&id) {
                b.state.linear_velocity = linear;
                b.state.angular_velocity = angular;
            }
        }

        fn set_damping(&mut self, id: BodyId, linear: f32, angular: f32) {
            if let Some(b) = self.bodies.get_mut(&id) {
                b.state.linear_damping = linear;
                b.state.angular_damping = angular;
            }
        }

        fn set_gravity_enabled(&mut self, id: BodyId, enabled: bool) {
            if let Some(b) = self.bodies.get_mut(&id) {
                b.state.gravity_enabled = enabled;
            }
        }

        fn apply_impulse(&mut self, id: BodyId, impulse: Vec3) {
            if let Some(b) = self.bodies.get_mut(&id) {
                b.impulses.push(impulse);
            }
        }

        fn move_kinematic(&mut self, id: BodyId, pose: Frame) {
            if let Some(b) = self.bodies.get_mut(&id) {
                b.kinematic_target = Some(pose);
                b.state.pose = pose;
                b.state.center_of_mass = pose.position;
            }
        }

        fn create_joint(&mut self, object: BodyId, anchor: BodyId, spec: &JointSpec) -> Option<JointId> {
            if !self.bodies.contains_key(&object) || !self.bodies.contains_key(&anchor) {
                return None;
            }
            self.next_id += 1;
            let id = JointId(self.next_id);
            self.joints.insert(id, (object, anchor, *spec));
            Some(id)
        }

        fn remove_joint(&mut self, id: JointId) {
            self.joints.remove(&id);
        }

        fn joint_exists(&self, id: JointId) -> bool {
            self.joints.contains_key(&id)
        }

        fn set_collision_ignored(&mut self, a: BodyId, b: BodyId, ignored: bool) {
            if ignored {
                self.ignored.insert(pair(a, b));
            } else {
                self.ignored.remove(&pair(a, b));
            }
        }

        fn drain_broken_joints(&mut self) -> Vec<JointId> {
            std::mem::take(&mut self.broken)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_frame_composes_back() {
        let parent = Frame::new(Vec3::new(1.0, 2.0, 0.0), Quat::from_rotation_y(0.7));
        let child = Frame::new(Vec3::new(-0.5, 2.5, 1.0), Quat::from_rotation_x(0.3));
        let back = parent.compose(&child.relative_to(&parent));
        assert!(back.position.distance(child.position) < 1e-5);
        assert!(back.rotation.angle_between(child.rotation) < 1e-3);
    }
}
