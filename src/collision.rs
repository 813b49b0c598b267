use std::collections::{HashMap, HashSet};

use glam::{Quat, Vec3};
use rapier3d::na;
use rapier3d::parry::shape::Ball;
use rapier3d::prelude::*;

use crate::physics::{BodyId, BodyKind, BodyState, Frame, JointDrive, JointId, JointSpec, PhysicsBackend};

pub const GRAVITY: f32 = 9.81;

fn body_id(handle: RigidBodyHandle) -> BodyId {
    let (index, generation) = handle.into_raw_parts();
    BodyId(((generation as u64) << 32) | index as u64)
}

fn body_handle(id: BodyId) -> RigidBodyHandle {
    RigidBodyHandle::from_raw_parts(id.0 as u32, (id.0 >> 32) as u32)
}

fn joint_id(handle: ImpulseJointHandle) -> JointId {
    let (index, generation) = handle.into_raw_parts();
    JointId(((generation as u64) << 32) | index as u64)
}

fn joint_handle(id: JointId) -> ImpulseJointHandle {
    ImpulseJointHandle::from_raw_parts(id.0 as u32, (id.0 >> 32) as u32)
}

fn to_vector(v: Vec3) -> Vector<Real> {
    vector![v.x, v.y, v.z]
}

fn to_vec3(v: &Vector<Real>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

fn to_isometry(frame: Frame) -> Isometry<Real> {
    let q = frame.rotation;
    na::Isometry3::from_parts(
        na::Translation3::new(frame.position.x, frame.position.y, frame.position.z),
        na::UnitQuaternion::new_normalize(na::Quaternion::new(q.w, q.x, q.y, q.z)),
    )
}

fn to_frame(iso: &Isometry<Real>) -> Frame {
    let t = iso.translation.vector;
    let q = iso.rotation;
    Frame::new(Vec3::new(t.x, t.y, t.z), Quat::from_xyzw(q.i, q.j, q.k, q.w))
}

fn ordered(a: BodyId, b: BodyId) -> (BodyId, BodyId) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Contact filter: body pairs in here never collide.
#[derive(Default)]
pub struct IgnoredPairs {
    pairs: HashSet<(BodyId, BodyId)>,
}

impl IgnoredPairs {
    pub fn contains(&self, a: BodyId, b: BodyId) -> bool {
        self.pairs.contains(&ordered(a, b))
    }
}

impl PhysicsHooks for IgnoredPairs {
    fn filter_contact_pair(&self, context: &PairFilterContext) -> Option<SolverFlags> {
        let parent = |h: ColliderHandle| context.colliders.get(h).and_then(|c| c.parent()).map(body_id);
        if let (Some(a), Some(b)) = (parent(context.collider1), parent(context.collider2))
            && self.contains(a, b)
        {
            return None;
        }
        Some(SolverFlags::COMPUTE_IMPULSES)
    }
}

struct Breakable {
    force: f32,
    torque: f32,
}

/// Free play of a spring joint, per axis.
struct SpringBand {
    linear: f32,
    angular: f32,
}

/// The rapier world the simulation runs in.
pub struct PhysicsWorld {
    pub gravity: Vector<Real>,
    pub rigid_body_set: RigidBodySet,
    pub collider_set: ColliderSet,
    pub integration_parameters: IntegrationParameters,
    pub physics_pipeline: PhysicsPipeline,
    pub island_manager: IslandManager,
    pub broad_phase: DefaultBroadPhase,
    pub narrow_phase: NarrowPhase,
    pub impulse_joint_set: ImpulseJointSet,
    pub multibody_joint_set: MultibodyJointSet,
    pub ccd_solver: CCDSolver,
    pub query_pipeline: QueryPipeline,
    pub hooks: IgnoredPairs,

    breakable: HashMap<JointId, Breakable>,
    springs: HashMap<JointId, SpringBand>,
    broken: Vec<JointId>,
}

impl PhysicsWorld {
    pub fn new() -> Self {
        Self {
            gravity: vector![0.0, -GRAVITY, 0.0],
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            integration_parameters: IntegrationParameters::default(),
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            hooks: IgnoredPairs::default(),
            breakable: HashMap::new(),
            springs: HashMap::new(),
            broken: Vec::new(),
        }
    }

    fn insert(&mut self, body: RigidBody, colliders: Vec<Collider>) -> BodyId {
        let handle = self.rigid_body_set.insert(body);
        for collider in colliders {
            self.collider_set
                .insert_with_parent(collider, handle, &mut self.rigid_body_set);
        }
        // Keep queries valid before the first step.
        self.query_pipeline.update(&self.collider_set);
        body_id(handle)
    }

    /// Static floor slab whose top face sits at y = 0.
    pub fn spawn_ground(&mut self, half_extent: f32) -> BodyId {
        let body = RigidBodyBuilder::fixed().translation(vector![0.0, -0.5, 0.0]).build();
        let collider = ColliderBuilder::cuboid(half_extent, 0.5, half_extent)
            .friction(0.8)
            .active_hooks(ActiveHooks::FILTER_CONTACT_PAIRS)
            .build();
        self.insert(body, vec![collider])
    }

    /// Upright capsule that never tips over.
    pub fn spawn_actor(&mut self, position: Vec3, radius: f32, half_height: f32, linear_damping: f32) -> BodyId {
        let body = RigidBodyBuilder::dynamic()
            .translation(to_vector(position))
            .lock_rotations()
            .linear_damping(linear_damping)
            .build();
        let collider = ColliderBuilder::capsule_y(half_height, radius)
            .friction(0.0)
            .mass(70.0)
            .active_hooks(ActiveHooks::FILTER_CONTACT_PAIRS)
            .build();
        self.insert(body, vec![collider])
    }

    /// Collider-less kinematic body for a hand to joint held objects to.
    pub fn spawn_anchor(&mut self, position: Vec3) -> BodyId {
        let body = RigidBodyBuilder::kinematic_position_based()
            .translation(to_vector(position))
            .build();
        self.insert(body, Vec::new())
    }

    pub fn spawn_crate(&mut self, position: Vec3, half_extents: Vec3, mass: f32) -> BodyId {
        let body = RigidBodyBuilder::dynamic().translation(to_vector(position)).build();
        let collider = ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
            .mass(mass)
            .friction(0.6)
            .active_hooks(ActiveHooks::FILTER_CONTACT_PAIRS)
            .build();
        self.insert(body, vec![collider])
    }

    /// Body made of several balls given as (local offset, radius); mass is
    /// split evenly between them.
    pub fn spawn_compound(&mut self, position: Vec3, parts: &[(Vec3, f32)], mass: f32) -> BodyId {
        let body = RigidBodyBuilder::dynamic().translation(to_vector(position)).build();
        let part_mass = mass / parts.len().max(1) as f32;
        let colliders = parts
            .iter()
            .map(|(offset, radius)| {
                ColliderBuilder::ball(*radius)
                    .translation(to_vector(*offset))
                    .mass(part_mass)
                    .active_hooks(ActiveHooks::FILTER_CONTACT_PAIRS)
                    .build()
            })
            .collect();
        self.insert(body, colliders)
    }

    /// Removes the body with its colliders and joints.
    pub fn remove_body(&mut self, id: BodyId) {
        self.rigid_body_set.remove(
            body_handle(id),
            &mut self.island_manager,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            true,
        );
        self.hooks.pairs.retain(|(a, b)| *a != id && *b != id);
        self.query_pipeline.update(&self.collider_set);
    }

    pub fn step(&mut self, dt: f32) {
        self.integration_parameters.dt = dt;
        self.relax_springs();
        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &self.hooks,
            &(),
        );
        self.detect_broken_joints(dt);
    }

    /// Rapier has no breakable joints: compare the impulse each joint applied
    /// this step against its thresholds and remove the ones over the limit.
    fn detect_broken_joints(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        let mut over = Vec::new();
        self.breakable.retain(|id, limits| {
            let Some(joint) = self.impulse_joint_set.get(joint_handle(*id)) else {
                return false;
            };
            // Locked axes report through `impulses`, motor-driven ones
            // through their motor.
            let i = &joint.impulses;
            let m = &joint.data.motors;
            let axis = |k: usize| i[k] + m[k].impulse;
            let force = Vec3::new(axis(0), axis(1), axis(2)).length() / dt;
            let torque = Vec3::new(axis(3), axis(4), axis(5)).length() / dt;
            if force > limits.force || torque > limits.torque {
                log::debug!("Joint {:?} broke (force {:.0}, torque {:.0})", id, force, torque);
                over.push(*id);
                return false;
            }
            true
        });
        for id in over {
            self.springs.remove(&id);
            self.impulse_joint_set.remove(joint_handle(id), true);
            self.broken.push(id);
        }
    }

    /// Spring slack: each motor targets the current offset clamped to its
    /// band, so the drive only pulls once the object drifts past the slack.
    /// Offsets are measured the way rapier's motors measure them, in the
    /// object-side joint frame.
    fn relax_springs(&mut self) {
        let bodies = &self.rigid_body_set;
        self.springs.retain(|id, band| {
            let Some(joint) = self.impulse_joint_set.get_mut(joint_handle(*id)) else {
                return false;
            };
            let (Some(rb1), Some(rb2)) = (bodies.get(joint.body1), bodies.get(joint.body2)) else {
                return false;
            };
            let frame1 = rb1.position() * joint.data.local_frame1;
            let frame2 = rb2.position() * joint.data.local_frame2;
            let offset = frame1.rotation.inverse() * (frame2.translation.vector - frame1.translation.vector);
            let twist = (frame1.rotation.inverse() * frame2.rotation).imag();

            let motors = &mut joint.data.motors;
            for k in 0..3 {
                motors[JointAxis::LinX as usize + k].target_pos = offset[k].clamp(-band.linear, band.linear);
                let angle = twist[k].clamp(-1.0, 1.0).asin() * 2.0;
                motors[JointAxis::AngX as usize + k].target_pos = angle.clamp(-band.angular, band.angular);
            }
            true
        });
    }

    fn build_joint(spec: &JointSpec) -> GenericJoint {
        let frame1 = to_isometry(spec.object_frame);
        let frame2 = to_isometry(spec.anchor_frame);
        match spec.drive {
            JointDrive::Rigid => FixedJointBuilder::new()
                .local_frame1(frame1)
                .local_frame2(frame2)
                .build()
                .into(),
            JointDrive::Spring {
                stiffness,
                damping,
                angular_stiffness,
                angular_damping,
                max_force,
                max_torque,
                ..
            } => {
                // Rapier limits are hard stops, so every axis stays free and
                // the motors pull it back; `relax_springs` moves their
                // targets to honor the slack.
                let mut builder = GenericJointBuilder::new(JointAxesMask::empty())
                    .local_frame1(frame1)
                    .local_frame2(frame2)
                    .contacts_enabled(false);
                for axis in [JointAxis::LinX, JointAxis::LinY, JointAxis::LinZ] {
                    builder = builder
                        .motor_position(axis, 0.0, stiffness, damping)
                        .motor_max_force(axis, max_force);
                }
                for axis in [JointAxis::AngX, JointAxis::AngY, JointAxis::AngZ] {
                    builder = builder
                        .motor_position(axis, 0.0, angular_stiffness, angular_damping)
                        .motor_max_force(axis, max_torque);
                }
                builder.build()
            }
        }
    }
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsBackend for PhysicsWorld {
    fn overlap_sphere(&self, center: Vec3, radius: f32) -> Vec<BodyId> {
        let mut hits = Vec::new();
        let shape_pos = Isometry::translation(center.x, center.y, center.z);
        self.query_pipeline.intersections_with_shape(
            &self.rigid_body_set,
            &self.collider_set,
            &shape_pos,
            &Ball::new(radius),
            QueryFilter::default(),
            |handle| {
                if let Some(parent) = self.collider_set.get(handle).and_then(|c| c.parent()) {
                    hits.push(body_id(parent));
                }
                true
            },
        );
        hits
    }

    fn body(&self, id: BodyId) -> Option<BodyState> {
        let rb = self.rigid_body_set.get(body_handle(id))?;
        let kind = if rb.is_dynamic() {
            BodyKind::Dynamic
        } else if rb.is_kinematic() {
            BodyKind::Kinematic
        } else {
            BodyKind::Fixed
        };
        let com = rb.center_of_mass();
        Some(BodyState {
            pose: to_frame(rb.position()),
            center_of_mass: Vec3::new(com.x, com.y, com.z),
            mass: rb.mass(),
            kind,
            linear_damping: rb.linear_damping(),
            angular_damping: rb.angular_damping(),
            linear_velocity: to_vec3(rb.linvel()),
            angular_velocity: to_vec3(rb.angvel()),
            gravity_enabled: rb.gravity_scale() != 0.0,
        })
    }

    fn set_pose(&mut self, id: BodyId, pose: Frame) {
        if let Some(rb) = self.rigid_body_set.get_mut(body_handle(id)) {
            rb.set_position(to_isometry(pose), true);
        }
    }

    fn set_velocity(&mut self, id: BodyId, linear: Vec3, angular: Vec3) {
        if let Some(rb) = self.rigid_body_set.get_mut(body_handle(id)) {
            rb.set_linvel(to_vector(linear), true);
            rb.set_angvel(to_vector(angular), true);
        }
    }

    fn set_damping(&mut self, id: BodyId, linear: f32, angular: f32) {
        if let Some(rb) = self.rigid_body_set.get_mut(body_handle(id)) {
            rb.set_linear_damping(linear);
            rb.set_angular_damping(angular);
        }
    }

    fn set_gravity_enabled(&mut self, id: BodyId, enabled: bool) {
        if let Some(rb) = self.rigid_body_set.get_mut(body_handle(id)) {
            rb.set_gravity_scale(if enabled { 1.0 } else { 0.0 }, true);
        }
    }

    fn apply_impulse(&mut self, id: BodyId, impulse: Vec3) {
        if let Some(rb) = self.rigid_body_set.get_mut(body_handle(id)) {
            rb.apply_impulse(to_vector(impulse), true);
        }
    }

    fn move_kinematic(&mut self, id: BodyId, pose: Frame) {
        if let Some(rb) = self.rigid_body_set.get_mut(body_handle(id)) {
            rb.set_next_kinematic_position(to_isometry(pose));
        }
    }

    fn create_joint(&mut self, object: BodyId, anchor: BodyId, spec: &JointSpec) -> Option<JointId> {
        let (h1, h2) = (body_handle(object), body_handle(anchor));
        if !self.rigid_body_set.contains(h1) || !self.rigid_body_set.contains(h2) {
            return None;
        }
        let handle = self.impulse_joint_set.insert(h1, h2, Self::build_joint(spec), true);
        let id = joint_id(handle);
        if let JointDrive::Spring {
            linear_slack,
            angular_slack,
            ..
        } = spec.drive
        {
            self.springs.insert(
                id,
                SpringBand {
                    linear: linear_slack.max(0.0),
                    angular: angular_slack.max(0.0),
                },
            );
        }
        if spec.break_force.is_finite() || spec.break_torque.is_finite() {
            self.breakable.insert(
                id,
                Breakable {
                    force: spec.break_force,
                    torque: spec.break_torque,
                },
            );
        }
        Some(id)
    }

    fn remove_joint(&mut self, id: JointId) {
        self.breakable.remove(&id);
        self.springs.remove(&id);
        self.impulse_joint_set.remove(joint_handle(id), true);
    }

    fn joint_exists(&self, id: JointId) -> bool {
        self.impulse_joint_set.contains(joint_handle(id))
    }

    fn set_collision_ignored(&mut self, a: BodyId, b: BodyId, ignored: bool) {
        if ignored {
            self.hooks.pairs.insert(ordered(a, b));
        } else {
            self.hooks.pairs.remove(&ordered(a, b));
        }
    }

    fn drain_broken_joints(&mut self) -> Vec<JointId> {
        std::mem::take(&mut self.broken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    fn rigid(break_force: f32) -> JointSpec {
        JointSpec {
            object_frame: Frame::IDENTITY,
            anchor_frame: Frame::IDENTITY,
            drive: JointDrive::Rigid,
            break_force,
            break_torque: f32::INFINITY,
        }
    }

    #[test]
    fn ids_survive_the_round_trip() {
        let mut world = PhysicsWorld::new();
        let a = world.spawn_anchor(Vec3::ZERO);
        let b = world.spawn_crate(Vec3::Y, Vec3::splat(0.25), 2.0);
        assert_ne!(a, b);
        assert!(world.body(a).is_some());
        assert_eq!(world.body(b).unwrap().kind, BodyKind::Dynamic);
        assert!((world.body(b).unwrap().mass - 2.0).abs() < 1e-4);
    }

    #[test]
    fn overlap_reports_every_volume() {
        let mut world = PhysicsWorld::new();
        let body = world.spawn_compound(Vec3::new(0.0, 2.0, 0.0), &[(Vec3::ZERO, 0.2), (Vec3::X * 0.5, 0.2)], 3.0);
        let hits = world.overlap_sphere(Vec3::new(0.25, 2.0, 0.0), 0.5);
        assert_eq!(hits, vec![body, body]);
        assert!(world.overlap_sphere(Vec3::new(5.0, 2.0, 0.0), 0.5).is_empty());
    }

    #[test]
    fn weak_joint_breaks_under_load() {
        let mut world = PhysicsWorld::new();
        let anchor = world.spawn_anchor(Vec3::new(0.0, 2.0, 0.0));
        let weak = world.spawn_crate(Vec3::new(0.0, 2.0, 0.0), Vec3::splat(0.2), 5.0);
        let strong = world.spawn_crate(Vec3::new(3.0, 2.0, 0.0), Vec3::splat(0.2), 5.0);
        let anchor2 = world.spawn_anchor(Vec3::new(3.0, 2.0, 0.0));

        let weak_joint = world.create_joint(weak, anchor, &rigid(1.0)).unwrap();
        let strong_joint = world.create_joint(strong, anchor2, &rigid(f32::INFINITY)).unwrap();

        for _ in 0..5 {
            world.step(DT);
        }
        assert_eq!(world.drain_broken_joints(), vec![weak_joint]);
        assert!(!world.joint_exists(weak_joint));
        assert!(world.joint_exists(strong_joint));
        assert!(world.drain_broken_joints().is_empty());
    }

    fn spring(slack: f32, break_force: f32) -> JointSpec {
        JointSpec {
            drive: JointDrive::Spring {
                linear_slack: slack,
                angular_slack: 0.1,
                stiffness: 800.0,
                damping: 60.0,
                angular_stiffness: 200.0,
                angular_damping: 20.0,
                max_force: 1500.0,
                max_torque: 400.0,
            },
            ..rigid(break_force)
        }
    }

    #[test]
    fn weak_spring_breaks_under_load() {
        let mut world = PhysicsWorld::new();
        let anchor = world.spawn_anchor(Vec3::new(0.0, 2.0, 0.0));
        let weak = world.spawn_crate(Vec3::new(0.0, 2.0, 0.0), Vec3::splat(0.2), 5.0);
        let anchor2 = world.spawn_anchor(Vec3::new(3.0, 2.0, 0.0));
        let strong = world.spawn_crate(Vec3::new(3.0, 2.0, 0.0), Vec3::splat(0.2), 5.0);

        let weak_joint = world.create_joint(weak, anchor, &spring(0.0, 1.0)).unwrap();
        let strong_joint = world.create_joint(strong, anchor2, &spring(0.0, f32::INFINITY)).unwrap();

        let mut broken = Vec::new();
        for _ in 0..60 {
            world.step(DT);
            broken.extend(world.drain_broken_joints());
        }
        assert_eq!(broken, vec![weak_joint]);
        assert!(!world.joint_exists(weak_joint));
        assert!(world.joint_exists(strong_joint));
        // The unbreakable spring still carries its crate.
        assert!(world.body(strong).unwrap().pose.position.y > 1.5);
    }

    fn settle_on_spring(start_offset: f32, slack: f32) -> f32 {
        let mut world = PhysicsWorld::new();
        let anchor = world.spawn_anchor(Vec3::new(0.0, 2.0, 0.0));
        let body = world.spawn_crate(Vec3::new(start_offset, 2.0, 0.0), Vec3::splat(0.2), 1.0);
        world.set_gravity_enabled(body, false);
        world.create_joint(body, anchor, &spring(slack, f32::INFINITY)).unwrap();
        for _ in 0..90 {
            world.step(DT);
        }
        world.body(body).unwrap().pose.position.x
    }

    #[test]
    fn spring_leaves_objects_inside_the_slack_alone() {
        assert!((settle_on_spring(0.05, 0.1) - 0.05).abs() < 1e-3);
        assert!(settle_on_spring(0.05, 0.0).abs() < 0.01);
    }

    #[test]
    fn spring_pulls_back_to_the_edge_of_the_slack() {
        let x = settle_on_spring(0.3, 0.1);
        assert!((x - 0.1).abs() < 0.02, "settled at {}", x);
    }

    #[test]
    fn ignored_pair_passes_through() {
        let mut world = PhysicsWorld::new();
        let ground = world.spawn_ground(5.0);
        let ball = world.spawn_crate(Vec3::new(0.0, 0.3, 0.0), Vec3::splat(0.25), 1.0);
        world.set_collision_ignored(ball, ground, true);
        for _ in 0..60 {
            world.step(DT);
        }
        assert!(world.body(ball).unwrap().pose.position.y < -1.0);

        let other = world.spawn_crate(Vec3::new(2.0, 0.3, 0.0), Vec3::splat(0.25), 1.0);
        for _ in 0..60 {
            world.step(DT);
        }
        assert!(world.body(other).unwrap().pose.position.y > 0.0);
    }

    #[test]
    fn gravity_toggle_and_kinematic_moves() {
        let mut world = PhysicsWorld::new();
        let floating = world.spawn_crate(Vec3::new(0.0, 5.0, 0.0), Vec3::splat(0.25), 1.0);
        world.set_gravity_enabled(floating, false);
        assert!(!world.body(floating).unwrap().gravity_enabled);

        let anchor = world.spawn_anchor(Vec3::ZERO);
        world.move_kinematic(anchor, Frame::from_position(Vec3::new(1.0, 2.0, 3.0)));
        for _ in 0..10 {
            world.step(DT);
        }
        assert!((world.body(floating).unwrap().pose.position.y - 5.0).abs() < 1e-4);
        assert!(world.body(anchor).unwrap().pose.position.distance(Vec3::new(1.0, 2.0, 3.0)) < 1e-4);
    }
}
