use crate::physics::{BodyId, Frame, PhysicsBackend};

/// Where an anchor override points.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AnchorTarget {
    /// A fixed world frame.
    World(Frame),
    /// A frame in some body's local space (e.g. a grab handle); follows the body.
    OnBody { body: BodyId, local: Frame },
}

impl AnchorTarget {
    fn resolve(&self, physics: &dyn PhysicsBackend) -> Option<Frame> {
        match *self {
            AnchorTarget::World(frame) => Some(frame),
            AnchorTarget::OnBody { body, local } => physics.body(body).map(|s| s.pose.compose(&local)),
        }
    }
}

/// Kinematic body the held object is jointed to. Follows a point on the
/// actor's rig unless told to track something else.
pub struct HandAnchor {
    pub body: BodyId,
    override_target: Option<AnchorTarget>,
    last_pose: Option<Frame>,
}

impl HandAnchor {
    pub fn new(body: BodyId) -> Self {
        Self {
            body,
            override_target: None,
            last_pose: None,
        }
    }

    pub fn set_override(&mut self, target: AnchorTarget) {
        self.override_target = Some(target);
    }

    pub fn clear_override(&mut self) {
        self.override_target = None;
    }

    pub fn override_target(&self) -> Option<AnchorTarget> {
        self.override_target
    }

    /// Last pose the anchor was driven to.
    pub fn pose(&self) -> Option<Frame> {
        self.last_pose
    }

    /// Once per physics step. `follow` is the rig frame, `None` when the rig
    /// point is unavailable this step. With nothing to track the anchor keeps
    /// its previous pose instead of snapping to the origin.
    pub fn update(&mut self, physics: &mut dyn PhysicsBackend, follow: Option<Frame>) {
        let target = self
            .override_target
            .and_then(|t| t.resolve(&*physics))
            .or(follow);

        let Some(pose) = target.or(self.last_pose) else {
            return;
        };
        physics.move_kinematic(self.body, pose);
        self.last_pose = Some(pose);
    }
}
