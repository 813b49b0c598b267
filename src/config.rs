use serde::Deserialize;

use crate::grabbable::WeightClass;

// Search
pub const GRAB_RADIUS: f32 = 0.9;
pub const TARGET_KEEP_TIME: f32 = 0.25; // sticky memory after overlap ends
pub const HIGHLIGHT_LIFETIME: f32 = 0.5;
pub const HAND_STRENGTH: f32 = 1.0;
pub const HIGHLIGHT_TINT: [f32; 4] = [0.0, 1.0, 1.0, 1.0];

// Reach then snap
pub const REACH_TIME: f32 = 0.12;
pub const SNAP_DISTANCE: f32 = 0.6; // closer than this latches without reaching
pub const IK_REACH_PADDING: f32 = 0.001;

// Spring tether
pub const TETHER_LINEAR_SLACK: f32 = 0.02;
pub const TETHER_ANGULAR_SLACK: f32 = 0.1; // radians
pub const TETHER_STIFFNESS: f32 = 800.0;
pub const TETHER_DAMPING: f32 = 60.0;
pub const TETHER_ANGULAR_STIFFNESS: f32 = 200.0;
pub const TETHER_ANGULAR_DAMPING: f32 = 20.0;
pub const TETHER_MAX_FORCE: f32 = 1500.0;
pub const TETHER_MAX_TORQUE: f32 = 400.0;

// Structural limits
pub const BREAK_FORCE: f32 = 4000.0;
pub const BREAK_TORQUE: f32 = 2000.0;

// Carry cost (masses in kg)
pub const LIGHT_MAX_MASS: f32 = 5.0;
pub const MEDIUM_MAX_MASS: f32 = 20.0;
pub const HEAVY_MAX_MASS: f32 = 80.0;
pub const LIGHT_SPEED: f32 = 0.95;
pub const MEDIUM_SPEED: f32 = 0.65;
pub const HEAVY_SPEED: f32 = 0.35;
pub const MEDIUM_DAMPING_ADD: f32 = 1.0;
pub const HEAVY_DAMPING_ADD: f32 = 3.0;
pub const SUPER_HEAVY_DAMPING_ADD: f32 = 6.0;

// Two-actor carry
pub const ASSIST_EXTRA_LINEAR_DAMPING: f32 = 6.0;
pub const ASSIST_EXTRA_ANGULAR_DAMPING: f32 = 6.0;
pub const ASSIST_FORWARD_FORCE: f32 = 40.0;
pub const ASSIST_MAX_PLANAR_SPEED: f32 = 2.5;

// Locomotion
pub const MAX_SPEED: f32 = 10.0;
pub const ACCELERATION: f32 = 30.0;
pub const DECELERATION: f32 = 10.0;
pub const TURN_ASSIST_MULTIPLIER: f32 = 1.8;
pub const INPUT_DEADZONE: f32 = 0.2;

// Actor body
pub const ACTOR_RADIUS: f32 = 0.35;
pub const ACTOR_HALF_HEIGHT: f32 = 0.5;
pub const ACTOR_LINEAR_DAMPING: f32 = 0.5;

// Input
pub const ACTIVATE_THRESHOLD: f32 = 0.05;

/// How the object reaches the hand once activation is accepted.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
pub enum GrabMode {
    /// Arm reaches for `reach_time`, object snaps into the palm, rigid lock.
    ReachThenSnap,
    /// No snap: a soft joint pulls the object in over a few steps.
    SpringTether,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
pub enum ReleaseMode {
    /// Hold to carry, let go to drop.
    OnRelease,
    /// Press once to grab, press again to drop.
    Toggle,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct HandTuning {
    pub grab_radius: f32,
    pub target_keep_time: f32,
    pub highlight_lifetime: f32,
    pub highlight_tint: [f32; 4],
    pub strength: f32,
    /// Heaviest class this hand may pick up.
    pub max_weight_class: WeightClass,
    pub mode: GrabMode,
    pub release_mode: ReleaseMode,
    pub reach_time: f32,
    pub snap_distance: f32,
    pub snap_rotation: bool,
    pub ignore_owner_collision: bool,
    pub reach_padding: f32,
    pub linear_slack: f32,
    pub angular_slack: f32,
    pub stiffness: f32,
    pub damping: f32,
    pub angular_stiffness: f32,
    pub angular_damping: f32,
    pub max_force: f32,
    pub max_torque: f32,
    pub break_force: f32,
    pub break_torque: f32,
}

impl Default for HandTuning {
    fn default() -> Self {
        Self {
            grab_radius: GRAB_RADIUS,
            target_keep_time: TARGET_KEEP_TIME,
            highlight_lifetime: HIGHLIGHT_LIFETIME,
            highlight_tint: HIGHLIGHT_TINT,
            strength: HAND_STRENGTH,
            max_weight_class: WeightClass::SuperHeavy,
            mode: GrabMode::ReachThenSnap,
            release_mode: ReleaseMode::OnRelease,
            reach_time: REACH_TIME,
            snap_distance: SNAP_DISTANCE,
            snap_rotation: true,
            ignore_owner_collision: true,
            reach_padding: IK_REACH_PADDING,
            linear_slack: TETHER_LINEAR_SLACK,
            angular_slack: TETHER_ANGULAR_SLACK,
            stiffness: TETHER_STIFFNESS,
            damping: TETHER_DAMPING,
            angular_stiffness: TETHER_ANGULAR_STIFFNESS,
            angular_damping: TETHER_ANGULAR_DAMPING,
            max_force: TETHER_MAX_FORCE,
            max_torque: TETHER_MAX_TORQUE,
            break_force: BREAK_FORCE,
            break_torque: BREAK_TORQUE,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct CarryTuning {
    pub light_max: f32,
    pub medium_max: f32,
    pub heavy_max: f32,
    pub light_speed: f32,
    pub medium_speed: f32,
    pub heavy_speed: f32,
    pub medium_damping_add: f32,
    pub heavy_damping_add: f32,
    pub super_heavy_damping_add: f32,
}

impl Default for CarryTuning {
    fn default() -> Self {
        Self {
            light_max: LIGHT_MAX_MASS,
            medium_max: MEDIUM_MAX_MASS,
            heavy_max: HEAVY_MAX_MASS,
            light_speed: LIGHT_SPEED,
            medium_speed: MEDIUM_SPEED,
            heavy_speed: HEAVY_SPEED,
            medium_damping_add: MEDIUM_DAMPING_ADD,
            heavy_damping_add: HEAVY_DAMPING_ADD,
            super_heavy_damping_add: SUPER_HEAVY_DAMPING_ADD,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct AssistTuning {
    pub extra_linear_damping: f32,
    pub extra_angular_damping: f32,
    /// Zero disables the forward push.
    pub forward_force: f32,
    pub max_planar_speed: f32,
}

impl Default for AssistTuning {
    fn default() -> Self {
        Self {
            extra_linear_damping: ASSIST_EXTRA_LINEAR_DAMPING,
            extra_angular_damping: ASSIST_EXTRA_ANGULAR_DAMPING,
            forward_force: ASSIST_FORWARD_FORCE,
            max_planar_speed: ASSIST_MAX_PLANAR_SPEED,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct MoverTuning {
    pub max_speed: f32,
    pub acceleration: f32,
    pub deceleration: f32,
    pub turn_assist_multiplier: f32,
    pub input_deadzone: f32,
}

impl Default for MoverTuning {
    fn default() -> Self {
        Self {
            max_speed: MAX_SPEED,
            acceleration: ACCELERATION,
            deceleration: DECELERATION,
            turn_assist_multiplier: TURN_ASSIST_MULTIPLIER,
            input_deadzone: INPUT_DEADZONE,
        }
    }
}

/// Everything tunable, loadable from a (partial) JSON file.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(default)]
pub struct GrabTuning {
    pub hand: HandTuning,
    pub carry: CarryTuning,
    pub assist: AssistTuning,
    pub mover: MoverTuning,
}

impl GrabTuning {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
