//! Analytic two-bone IK for arms.

use glam::{Mat3, Quat, Vec3};

use crate::grab::HandSide;

/// Segments shorter than this are treated as this long.
pub const MIN_SEGMENT: f32 = 1e-4;

const PARALLEL_EPSILON: f32 = 1e-6;

/// World positions of the three limb joints (shoulder, elbow, wrist).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LimbPose {
    pub root: Vec3,
    pub mid: Vec3,
    pub end: Vec3,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LimbSolution {
    /// World rotation of the upper segment; its local +Z points at the mid joint.
    pub root_rotation: Quat,
    /// World rotation of the lower segment; its local +Z points at the end joint.
    pub mid_rotation: Quat,
    /// Copied verbatim from the request when one was given.
    pub end_rotation: Option<Quat>,
    pub mid_position: Vec3,
    pub end_position: Vec3,
}

/// Rig/animation side of the limb: hands out joint positions and accepts the
/// solved rotations before the pose is committed.
pub trait Rig {
    fn limb(&self, side: HandSide) -> Option<LimbPose>;
    fn apply_limb(&mut self, side: HandSide, solution: &LimbSolution);
}

/// Rotation whose +Z looks along `forward` with +Y as close to `up` as possible.
pub fn look_rotation(forward: Vec3, up: Vec3) -> Quat {
    let Some(f) = forward.try_normalize() else {
        return Quat::IDENTITY;
    };
    let mut right = up.cross(f);
    if right.length_squared() < PARALLEL_EPSILON {
        let fallback = if f.y.abs() < 0.99 { Vec3::Y } else { Vec3::X };
        right = fallback.cross(f);
    }
    let right = right.normalize();
    let up = f.cross(right);
    Quat::from_mat3(&Mat3::from_cols(right, up, f)).normalize()
}

/// Places the limb end on `target`, or as close as the limb allows.
///
/// Segment lengths are measured from `pose` on every call, so the solver
/// follows rig scale changes. The target distance is clamped into
/// `[|L1-L2| + padding, L1+L2 - padding]`; out of range targets are reached
/// at the clamped distance along the root->target direction. `hint` picks the
/// side the mid joint bends toward (world up when missing or parallel to the
/// target direction).
pub fn solve(
    pose: &LimbPose,
    target: Vec3,
    hint: Option<Vec3>,
    end_rotation: Option<Quat>,
    reach_padding: f32,
) -> LimbSolution {
    let upper = pose.root.distance(pose.mid).max(MIN_SEGMENT);
    let lower = pose.mid.distance(pose.end).max(MIN_SEGMENT);

    let to_target = target - pose.root;
    let max_reach = (upper + lower - reach_padding).max(MIN_SEGMENT);
    let min_reach = ((upper - lower).abs() + reach_padding).max(MIN_SEGMENT).min(max_reach);
    let dist = to_target.length().clamp(min_reach, max_reach);

    let dir = if to_target.length_squared() > PARALLEL_EPSILON {
        to_target.normalize()
    } else {
        (pose.mid - pose.root).try_normalize().unwrap_or(Vec3::Z)
    };

    let bend_normal = bend_normal(dir, hint.map(|h| h - pose.root));
    let bend_dir = bend_normal.cross(dir).normalize();

    let cos_root = ((upper * upper + dist * dist - lower * lower) / (2.0 * upper * dist)).clamp(-1.0, 1.0);
    let angle = cos_root.acos();
    let mid_position = pose.root + dir * (angle.cos() * upper) + bend_dir * (angle.sin() * upper);
    let reach_point = pose.root + dir * dist;

    let root_rotation = look_rotation(mid_position - pose.root, bend_normal);
    let mid_rotation = look_rotation(reach_point - mid_position, bend_normal);
    let end_position = mid_position + mid_rotation * Vec3::Z * lower;

    LimbSolution {
        root_rotation,
        mid_rotation,
        end_rotation,
        mid_position,
        end_position,
    }
}

fn bend_normal(dir: Vec3, to_hint: Option<Vec3>) -> Vec3 {
    if let Some(to_hint) = to_hint {
        let n = dir.cross(to_hint);
        if n.length_squared() >= PARALLEL_EPSILON {
            return n.normalize();
        }
    }
    // World up, unless the target sits straight above or below.
    if Vec3::Y.cross(dir).length_squared() >= PARALLEL_EPSILON {
        Vec3::Y
    } else {
        Vec3::X
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arm() -> LimbPose {
        LimbPose {
            root: Vec3::new(0.0, 1.5, 0.0),
            mid: Vec3::new(0.0, 1.5, 1.0),
            end: Vec3::new(0.0, 1.5, 1.8),
        }
    }

    fn directions() -> Vec<Vec3> {
        vec![
            Vec3::X,
            Vec3::NEG_Z,
            Vec3::new(1.0, 1.0, 0.0).normalize(),
            Vec3::new(-0.3, -0.8, 0.5).normalize(),
            Vec3::new(0.2, 0.1, -0.9).normalize(),
        ]
    }

    #[test]
    fn reachable_targets_are_hit() {
        let pose = arm();
        for dir in directions() {
            for dist in [0.3, 0.6, 0.9, 1.2, 1.5, 1.75] {
                let target = pose.root + dir * dist;
                let s = solve(&pose, target, Some(pose.root + Vec3::new(0.0, -1.0, 0.3)), None, 0.0);
                assert!(
                    s.end_position.distance(target) < 1e-4,
                    "dir {dir:?} dist {dist}: ended at {:?}",
                    s.end_position
                );
                assert!((s.mid_position.distance(pose.root) - 1.0).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn far_targets_clamp_to_full_reach() {
        let pose = arm();
        for dir in directions() {
            let s = solve(&pose, pose.root + dir * 5.0, None, None, 0.0);
            let expected = pose.root + dir * 1.8;
            assert!(s.end_position.distance(expected) < 1e-3, "{:?} vs {:?}", s.end_position, expected);
        }
    }

    #[test]
    fn near_targets_clamp_to_min_reach() {
        let pose = arm();
        let dir = Vec3::new(0.0, 0.6, 0.8);
        let s = solve(&pose, pose.root + dir * 0.05, None, None, 0.0);
        let expected = pose.root + dir * 0.2;
        assert!(s.end_position.distance(expected) < 1e-3);
    }

    #[test]
    fn padding_keeps_arm_off_full_extension() {
        let pose = arm();
        let s = solve(&pose, pose.root + Vec3::X * 10.0, None, None, 0.01);
        let reach = s.end_position.distance(pose.root);
        assert!((reach - 1.79).abs() < 1e-3);
    }

    #[test]
    fn segments_point_at_their_child_joint() {
        let pose = arm();
        let target = pose.root + Vec3::new(0.8, -0.4, 0.6);
        let s = solve(&pose, target, Some(pose.root + Vec3::NEG_Y), None, 0.0);
        let upper_dir = (s.mid_position - pose.root).normalize();
        let lower_dir = (s.end_position - s.mid_position).normalize();
        assert!((s.root_rotation * Vec3::Z).distance(upper_dir) < 1e-4);
        assert!((s.mid_rotation * Vec3::Z).distance(lower_dir) < 1e-4);
    }

    #[test]
    fn hint_picks_bend_side() {
        let pose = arm();
        let target = pose.root + Vec3::new(1.2, 0.0, 0.0);
        let down = solve(&pose, target, Some(pose.root + Vec3::new(0.5, -1.0, 0.0)), None, 0.0);
        let up = solve(&pose, target, Some(pose.root + Vec3::new(0.5, 1.0, 0.0)), None, 0.0);
        assert!(down.mid_position.y < pose.root.y);
        assert!(up.mid_position.y > pose.root.y);
    }

    #[test]
    fn parallel_hint_falls_back_to_up() {
        let pose = arm();
        let target = pose.root + Vec3::new(1.2, 0.0, 0.0);
        let parallel = solve(&pose, target, Some(pose.root + Vec3::X * 3.0), None, 0.0);
        let none = solve(&pose, target, None, None, 0.0);
        assert_eq!(parallel, none);
    }

    #[test]
    fn identical_inputs_give_identical_outputs() {
        let pose = arm();
        let target = Vec3::new(0.4, 1.1, 0.9);
        let rot = Some(Quat::from_rotation_y(0.7));
        let a = solve(&pose, target, Some(Vec3::ZERO), rot, 0.001);
        let b = solve(&pose, target, Some(Vec3::ZERO), rot, 0.001);
        assert_eq!(a, b);
        assert_eq!(a.end_rotation, rot);
    }

    #[test]
    fn degenerate_inputs_stay_finite() {
        let p = Vec3::new(1.0, 1.0, 1.0);
        let collapsed = LimbPose { root: p, mid: p, end: p };
        let s = solve(&collapsed, p, None, None, 0.001);
        assert!(s.end_position.is_finite());
        assert!(s.root_rotation.is_finite());
        assert!(s.mid_rotation.is_finite());

        let s = solve(&arm(), arm().root, None, None, 0.0);
        assert!(s.end_position.is_finite());
        assert!(s.mid_position.is_finite());
    }

    #[test]
    fn look_rotation_matches_forward_and_up() {
        let q = look_rotation(Vec3::X, Vec3::Y);
        assert!((q * Vec3::Z).distance(Vec3::X) < 1e-5);
        assert!((q * Vec3::Y).distance(Vec3::Y) < 1e-5);
        assert_eq!(look_rotation(Vec3::ZERO, Vec3::Y), Quat::IDENTITY);
        let q = look_rotation(Vec3::Y, Vec3::Y);
        assert!((q * Vec3::Z).distance(Vec3::Y) < 1e-5);
    }
}
