//! Objects that can be picked up, and the registry the simulation root owns
//! for looking them up by body.

use glam::Quat;
use serde::Deserialize;
use std::collections::HashMap;

use crate::grab::{ActorId, HandId};
use crate::physics::{BodyId, BodyState, Frame};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Deserialize)]
pub enum WeightClass {
    Light,
    Medium,
    Heavy,
    SuperHeavy,
}

/// What a held object weighs, as fed to the carry-cost model.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum CarryLoad {
    Class(WeightClass),
    Mass(f32),
}

#[derive(Clone, Debug)]
pub struct Grabbable {
    pub body: BodyId,
    /// Attachment point in the body's local space.
    pub handle: Option<Frame>,
    /// Explicit class; when absent the body's mass is used.
    pub weight_class: Option<WeightClass>,
    pub required_strength: f32,
    pub disable_gravity_while_held: bool,
    pub ignore_owner_collision_while_held: bool,
    /// When false, only one hand at a time may hold this body.
    pub allow_shared_hold: bool,
    /// Bodies that belong to an actor (its own props) cannot be grabbed by it.
    pub owner: Option<ActorId>,
    pub base_tint: [f32; 4],
}

impl Grabbable {
    pub fn new(body: BodyId) -> Self {
        Self {
            body,
            handle: None,
            weight_class: None,
            required_strength: 0.0,
            disable_gravity_while_held: true,
            ignore_owner_collision_while_held: true,
            allow_shared_hold: true,
            owner: None,
            base_tint: [0.5, 0.5, 0.5, 1.0],
        }
    }

    pub fn with_handle(mut self, handle: Frame) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn with_weight_class(mut self, class: WeightClass) -> Self {
        self.weight_class = Some(class);
        self
    }

    pub fn with_required_strength(mut self, strength: f32) -> Self {
        self.required_strength = strength;
        self
    }

    pub fn with_owner(mut self, owner: ActorId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn exclusive(mut self) -> Self {
        self.allow_shared_hold = false;
        self
    }

    /// World frame a hand attaches to: the handle, or the center of mass
    /// (with the body's orientation) when no handle is defined.
    pub fn grab_frame(&self, state: &BodyState) -> Frame {
        match self.handle {
            Some(handle) => state.pose.compose(&handle),
            None => Frame::new(state.center_of_mass, state.pose.rotation),
        }
    }

    /// Attachment frame in body space.
    pub fn local_grab_frame(&self, state: &BodyState) -> Frame {
        match self.handle {
            Some(handle) => handle,
            None => Frame::new(state.pose.inverse_transform_point(state.center_of_mass), Quat::IDENTITY),
        }
    }

    pub fn load(&self, state: &BodyState) -> CarryLoad {
        match self.weight_class {
            Some(class) => CarryLoad::Class(class),
            None => CarryLoad::Mass(state.mass),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct HighlightMark {
    hand: HandId,
    tint: [f32; 4],
    expires_at: f32,
}

#[derive(Debug)]
struct Entry {
    grabbable: Grabbable,
    highlights: Vec<HighlightMark>,
    holders: Vec<HandId>,
    /// Gravity was switched off by a holder and is owed back once the last
    /// one lets go.
    gravity_suspended: bool,
}

/// Lookup of grabbables by body, owned by the simulation root.
#[derive(Default)]
pub struct GrabbableRegistry {
    entries: HashMap<BodyId, Entry>,
}

impl GrabbableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, grabbable: Grabbable) {
        self.entries.insert(
            grabbable.body,
            Entry {
                grabbable,
                highlights: Vec::new(),
                holders: Vec::new(),
                gravity_suspended: false,
            },
        );
    }

    /// Call when the object itself is destroyed. Hands holding it notice on
    /// their next step.
    pub fn remove(&mut self, body: BodyId) -> Option<Grabbable> {
        self.entries.remove(&body).map(|e| e.grabbable)
    }

    pub fn get(&self, body: BodyId) -> Option<&Grabbable> {
        self.entries.get(&body).map(|e| &e.grabbable)
    }

    pub fn get_mut(&mut self, body: BodyId) -> Option<&mut Grabbable> {
        self.entries.get_mut(&body).map(|e| &mut e.grabbable)
    }

    pub fn contains(&self, body: BodyId) -> bool {
        self.entries.contains_key(&body)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn bodies(&self) -> impl Iterator<Item = BodyId> + '_ {
        self.entries.keys().copied()
    }

    /// Marks (or refreshes) `hand`'s highlight on `body`.
    pub fn highlight(&mut self, body: BodyId, hand: HandId, tint: [f32; 4], expires_at: f32) {
        let Some(entry) = self.entries.get_mut(&body) else {
            return;
        };
        match entry.highlights.iter_mut().find(|m| m.hand == hand) {
            Some(mark) => {
                mark.tint = tint;
                mark.expires_at = expires_at;
            }
            None => entry.highlights.push(HighlightMark { hand, tint, expires_at }),
        }
    }

    pub fn clear_highlight(&mut self, body: BodyId, hand: HandId) {
        if let Some(entry) = self.entries.get_mut(&body) {
            entry.highlights.retain(|m| m.hand != hand);
        }
    }

    pub fn is_highlighted(&self, body: BodyId) -> bool {
        self.entries.get(&body).is_some_and(|e| !e.highlights.is_empty())
    }

    pub fn is_highlighted_by(&self, body: BodyId, hand: HandId) -> bool {
        self.entries
            .get(&body)
            .is_some_and(|e| e.highlights.iter().any(|m| m.hand == hand))
    }

    /// Number of bodies currently highlighted by `hand`.
    pub fn highlight_count(&self, hand: HandId) -> usize {
        self.entries
            .values()
            .filter(|e| e.highlights.iter().any(|m| m.hand == hand))
            .count()
    }

    /// Tint to draw the body with: the most recent highlight, else its own.
    pub fn appearance(&self, body: BodyId) -> Option<[f32; 4]> {
        self.entries.get(&body).map(|e| match e.highlights.last() {
            Some(mark) => mark.tint,
            None => e.grabbable.base_tint,
        })
    }

    /// Drops highlights that were not refreshed in time. Returns how many.
    pub fn expire_highlights(&mut self, now: f32) -> usize {
        let mut expired = 0;
        for (body, entry) in &mut self.entries {
            let before = entry.highlights.len();
            entry.highlights.retain(|m| now <= m.expires_at);
            let dropped = before - entry.highlights.len();
            if dropped > 0 {
                log::debug!("Highlight on {:?} lapsed", body);
                expired += dropped;
            }
        }
        expired
    }

    pub fn add_holder(&mut self, body: BodyId, hand: HandId) {
        if let Some(entry) = self.entries.get_mut(&body)
            && !entry.holders.contains(&hand)
        {
            entry.holders.push(hand);
        }
    }

    pub fn remove_holder(&mut self, body: BodyId, hand: HandId) {
        if let Some(entry) = self.entries.get_mut(&body) {
            entry.holders.retain(|h| *h != hand);
        }
    }

    pub fn holders(&self, body: BodyId) -> &[HandId] {
        self.entries.get(&body).map(|e| e.holders.as_slice()).unwrap_or(&[])
    }

    pub fn is_held_by_other(&self, body: BodyId, hand: HandId) -> bool {
        self.holders(body).iter().any(|h| *h != hand)
    }

    pub fn mark_gravity_suspended(&mut self, body: BodyId) {
        if let Some(entry) = self.entries.get_mut(&body) {
            entry.gravity_suspended = true;
        }
    }

    pub fn is_gravity_suspended(&self, body: BodyId) -> bool {
        self.entries.get(&body).is_some_and(|e| e.gravity_suspended)
    }

    /// Clears the mark; true if gravity should be switched back on.
    pub fn take_gravity_suspended(&mut self, body: BodyId) -> bool {
        self.entries
            .get_mut(&body)
            .is_some_and(|e| std::mem::take(&mut e.gravity_suspended))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grab::HandSide;
    use glam::Vec3;

    fn hand(actor: u32, side: HandSide) -> HandId {
        HandId { actor: ActorId(actor), side }
    }

    #[test]
    fn highlight_restores_base_tint() {
        let mut reg = GrabbableRegistry::new();
        let body = BodyId(7);
        reg.insert(Grabbable::new(body));
        let base = reg.appearance(body).unwrap();

        reg.highlight(body, hand(1, HandSide::Right), [0.0, 1.0, 1.0, 1.0], 1.0);
        assert_eq!(reg.appearance(body), Some([0.0, 1.0, 1.0, 1.0]));
        assert!(reg.is_highlighted(body));

        reg.clear_highlight(body, hand(1, HandSide::Right));
        assert_eq!(reg.appearance(body), Some(base));
        assert!(!reg.is_highlighted(body));
    }

    #[test]
    fn highlight_expiry_is_per_hand() {
        let mut reg = GrabbableRegistry::new();
        let body = BodyId(1);
        reg.insert(Grabbable::new(body));
        reg.highlight(body, hand(1, HandSide::Left), [1.0; 4], 0.5);
        reg.highlight(body, hand(2, HandSide::Left), [1.0; 4], 1.0);

        assert_eq!(reg.expire_highlights(0.5), 0);
        assert_eq!(reg.expire_highlights(0.75), 1);
        assert!(!reg.is_highlighted_by(body, hand(1, HandSide::Left)));
        assert!(reg.is_highlighted_by(body, hand(2, HandSide::Left)));
    }

    #[test]
    fn suspended_gravity_is_owed_back_once() {
        let mut reg = GrabbableRegistry::new();
        let body = BodyId(3);
        reg.insert(Grabbable::new(body));
        assert!(!reg.take_gravity_suspended(body));

        reg.mark_gravity_suspended(body);
        assert!(reg.is_gravity_suspended(body));
        assert!(reg.take_gravity_suspended(body));
        assert!(!reg.take_gravity_suspended(body));
        assert!(!reg.take_gravity_suspended(BodyId(99)));
    }

    #[test]
    fn holders_are_tracked_once() {
        let mut reg = GrabbableRegistry::new();
        let body = BodyId(3);
        reg.insert(Grabbable::new(body));
        let left = hand(1, HandSide::Left);
        reg.add_holder(body, left);
        reg.add_holder(body, left);
        assert_eq!(reg.holders(body).len(), 1);
        assert!(!reg.is_held_by_other(body, left));
        assert!(reg.is_held_by_other(body, hand(1, HandSide::Right)));
        reg.remove_holder(body, left);
        assert!(reg.holders(body).is_empty());
    }

    #[test]
    fn grab_frame_falls_back_to_center_of_mass() {
        let state = BodyState {
            pose: Frame::from_position(Vec3::new(1.0, 0.0, 0.0)),
            center_of_mass: Vec3::new(1.0, 0.5, 0.0),
            mass: 3.0,
            kind: crate::physics::BodyKind::Dynamic,
            linear_damping: 0.0,
            angular_damping: 0.0,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            gravity_enabled: true,
        };
        let plain = Grabbable::new(BodyId(1));
        assert_eq!(plain.grab_frame(&state).position, Vec3::new(1.0, 0.5, 0.0));
        assert_eq!(plain.local_grab_frame(&state).position, Vec3::new(0.0, 0.5, 0.0));
        assert_eq!(plain.load(&state), CarryLoad::Mass(3.0));

        let handled = Grabbable::new(BodyId(1))
            .with_handle(Frame::from_position(Vec3::new(0.0, 0.0, 0.25)))
            .with_weight_class(WeightClass::Heavy);
        assert_eq!(handled.grab_frame(&state).position, Vec3::new(1.0, 0.0, 0.25));
        assert_eq!(handled.load(&state), CarryLoad::Class(WeightClass::Heavy));
    }
}
