//! Optional side effects fired when a hand latches or a hold breaks.

use glam::Vec3;
use rand::Rng;

use crate::grab::HandId;
use crate::physics::BodyId;

/// Hook points the grab code calls if registered. Both default to no-ops.
pub trait GrabFeedback {
    fn on_latch(&mut self, _hand: HandId, _body: BodyId) {}
    fn on_break(&mut self, _hand: HandId, _body: BodyId) {}
}

/// Feedback that does nothing.
pub struct NoFeedback;

impl GrabFeedback for NoFeedback {}

/// Logs every hook call.
pub struct LogFeedback;

impl GrabFeedback for LogFeedback {
    fn on_latch(&mut self, hand: HandId, body: BodyId) {
        log::info!("{:?} latched onto {:?}", hand, body);
    }

    fn on_break(&mut self, hand: HandId, body: BodyId) {
        log::info!("{:?} lost {:?} (joint broke)", hand, body);
    }
}

/// Camera shake: a short bump on latch, a harder one when a hold snaps.
pub struct ShakeFeedback {
    pub latch_strength: f32,
    pub latch_duration: f32,
    pub break_strength: f32,
    pub break_duration: f32,
    strength: f32,
    remaining: f32,
}

impl ShakeFeedback {
    pub fn new() -> Self {
        Self {
            latch_strength: 0.05,
            latch_duration: 0.1,
            break_strength: 0.2,
            break_duration: 0.15,
            strength: 0.0,
            remaining: 0.0,
        }
    }

    /// Starts a shake unless a stronger one is already running.
    pub fn shake(&mut self, strength: f32, duration: f32) {
        if self.remaining <= 0.0 || strength >= self.strength {
            self.strength = strength;
            self.remaining = duration;
        }
    }

    pub fn is_shaking(&self) -> bool {
        self.remaining > 0.0
    }

    /// Camera offset for this frame: a random point inside a sphere of the
    /// current strength, zero once the shake has run out.
    pub fn sample(&mut self, dt: f32, rng: &mut impl Rng) -> Vec3 {
        if self.remaining <= 0.0 {
            return Vec3::ZERO;
        }
        self.remaining -= dt;
        let offset = loop {
            let v = Vec3::new(
                rng.gen_range(-1.0..=1.0),
                rng.gen_range(-1.0..=1.0),
                rng.gen_range(-1.0..=1.0),
            );
            if v.length_squared() <= 1.0 {
                break v;
            }
        };
        if self.remaining <= 0.0 {
            self.strength = 0.0;
        }
        offset * self.strength
    }
}

impl Default for ShakeFeedback {
    fn default() -> Self {
        Self::new()
    }
}

impl GrabFeedback for ShakeFeedback {
    fn on_latch(&mut self, _hand: HandId, _body: BodyId) {
        self.shake(self.latch_strength, self.latch_duration);
    }

    fn on_break(&mut self, _hand: HandId, _body: BodyId) {
        self.shake(self.break_strength, self.break_duration);
    }
}
