//! How much a held object slows its carrier down.

use crate::config::CarryTuning;
use crate::grabbable::{CarryLoad, WeightClass};
use crate::physics::{BodyId, PhysicsBackend};

/// Per-actor carry penalty. Locomotion multiplies its target speed by
/// [`speed_multiplier`](Self::speed_multiplier) and stops steering while
/// [`movement_locked`](Self::movement_locked) is set.
pub struct CarryCostModel {
    tuning: CarryTuning,
    actor_body: BodyId,
    baseline_damping: f32,
    speed_multiplier: f32,
    movement_locked: bool,
    band: Option<WeightClass>,
}

impl CarryCostModel {
    /// `baseline_damping` is the actor body's linear damping with nothing held.
    pub fn new(actor_body: BodyId, baseline_damping: f32, tuning: CarryTuning) -> Self {
        Self {
            tuning,
            actor_body,
            baseline_damping,
            speed_multiplier: 1.0,
            movement_locked: false,
            band: None,
        }
    }

    pub fn speed_multiplier(&self) -> f32 {
        self.speed_multiplier
    }

    pub fn movement_locked(&self) -> bool {
        self.movement_locked
    }

    /// Band of the load currently applied, if any.
    pub fn band(&self) -> Option<WeightClass> {
        self.band
    }

    pub fn baseline_damping(&self) -> f32 {
        self.baseline_damping
    }

    pub fn classify(&self, load: CarryLoad) -> WeightClass {
        match load {
            CarryLoad::Class(class) => class,
            CarryLoad::Mass(m) if m <= self.tuning.light_max => WeightClass::Light,
            CarryLoad::Mass(m) if m <= self.tuning.medium_max => WeightClass::Medium,
            CarryLoad::Mass(m) if m <= self.tuning.heavy_max => WeightClass::Heavy,
            CarryLoad::Mass(_) => WeightClass::SuperHeavy,
        }
    }

    fn band_effect(&self, band: WeightClass) -> (f32, bool, f32) {
        let t = &self.tuning;
        match band {
            WeightClass::Light => (t.light_speed, false, 0.0),
            WeightClass::Medium => (t.medium_speed, false, t.medium_damping_add),
            WeightClass::Heavy => (t.heavy_speed, false, t.heavy_damping_add),
            // Still holdable, but the carrier is rooted in place.
            WeightClass::SuperHeavy => (0.0, true, t.super_heavy_damping_add),
        }
    }

    /// Replaces whatever was applied before; damping is always derived from
    /// the baseline, so repeated calls never stack.
    pub fn apply(&mut self, physics: &mut dyn PhysicsBackend, load: CarryLoad) {
        let band = self.classify(load);
        let (speed, locked, damping_add) = self.band_effect(band);
        self.speed_multiplier = speed;
        self.movement_locked = locked;
        self.band = Some(band);
        self.set_linear_damping(physics, self.baseline_damping + damping_add);
        log::debug!("Carry cost {:?}: speed x{:.2}, locked {}", band, speed, locked);
    }

    /// Unconditional reset to the unburdened state.
    pub fn clear(&mut self, physics: &mut dyn PhysicsBackend) {
        self.speed_multiplier = 1.0;
        self.movement_locked = false;
        self.band = None;
        self.set_linear_damping(physics, self.baseline_damping);
    }

    fn set_linear_damping(&self, physics: &mut dyn PhysicsBackend, linear: f32) {
        match physics.body(self.actor_body) {
            Some(state) => physics.set_damping(self.actor_body, linear, state.angular_damping),
            None => log::warn!("Carrier body {:?} missing, damping not updated", self.actor_body),
        }
    }
}
