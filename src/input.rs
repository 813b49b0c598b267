use crate::config::ACTIVATE_THRESHOLD;
use crate::grab::HandSide;
use crate::physics::Frame;

/// One hand's "activate" button with edge detection.
#[derive(Clone, Copy, Debug, Default)]
pub struct ActivateButton {
    held: bool,
    was_held: bool,
}

impl ActivateButton {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed this step's raw value (analog triggers allowed).
    pub fn update(&mut self, value: f32) {
        self.was_held = self.held;
        self.held = value > ACTIVATE_THRESHOLD;
    }

    pub fn set(&mut self, held: bool) {
        self.update(if held { 1.0 } else { 0.0 });
    }

    pub fn down(&self) -> bool {
        self.held && !self.was_held
    }

    pub fn held(&self) -> bool {
        self.held
    }

    pub fn up(&self) -> bool {
        !self.held && self.was_held
    }

    /// Consumes this step's edges; the level stays as it was.
    pub fn settle(&mut self) {
        self.was_held = self.held;
    }
}

/// Per-hand input as the grab controller sees it.
#[derive(Clone, Copy, Debug, Default)]
pub struct HandSignal {
    pub activate: ActivateButton,
    /// Palm reference frame from a tracked device. Actors fill in their arm's
    /// rest palm when this is `None`; a bare controller treats it as lost
    /// tracking.
    pub frame: Option<Frame>,
}

/// One player's input for a step.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlayerInput {
    pub player_index: usize,
    /// Planar move stick, x = right, y = forward.
    pub move_axis: (f32, f32),
    pub left: HandSignal,
    pub right: HandSignal,
}

impl PlayerInput {
    pub fn new(player_index: usize) -> Self {
        Self {
            player_index,
            ..Default::default()
        }
    }

    pub fn hand(&self, side: HandSide) -> &HandSignal {
        match side {
            HandSide::Left => &self.left,
            HandSide::Right => &self.right,
        }
    }

    pub fn hand_mut(&mut self, side: HandSide) -> &mut HandSignal {
        match side {
            HandSide::Left => &mut self.left,
            HandSide::Right => &mut self.right,
        }
    }

    pub fn end_step(&mut self) {
        self.left.activate.settle();
        self.right.activate.settle();
    }
}

/// Player inputs owned by the simulation root, kept sorted by player index.
#[derive(Default)]
pub struct InputRegistry {
    players: Vec<PlayerInput>,
}

impl InputRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, player_index: usize) {
        if self.players.iter().any(|p| p.player_index == player_index) {
            return;
        }
        self.players.push(PlayerInput::new(player_index));
        self.players.sort_by_key(|p| p.player_index);
    }

    pub fn unregister(&mut self, player_index: usize) {
        self.players.retain(|p| p.player_index != player_index);
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Input for `player_index`; unknown indices fall back to the first
    /// player. `None` only when nobody is registered.
    pub fn get(&self, player_index: usize) -> Option<&PlayerInput> {
        match self.players.iter().find(|p| p.player_index == player_index) {
            Some(p) => Some(p),
            None => {
                if let Some(first) = self.players.first() {
                    log::warn!("No input for player {}, using player {}", player_index, first.player_index);
                }
                self.players.first()
            }
        }
    }

    pub fn get_mut(&mut self, player_index: usize) -> Option<&mut PlayerInput> {
        self.players.iter_mut().find(|p| p.player_index == player_index)
    }

    /// Called by the simulation once every actor has read its input, so a
    /// press that is not re-fed next step does not fire again.
    pub fn end_step(&mut self) {
        for player in &mut self.players {
            player.end_step();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edges_fire_for_one_step() {
        let mut b = ActivateButton::new();
        b.update(0.9);
        assert!(b.down() && b.held() && !b.up());
        b.update(0.9);
        assert!(!b.down() && b.held());
        b.update(0.01);
        assert!(b.up() && !b.held());
        b.update(0.0);
        assert!(!b.up());
    }

    #[test]
    fn settle_consumes_edges() {
        let mut b = ActivateButton::new();
        b.set(true);
        b.settle();
        assert!(b.held() && !b.down());
        b.set(false);
        b.settle();
        assert!(!b.up());
    }

    #[test]
    fn registry_falls_back_to_first_player() {
        let mut reg = InputRegistry::new();
        assert!(reg.get(0).is_none());
        reg.register(3);
        reg.register(1);
        reg.register(1);
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.get(3).unwrap().player_index, 3);
        assert_eq!(reg.get(9).unwrap().player_index, 1);
        assert!(reg.get_mut(9).is_none());
        reg.unregister(1);
        assert_eq!(reg.get(9).unwrap().player_index, 3);
    }
}
