use glam::Vec3;

use crate::assist::TwoActorCarryAssist;
use crate::collision::PhysicsWorld;
use crate::config::*;
use crate::feedback::{GrabFeedback, LogFeedback};
use crate::grab::{ActorId, GrabController, GrabEvent, HandId};
use crate::grabbable::{Grabbable, GrabbableRegistry};
use crate::input::{InputRegistry, PlayerInput};
use crate::physics::{BodyId, PhysicsBackend};
use crate::player::{Actor, ActorStep};

fn find_hand(actors: &[Actor], hand: HandId) -> Option<&GrabController> {
    actors
        .iter()
        .find(|a| a.id == hand.actor)
        .map(|a| a.hand(hand.side))
}

/// Owns the world and drives it in fixed steps.
pub struct Simulation {
    pub physics: PhysicsWorld,
    pub registry: GrabbableRegistry,
    pub inputs: InputRegistry,
    pub actors: Vec<Actor>,
    pub assists: Vec<TwoActorCarryAssist>,
    pub feedback: Box<dyn GrabFeedback>,
    pub tuning: GrabTuning,
    events: Vec<GrabEvent>,
    time: f32,
    next_actor: u32,
}

impl Simulation {
    pub fn new(tuning: GrabTuning) -> Self {
        Self {
            physics: PhysicsWorld::new(),
            registry: GrabbableRegistry::new(),
            inputs: InputRegistry::new(),
            actors: Vec::new(),
            assists: Vec::new(),
            feedback: Box::new(LogFeedback),
            tuning,
            events: Vec::new(),
            time: 0.0,
            next_actor: 0,
        }
    }

    pub fn with_feedback(mut self, feedback: Box<dyn GrabFeedback>) -> Self {
        self.feedback = feedback;
        self
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    /// Events produced by the last step.
    pub fn events(&self) -> &[GrabEvent] {
        &self.events
    }

    /// Spawns an actor standing on the ground at `position` (x/z).
    pub fn spawn_actor(&mut self, player_index: usize, position: Vec3) -> ActorId {
        let id = ActorId(self.next_actor);
        self.next_actor += 1;

        let center = Vec3::new(position.x, ACTOR_HALF_HEIGHT + ACTOR_RADIUS, position.z);
        let body = self
            .physics
            .spawn_actor(center, ACTOR_RADIUS, ACTOR_HALF_HEIGHT, ACTOR_LINEAR_DAMPING);
        let anchors = [self.physics.spawn_anchor(center), self.physics.spawn_anchor(center)];
        self.actors.push(Actor::new(
            id,
            player_index,
            body,
            anchors,
            ACTOR_LINEAR_DAMPING,
            &self.tuning,
        ));
        self.inputs.register(player_index);
        log::info!("Spawned actor {:?} for player {} at {:?}", id, player_index, center);
        id
    }

    /// Releases whatever the actor holds, then removes it from the world.
    pub fn despawn_actor(&mut self, id: ActorId) {
        let Some(index) = self.actors.iter().position(|a| a.id == id) else {
            return;
        };
        let mut actor = self.actors.remove(index);
        let mut step = ActorStep {
            physics: &mut self.physics,
            registry: &mut self.registry,
            feedback: self.feedback.as_mut(),
            broken_joints: &[],
            now: self.time,
            dt: 0.0,
        };
        self.events.extend(actor.despawn(&mut step));

        let physics = &mut self.physics;
        self.assists.retain_mut(|assist| {
            if assist.hands.iter().any(|h| h.actor == id) {
                assist.disengage(physics);
                false
            } else {
                true
            }
        });
        for hand in &actor.hands {
            self.physics.remove_body(hand.anchor.body);
        }
        self.physics.remove_body(actor.body);
        if !self.actors.iter().any(|a| a.player_index == actor.player_index) {
            self.inputs.unregister(actor.player_index);
        }
        log::info!("Despawned actor {:?}", id);
    }

    pub fn add_grabbable(&mut self, grabbable: Grabbable) -> BodyId {
        let body = grabbable.body;
        self.registry.insert(grabbable);
        body
    }

    /// Dynamic box registered as grabbable.
    pub fn spawn_crate(&mut self, position: Vec3, half_extents: Vec3, mass: f32) -> BodyId {
        let body = self.physics.spawn_crate(position, half_extents, mass);
        self.add_grabbable(Grabbable::new(body))
    }

    /// Removes an object from the world. Hands holding it release on their
    /// next step.
    pub fn destroy_object(&mut self, body: BodyId) {
        self.registry.remove(body);
        self.physics.remove_body(body);
    }

    /// Watches two hands for a shared hold.
    pub fn add_assist(&mut self, hands: [HandId; 2]) {
        self.assists.push(TwoActorCarryAssist::new(hands, self.tuning.assist));
    }

    pub fn actor(&self, id: ActorId) -> Option<&Actor> {
        self.actors.iter().find(|a| a.id == id)
    }

    pub fn actor_mut(&mut self, id: ActorId) -> Option<&mut Actor> {
        self.actors.iter_mut().find(|a| a.id == id)
    }

    pub fn hand(&self, hand: HandId) -> Option<&GrabController> {
        find_hand(&self.actors, hand)
    }

    pub fn input_mut(&mut self, player_index: usize) -> Option<&mut PlayerInput> {
        self.inputs.get_mut(player_index)
    }

    /// Tint a renderer should draw `body` with right now.
    pub fn appearance(&self, body: BodyId) -> Option<[f32; 4]> {
        self.registry.appearance(body)
    }

    pub fn fixed_step(&mut self, dt: f32) -> &[GrabEvent] {
        self.time += dt;
        self.events.clear();

        let broken = self.physics.drain_broken_joints();
        self.registry.expire_highlights(self.time);

        for actor in &mut self.actors {
            let input = self
                .inputs
                .get(actor.player_index)
                .copied()
                .unwrap_or_else(|| PlayerInput::new(actor.player_index));
            let mut step = ActorStep {
                physics: &mut self.physics,
                registry: &mut self.registry,
                feedback: self.feedback.as_mut(),
                broken_joints: &broken,
                now: self.time,
                dt,
            };
            self.events.extend(actor.fixed_update(&mut step, &input));
        }
        self.inputs.end_step();

        for assist in &mut self.assists {
            let held = assist
                .hands
                .map(|h| find_hand(&self.actors, h).and_then(|hand| hand.held_body()));
            let forward = self
                .actors
                .iter()
                .find(|a| a.id == assist.hands[0].actor)
                .map(|a| a.forward())
                .unwrap_or(Vec3::ZERO);
            assist.fixed_update(&mut self.physics, held, forward, dt);
        }

        self.physics.step(dt);

        for actor in &mut self.actors {
            actor.late_update(&self.physics, &self.registry);
        }

        &self.events
    }
}
