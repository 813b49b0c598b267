//! Grab-and-carry for physics characters: hands that find, reach for, latch
//! onto and carry rigid bodies, with a carry cost on the carrier, two-hand
//! assist, and two-bone arm IK.

pub mod anchor;
pub mod assist;
pub mod carry;
pub mod collision;
pub mod config;
pub mod feedback;
pub mod game;
pub mod grab;
pub mod grabbable;
pub mod ik;
pub mod input;
pub mod physics;
pub mod player;

pub use config::GrabTuning;
pub use game::Simulation;
pub use grab::{ActorId, GrabEvent, GrabState, HandId, HandSide, ReleaseCause};
pub use grabbable::{Grabbable, WeightClass};
pub use physics::{BodyId, Frame, PhysicsBackend};
