mod body;
mod collider;
mod history;
mod input;

pub use body::{integrate, ControlledBody, FrameReport, InputOutcome};
pub use collider::{sweep, Axis, CollisionResolver, Resolution, SweepHit, CORNER_EPSILON, MAX_PASSES, RESTITUTION};
pub use history::{HistoricalTransform, StateHistory};
pub use input::{heading, wrap_angle, Buttons};
