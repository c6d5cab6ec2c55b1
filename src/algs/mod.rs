//! Communication primitives.

pub mod communicator;
pub mod exchange;
pub mod wire;

pub use communicator::{CommTag, Communicator, NoComm, RayonComm, VectorCommTags, Wait};
