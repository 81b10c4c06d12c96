pub mod attendance;
pub mod core;
pub mod detections;
pub mod proofs;
pub mod roster;
pub mod setup;
pub mod teachers;
