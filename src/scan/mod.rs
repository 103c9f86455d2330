pub mod decoder;
pub mod dedup;
pub mod gate;

pub use decoder::decode_identity;
pub use dedup::{InFlight, ScanDeduplicator, SharedDeduplicator, Suppression};
pub use gate::{AdmissionGate, ClockWindow};
