pub mod capability;
pub mod controller;
pub mod events;
pub mod session;
pub mod state;

pub use capability::{ChannelScanner, ScanCapability, StdinScanner};
pub use controller::{ScanDisposition, ScannerController};
pub use events::{EventSink, KioskEvent, SessionSnapshot};
pub use session::ScanSession;
pub use state::{SessionState, SessionStatus, StopReason};
