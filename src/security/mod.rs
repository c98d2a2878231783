//! Security helpers shared by the server and the CLI.

pub mod events;
pub mod fingerprint;
pub mod rate_limit;
pub mod state;

pub use events::{log_property_access, log_security_event, record_security_event, SecurityEvent, Severity};
pub use fingerprint::{device_fingerprint, DeviceTraits};
pub use rate_limit::RateLimiter;
pub use state::{AdminSessionMeta, SecurityPolicy, SecurityState, SecurityViolation};
