pub mod guard;
pub mod response;

pub use guard::{require_guard, Authorized, RequestBackend};
pub use response::{ApiResponse, ApiResult};
