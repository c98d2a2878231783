pub mod investor_service;
pub mod property_service;
pub mod signup_service;

pub use investor_service::InvestorService;
pub use property_service::{Page, PageRequest, PropertyService};
pub use signup_service::{AccountType, SignupError, SignupForm, SignupService};
