pub mod investor;
pub mod profile;
pub mod property;

pub use investor::{Investor, InvestorSummary};
pub use profile::{Participant, Profile, Role};
pub use property::Property;
