//! Authorization gate: who may see the admin back-office and the
//! participant pages.
//!
//! A [`GuardKind`] names the record that authorizes a user and the login
//! location that unauthorized users are sent to. [`AuthResolver`] turns the
//! current session into a [`Resolution`]; [`RouteGuard`] wraps that in the
//! `checking -> authorized | unauthorized` lifecycle of a protected page.

pub mod guard;
pub mod resolver;

use serde::de::DeserializeOwned;

use crate::models::{Participant, Profile, Role};

pub use guard::{AdminRoute, GuardState, GuardView, ParticipantRoute, RouteGuard};
pub use resolver::{AuthResolver, DenialReason, Resolution};

pub trait GuardKind: Send + Sync + 'static {
    /// Row that authorizes the user
    type Record: DeserializeOwned + Clone + Send + Sync + 'static;

    /// Name used in logs
    const NAME: &'static str;
    const TABLE: &'static str;
    /// Column holding the user id
    const KEY_COLUMN: &'static str;
    /// Where unauthorized users are redirected
    const LOGIN_PATH: &'static str;
    /// Whether mounted guards follow auth-state change events
    const WATCHES_AUTH_EVENTS: bool;

    fn authorize(record: &Self::Record) -> Result<(), DenialReason>;
}

/// Active admin profile required
pub struct AdminGuard;

impl GuardKind for AdminGuard {
    type Record = Profile;

    const NAME: &'static str = "admin";
    const TABLE: &'static str = "profiles";
    const KEY_COLUMN: &'static str = "id";
    const LOGIN_PATH: &'static str = "/admin/login";
    const WATCHES_AUTH_EVENTS: bool = true;

    fn authorize(profile: &Profile) -> Result<(), DenialReason> {
        if profile.role != Role::Admin {
            return Err(DenialReason::RoleNotAdmin);
        }
        if !profile.is_active {
            return Err(DenialReason::Inactive);
        }
        Ok(())
    }
}

/// Any participant row for the user is enough
pub struct ParticipantGuard;

impl GuardKind for ParticipantGuard {
    type Record = Participant;

    const NAME: &'static str = "participant";
    const TABLE: &'static str = "participants";
    const KEY_COLUMN: &'static str = "user_id";
    const LOGIN_PATH: &'static str = "/login";
    const WATCHES_AUTH_EVENTS: bool = false;

    fn authorize(_participant: &Participant) -> Result<(), DenialReason> {
        Ok(())
    }
}
