pub mod admin;
pub mod auth;
pub mod participant;
pub mod public;
