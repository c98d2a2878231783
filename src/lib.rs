pub mod audit;
pub mod auth;
pub mod backend;
pub mod cli;
pub mod config;
pub mod edge;
pub mod models;
pub mod security;
pub mod services;

#[cfg(test)]
pub mod testing;
