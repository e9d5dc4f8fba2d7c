//! Skin photo diagnosis with step-by-step healing visuals.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod session;
pub mod startup;
