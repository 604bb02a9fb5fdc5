// server/src/services/mod.rs

pub mod alerts;
pub mod auth_service;
pub mod processor;
pub mod scheduler;
