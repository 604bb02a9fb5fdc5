// server/src/web/handlers/mod.rs

pub mod cron_handlers;
pub mod health_handlers;
pub mod order_handlers;
pub mod poll_handlers;
pub mod webhook_handlers;
