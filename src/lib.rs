//! Todo Bot: turns chat messages into tracked tasks through a durable queue.

pub mod bot;
pub mod channels;
pub mod classify;
pub mod config;
pub mod error;
pub mod health;
pub mod pipeline;
pub mod queue;
pub mod sheets;
pub mod store;
