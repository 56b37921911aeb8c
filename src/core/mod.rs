pub mod actions;
pub mod admin;
pub mod assistant;
pub mod commands;
pub mod faq_cache;
pub mod intake;
pub mod knowledge;
pub mod rate_limiter;
pub mod services;
pub mod traits;
