pub mod entities;
pub mod providers;
pub mod store;
pub mod telegram;
