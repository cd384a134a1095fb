//! Archives posts on request and re-delivers them through Telegram.

pub mod archiver;
pub mod backup;
pub mod config;
pub mod cookies;
pub mod delivery;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod inline;
pub mod model;
pub mod render;
pub mod share;
pub mod store;
pub mod telegraph;
pub mod util;
