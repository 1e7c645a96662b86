//! Bloat-Flies — HMT Learner Hub verification bot.

pub mod bot;
pub mod channels;
pub mod commands;
pub mod config;
pub mod error;
pub mod hiscores;
pub mod reputation;
pub mod requirements;
pub mod session;
