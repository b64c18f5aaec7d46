//! Livenick library
//!
//! Keeps Discord nicknames in sync with Twitch live status: members who
//! register a Twitch login get a marker in front of their nickname while
//! they stream, and their original nickname back when they stop.

pub mod chat;
pub mod commands;
pub mod config;
pub mod db;
pub mod discord;
pub mod mapping;
pub mod sync;
pub mod twitch;
