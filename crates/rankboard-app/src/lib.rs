// Library root: configuration, Discord integration and slash commands for
// the leaderboard bot. Re-exported so the binary and integration tests share
// one API.

pub mod commands;
pub mod config;
pub mod discord;
