// Library root: Riot Games API client implementing the engine's rank source.

pub mod client;
pub mod platform;

pub use client::RiotClient;
pub use platform::Platform;
