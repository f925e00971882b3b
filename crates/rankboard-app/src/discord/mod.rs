// Discord integration: REST publishing, gateway session and embeds.

pub mod embed;
pub mod gateway;
pub mod rest;

pub use embed::EmbedStyle;
pub use gateway::{GatewayEvent, Interaction};
pub use rest::{DiscordRest, InteractionApi};
