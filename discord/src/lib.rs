//! Minimal Discord client covering what a display bot needs: a gateway
//! session that tracks readiness and guild membership and can publish a
//! presence, and a REST client that renames the bot inside a guild.
mod error;
mod http;
mod ws;

pub use error::Error;
pub use http::HttpClient;
pub use ws::Gateway;

use derive_more::{Display, From};
use serde::Deserialize;

pub type Result<T> = std::result::Result<T, Error>;

/// Snowflake identifying a guild, kept as the raw string it arrives as on
/// the wire.
#[derive(Clone, Debug, Deserialize, Display, Eq, From, Hash, PartialEq)]
pub struct GuildId(pub String);

impl From<&str> for GuildId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}
