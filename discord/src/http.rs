use crate::{Error, GuildId, Result};
use reqwest::header;
use serde_json::json;

const BASE_URL: &str = "https://discord.com/api/v10";

/// REST client for the endpoints the gateway cannot reach, authenticated
/// with the bot token.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    token: String,
}

impl HttpClient {
    pub fn new(token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: token.to_string(),
        }
    }

    /// Sets the bot's own nickname inside `guild_id`. Nicknames are local to
    /// a guild, unlike the presence.
    pub async fn update_nickname(&self, guild_id: &GuildId, nick: &str) -> Result<()> {
        let response = self
            .client
            .patch(format!("{BASE_URL}/guilds/{guild_id}/members/@me"))
            .header(header::AUTHORIZATION, format!("Bot {}", self.token))
            .json(&json!({ "nick": nick }))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Error::Response(status, response.text().await?))
        }
    }
}
