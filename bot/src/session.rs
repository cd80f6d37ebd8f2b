use anyhow::Result;
use async_trait::async_trait;
use discord::{Gateway, GuildId, HttpClient};

/// Chat-platform session as seen by the refresh controller: membership,
/// readiness and the two display surfaces it mutates.
#[async_trait]
pub trait Session: Send + Sync {
    /// Blocks until the platform connection is ready for display mutations.
    async fn wait_until_ready(&self);

    /// Servers the bot currently belongs to.
    async fn guild_ids(&self) -> Vec<GuildId>;

    /// Sets the global activity status shown next to the bot's name.
    async fn update_presence(&self, activity: &str) -> Result<()>;

    /// Sets the bot's per-server display name.
    async fn update_nickname(&self, guild_id: &GuildId, nick: &str) -> Result<()>;
}

/// [`Session`] over a live Discord connection: presence through the gateway
/// socket, nicknames through REST.
pub struct DiscordSession {
    gateway: Gateway,
    http: HttpClient,
}

impl DiscordSession {
    pub async fn connect(token: &str) -> Result<Self> {
        Ok(Self {
            gateway: Gateway::connect(token).await?,
            http: HttpClient::new(token),
        })
    }
}

#[async_trait]
impl Session for DiscordSession {
    async fn wait_until_ready(&self) {
        self.gateway.wait_until_ready().await;
    }

    async fn guild_ids(&self) -> Vec<GuildId> {
        self.gateway.guild_ids().await
    }

    async fn update_presence(&self, activity: &str) -> Result<()> {
        Ok(self.gateway.update_presence(activity)?)
    }

    async fn update_nickname(&self, guild_id: &GuildId, nick: &str) -> Result<()> {
        Ok(self.http.update_nickname(guild_id, nick).await?)
    }
}
