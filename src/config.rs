use anyhow::{bail, Result};
use serenity::model::id::GuildId;

/// Bot configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<GuildId>, // Para comandos de desarrollo

    // Subsonic
    pub subsonic_url: String,
    pub subsonic_user: String,
    pub subsonic_password: String,

    // Comportamiento
    /// Segundos de gracia antes de desconectar un canal sin humanos.
    pub idle_grace_secs: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            discord_token: std::env::var("DISCORD_TOKEN")?,
            guild_id: std::env::var("GUILD_ID")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(GuildId::new),

            subsonic_url: std::env::var("SUBSONIC_URL")?,
            subsonic_user: std::env::var("SUBSONIC_USER")?,
            subsonic_password: std::env::var("SUBSONIC_PASSWORD")?,

            idle_grace_secs: std::env::var("IDLE_GRACE_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Sanity checks to catch common mistakes before connecting anywhere.
    fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            bail!("DISCORD_TOKEN está vacío");
        }
        if self.subsonic_url.trim().is_empty() {
            bail!("SUBSONIC_URL está vacío");
        }
        if !self.subsonic_url.starts_with("http://") && !self.subsonic_url.starts_with("https://") {
            bail!("SUBSONIC_URL debe empezar con http:// o https://");
        }
        if self.subsonic_user.trim().is_empty() {
            bail!("SUBSONIC_USER está vacío");
        }
        if self.idle_grace_secs == 0 {
            bail!("IDLE_GRACE_SECS debe ser mayor que cero");
        }
        Ok(())
    }
}
