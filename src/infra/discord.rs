use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use time::OffsetDateTime;
use tracing::{debug, info};
use url::Url;

use crate::config::AppConfig;
use crate::infra::platform::{AuditEntry, AuditTrail, CapabilityMarker, Notifier, PlatformError};

const MEMBER_BAN_ADD: u8 = 22;
const SNOWFLAKE_EPOCH_MS: i64 = 1_420_070_400_000;
const REQUEST_TIMEOUT_SECONDS: u64 = 10;

#[derive(Deserialize)]
struct AuditLogPage {
    audit_log_entries: Vec<RawAuditEntry>,
    #[serde(default)]
    users: Vec<RawUser>,
}

#[derive(Deserialize)]
struct RawAuditEntry {
    id: String,
    user_id: Option<String>,
    target_id: Option<String>,
    reason: Option<String>,
}

#[derive(Deserialize)]
struct RawUser {
    id: String,
    username: String,
}

#[derive(Deserialize)]
struct RawMember {
    roles: Vec<String>,
}

/// REST adapter for the chat platform: audit trail, ban role and the
/// administrators' channel.
#[derive(Clone)]
pub struct DiscordClient {
    http: Client,
    api_base: Url,
    guild_id: i64,
    ban_role_id: i64,
    admin_channel_id: Option<i64>,
}

impl DiscordClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut token = HeaderValue::from_str(&format!("Bot {}", config.discord_token))
            .map_err(|err| anyhow!("invalid DISCORD_TOKEN: {}", err))?;
        token.set_sensitive(true);
        headers.insert(AUTHORIZATION, token);

        let http = Client::builder()
            .default_headers(headers)
            .user_agent(concat!("warden/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
            .build()?;

        // Url::join drops the last segment unless the base ends with '/'.
        let mut api_base = config.discord_api_base.clone();
        if !api_base.path().ends_with('/') {
            let path = format!("{}/", api_base.path());
            api_base.set_path(&path);
        }

        Ok(Self {
            http,
            api_base,
            guild_id: config.guild_id,
            ban_role_id: config.ban_role_id,
            admin_channel_id: config.admin_channel_id,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, PlatformError> {
        self.api_base
            .join(path)
            .map_err(|err| PlatformError::Unexpected(format!("bad endpoint {}: {}", path, err)))
    }

    fn role_endpoint(&self, member_id: i64) -> Result<Url, PlatformError> {
        self.endpoint(&format!(
            "guilds/{}/members/{}/roles/{}",
            self.guild_id, member_id, self.ban_role_id
        ))
    }

    /// The bot account's own id; its audit entries come from the command path.
    pub async fn current_user_id(&self) -> Result<i64, PlatformError> {
        let response = self.http.get(self.endpoint("users/@me")?).send().await?;
        let user: RawUser = check_status(response).await?.json().await?;
        parse_snowflake(&user.id)
    }
}

async fn check_status(response: Response) -> Result<Response, PlatformError> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::FORBIDDEN => Err(PlatformError::Forbidden),
        StatusCode::NOT_FOUND => Err(PlatformError::NotFound),
        status => {
            let url = response.url().clone();
            let body = response.text().await.unwrap_or_default();
            Err(PlatformError::Unexpected(format!("{} from {}: {}", status, url, body)))
        }
    }
}

fn parse_snowflake(value: &str) -> Result<i64, PlatformError> {
    value
        .parse::<i64>()
        .map_err(|_| PlatformError::Unexpected(format!("invalid snowflake {:?}", value)))
}

fn snowflake_time(id: i64) -> Result<OffsetDateTime, PlatformError> {
    let millis = (id >> 22) + SNOWFLAKE_EPOCH_MS;
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .map_err(|err| PlatformError::Unexpected(format!("snowflake {} out of range: {}", id, err)))
}

#[async_trait]
impl AuditTrail for DiscordClient {
    async fn recent_bans(
        &self,
        after: Option<i64>,
        limit: u8,
    ) -> Result<Vec<AuditEntry>, PlatformError> {
        let mut url = self.endpoint(&format!("guilds/{}/audit-logs", self.guild_id))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("action_type", &MEMBER_BAN_ADD.to_string());
            query.append_pair("limit", &limit.to_string());
            if let Some(after) = after {
                query.append_pair("after", &after.to_string());
            }
        }

        let response = self.http.get(url).send().await?;
        let page: AuditLogPage = check_status(response).await?.json().await?;

        let names: HashMap<String, String> = page
            .users
            .into_iter()
            .map(|user| (user.id, user.username))
            .collect();

        let mut entries = Vec::with_capacity(page.audit_log_entries.len());
        for raw in page.audit_log_entries {
            let (Some(actor), Some(target)) = (raw.user_id, raw.target_id) else {
                debug!(entry_id = %raw.id, "skipping audit entry without actor or target");
                continue;
            };
            let entry_id = parse_snowflake(&raw.id)?;
            let target_name = names
                .get(&target)
                .cloned()
                .unwrap_or_else(|| target.clone());
            entries.push(AuditEntry {
                entry_id,
                actor_id: parse_snowflake(&actor)?,
                target_id: parse_snowflake(&target)?,
                target_name,
                reason: raw.reason,
                occurred_at: snowflake_time(entry_id)?,
            });
        }

        entries.sort_by_key(|entry| entry.entry_id);
        Ok(entries)
    }
}

#[async_trait]
impl CapabilityMarker for DiscordClient {
    async fn has_marker(&self, member_id: i64) -> Result<bool, PlatformError> {
        let url = self.endpoint(&format!("guilds/{}/members/{}", self.guild_id, member_id))?;
        let response = self.http.get(url).send().await?;
        let member: RawMember = check_status(response).await?.json().await?;
        let role = self.ban_role_id.to_string();
        Ok(member.roles.iter().any(|id| *id == role))
    }

    async fn grant_marker(&self, member_id: i64) -> Result<(), PlatformError> {
        let response = self.http.put(self.role_endpoint(member_id)?).send().await?;
        check_status(response).await?;
        Ok(())
    }

    async fn revoke_marker(&self, member_id: i64) -> Result<(), PlatformError> {
        let response = self.http.delete(self.role_endpoint(member_id)?).send().await?;
        check_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for DiscordClient {
    async fn notify(&self, message: &str) -> Result<(), PlatformError> {
        let Some(channel_id) = self.admin_channel_id else {
            info!(notice = message, "no admin channel configured");
            return Ok(());
        };

        let url = self.endpoint(&format!("channels/{}/messages", channel_id))?;
        let response = self
            .http
            .post(url)
            .json(&json!({ "content": message }))
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}
