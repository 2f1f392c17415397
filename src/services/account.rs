//! User profile and session bookkeeping

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::core::error::AppError;
use crate::core::result::AppResult;
use crate::core::types::{Profile, UserSession};
use crate::infrastructure::database::{Query, Table, TableStore};
use crate::utils::time::now;

const MAX_USERNAME_LEN: usize = 32;

/// Profile fields a user can change; `None` leaves a field as is
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub preferred_currency: Option<String>,
}

/// `profiles` and `user_sessions` access
#[derive(Debug, Clone)]
pub struct AccountService {
    profiles: Table<Profile>,
    sessions: Table<UserSession>,
}

impl AccountService {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self {
            profiles: Table::new(store.clone()),
            sessions: Table::new(store),
        }
    }

    /// A user's profile, or an empty one if they never saved it
    pub async fn get_profile(&self, user_id: &str) -> AppResult<Profile> {
        Ok(self
            .profiles
            .first(Query::new().eq("id", user_id))
            .await?
            .unwrap_or_else(|| empty_profile(user_id)))
    }

    #[instrument(skip(self, update))]
    pub async fn update_profile(&self, user_id: &str, update: ProfileUpdate) -> AppResult<Profile> {
        let mut profile = self.get_profile(user_id).await?;

        if let Some(username) = update.username {
            let username = username.trim();
            if username.chars().count() > MAX_USERNAME_LEN {
                crate::bail_validation!("Username cannot exceed {} characters", MAX_USERNAME_LEN);
            }
            profile.username = (!username.is_empty()).then(|| username.to_string());
        }
        if let Some(avatar) = update.avatar_url {
            let avatar = avatar.trim();
            if !avatar.is_empty() && url::Url::parse(avatar).is_err() {
                return Err(AppError::invalid_field("avatar_url", avatar, "Avatar must be a valid URL"));
            }
            profile.avatar_url = (!avatar.is_empty()).then(|| avatar.to_string());
        }
        if let Some(currency) = update.preferred_currency {
            let currency = currency.trim().to_ascii_uppercase();
            if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(AppError::invalid_field(
                    "preferred_currency",
                    &currency,
                    "Currency must be a three-letter code",
                ));
            }
            profile.preferred_currency = currency;
        }

        profile.updated_at = Some(now());
        let saved = self
            .profiles
            .upsert(&[profile], &["id"])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::table("profiles", "upsert", "no row returned"))?;

        info!("👤 Updated profile for {}", user_id);
        Ok(saved)
    }

    /// Open a session row for `user_id`
    pub async fn start_session(&self, user_id: &str, user_agent: Option<&str>) -> AppResult<UserSession> {
        let session = self
            .sessions
            .insert(&UserSession {
                id: None,
                user_id: user_id.to_string(),
                started_at: now(),
                ended_at: None,
                user_agent: user_agent.map(str::to_string),
            })
            .await?;

        info!("🔐 Session started for {}", user_id);
        Ok(session)
    }

    /// Close a session; ending an already closed session is a no-op
    pub async fn end_session(&self, session_id: &str) -> AppResult<UserSession> {
        let session = self
            .sessions
            .first(Query::new().eq("id", session_id))
            .await?
            .ok_or_else(|| AppError::not_found("user_session", session_id))?;

        if session.ended_at.is_some() {
            return Ok(session);
        }

        let ended = self
            .sessions
            .update(&Query::new().eq("id", session_id), json!({ "ended_at": now() }))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::not_found("user_session", session_id))?;

        info!("🔒 Session {} ended", session_id);
        Ok(ended)
    }

    /// Sessions of a user that have not ended, newest first
    pub async fn active_sessions(&self, user_id: &str) -> AppResult<Vec<UserSession>> {
        self.sessions
            .select(
                &Query::new()
                    .eq("user_id", user_id)
                    .is_null("ended_at")
                    .order("started_at", true),
            )
            .await
    }
}

fn empty_profile(user_id: &str) -> Profile {
    Profile {
        id: user_id.to_string(),
        username: None,
        avatar_url: None,
        preferred_currency: "USD".to_string(),
        updated_at: None,
    }
}
