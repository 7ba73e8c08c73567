//! Tool registry: maps each catalog action to an MCP tool definition
//! (name, description, input contract) and an execution path into the
//! provider adapters.
//!
//! The registry is process-wide, immutable, and cross-validated
//! against the permission catalog: a tool without a catalog action or
//! a catalog action without a tool is a startup error.

pub mod validate;

use anyhow::anyhow;
use once_cell::sync::Lazy;
use serde_json::{json, Value};

use crate::errors::AppError;
use crate::models::connection::ConnectionRow;
use crate::permissions::{self, Provider};
use crate::providers::ads::AdsClient;
use crate::providers::calendar::CalendarClient;
use crate::providers::linkedin::LinkedInClient;
use crate::providers::openrouter::OpenRouterClient;
use crate::providers::search_console::SearchConsoleClient;
use crate::providers::twitter::{OAuth1Credentials, TwitterClient};
use crate::{tokens, AppState};
use validate::{
    optional_str, optional_u32, require_iso_date, required_array, required_object, required_str,
};

#[derive(Debug, Clone)]
pub struct ToolDef {
    pub action: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

impl ToolDef {
    /// MCP `tools/list` wire shape.
    pub fn to_mcp(&self) -> Value {
        json!({
            "name": self.action,
            "title": self.title,
            "description": self.description,
            "inputSchema": self.input_schema,
        })
    }
}

fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

pub static REGISTRY: Lazy<Vec<ToolDef>> = Lazy::new(|| {
    vec![
        // -- Google Calendar --
        ToolDef {
            action: "calendar_list_events",
            title: "List calendar events",
            description: "List upcoming events on a calendar, ordered by start time.",
            input_schema: object_schema(
                json!({
                    "calendar_id": { "type": "string", "description": "Calendar id, defaults to 'primary'" },
                    "time_min": { "type": "string", "format": "date-time" },
                    "time_max": { "type": "string", "format": "date-time" },
                    "max_results": { "type": "integer", "minimum": 1, "maximum": 250 },
                }),
                &[],
            ),
        },
        ToolDef {
            action: "calendar_create_event",
            title: "Create calendar event",
            description: "Create an event. `event` follows the Google Calendar event resource shape.",
            input_schema: object_schema(
                json!({
                    "calendar_id": { "type": "string" },
                    "event": { "type": "object" },
                }),
                &["event"],
            ),
        },
        ToolDef {
            action: "calendar_update_event",
            title: "Update calendar event",
            description: "Patch fields on an existing event.",
            input_schema: object_schema(
                json!({
                    "calendar_id": { "type": "string" },
                    "event_id": { "type": "string", "pattern": "^[A-Za-z0-9_-]+$" },
                    "patch": { "type": "object" },
                }),
                &["event_id", "patch"],
            ),
        },
        ToolDef {
            action: "calendar_delete_event",
            title: "Delete calendar event",
            description: "Delete an event by id.",
            input_schema: object_schema(
                json!({
                    "calendar_id": { "type": "string" },
                    "event_id": { "type": "string", "pattern": "^[A-Za-z0-9_-]+$" },
                }),
                &["event_id"],
            ),
        },
        ToolDef {
            action: "calendar_free_busy",
            title: "Query free/busy",
            description: "Free/busy windows for one or more calendars in a time range.",
            input_schema: object_schema(
                json!({
                    "time_min": { "type": "string", "format": "date-time" },
                    "time_max": { "type": "string", "format": "date-time" },
                    "calendar_ids": { "type": "array", "items": { "type": "string" } },
                }),
                &["time_min", "time_max"],
            ),
        },
        // -- Google Ads --
        ToolDef {
            action: "ads_list_campaigns",
            title: "List ad campaigns",
            description: "All campaigns on the connected Google Ads account.",
            input_schema: object_schema(json!({}), &[]),
        },
        ToolDef {
            action: "ads_campaign_metrics",
            title: "Campaign performance",
            description: "Impressions, clicks, cost and conversions per campaign for a preset date range.",
            input_schema: object_schema(
                json!({
                    "date_range": {
                        "type": "string",
                        "enum": ["TODAY", "YESTERDAY", "LAST_7_DAYS", "LAST_30_DAYS", "THIS_MONTH"],
                    },
                }),
                &["date_range"],
            ),
        },
        ToolDef {
            action: "ads_search_terms",
            title: "Search terms report",
            description: "Search terms that triggered ads in a preset date range.",
            input_schema: object_schema(
                json!({
                    "date_range": {
                        "type": "string",
                        "enum": ["TODAY", "YESTERDAY", "LAST_7_DAYS", "LAST_30_DAYS", "THIS_MONTH"],
                    },
                }),
                &["date_range"],
            ),
        },
        // -- Search Console --
        ToolDef {
            action: "gsc_list_sites",
            title: "List Search Console sites",
            description: "Verified properties available to the connected account.",
            input_schema: object_schema(json!({}), &[]),
        },
        ToolDef {
            action: "gsc_query_analytics",
            title: "Search analytics query",
            description: "Clicks and impressions by dimension over a date range.",
            input_schema: object_schema(
                json!({
                    "site_url": { "type": "string" },
                    "start_date": { "type": "string", "format": "date" },
                    "end_date": { "type": "string", "format": "date" },
                    "dimensions": {
                        "type": "array",
                        "items": { "type": "string", "enum": ["query", "page", "country", "device", "date"] },
                    },
                    "row_limit": { "type": "integer", "minimum": 1, "maximum": 25000 },
                }),
                &["site_url", "start_date", "end_date"],
            ),
        },
        ToolDef {
            action: "gsc_list_sitemaps",
            title: "List sitemaps",
            description: "Sitemaps submitted for a property.",
            input_schema: object_schema(
                json!({ "site_url": { "type": "string" } }),
                &["site_url"],
            ),
        },
        // -- LinkedIn --
        ToolDef {
            action: "li_get_profile",
            title: "Get LinkedIn profile",
            description: "Profile of the connected member.",
            input_schema: object_schema(json!({}), &[]),
        },
        ToolDef {
            action: "li_create_post",
            title: "Create LinkedIn post",
            description: "Publish a text post as the connected member.",
            input_schema: object_schema(
                json!({
                    "text": { "type": "string", "maxLength": 3000 },
                    "visibility": { "type": "string", "enum": ["PUBLIC", "CONNECTIONS"] },
                }),
                &["text"],
            ),
        },
        // -- Twitter/X --
        ToolDef {
            action: "tw_get_me",
            title: "Get X account",
            description: "The connected X account's id and handle.",
            input_schema: object_schema(json!({}), &[]),
        },
        ToolDef {
            action: "tw_post_tweet",
            title: "Post to X",
            description: "Post a tweet as the connected account.",
            input_schema: object_schema(
                json!({ "text": { "type": "string", "maxLength": 280 } }),
                &["text"],
            ),
        },
        ToolDef {
            action: "tw_delete_tweet",
            title: "Delete a tweet",
            description: "Delete a tweet by id.",
            input_schema: object_schema(
                json!({ "tweet_id": { "type": "string", "pattern": "^[A-Za-z0-9_-]+$" } }),
                &["tweet_id"],
            ),
        },
        // -- OpenRouter --
        ToolDef {
            action: "llm_chat",
            title: "LLM chat completion",
            description: "Route a chat completion through the connected OpenRouter account.",
            input_schema: object_schema(
                json!({
                    "model": { "type": "string" },
                    "messages": { "type": "array", "items": { "type": "object" } },
                    "max_tokens": { "type": "integer", "minimum": 1 },
                }),
                &["model", "messages"],
            ),
        },
        ToolDef {
            action: "llm_list_models",
            title: "List LLM models",
            description: "Models available through the connected OpenRouter account.",
            input_schema: object_schema(json!({}), &[]),
        },
    ]
});

/// Tools for exactly the granted actions: pure set intersection,
/// silent on unknown requested actions. Write-time grant validation
/// is the caller's duty (`validate_grants`).
pub fn tools_for_actions(granted: &[String]) -> Vec<&'static ToolDef> {
    REGISTRY
        .iter()
        .filter(|t| granted.iter().any(|g| g == t.action))
        .collect()
}

pub fn tool_for_action(action: &str) -> Option<&'static ToolDef> {
    REGISTRY.iter().find(|t| t.action == action)
}

/// Write-time grant check: every requested action must exist in the
/// catalog and belong to the connection's provider. Unknown actions
/// are rejected, not dropped.
pub fn validate_grants(provider: Provider, actions: &[String]) -> Result<(), AppError> {
    let provider_actions = permissions::actions_for_provider(provider);
    for action in actions {
        if !permissions::all_actions().contains(action.as_str()) {
            return Err(AppError::validation(
                "granted_actions",
                format!("unknown action '{}'", action),
            ));
        }
        if !provider_actions.contains(&action.as_str()) {
            return Err(AppError::validation(
                "granted_actions",
                format!("action '{}' does not belong to provider {}", action, provider),
            ));
        }
    }
    Ok(())
}

/// Startup cross-check between the tool registry and the permission
/// catalog. Both directions must be exact.
pub fn verify_registry() -> anyhow::Result<()> {
    for tool in REGISTRY.iter() {
        if permissions::group_of(tool.action).is_none() {
            anyhow::bail!("tool '{}' has no catalog entry", tool.action);
        }
    }
    for action in permissions::all_actions() {
        if tool_for_action(action).is_none() {
            anyhow::bail!("catalog action '{}' has no tool", action);
        }
    }
    Ok(())
}

/// Execute one granted tool against its connection. Dispatch is an
/// exhaustive match so an unhandled action cannot slip through the
/// registry check silently.
pub async fn execute(
    state: &AppState,
    conn: &ConnectionRow,
    action: &str,
    args: &Value,
) -> Result<Value, AppError> {
    let provider = conn
        .provider()
        .ok_or_else(|| AppError::Internal(anyhow!("unknown provider '{}'", conn.provider)))?;

    match action {
        // -- Google Calendar --
        "calendar_list_events" => {
            let token = tokens::get_valid_access_token(state, conn.id).await?;
            let client = CalendarClient::new(&state.http, token);
            client
                .list_events(
                    optional_str(args, "calendar_id").unwrap_or("primary"),
                    optional_str(args, "time_min"),
                    optional_str(args, "time_max"),
                    optional_u32(args, "max_results", 25)?.min(250),
                )
                .await
        }
        "calendar_create_event" => {
            let event = required_object(args, "event")?.clone();
            let token = tokens::get_valid_access_token(state, conn.id).await?;
            let client = CalendarClient::new(&state.http, token);
            client
                .create_event(optional_str(args, "calendar_id").unwrap_or("primary"), event)
                .await
        }
        "calendar_update_event" => {
            let event_id = required_str(args, "event_id")?;
            let patch = required_object(args, "patch")?.clone();
            let token = tokens::get_valid_access_token(state, conn.id).await?;
            let client = CalendarClient::new(&state.http, token);
            client
                .update_event(
                    optional_str(args, "calendar_id").unwrap_or("primary"),
                    event_id,
                    patch,
                )
                .await
        }
        "calendar_delete_event" => {
            let event_id = required_str(args, "event_id")?;
            let token = tokens::get_valid_access_token(state, conn.id).await?;
            let client = CalendarClient::new(&state.http, token);
            client
                .delete_event(optional_str(args, "calendar_id").unwrap_or("primary"), event_id)
                .await
        }
        "calendar_free_busy" => {
            let time_min = required_str(args, "time_min")?;
            let time_max = required_str(args, "time_max")?;
            let calendar_ids: Vec<String> = match args.get("calendar_ids") {
                Some(Value::Array(ids)) => ids
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(String::from)
                    .collect(),
                _ => vec!["primary".into()],
            };
            let token = tokens::get_valid_access_token(state, conn.id).await?;
            let client = CalendarClient::new(&state.http, token);
            client.free_busy(time_min, time_max, &calendar_ids).await
        }

        // -- Google Ads --
        "ads_list_campaigns" | "ads_campaign_metrics" | "ads_search_terms" => {
            let customer_id = conn
                .ads_customer_id()
                .map(String::from)
                .ok_or_else(|| {
                    AppError::Internal(anyhow!(
                        "connection {} has no resolved ads customer id",
                        conn.id
                    ))
                })?;
            let token = tokens::get_valid_access_token(state, conn.id).await?;
            let developer_token = state
                .config
                .google_ads_developer_token
                .clone()
                .ok_or_else(|| AppError::Internal(anyhow!("ads developer token not configured")))?;
            let client = match &state.config.ads_base_url_override {
                Some(base) => {
                    AdsClient::with_base(&state.http, token, developer_token, base.clone())
                }
                None => AdsClient::new(&state.http, token, developer_token),
            };
            match action {
                "ads_list_campaigns" => client.list_campaigns(&customer_id).await,
                "ads_campaign_metrics" => {
                    client
                        .campaign_metrics(&customer_id, required_str(args, "date_range")?)
                        .await
                }
                _ => {
                    client
                        .search_terms(&customer_id, required_str(args, "date_range")?)
                        .await
                }
            }
        }

        // -- Search Console --
        "gsc_list_sites" => {
            let token = tokens::get_valid_access_token(state, conn.id).await?;
            SearchConsoleClient::new(&state.http, token).list_sites().await
        }
        "gsc_list_sitemaps" => {
            let site_url = required_str(args, "site_url")?;
            let token = tokens::get_valid_access_token(state, conn.id).await?;
            SearchConsoleClient::new(&state.http, token)
                .list_sitemaps(site_url)
                .await
        }
        "gsc_query_analytics" => {
            let site_url = required_str(args, "site_url")?;
            let start_date = required_str(args, "start_date")?;
            let end_date = required_str(args, "end_date")?;
            require_iso_date("start_date", start_date)?;
            require_iso_date("end_date", end_date)?;
            let dimensions: Vec<String> = match args.get("dimensions") {
                Some(Value::Array(ds)) => ds
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(String::from)
                    .collect(),
                _ => vec!["query".into()],
            };
            let row_limit = optional_u32(args, "row_limit", 100)?;
            let token = tokens::get_valid_access_token(state, conn.id).await?;
            SearchConsoleClient::new(&state.http, token)
                .query_analytics(site_url, start_date, end_date, &dimensions, row_limit)
                .await
        }

        // -- LinkedIn --
        "li_get_profile" => {
            let token = tokens::get_valid_access_token(state, conn.id).await?;
            LinkedInClient::new(&state.http, token).get_profile().await
        }
        "li_create_post" => {
            let text = required_str(args, "text")?;
            let visibility = optional_str(args, "visibility").unwrap_or("PUBLIC");
            let token = tokens::get_valid_access_token(state, conn.id).await?;
            let client = LinkedInClient::new(&state.http, token);

            // Author URN is resolved once and cached in metadata.
            let member_id = match conn.cached_user_id() {
                Some(id) => id.to_string(),
                None => {
                    let id = client.resolve_member_id().await?;
                    state
                        .db
                        .merge_connection_metadata(conn.id, &json!({ "user_id": id }))
                        .await?;
                    id
                }
            };
            client.create_post(&member_id, text, visibility).await
        }

        // -- Twitter/X --
        "tw_get_me" | "tw_post_tweet" | "tw_delete_tweet" => {
            let creds = twitter_credentials(state, conn)?;
            let client = TwitterClient::new(&state.http, creds);
            match action {
                "tw_get_me" => client.get_me().await,
                "tw_post_tweet" => client.post_tweet(required_str(args, "text")?).await,
                _ => client.delete_tweet(required_str(args, "tweet_id")?).await,
            }
        }

        // -- OpenRouter --
        "llm_chat" => {
            let model = required_str(args, "model")?;
            let messages = required_array(args, "messages")?;
            let max_tokens = match args.get("max_tokens") {
                None | Some(Value::Null) => None,
                Some(v) => Some(
                    v.as_u64()
                        .and_then(|n| u32::try_from(n).ok())
                        .ok_or_else(|| {
                            AppError::validation("max_tokens", "must be a positive integer")
                        })?,
                ),
            };
            let api_key = state.vault.decrypt(&conn.encrypted_access_secret)?;
            OpenRouterClient::new(&state.http, api_key)
                .chat(model, messages, max_tokens)
                .await
        }
        "llm_list_models" => {
            let api_key = state.vault.decrypt(&conn.encrypted_access_secret)?;
            OpenRouterClient::new(&state.http, api_key).list_models().await
        }

        other => Err(AppError::ActionNotGranted(other.to_string())),
    }
    .map_err(|e| annotate_provider(e, provider))
}

/// Twitter stores its OAuth1 token pair in the two secret slots:
/// access secret holds the token, refresh slot holds the token secret.
fn twitter_credentials(
    state: &AppState,
    conn: &ConnectionRow,
) -> Result<OAuth1Credentials, AppError> {
    let consumer_key = state
        .config
        .twitter_consumer_key
        .clone()
        .ok_or_else(|| AppError::Internal(anyhow!("twitter consumer key not configured")))?;
    let consumer_secret = state
        .config
        .twitter_consumer_secret
        .clone()
        .ok_or_else(|| AppError::Internal(anyhow!("twitter consumer secret not configured")))?;
    let token = state.vault.decrypt(&conn.encrypted_access_secret)?;
    let token_secret = match &conn.encrypted_refresh_secret {
        Some(enc) => state.vault.decrypt(enc)?,
        None => {
            return Err(AppError::Internal(anyhow!(
                "twitter connection {} has no token secret",
                conn.id
            )))
        }
    };
    Ok(OAuth1Credentials {
        consumer_key,
        consumer_secret,
        token,
        token_secret,
    })
}

fn annotate_provider(err: AppError, provider: Provider) -> AppError {
    if matches!(err, AppError::Upstream(_)) {
        tracing::debug!(provider = %provider, "tool execution failed upstream");
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_and_catalog_agree() {
        verify_registry().unwrap();
    }

    #[test]
    fn intersection_ignores_ungranted_requests() {
        // Grants {A, B}, request effectively for {A, C}: only A comes back.
        let granted = vec![
            "calendar_list_events".to_string(),
            "calendar_create_event".to_string(),
        ];
        let tools = tools_for_actions(&granted);
        let names: Vec<&str> = tools.iter().map(|t| t.action).collect();
        assert_eq!(
            names,
            vec!["calendar_list_events", "calendar_create_event"]
        );

        let mixed = vec!["calendar_list_events".to_string(), "not_a_tool".to_string()];
        let tools = tools_for_actions(&mixed);
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].action, "calendar_list_events");
    }

    #[test]
    fn intersection_of_empty_grants_is_empty() {
        assert!(tools_for_actions(&[]).is_empty());
    }

    #[test]
    fn grants_must_exist_in_the_catalog() {
        let err = validate_grants(
            Provider::GoogleCalendar,
            &["calendar_list_events".into(), "made_up_action".into()],
        )
        .unwrap_err();
        assert!(err.caller_message().contains("made_up_action"));
    }

    #[test]
    fn grants_must_match_the_connection_provider() {
        let err = validate_grants(Provider::GoogleCalendar, &["tw_post_tweet".into()]).unwrap_err();
        assert!(err.caller_message().contains("does not belong"));
    }

    #[test]
    fn mcp_shape_carries_schema() {
        let tool = tool_for_action("tw_post_tweet").unwrap();
        let wire = tool.to_mcp();
        assert_eq!(wire["name"], "tw_post_tweet");
        assert_eq!(wire["inputSchema"]["type"], "object");
        assert_eq!(wire["inputSchema"]["required"][0], "text");
    }
}
