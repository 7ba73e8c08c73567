//! Static permission catalog: provider → capability group → actions.
//!
//! Initialized once at process start and never mutated. The tool
//! registry cross-checks itself against this catalog on startup so a
//! tool without a catalog action (or vice versa) is caught immediately.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Closed set of upstream providers. Adding one is a compile-time
/// exhaustive-match sweep, not a string comparison audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    GoogleCalendar,
    GoogleAds,
    SearchConsole,
    LinkedIn,
    Twitter,
    OpenRouter,
}

impl Provider {
    pub const ALL: [Provider; 6] = [
        Provider::GoogleCalendar,
        Provider::GoogleAds,
        Provider::SearchConsole,
        Provider::LinkedIn,
        Provider::Twitter,
        Provider::OpenRouter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::GoogleCalendar => "google_calendar",
            Provider::GoogleAds => "google_ads",
            Provider::SearchConsole => "search_console",
            Provider::LinkedIn => "linkedin",
            Provider::Twitter => "twitter",
            Provider::OpenRouter => "openrouter",
        }
    }

    pub fn parse(s: &str) -> Option<Provider> {
        Provider::ALL.iter().copied().find(|p| p.as_str() == s)
    }

    /// Whether this provider hands out expiring OAuth2 access tokens
    /// with a refresh flow. API-key-style providers (Twitter's OAuth1
    /// token pair, OpenRouter keys) never go through token refresh.
    pub fn supports_refresh(&self) -> bool {
        match self {
            Provider::GoogleCalendar
            | Provider::GoogleAds
            | Provider::SearchConsole
            | Provider::LinkedIn => true,
            Provider::Twitter | Provider::OpenRouter => false,
        }
    }

    /// OAuth2 token endpoint for refreshable providers.
    pub fn token_endpoint(&self) -> Option<&'static str> {
        match self {
            Provider::GoogleCalendar | Provider::GoogleAds | Provider::SearchConsole => {
                Some("https://oauth2.googleapis.com/token")
            }
            Provider::LinkedIn => Some("https://www.linkedin.com/oauth/v2/accessToken"),
            Provider::Twitter | Provider::OpenRouter => None,
        }
    }

    /// OAuth2 revocation endpoint, where the provider offers one.
    pub fn revoke_endpoint(&self) -> Option<&'static str> {
        match self {
            Provider::GoogleCalendar | Provider::GoogleAds | Provider::SearchConsole => {
                Some("https://oauth2.googleapis.com/revoke")
            }
            Provider::LinkedIn => Some("https://www.linkedin.com/oauth/v2/revoke"),
            Provider::Twitter | Provider::OpenRouter => None,
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CapabilityGroup {
    pub provider: Provider,
    pub name: &'static str,
    pub description: &'static str,
    pub actions: &'static [&'static str],
}

/// The full catalog, in display order.
pub static CATALOG: Lazy<Vec<CapabilityGroup>> = Lazy::new(|| {
    vec![
        CapabilityGroup {
            provider: Provider::GoogleCalendar,
            name: "events",
            description: "Read and manage calendar events",
            actions: &[
                "calendar_list_events",
                "calendar_create_event",
                "calendar_update_event",
                "calendar_delete_event",
            ],
        },
        CapabilityGroup {
            provider: Provider::GoogleCalendar,
            name: "availability",
            description: "Query free/busy windows",
            actions: &["calendar_free_busy"],
        },
        CapabilityGroup {
            provider: Provider::GoogleAds,
            name: "reporting",
            description: "Read-only campaign reporting",
            actions: &["ads_list_campaigns", "ads_campaign_metrics", "ads_search_terms"],
        },
        CapabilityGroup {
            provider: Provider::SearchConsole,
            name: "search_analytics",
            description: "Search Console sites, sitemaps and query analytics",
            actions: &["gsc_list_sites", "gsc_query_analytics", "gsc_list_sitemaps"],
        },
        CapabilityGroup {
            provider: Provider::LinkedIn,
            name: "publishing",
            description: "Profile lookup and post publishing",
            actions: &["li_get_profile", "li_create_post"],
        },
        CapabilityGroup {
            provider: Provider::Twitter,
            name: "tweets",
            description: "Post, delete and identify via the X API",
            actions: &["tw_get_me", "tw_post_tweet", "tw_delete_tweet"],
        },
        CapabilityGroup {
            provider: Provider::OpenRouter,
            name: "llm",
            description: "Route chat completions through OpenRouter",
            actions: &["llm_chat", "llm_list_models"],
        },
    ]
});

/// Flattened set of every catalog action.
pub static ALL_ACTIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    CATALOG
        .iter()
        .flat_map(|g| g.actions.iter().copied())
        .collect()
});

pub fn all_actions() -> &'static HashSet<&'static str> {
    &ALL_ACTIONS
}

/// Owning group of an action, or None for any non-catalog string.
pub fn group_of(action: &str) -> Option<&'static CapabilityGroup> {
    CATALOG.iter().find(|g| g.actions.contains(&action))
}

/// Owning provider of an action.
pub fn provider_of(action: &str) -> Option<Provider> {
    group_of(action).map(|g| g.provider)
}

/// Actions belonging to one provider, in catalog order.
pub fn actions_for_provider(provider: Provider) -> Vec<&'static str> {
    CATALOG
        .iter()
        .filter(|g| g.provider == provider)
        .flat_map(|g| g.actions.iter().copied())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_actions_matches_catalog_exactly() {
        let mut count = 0;
        for group in CATALOG.iter() {
            for action in group.actions {
                assert!(all_actions().contains(action));
                count += 1;
            }
        }
        assert_eq!(all_actions().len(), count, "duplicate action in catalog");
    }

    #[test]
    fn group_of_is_total_over_the_catalog() {
        for action in all_actions() {
            let group = group_of(action).expect("catalog action must have a group");
            assert!(group.actions.contains(action));
        }
    }

    #[test]
    fn group_of_rejects_non_catalog_strings() {
        assert!(group_of("").is_none());
        assert!(group_of("calendar_list_events ").is_none());
        assert!(group_of("rm_rf_slash").is_none());
    }

    #[test]
    fn provider_roundtrip() {
        for p in Provider::ALL {
            assert_eq!(Provider::parse(p.as_str()), Some(p));
        }
        assert_eq!(Provider::parse("facebook"), None);
    }

    #[test]
    fn refreshable_providers_have_token_endpoints() {
        for p in Provider::ALL {
            assert_eq!(p.supports_refresh(), p.token_endpoint().is_some());
        }
    }

    #[test]
    fn every_action_maps_back_to_its_provider() {
        for p in Provider::ALL {
            for action in actions_for_provider(p) {
                assert_eq!(provider_of(action), Some(p));
            }
        }
    }
}
