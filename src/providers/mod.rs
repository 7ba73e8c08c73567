//! Provider adapters: one per upstream, each wrapping authenticated
//! HTTP calls and the provider's quirks (signing, pagination, account
//! discovery). Adapters never surface upstream error detail to
//! callers; `UpstreamClient::send_json` sanitizes on the way out.

pub mod ads;
pub mod calendar;
pub mod http;
pub mod linkedin;
pub mod openrouter;
pub mod search_console;
pub mod twitter;
