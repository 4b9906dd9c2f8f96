//! Shared User-Agent string for the session client.

/// Project URL for User-Agent identification (good citizenship; RFC 9308).
const PROJECT_UA_URL: &str = "https://github.com/trollixx/bitbucket-downloads";

/// Default User-Agent sent with every request (identifies the tool).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("bitbucket-downloads/{version} (+{PROJECT_UA_URL})")
}
