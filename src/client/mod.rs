//! Session client for the Bitbucket Downloads page.
//!
//! Holds one browser-like session: a cookie store for session continuity and
//! a CSRF token derived from cookies. All operations are plain request and
//! response round trips against the repository's Downloads page; there is no
//! queue, scheduler, or background task. Mutating requests echo the CSRF
//! token Bitbucket ties to the most recent page view, so `upload` and
//! `remove` each refresh the token with a throwaway page fetch first.

pub mod error;
pub mod payload;

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::REFERER;
use reqwest::{multipart, redirect};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::listing::{self, DownloadItem};
use crate::user_agent;
use self::error::ClientError;
use self::payload::Payload;

/// Base URL of the Bitbucket site. Injectable via
/// [`Client::with_base_url`] so tests can point at a local server.
pub const DEFAULT_BASE_URL: &str = "https://bitbucket.org";

/// Name of the CSRF cookie Bitbucket issues on every page view.
const CSRF_COOKIE: &str = "csrftoken";
/// Form field the token must be echoed back in on mutating posts.
const CSRF_FIELD: &str = "csrfmiddlewaretoken";

const CONNECT_TIMEOUT_SECS: u64 = 30;
const READ_TIMEOUT_SECS: u64 = 120;

/// Session client for one repository's Downloads page.
///
/// A client owns exactly one session (cookie jar, CSRF token, authenticated
/// flag). Every call that touches session state (`login`, `logout`, `upload`,
/// `remove`) takes `&mut self`, so call ordering on one instance is
/// serialized by the borrow checker; there is no internal lock. An
/// interleaved token refresh and submission therefore cannot compile:
///
/// ```compile_fail
/// use bitbucket_downloads::Client;
///
/// async fn race(client: &mut Client) {
///     let first = client.upload("a.txt", "one");
///     let second = client.upload("b.txt", "two");
///     first.await.unwrap();
///     second.await.unwrap();
/// }
/// ```
///
/// Redirects are never followed: a successful login is signalled only by a
/// redirect status, which must stay observable.
#[derive(Debug)]
pub struct Client {
    http: reqwest::Client,
    cookie_jar: Arc<Jar>,
    base_url: Url,
    page_url: Url,
    delete_url: Url,
    logged_in: bool,
}

/// Outcome of a [`Client::remove`] batch.
///
/// Every id is attempted; the caller's input is never mutated. This replaces
/// the upstream behaviour of editing the id list in place while iterating it,
/// which could skip entries and reported nothing about partial progress.
#[derive(Debug, Default)]
pub struct RemoveReport {
    /// Ids whose delete post was accepted by the transport.
    pub removed: Vec<String>,
    /// Ids whose delete post failed, with the reason.
    pub failed: Vec<(String, ClientError)>,
}

impl RemoveReport {
    /// Returns `true` when every id in the batch was removed.
    #[must_use]
    pub fn all_removed(&self) -> bool {
        self.failed.is_empty()
    }
}

impl Client {
    /// Creates a client for `repository` (in `owner/repo` format) against the
    /// public Bitbucket site.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Validation`] if the repository identifier is
    /// not in `owner/repo` format.
    pub fn new(repository: &str) -> Result<Self, ClientError> {
        Self::with_base_url(repository, DEFAULT_BASE_URL)
    }

    /// Creates a client against an explicit base site URL.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Validation`] for a malformed repository
    /// identifier or base URL, and [`ClientError::Network`] if the HTTP
    /// client cannot be constructed.
    pub fn with_base_url(repository: &str, base_url: &str) -> Result<Self, ClientError> {
        validate_repository(repository)?;

        let base = base_url.trim_end_matches('/');
        let base_url = Url::parse(base)
            .map_err(|e| ClientError::validation(format!("invalid base URL {base}: {e}")))?;
        let page_url = Url::parse(&format!("{base}/{repository}/downloads"))
            .map_err(|e| ClientError::validation(format!("invalid page URL: {e}")))?;
        let delete_url = Url::parse(&format!("{page_url}/delete"))
            .map_err(|e| ClientError::validation(format!("invalid delete URL: {e}")))?;

        let cookie_jar = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&cookie_jar))
            .redirect(redirect::Policy::none())
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(READ_TIMEOUT_SECS))
            .gzip(true)
            .user_agent(user_agent::default_user_agent())
            .build()
            .map_err(|e| ClientError::network(base, e))?;

        debug!(page_url = %page_url, "created downloads client");
        Ok(Self {
            http,
            cookie_jar,
            base_url,
            page_url,
            delete_url,
            logged_in: false,
        })
    }

    /// Whether a login has succeeded on this session.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    /// The Downloads page URL all operations run against.
    #[must_use]
    pub fn page_url(&self) -> &str {
        self.page_url.as_str()
    }

    /// Authenticates with `username` and `password`.
    ///
    /// Fetches the sign-in page first to obtain a fresh CSRF token from
    /// cookies, then submits the sign-in form. Bitbucket signals a successful
    /// login only by redirecting; any non-redirect status is a rejection.
    /// Team account credentials work in addition to regular user accounts.
    ///
    /// # Errors
    ///
    /// [`ClientError::Token`] if no CSRF cookie is present after the page
    /// fetch, [`ClientError::Auth`] if the login is rejected, and
    /// [`ClientError::Network`] for transport failures.
    #[instrument(level = "debug", skip(self, password))]
    pub async fn login(&mut self, username: &str, password: &str) -> Result<(), ClientError> {
        let signin_url = self.signin_url()?;
        self.http
            .get(signin_url.clone())
            .send()
            .await
            .map_err(|e| ClientError::network(signin_url.as_str(), e))?;
        let token = self
            .csrf_token()
            .ok_or_else(|| ClientError::token(signin_url.as_str()))?;

        let form = [
            ("username", username),
            ("password", password),
            ("submit", ""),
            ("next", "/"),
            (CSRF_FIELD, token.as_str()),
        ];
        let response = self
            .http
            .post(signin_url.clone())
            .header(REFERER, signin_url.as_str())
            .form(&form)
            .send()
            .await
            .map_err(|e| ClientError::network(signin_url.as_str(), e))?;

        let status = response.status();
        if !status.is_redirection() {
            warn!(status = status.as_u16(), "login rejected");
            return Err(ClientError::login_rejected(status.as_u16()));
        }

        self.logged_in = true;
        info!(username, "login succeeded");
        Ok(())
    }

    /// Signs out of the session, best effort.
    ///
    /// The sign-out response is not verified; Bitbucket gives no reliable
    /// signal here (known limitation carried over from the original client).
    /// The session is marked unauthenticated regardless.
    ///
    /// # Errors
    ///
    /// [`ClientError::Auth`] if no login preceded the call, or
    /// [`ClientError::Network`] if the request itself cannot be sent.
    #[instrument(level = "debug", skip(self))]
    pub async fn logout(&mut self) -> Result<(), ClientError> {
        if !self.logged_in {
            return Err(ClientError::auth_required("logout"));
        }
        let signout_url = self.signout_url()?;
        self.http
            .get(signout_url.clone())
            .send()
            .await
            .map_err(|e| ClientError::network(signout_url.as_str(), e))?;
        self.logged_in = false;
        info!("signed out");
        Ok(())
    }

    /// Retrieves the list of files available for download.
    ///
    /// Items come back in the order rows appear on the page (most recent
    /// upload first). An empty listing is an empty vector, not an error.
    ///
    /// # Errors
    ///
    /// [`ClientError::Fetch`] for a non-success response status, or
    /// [`ClientError::Network`] for transport failures.
    #[instrument(level = "debug", skip(self))]
    pub async fn list(&self) -> Result<Vec<DownloadItem>, ClientError> {
        let response = self
            .http
            .get(self.page_url.clone())
            .send()
            .await
            .map_err(|e| ClientError::network(self.page_url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::fetch(self.page_url.as_str(), status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ClientError::network(self.page_url.as_str(), e))?;
        Ok(listing::parse_downloads_page(&body))
    }

    /// Uploads a file to the Downloads page.
    ///
    /// A stream payload is fully drained into memory first, since Bitbucket
    /// requires a known-length multipart body. Success is the absence of a
    /// transport error: the site returns no structured outcome for uploads,
    /// so the response body is not validated (known limitation carried over
    /// from the original client).
    ///
    /// # Errors
    ///
    /// [`ClientError::Validation`] for an empty filename and
    /// [`ClientError::Auth`] when not logged in, both before any network
    /// call. [`ClientError::Io`] if draining a stream payload fails,
    /// [`ClientError::Token`] if the token refresh yields no CSRF cookie,
    /// and [`ClientError::Network`] for transport failures.
    #[instrument(level = "debug", skip(self, payload))]
    pub async fn upload(
        &mut self,
        filename: &str,
        payload: impl Into<Payload>,
    ) -> Result<(), ClientError> {
        if filename.is_empty() {
            return Err(ClientError::validation(
                "filename must be a non-empty string",
            ));
        }
        if !self.logged_in {
            return Err(ClientError::auth_required("upload"));
        }

        let bytes = payload.into().into_bytes().await.map_err(ClientError::io)?;
        let token = self.refresh_csrf().await?;

        let file_part = multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str("application/octet-stream")
            .map_err(|e| ClientError::network(self.page_url.as_str(), e))?;
        let form = multipart::Form::new()
            .text(CSRF_FIELD, token)
            .text("token", "")
            .part("file", file_part);

        self.http
            .post(self.page_url.clone())
            .header(REFERER, self.page_url.as_str())
            .multipart(form)
            .send()
            .await
            .map_err(|e| ClientError::network(self.page_url.as_str(), e))?;

        info!(filename, "upload submitted");
        Ok(())
    }

    /// Removes files from the Downloads page.
    ///
    /// Refreshes the CSRF token once, then issues one delete post per id,
    /// sequentially, reusing the same token across the batch. Every id is
    /// attempted; per-id outcomes are collected in the returned
    /// [`RemoveReport`] and the caller's ids are never mutated.
    ///
    /// # Errors
    ///
    /// [`ClientError::Auth`] when not logged in (before any network call),
    /// [`ClientError::Token`] if the token refresh yields no CSRF cookie, or
    /// [`ClientError::Network`] if the refresh fetch itself fails. Per-id
    /// delete failures are reported through the [`RemoveReport`], not as an
    /// error.
    #[instrument(level = "debug", skip(self, ids))]
    pub async fn remove<I, S>(&mut self, ids: I) -> Result<RemoveReport, ClientError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if !self.logged_in {
            return Err(ClientError::auth_required("remove"));
        }

        let token = self.refresh_csrf().await?;

        let mut report = RemoveReport::default();
        for id in ids {
            let id = id.into();
            let form = [
                (CSRF_FIELD, token.as_str()),
                ("token", ""),
                ("file_id", id.as_str()),
            ];
            let result = self
                .http
                .post(self.delete_url.clone())
                .header(REFERER, self.page_url.as_str())
                .form(&form)
                .send()
                .await;
            match result {
                Ok(_) => {
                    debug!(id = %id, "delete submitted");
                    report.removed.push(id);
                }
                Err(e) => {
                    warn!(id = %id, error = %e, "delete failed");
                    let url = self.delete_url.as_str().to_string();
                    report.failed.push((id, ClientError::network(url, e)));
                }
            }
        }

        info!(
            removed = report.removed.len(),
            failed = report.failed.len(),
            "remove batch finished"
        );
        Ok(report)
    }

    /// Removes a single file. Convenience wrapper around [`Client::remove`]
    /// with a one-element batch.
    ///
    /// # Errors
    ///
    /// Same as [`Client::remove`].
    pub async fn remove_one(&mut self, id: &str) -> Result<RemoveReport, ClientError> {
        self.remove([id]).await
    }

    /// Fetches the Downloads page purely to make Bitbucket issue a fresh
    /// CSRF cookie, then reads the token back from the jar.
    async fn refresh_csrf(&self) -> Result<String, ClientError> {
        debug!(url = %self.page_url, "refreshing CSRF token");
        self.http
            .get(self.page_url.clone())
            .send()
            .await
            .map_err(|e| ClientError::network(self.page_url.as_str(), e))?;
        self.csrf_token()
            .ok_or_else(|| ClientError::token(self.page_url.as_str()))
    }

    /// Reads the CSRF token out of the session cookie jar, if present.
    fn csrf_token(&self) -> Option<String> {
        let header = self.cookie_jar.cookies(&self.base_url)?;
        let raw = header.to_str().ok()?;
        raw.split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == CSRF_COOKIE)
            .map(|(_, value)| value.to_string())
    }

    fn signin_url(&self) -> Result<Url, ClientError> {
        self.site_url("/account/signin/")
    }

    fn signout_url(&self) -> Result<Url, ClientError> {
        self.site_url("/account/signout/")
    }

    fn site_url(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::validation(format!("invalid URL path {path}: {e}")))
    }
}

/// Validates an `owner/repo` repository identifier.
fn validate_repository(repository: &str) -> Result<(), ClientError> {
    let well_formed = matches!(
        repository.split('/').collect::<Vec<_>>().as_slice(),
        [owner, repo] if !owner.is_empty() && !repo.is_empty()
    ) && !repository.contains(char::is_whitespace);

    if well_formed {
        Ok(())
    } else {
        Err(ClientError::validation(format!(
            "repository must be in owner/repo format, got {repository:?}"
        )))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_derives_page_url_from_repository() {
        let client = Client::new("team/proj").unwrap();
        assert_eq!(client.page_url(), "https://bitbucket.org/team/proj/downloads");
        assert!(!client.is_logged_in());
    }

    #[test]
    fn test_with_base_url_strips_trailing_slash() {
        let client = Client::with_base_url("team/proj", "http://127.0.0.1:9000/").unwrap();
        assert_eq!(client.page_url(), "http://127.0.0.1:9000/team/proj/downloads");
    }

    #[test]
    fn test_rejects_malformed_repository_identifiers() {
        for bad in ["", "noslash", "a/b/c", "/repo", "owner/", "owner /repo"] {
            let result = Client::new(bad);
            assert!(
                matches!(result, Err(ClientError::Validation { .. })),
                "expected Validation error for {bad:?}"
            );
        }
    }

    #[test]
    fn test_rejects_malformed_base_url() {
        let result = Client::with_base_url("team/proj", "not a url");
        assert!(matches!(result, Err(ClientError::Validation { .. })));
    }

    #[test]
    fn test_delete_url_is_page_url_plus_delete() {
        let client = Client::new("team/proj").unwrap();
        assert_eq!(
            client.delete_url.as_str(),
            "https://bitbucket.org/team/proj/downloads/delete"
        );
    }

    #[test]
    fn test_csrf_token_absent_on_fresh_session() {
        let client = Client::new("team/proj").unwrap();
        assert!(client.csrf_token().is_none());
    }

    #[test]
    fn test_csrf_token_read_from_jar() {
        let client = Client::new("team/proj").unwrap();
        client.cookie_jar.add_cookie_str(
            "csrftoken=tok-123; Path=/",
            &"https://bitbucket.org/".parse::<Url>().unwrap(),
        );
        client.cookie_jar.add_cookie_str(
            "sessionid=abc; Path=/",
            &"https://bitbucket.org/".parse::<Url>().unwrap(),
        );
        assert_eq!(client.csrf_token().as_deref(), Some("tok-123"));
    }

    #[tokio::test]
    async fn test_logout_before_login_fails_with_auth() {
        let mut client = Client::new("team/proj").unwrap();
        let result = client.logout().await;
        assert!(matches!(result, Err(ClientError::Auth { .. })));
    }

    #[tokio::test]
    async fn test_upload_empty_filename_fails_with_validation() {
        let mut client = Client::new("team/proj").unwrap();
        let result = client.upload("", "data").await;
        assert!(matches!(result, Err(ClientError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_upload_before_login_fails_with_auth() {
        let mut client = Client::new("team/proj").unwrap();
        let result = client.upload("file.txt", "data").await;
        assert!(matches!(result, Err(ClientError::Auth { .. })));
    }

    #[tokio::test]
    async fn test_remove_before_login_fails_with_auth() {
        let mut client = Client::new("team/proj").unwrap();
        let result = client.remove(["123"]).await;
        assert!(matches!(result, Err(ClientError::Auth { .. })));
    }

    #[test]
    fn test_remove_report_all_removed() {
        let mut report = RemoveReport::default();
        report.removed.push("1".to_string());
        assert!(report.all_removed());

        report
            .failed
            .push(("2".to_string(), ClientError::token("http://x/")));
        assert!(!report.all_removed());
    }
}
