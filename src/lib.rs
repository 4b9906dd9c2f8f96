//! Bitbucket Downloads page client.
//!
//! This library automates the "Downloads" page of a Bitbucket repository by
//! simulating a browser session: form-based sign-in, HTML scraping to list
//! uploaded files, multipart upload, and form-post deletion. The page markup
//! is version-fragile; all selector knowledge is isolated in the [`listing`]
//! module so the client itself never depends on page structure.
//!
//! # Architecture
//!
//! - [`client`] - the session client (login, logout, list, upload, remove)
//! - [`listing`] - HTML-in, items-out extraction for the Downloads table
//!
//! # Example
//!
//! ```no_run
//! use bitbucket_downloads::Client;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = Client::new("team/proj")?;
//! client.login("user", "password").await?;
//! for item in client.list().await? {
//!     println!("{} ({}, {} downloads)", item.name, item.size, item.count);
//! }
//! client.logout().await?;
//! # Ok(())
//! # }
//! ```

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod listing;

mod user_agent;

// Re-export commonly used types
pub use client::error::ClientError;
pub use client::payload::Payload;
pub use client::{Client, DEFAULT_BASE_URL, RemoveReport};
pub use listing::{DownloadItem, parse_downloads_page};
