//! Environment-driven configuration.
//!
//! Everything comes from environment variables, with two legacy file
//! fallbacks. `IG_USERNAME`/`IG_PASSWORD` (or `login_details.txt`) log in
//! to the story service and `PCLOUD_EMAIL`/`PCLOUD_PASSWORD` to the remote
//! mirror. `USERNAMES_URL` (or `usernames.txt`) lists the accounts to
//! archive, `TIMEZONE_NAME` fixes the timezone encoded into filenames, and
//! `ERROR_REPORT_URL` enables the failure webhook. Empty values count as
//! unset.

use std::fmt;

use anyhow::{Context, Result};
use chrono_tz::Tz;

/// Fallback credentials file: source username on the first line, password
/// on the second.
pub const LOGIN_DETAILS_FILE: &str = "login_details.txt";
/// Fallback account list, one account name per line.
pub const USERNAMES_FILE: &str = "usernames.txt";

/// Application configuration. Credential fields stay optional here; each
/// command validates the subset it actually needs, so `repair` runs
/// without any credentials at all.
pub struct Config {
    pub remote_email: Option<String>,
    pub remote_password: Option<String>,
    pub source_username: Option<String>,
    pub source_password: Option<String>,
    pub usernames_url: Option<String>,
    pub error_report_url: Option<String>,
    pub timezone: Option<Tz>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("remote_email", &self.remote_email)
            .field(
                "remote_password",
                &self.remote_password.as_ref().map(|_| "<redacted>"),
            )
            .field("source_username", &self.source_username)
            .field(
                "source_password",
                &self.source_password.as_ref().map(|_| "<redacted>"),
            )
            .field("usernames_url", &self.usernames_url)
            .field("error_report_url", &self.error_report_url)
            .field("timezone", &self.timezone)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let timezone = match get("TIMEZONE_NAME") {
            Some(name) => Some(
                name.parse::<Tz>()
                    .map_err(|e| anyhow::anyhow!("Invalid TIMEZONE_NAME {:?}: {}", name, e))?,
            ),
            None => None,
        };
        Ok(Self {
            remote_email: get("PCLOUD_EMAIL"),
            remote_password: get("PCLOUD_PASSWORD"),
            source_username: get("IG_USERNAME"),
            source_password: get("IG_PASSWORD"),
            usernames_url: get("USERNAMES_URL"),
            error_report_url: get("ERROR_REPORT_URL"),
            timezone,
        })
    }

    /// Story-service credentials: the environment pair when both are set,
    /// otherwise the legacy two-line credentials file.
    pub fn source_credentials(&self) -> Result<SourceCredentials> {
        if let (Some(username), Some(password)) = (&self.source_username, &self.source_password) {
            return Ok(SourceCredentials {
                username: username.clone(),
                password: password.clone(),
            });
        }
        let contents = std::fs::read_to_string(LOGIN_DETAILS_FILE).with_context(|| {
            format!(
                "IG_USERNAME/IG_PASSWORD are not set and {LOGIN_DETAILS_FILE} is unreadable"
            )
        })?;
        parse_login_details(&contents)
    }

    pub fn remote_credentials(&self) -> Result<RemoteCredentials> {
        let email = self
            .remote_email
            .clone()
            .context("PCLOUD_EMAIL is not set")?;
        let password = self
            .remote_password
            .clone()
            .context("PCLOUD_PASSWORD is not set")?;
        Ok(RemoteCredentials { email, password })
    }
}

/// Story-service login pair.
#[derive(Clone)]
pub struct SourceCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for SourceCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Remote-storage login pair.
#[derive(Clone)]
pub struct RemoteCredentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for RemoteCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteCredentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn parse_login_details(contents: &str) -> Result<SourceCredentials> {
    let mut lines = contents.lines().map(str::trim);
    let username = lines
        .next()
        .filter(|line| !line.is_empty())
        .with_context(|| format!("{LOGIN_DETAILS_FILE} is missing the username line"))?;
    let password = lines
        .next()
        .filter(|line| !line.is_empty())
        .with_context(|| format!("{LOGIN_DETAILS_FILE} is missing the password line"))?;
    Ok(SourceCredentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_from_lookup_all_set() {
        let config = Config::from_lookup(lookup_from(&[
            ("PCLOUD_EMAIL", "a@example.com"),
            ("PCLOUD_PASSWORD", "pw1"),
            ("IG_USERNAME", "alice"),
            ("IG_PASSWORD", "pw2"),
            ("USERNAMES_URL", "https://example.com/accounts.txt"),
            ("ERROR_REPORT_URL", "https://hooks.example.com/fail"),
            ("TIMEZONE_NAME", "Asia/Tokyo"),
        ]))
        .unwrap();
        assert_eq!(config.remote_email.as_deref(), Some("a@example.com"));
        assert_eq!(config.source_username.as_deref(), Some("alice"));
        assert_eq!(config.timezone, Some(Tz::Asia__Tokyo));
        let remote = config.remote_credentials().unwrap();
        assert_eq!(remote.email, "a@example.com");
        let source = config.source_credentials().unwrap();
        assert_eq!(source.username, "alice");
        assert_eq!(source.password, "pw2");
    }

    #[test]
    fn test_from_lookup_nothing_set() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert!(config.remote_email.is_none());
        assert!(config.timezone.is_none());
        assert!(config.remote_credentials().is_err());
    }

    #[test]
    fn test_empty_values_count_as_unset() {
        let config =
            Config::from_lookup(lookup_from(&[("PCLOUD_EMAIL", ""), ("IG_USERNAME", "  ")]))
                .unwrap();
        assert!(config.remote_email.is_none());
        assert!(config.source_username.is_none());
    }

    #[test]
    fn test_invalid_timezone_is_rejected() {
        let err = Config::from_lookup(lookup_from(&[("TIMEZONE_NAME", "Mars/Olympus")]))
            .unwrap_err();
        assert!(err.to_string().contains("Mars/Olympus"));
    }

    #[test]
    fn test_parse_login_details() {
        let creds = parse_login_details("alice\nhunter2\n").unwrap();
        assert_eq!(creds.username, "alice");
        assert_eq!(creds.password, "hunter2");
    }

    #[test]
    fn test_parse_login_details_windows_line_endings() {
        let creds = parse_login_details("alice\r\nhunter2\r\n").unwrap();
        assert_eq!(creds.username, "alice");
        assert_eq!(creds.password, "hunter2");
    }

    #[test]
    fn test_parse_login_details_missing_lines() {
        assert!(parse_login_details("").is_err());
        assert!(parse_login_details("alice\n").is_err());
        assert!(parse_login_details("alice\n\n").is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = Config::from_lookup(lookup_from(&[
            ("PCLOUD_PASSWORD", "remote-secret"),
            ("IG_PASSWORD", "source-secret"),
        ]))
        .unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("remote-secret"));
        assert!(!rendered.contains("source-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
