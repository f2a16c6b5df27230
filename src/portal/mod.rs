//! Portal handshake: the web front end that schedules a database sync
//! before a preprocess run.
//!
//! The portal is a classic cookie-session web app behind a redirecting
//! load balancer. The handshake discovers the active host by following
//! the redirect, signs in, submits the sync request for the target
//! database, and signs out.

use slog::{info, Logger};

use crate::status::{StatusBus, StatusKey};

/// Where and how to reach the portal.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct PortalConfig {
    pub root_url: String,
    pub username: String,
    pub password: String,
    pub dsn: String,
    pub sbid: String,
    pub sync_host: String,
    pub sync_port: u16,
    pub sync_db_guid: String,
}

#[derive(Debug)]
pub enum PortalError {
    BadUrl(String),
    Http(reqwest::Error),
    UnexpectedStatus { stage: &'static str, status: u16 },
}

impl std::fmt::Display for PortalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortalError::BadUrl(url) => write!(f, "Portal URL is not valid: {}", url),
            PortalError::Http(err) => write!(f, "Portal request failed: {}", err),
            PortalError::UnexpectedStatus { stage, status } => {
                write!(f, "Portal {} returned HTTP {}", stage, status)
            }
        }
    }
}

impl std::error::Error for PortalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PortalError::Http(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for PortalError {
    fn from(err: reqwest::Error) -> Self {
        PortalError::Http(err)
    }
}

/// Cookie-session client for the portal handshake.
pub struct PortalClient {
    http: reqwest::Client,
    config: PortalConfig,
    logger: Logger,
}

impl PortalClient {
    pub fn new(config: PortalConfig, logger: Logger) -> Result<Self, PortalError> {
        let http = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(Self {
            http,
            config,
            logger,
        })
    }

    /// Sign in, submit the sync request, sign out. Progress lands on the
    /// status bus; any failure publishes its message before returning.
    pub async fn login_and_sync(&self, bus: &StatusBus) -> Result<(), PortalError> {
        match self.handshake(bus).await {
            Ok(()) => Ok(()),
            Err(err) => {
                bus.publish(StatusKey::Status, err.to_string());
                Err(err)
            }
        }
    }

    async fn handshake(&self, bus: &StatusBus) -> Result<(), PortalError> {
        let base = self.discover_base().await?;
        info!(self.logger, "portal host resolved"; "base" => &base);

        bus.publish(StatusKey::Status, "Portal login in-progress...");
        let login_form: Vec<(&str, String)> = vec![
            ("viewChanged", "1".to_string()),
            ("viewCommand", "login".to_string()),
            ("dsn", self.config.dsn.clone()),
            ("sbid", self.config.sbid.clone()),
            ("target", String::new()),
            ("username", self.config.username.clone()),
            ("password", self.config.password.clone()),
            ("co", String::new()),
        ];
        let resp = self
            .http
            .post(format!("{}/Login.asp", base))
            .form(&login_form)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(PortalError::UnexpectedStatus {
                stage: "login",
                status: resp.status().as_u16(),
            });
        }
        bus.publish(StatusKey::Status, "Portal login complete");

        let guid = &self.config.sync_db_guid;
        let sync_form: Vec<(String, String)> = vec![
            (
                format!("SSyncDbInfo_{}_hostname", guid),
                self.config.sync_host.clone(),
            ),
            (
                format!("SSyncDbInfo_{}_port", guid),
                self.config.sync_port.to_string(),
            ),
            ("add_co".to_string(), "1".to_string()),
        ];
        let resp = self
            .http
            .post(format!("{}/SyncDb.asp", base))
            .form(&sync_form)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(PortalError::UnexpectedStatus {
                stage: "sync",
                status: resp.status().as_u16(),
            });
        }
        bus.publish(StatusKey::Status, "Sync request submitted");

        let resp = self
            .http
            .get(format!("{}/Logout.asp", base))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(PortalError::UnexpectedStatus {
                stage: "logout",
                status: resp.status().as_u16(),
            });
        }
        bus.publish(StatusKey::Status, "Portal logout complete");
        Ok(())
    }

    /// Follow the root URL through any load-balancer redirect and keep the
    /// origin of wherever it lands, with the original root path.
    async fn discover_base(&self) -> Result<String, PortalError> {
        let root = reqwest::Url::parse(&self.config.root_url)
            .map_err(|_| PortalError::BadUrl(self.config.root_url.clone()))?;
        let resp = self.http.get(root.clone()).send().await?;
        let landed = resp.url();
        let origin = landed.origin().ascii_serialization();
        Ok(format!("{}{}", origin, root.path().trim_end_matches('/')))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_parses_from_json() {
        let json = r#"{
            "root_url": "https://portal.example.com/m3",
            "username": "ops",
            "password": "pw",
            "dsn": "PAYROLL01",
            "sbid": "42",
            "sync_host": "db.example.com",
            "sync_port": 5432,
            "sync_db_guid": "a1b2c3"
        }"#;
        let config: PortalConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.sync_port, 5432);
        assert_eq!(config.sbid, "42");
    }

    #[test]
    fn errors_name_the_failing_stage() {
        let err = PortalError::UnexpectedStatus {
            stage: "login",
            status: 503,
        };
        assert_eq!(err.to_string(), "Portal login returned HTTP 503");
    }
}
