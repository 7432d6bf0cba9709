use std::time::Duration;

use chrono::Local;
use serde_json::Value;
use tracing::debug;

use crate::logger::{MessageLogMode, MessageLogger};
use crate::protocol::{
    login_body, parse_energy_usage_response, parse_login_response, parse_thermostats_response,
    usage_query, DEFAULT_BASE_URL,
};
use crate::types::{SessionToken, Thermostat, UsageWindow};
use crate::{Error, Result};

const HTTP_TIMEOUT_SECS: u64 = 30;

/// Thin client for the vendor cloud API: one login endpoint, one thermostat
/// listing, one per-device usage history fetch. Holds the session token for
/// a single credential pair and does no scheduling or aggregation of its own.
pub struct DitraClient {
    http: reqwest::Client,
    base_url: String,
    email: String,
    password: String,
    session: Option<SessionToken>,
    logger: Option<MessageLogger>,
}

impl DitraClient {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .expect("failed to build HTTP client");

        Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            email: email.into(),
            password: password.into(),
            session: None,
            logger: None,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_message_log(mut self, mode: MessageLogMode, path: &str) -> Result<Self> {
        self.logger = Some(MessageLogger::new(mode, path)?);
        Ok(self)
    }

    /// Exchange the credentials for a session token. The token is kept on the
    /// client for subsequent calls and also returned to the caller.
    pub async fn login(&mut self) -> Result<SessionToken> {
        let url = format!("{}/authenticate/user", self.base_url);
        let body = login_body(&self.email, &self.password);
        debug!(url = %url, "authenticating");

        if let Some(ref mut logger) = self.logger {
            logger.log_request("POST", "/authenticate/user", Some(&body));
        }

        let resp = self.http.post(&url).json(&body).send().await?;
        let status = resp.status().as_u16();
        match status {
            401 | 403 => {
                return Err(Error::Auth(format!("login rejected with status {status}")));
            }
            s if (400..600).contains(&s) => {
                resp.error_for_status()?;
                unreachable!();
            }
            _ => {}
        }

        let text = resp.text().await?;
        if let Some(ref mut logger) = self.logger {
            let body_json = serde_json::from_str(&text).unwrap_or(Value::Null);
            logger.log_response(status, &body_json);
        }

        let token = parse_login_response(&text)?;
        self.session = Some(token.clone());
        Ok(token)
    }

    /// Fetch the account's thermostats as a flat list in vendor order, with
    /// empty usage windows.
    pub async fn list_thermostats(&mut self) -> Result<Vec<Thermostat>> {
        let session = self.session()?;
        let url = format!("{}/thermostats", self.base_url);
        let query = [("sessionId", session.as_str().to_string())];
        debug!(url = %url, "listing thermostats");

        if let Some(ref mut logger) = self.logger {
            logger.log_request("GET", "/thermostats", None);
        }

        let resp = self.http.get(&url).query(&query).send().await?;
        let status = resp.status().as_u16();
        match status {
            401 | 403 => {
                return Err(Error::Auth(format!("session rejected with status {status}")));
            }
            s if (400..600).contains(&s) => {
                resp.error_for_status()?;
                unreachable!();
            }
            _ => {}
        }

        let text = resp.text().await?;
        if let Some(ref mut logger) = self.logger {
            let body_json = serde_json::from_str(&text).unwrap_or(Value::Null);
            logger.log_response(status, &body_json);
        }

        parse_thermostats_response(&text)
    }

    /// Fetch a rolling usage history of `window_count` days ending today for
    /// one thermostat.
    pub async fn fetch_usage(
        &mut self,
        serial_number: &str,
        window_count: usize,
    ) -> Result<Vec<UsageWindow>> {
        let session = self.session()?;
        let url = format!("{}/energyusage", self.base_url);
        // history=N returns N+1 days counting back from the anchor date
        let history = window_count.saturating_sub(1);
        let today = Local::now().date_naive();
        let query = usage_query(session, serial_number, today, history);
        debug!(url = %url, serial = %serial_number, history, "fetching energy usage");

        if let Some(ref mut logger) = self.logger {
            let path = format!("/energyusage?serialnumber={serial_number}");
            logger.log_request("GET", &path, None);
        }

        let resp = self.http.get(&url).query(&query).send().await?;
        let status = resp.status().as_u16();
        match status {
            401 | 403 => {
                return Err(Error::Auth(format!("session rejected with status {status}")));
            }
            s if (400..600).contains(&s) => {
                resp.error_for_status()?;
                unreachable!();
            }
            _ => {}
        }

        let text = resp.text().await?;
        if let Some(ref mut logger) = self.logger {
            let body_json = serde_json::from_str(&text).unwrap_or(Value::Null);
            logger.log_response(status, &body_json);
        }

        parse_energy_usage_response(&text, window_count)
    }

    fn session(&self) -> Result<&SessionToken> {
        self.session.as_ref().ok_or(Error::NotAuthenticated)
    }
}
