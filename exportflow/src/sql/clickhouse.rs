//! ClickHouse over its HTTP interface (port 8123, not the native 9000).

use super::connection::{CommandOutcome, SqlConnection, SqlConnector, SqlError};
use crate::config::ClickHouseSettings;
use crate::errors::{ConfigurationError, ConnectionError, ExportflowError};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::debug;

const USER_HEADER: &str = "X-ClickHouse-User";
const KEY_HEADER: &str = "X-ClickHouse-Key";
const SUMMARY_HEADER: &str = "X-ClickHouse-Summary";

/// Progress summary ClickHouse attaches to every HTTP response.
///
/// Numbers are sent as strings.
#[derive(Debug, Default, Deserialize)]
struct QuerySummary {
    #[serde(default)]
    written_rows: Option<String>,
}

impl QuerySummary {
    fn written_rows(&self) -> Option<u64> {
        self.written_rows.as_deref().and_then(|v| v.parse().ok())
    }
}

/// Opens ClickHouse HTTP sessions.
#[derive(Debug, Clone)]
pub struct ClickHouseConnector {
    settings: ClickHouseSettings,
    client: Client,
    endpoint: Url,
}

impl ClickHouseConnector {
    /// Creates a connector for `settings`.
    pub fn new(settings: ClickHouseSettings) -> Result<Self, ExportflowError> {
        let base = format!("http://{}:{}/", settings.host, settings.port);
        let endpoint = Url::parse_with_params(&base, &[("database", settings.database.as_str())])
            .map_err(|e| ConfigurationError::invalid_value("CLICKHOUSE_HOST", format!("{base} ({e})")))?;

        let client = Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| ConnectionError::new(base.clone(), e.to_string()))?;

        Ok(Self {
            settings,
            client,
            endpoint,
        })
    }

    fn ping_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        url.set_path("/ping");
        url.set_query(None);
        url
    }
}

#[async_trait]
impl SqlConnector for ClickHouseConnector {
    fn target(&self) -> String {
        format!("{}:{}", self.settings.host, self.settings.port)
    }

    async fn connect(&self) -> Result<Box<dyn SqlConnection>, ExportflowError> {
        let response = self
            .client
            .get(self.ping_url())
            .send()
            .await
            .map_err(|e| ConnectionError::new(self.target(), e.to_string()))?;

        if !response.status().is_success() {
            return Err(ConnectionError::new(
                self.target(),
                format!("ping returned HTTP {}", response.status()),
            )
            .into());
        }

        debug!(target_db = %self.target(), database = %self.settings.database, "Connected");
        Ok(Box::new(ClickHouseConnection {
            client: self.client.clone(),
            endpoint: self.endpoint.clone(),
            target: self.target(),
            user: self.settings.user.clone(),
            password: self.settings.password.clone(),
            released: false,
        }))
    }
}

/// One ClickHouse HTTP session.
#[derive(Debug)]
pub struct ClickHouseConnection {
    client: Client,
    endpoint: Url,
    target: String,
    user: String,
    password: String,
    released: bool,
}

impl ClickHouseConnection {
    async fn post(&self, sql: &str) -> Result<(String, QuerySummary), SqlError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .header(USER_HEADER, &self.user)
            .header(KEY_HEADER, &self.password)
            .body(sql.to_string())
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        let summary: QuerySummary = response
            .headers()
            .get(SUMMARY_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| serde_json::from_str(v).ok())
            .unwrap_or_default();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(&e))?;

        if !status.is_success() {
            return Err(SqlError::server(Some(status.as_u16()), body.trim()));
        }
        Ok((body, summary))
    }

    fn transport_error(&self, err: &reqwest::Error) -> SqlError {
        if err.is_connect() || err.is_timeout() || err.is_request() {
            SqlError::Connection(ConnectionError::new(self.target.clone(), err.to_string()))
        } else {
            SqlError::server(err.status().map(|s| s.as_u16()), err.to_string())
        }
    }
}

#[async_trait]
impl SqlConnection for ClickHouseConnection {
    async fn query_scalar(&mut self, sql: &str) -> Result<Option<u64>, SqlError> {
        let (body, _) = self.post(&format!("{sql} FORMAT TabSeparated")).await?;
        parse_scalar(&body)
    }

    async fn execute(&mut self, sql: &str) -> Result<CommandOutcome, SqlError> {
        let (body, summary) = self.post(sql).await?;
        let output = body.trim();
        Ok(CommandOutcome {
            output: (!output.is_empty()).then(|| output.to_string()),
            affected_rows: summary.written_rows(),
        })
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            debug!(target_db = %self.target, "Connection released");
        }
    }
}

fn parse_scalar(body: &str) -> Result<Option<u64>, SqlError> {
    let Some(first) = body.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return Ok(None);
    };
    let cell = first.split('\t').next().unwrap_or(first);
    cell.parse::<u64>()
        .map(Some)
        .map_err(|_| SqlError::server(None, format!("expected an integer, got '{cell}'")))
}
