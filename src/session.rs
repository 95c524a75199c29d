use crate::config::Profile;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One tabular result returned by the warehouse. Held in memory only for the
/// duration of a render pass; values are kept exactly as the SQL API returned
/// them (mostly strings, sometimes numbers or nulls).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RowSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Case-insensitive column lookup (the warehouse uppercases identifiers).
    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    fn value_at(&self, row: usize, name: &str) -> Option<&Value> {
        let col = self.column(name)?;
        self.rows.get(row)?.get(col)
    }

    pub fn str_at(&self, row: usize, name: &str) -> Option<&str> {
        self.value_at(row, name)?.as_str()
    }

    pub fn f64_at(&self, row: usize, name: &str) -> Option<f64> {
        match self.value_at(row, name)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn i64_at(&self, row: usize, name: &str) -> Option<i64> {
        match self.value_at(row, name)? {
            Value::Number(n) => n.as_i64(),
            // Numeric columns can come back as "42" or "42.000"
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
            }
            _ => None,
        }
    }

    /// Cell rendered for table display.
    pub fn display(&self, row: usize, col: usize) -> String {
        match self.rows.get(row).and_then(|r| r.get(col)) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(v) => v.to_string(),
        }
    }
}

/// Handle to an authenticated warehouse session. The dashboard only ever
/// builds SQL strings and hands them to this seam; everything non-trivial
/// (NL-to-SQL, sentiment, forecasting) happens on the other side of it.
#[async_trait]
pub trait WarehouseSession: Send + Sync {
    /// Executes a single SQL statement and collects the full result set.
    async fn query(&self, sql: &str) -> Result<RowSet>;
}

#[derive(Serialize)]
struct StatementRequest<'a> {
    statement: &'a str,
    timeout: u64,
    database: &'a str,
    schema: &'a str,
    warehouse: &'a str,
}

#[derive(Deserialize)]
struct StatementResponse {
    #[serde(rename = "resultSetMetaData")]
    metadata: Option<ResultSetMetaData>,
    #[serde(default)]
    data: Vec<Vec<Value>>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct ResultSetMetaData {
    #[serde(rename = "rowType")]
    row_type: Vec<ColumnType>,
}

#[derive(Deserialize)]
struct ColumnType {
    name: String,
}

fn rowset_from_response(response: StatementResponse) -> RowSet {
    let columns = response
        .metadata
        .map(|m| m.row_type.into_iter().map(|c| c.name).collect())
        .unwrap_or_default();
    RowSet {
        columns,
        rows: response.data,
    }
}

/// Client for the warehouse SQL REST API
/// (`POST {account_url}/api/v2/statements`, bearer auth).
pub struct RestSession {
    client: reqwest::Client,
    endpoint: String,
    token: String,
    database: String,
    schema: String,
    warehouse: String,
}

impl RestSession {
    // Forecast model training runs inside one statement, so be generous.
    const STATEMENT_TIMEOUT_SECS: u64 = 120;

    pub fn connect(profile: &Profile) -> Result<Self> {
        let token = profile.token()?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(
                Self::STATEMENT_TIMEOUT_SECS + 10,
            ))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/v2/statements", profile.account_url),
            token,
            database: profile.database.clone(),
            schema: profile.schema.clone(),
            warehouse: profile.warehouse.clone(),
        })
    }
}

#[async_trait]
impl WarehouseSession for RestSession {
    async fn query(&self, sql: &str) -> Result<RowSet> {
        log::debug!("Executing statement: {}", sql.trim());

        let request = StatementRequest {
            statement: sql,
            timeout: Self::STATEMENT_TIMEOUT_SECS,
            database: &self.database,
            schema: &self.schema,
            warehouse: &self.warehouse,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .json(&request)
            .send()
            .await
            .context("Warehouse request failed")?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            let preview: String = body.chars().take(500).collect();
            log::error!("Statement failed with {}: {}", status, preview);
            anyhow::bail!("Warehouse returned {}: {}", status, preview);
        }

        let parsed: StatementResponse = serde_json::from_str(&body)
            .with_context(|| {
                let preview: String = body.chars().take(200).collect();
                format!("Failed to parse warehouse response: {}", preview)
            })?;

        if let Some(message) = &parsed.message {
            log::debug!("Warehouse message: {}", message);
        }

        let rows = rowset_from_response(parsed);
        log::debug!("Statement returned {} rows", rows.len());
        Ok(rows)
    }
}
