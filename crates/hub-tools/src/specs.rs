//! Declarative tool kinds. Unlike `Tool` (a trait object with a Rust
//! handler), these describe the call entirely as data — the dispatcher
//! interprets the spec at execution time.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::ToolError;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailToolSpec {
    pub name: String,
    pub description: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_address: String,
}

impl EmailToolSpec {
    pub fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "to": {"type": "string", "description": "Recipient email address"},
                "subject": {"type": "string"},
                "body": {"type": "string"},
            },
            "required": ["to", "subject", "body"],
        })
    }

    pub async fn execute(&self, params: &HashMap<String, Value>) -> Result<String, ToolError> {
        let to = require_string(params, &self.name, "to")?;
        let subject = require_string(params, &self.name, "subject")?;
        let body = require_string(params, &self.name, "body")?;

        let email = lettre::Message::builder()
            .from(self.from_address.parse().map_err(|e| {
                ToolError::HandlerFailed(self.name.clone(), format!("invalid from address: {e}"))
            })?)
            .to(to.parse().map_err(|e| {
                ToolError::HandlerFailed(self.name.clone(), format!("invalid recipient: {e}"))
            })?)
            .subject(subject)
            .body(body)
            .map_err(|e| ToolError::HandlerFailed(self.name.clone(), e.to_string()))?;

        let creds = lettre::transport::smtp::authentication::Credentials::new(
            self.smtp_username.clone(),
            self.smtp_password.clone(),
        );

        let mailer = lettre::AsyncSmtpTransport::<lettre::Tokio1Executor>::relay(&self.smtp_host)
            .map_err(|e| ToolError::HandlerFailed(self.name.clone(), e.to_string()))?
            .port(self.smtp_port)
            .credentials(creds)
            .build();

        use lettre::AsyncTransport;
        mailer
            .send(email)
            .await
            .map_err(|e| ToolError::HandlerFailed(self.name.clone(), e.to_string()))?;

        Ok(format!("Email sent to {to}"))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDatabaseType {
    Postgresql,
    Mysql,
    Mssql,
    Oracle,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlToolSpec {
    pub name: String,
    pub description: String,
    pub database_type: SqlDatabaseType,
    pub connection_string: String,
    /// Parameterized query template; `params["query_params"]` supplies positional binds.
    pub query_template: String,
}

const DANGEROUS_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "TRUNCATE", "ALTER", "CREATE", "INSERT", "UPDATE",
];

impl SqlToolSpec {
    pub fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query_params": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Positional parameters substituted into the query template",
                },
            },
            "required": [],
        })
    }

    /// Logs (but does not block) queries containing DDL/DML keywords.
    fn flag_dangerous_keywords(&self) {
        let upper = self.query_template.to_uppercase();
        for kw in DANGEROUS_KEYWORDS {
            if upper.contains(kw) {
                tracing::warn!(tool = %self.name, keyword = %kw, "sql tool query contains a dangerous keyword");
            }
        }
    }

    pub async fn execute(&self, params: &HashMap<String, Value>) -> Result<String, ToolError> {
        self.flag_dangerous_keywords();

        let query_params: Vec<String> = params
            .get("query_params")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();

        match self.database_type {
            SqlDatabaseType::Postgresql => self.execute_postgres(&query_params).await,
            other => Err(ToolError::UnsupportedDatabase(
                self.name.clone(),
                format!("{other:?}"),
            )),
        }
    }

    async fn execute_postgres(&self, query_params: &[String]) -> Result<String, ToolError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(1)
            .connect(&self.connection_string)
            .await
            .map_err(|e| ToolError::HandlerFailed(self.name.clone(), e.to_string()))?;

        let mut query = sqlx::query(&self.query_template);
        for p in query_params {
            query = query.bind(p);
        }

        let rows = query
            .fetch_all(&pool)
            .await
            .map_err(|e| ToolError::HandlerFailed(self.name.clone(), e.to_string()))?;

        Ok(format!("Query returned {} row(s)", rows.len()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    fn as_reqwest(&self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestToolSpec {
    pub name: String,
    pub description: String,
    pub method: HttpMethod,
    pub url_template: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl RestToolSpec {
    pub fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {"type": "string", "description": "Overrides the configured URL when present"},
                "body": {"type": "object", "description": "JSON request body"},
            },
            "required": [],
        })
    }

    pub async fn execute(&self, params: &HashMap<String, Value>) -> Result<String, ToolError> {
        let url = params
            .get("url")
            .and_then(|v| v.as_str())
            .map(String::from)
            .unwrap_or_else(|| self.url_template.clone());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| ToolError::HandlerFailed(self.name.clone(), e.to_string()))?;

        let mut req = client.request(self.method.as_reqwest(), &url);
        for (k, v) in &self.headers {
            req = req.header(k, v);
        }
        if let Some(body) = params.get("body") {
            req = req.json(body);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| ToolError::HandlerFailed(self.name.clone(), e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ToolError::HandlerFailed(self.name.clone(), e.to_string()))?;

        Ok(format!("HTTP {status}: {text}"))
    }
}

fn require_string(
    params: &HashMap<String, Value>,
    tool_name: &str,
    key: &str,
) -> Result<String, ToolError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| {
            ToolError::HandlerFailed(tool_name.to_string(), format!("missing parameter: {key}"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dangerous_keyword_detection_does_not_panic() {
        let spec = SqlToolSpec {
            name: "lookup".into(),
            description: "d".into(),
            database_type: SqlDatabaseType::Postgresql,
            connection_string: "postgres://localhost/db".into(),
            query_template: "DROP TABLE users".into(),
        };
        spec.flag_dangerous_keywords();
    }

    #[test]
    fn test_mysql_routes_to_unsupported() {
        let spec = SqlToolSpec {
            name: "lookup".into(),
            description: "d".into(),
            database_type: SqlDatabaseType::Mysql,
            connection_string: "mysql://localhost/db".into(),
            query_template: "SELECT 1".into(),
        };
        assert!(matches!(spec.database_type, SqlDatabaseType::Mysql));
    }

    #[test]
    fn test_rest_spec_default_timeout() {
        let json = serde_json::json!({
            "name": "ping",
            "description": "d",
            "method": "GET",
            "urlTemplate": "https://example.com",
        });
        let spec: RestToolSpec = serde_json::from_value(json).unwrap();
        assert_eq!(spec.timeout_secs, 30);
    }

    #[test]
    fn test_http_method_maps_to_reqwest() {
        assert_eq!(HttpMethod::Post.as_reqwest(), reqwest::Method::POST);
        assert_eq!(HttpMethod::Get.as_reqwest(), reqwest::Method::GET);
    }
}
