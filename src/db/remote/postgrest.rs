use reqwest::blocking::{RequestBuilder, Response};
use reqwest::StatusCode;
use serde_json::Value;

use super::RestTransport;
use crate::db::StoreError;

/// Blocking client for a PostgREST endpoint (Supabase `rest/v1`).
pub struct PostgrestClient {
    base_url: String,
    api_key: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl PostgrestClient {
    /// No request is made here; the first call reaches the network.
    pub fn new(base_url: &str, api_key: &str, timeout_secs: u64) -> Result<Self, StoreError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| StoreError::Connection(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
            timeout_secs,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    fn send(&self, builder: RequestBuilder) -> Result<Response, StoreError> {
        self.authorized(builder).send().map_err(|e| {
            if e.is_connect() {
                StoreError::Connection(format!("Cannot reach {}", self.base_url))
            } else if e.is_timeout() {
                StoreError::Connection(format!(
                    "Request timed out after {}s",
                    self.timeout_secs
                ))
            } else {
                StoreError::Connection(e.to_string())
            }
        })
    }
}

fn check_status(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(StoreError::Remote {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

fn parse_rows(response: Response) -> Result<Vec<Value>, StoreError> {
    let status = response.status().as_u16();
    match response.json::<Value>() {
        Ok(Value::Array(rows)) => Ok(rows),
        Ok(other) => Err(StoreError::Remote {
            status,
            body: format!("expected a JSON array, got {other}"),
        }),
        Err(e) => Err(StoreError::Remote {
            status,
            body: format!("unreadable response: {e}"),
        }),
    }
}

impl RestTransport for PostgrestClient {
    fn probe(&self, table: &str) -> Result<(), StoreError> {
        let response = self.send(
            self.client
                .get(self.endpoint(table))
                .query(&[("select", "*"), ("limit", "0")]),
        )?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::SchemaMissing {
                table: table.to_string(),
            });
        }
        check_status(response)?;
        Ok(())
    }

    fn select(&self, table: &str, query: &[(&str, String)]) -> Result<Vec<Value>, StoreError> {
        let response = self.send(self.client.get(self.endpoint(table)).query(query))?;
        parse_rows(check_status(response)?)
    }

    fn upsert(&self, table: &str, row: &Value, on_conflict: &str) -> Result<(), StoreError> {
        let response = self.send(
            self.client
                .post(self.endpoint(table))
                .query(&[("on_conflict", on_conflict)])
                .header("Prefer", "resolution=merge-duplicates,return=minimal")
                .json(row),
        )?;
        check_status(response)?;
        Ok(())
    }

    fn insert_returning(&self, table: &str, row: &Value) -> Result<Value, StoreError> {
        let response = self.send(
            self.client
                .post(self.endpoint(table))
                .header("Prefer", "return=representation")
                .json(row),
        )?;
        let status = response.status().as_u16();
        parse_rows(check_status(response)?)?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Remote {
                status,
                body: "insert returned no row".into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalised() {
        let client = PostgrestClient::new("https://project.supabase.co/", "key", 5).unwrap();
        assert_eq!(client.base_url(), "https://project.supabase.co");
        assert_eq!(
            client.endpoint("alerts"),
            "https://project.supabase.co/rest/v1/alerts"
        );
    }

    #[test]
    fn unreachable_host_is_a_connection_error() {
        // Port 9 (discard) is closed on loopback.
        let client = PostgrestClient::new("http://127.0.0.1:9", "key", 2).unwrap();
        let err = client.probe("alerts").unwrap_err();
        assert!(matches!(err, StoreError::Connection(_)), "{err:?}");
    }
}
