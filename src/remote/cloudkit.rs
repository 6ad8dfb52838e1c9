use super::RemoteStore;
use crate::config::CloudKitConfig;
use crate::note::NoteId;
use crate::record::{NOTE_RECORD_TYPE, RemoteRecord};
use anyhow::{Context, Result, anyhow, bail};
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;

const API_ROOT: &str = "https://api.apple-cloudkit.com/database/1";
const HTTP_USER_AGENT: &str = concat!("Stickies/", env!("CARGO_PKG_VERSION"));
const HTTP_TIMEOUT: Duration = Duration::from_secs(15);
const QUERY_RESULTS_LIMIT: u32 = 200;
const MAX_QUERY_PAGES: usize = 1_000;
const NOT_FOUND: &str = "NOT_FOUND";

/// CloudKit Web Services client for the user's private database.
pub struct CloudKitStore {
    client: Client,
    base_url: String,
    api_token: String,
    web_auth_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: QueryFilter<'a>,
    results_limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    continuation_marker: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryFilter<'a> {
    record_type: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    records: Vec<Value>,
    continuation_marker: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModifyResponse {
    #[serde(default)]
    records: Vec<RecordResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordResult {
    record_name: Option<String>,
    server_error_code: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    server_error_code: Option<String>,
    reason: Option<String>,
}

impl CloudKitStore {
    pub fn new(config: &CloudKitConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(HTTP_USER_AGENT)
            .build()
            .context("failed to create cloudkit http client")?;

        Ok(Self {
            client,
            base_url: database_url(config),
            api_token: config.api_token.clone(),
            web_auth_token: config.web_auth_token.clone(),
        })
    }

    fn post<B: Serialize, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R> {
        let url = format!("{}/{}", self.base_url, path);
        let mut params = vec![("ckAPIToken", self.api_token.as_str())];
        if let Some(token) = self.web_auth_token.as_deref() {
            params.push(("ckWebAuthToken", token));
        }

        let response = self
            .client
            .post(&url)
            .query(&params)
            .json(body)
            .send()
            .with_context(|| format!("failed to reach cloudkit ({path})"))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<ErrorResponse>()
                .ok()
                .map(|err| describe_server_error(err.server_error_code, err.reason))
                .unwrap_or_else(|| status.to_string());
            bail!("cloudkit {path} failed: {detail}");
        }

        response
            .json::<R>()
            .with_context(|| format!("failed to parse cloudkit {path} response"))
    }

    fn modify(&self, operation: Value, tolerate_not_found: bool) -> Result<()> {
        let response: ModifyResponse =
            self.post("records/modify", &json!({ "operations": [operation] }))?;
        check_modify_response(response, tolerate_not_found)
    }
}

impl RemoteStore for CloudKitStore {
    fn query_all(&self) -> Result<Vec<RemoteRecord>> {
        let mut records = Vec::new();
        let mut marker: Option<String> = None;
        let mut pages = 0;
        loop {
            let request = QueryRequest {
                query: QueryFilter {
                    record_type: NOTE_RECORD_TYPE,
                },
                results_limit: QUERY_RESULTS_LIMIT,
                continuation_marker: marker.as_deref(),
            };
            let page: QueryResponse = self.post("records/query", &request)?;
            let (mut page_records, next) = split_query_page(page);
            records.append(&mut page_records);
            pages += 1;
            marker = match next_marker(marker.as_deref(), next, pages)? {
                Some(next) => Some(next),
                None => break,
            };
        }
        crate::debug_log!("[cloudkit] fetched {} records", records.len());
        Ok(records)
    }

    fn save(&self, record: RemoteRecord) -> Result<()> {
        let name = record.record_name.clone();
        let record = serde_json::to_value(&record).context("failed to serialize record")?;
        self.modify(
            json!({ "operationType": "forceReplace", "record": record }),
            false,
        )
        .with_context(|| format!("failed to save note {name}"))
    }

    fn delete(&self, id: &NoteId) -> Result<()> {
        self.modify(
            json!({
                "operationType": "forceDelete",
                "record": { "recordName": id.as_str() }
            }),
            true,
        )
        .with_context(|| format!("failed to delete note {id}"))
    }
}

fn database_url(config: &CloudKitConfig) -> String {
    format!(
        "{}/{}/{}/private",
        API_ROOT,
        config.container,
        config.environment.as_str()
    )
}

/// Keeps the entries that parse as records; per-record errors are logged and skipped.
fn split_query_page(page: QueryResponse) -> (Vec<RemoteRecord>, Option<String>) {
    let mut records = Vec::with_capacity(page.records.len());
    for raw in page.records {
        if let Some(code) = raw.get("serverErrorCode").and_then(Value::as_str) {
            crate::debug_log!(
                "[cloudkit] skipping record {} | {}",
                raw.get("recordName").and_then(Value::as_str).unwrap_or("?"),
                code
            );
            continue;
        }
        match serde_json::from_value::<RemoteRecord>(raw) {
            Ok(record) => records.push(record),
            Err(err) => crate::debug_log!("[cloudkit] skipping unparsable record | {}", err),
        }
    }
    let next = page.continuation_marker.filter(|marker| !marker.is_empty());
    (records, next)
}

/// Fails the query when the server hands back the marker it was just given,
/// or keeps paging past any plausible number of notes.
fn next_marker(previous: Option<&str>, next: Option<String>, pages: usize) -> Result<Option<String>> {
    let Some(next) = next else {
        return Ok(None);
    };
    if previous == Some(next.as_str()) {
        bail!("cloudkit repeated continuation marker after {pages} pages");
    }
    if pages >= MAX_QUERY_PAGES {
        bail!("cloudkit query did not finish within {MAX_QUERY_PAGES} pages");
    }
    Ok(Some(next))
}

fn check_modify_response(response: ModifyResponse, tolerate_not_found: bool) -> Result<()> {
    for result in response.records {
        let Some(code) = result.server_error_code else {
            continue;
        };
        if tolerate_not_found && code == NOT_FOUND {
            continue;
        }
        return Err(anyhow!(
            "record {} rejected: {}",
            result.record_name.as_deref().unwrap_or("?"),
            describe_server_error(Some(code), result.reason)
        ));
    }
    Ok(())
}

fn describe_server_error(code: Option<String>, reason: Option<String>) -> String {
    match (code, reason) {
        (Some(code), Some(reason)) => format!("{code}: {reason}"),
        (Some(code), None) => code,
        (None, Some(reason)) => reason,
        (None, None) => "unknown error".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CloudKitEnvironment;
    use crate::record::decode;

    #[test]
    fn builds_private_database_url() {
        let config = CloudKitConfig {
            container: "iCloud.com.example.stickies".into(),
            environment: CloudKitEnvironment::Production,
            api_token: "token".into(),
            web_auth_token: None,
        };
        assert_eq!(
            database_url(&config),
            "https://api.apple-cloudkit.com/database/1/iCloud.com.example.stickies/production/private"
        );
    }

    #[test]
    fn query_request_shape() {
        let request = QueryRequest {
            query: QueryFilter {
                record_type: NOTE_RECORD_TYPE,
            },
            results_limit: 200,
            continuation_marker: None,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({ "query": { "recordType": "StickyNote" }, "resultsLimit": 200 })
        );
    }

    #[test]
    fn query_page_skips_errors_and_malformed_entries() {
        let page: QueryResponse = serde_json::from_value(json!({
            "records": [
                {
                    "recordName": "a",
                    "recordType": "StickyNote",
                    "fields": {
                        "content": { "value": "kept", "type": "STRING" },
                        "lastModified": { "value": 1000, "type": "TIMESTAMP" }
                    }
                },
                { "recordName": "b", "serverErrorCode": "ACCESS_DENIED", "reason": "nope" },
                {
                    "recordName": "c",
                    "recordType": "StickyNote",
                    "fields": {
                        "content": { "value": "also kept", "type": "STRING" },
                        "lastModified": { "value": 2000, "type": "TIMESTAMP" },
                        "place": { "value": { "latitude": 1.0 }, "type": "LOCATION" }
                    }
                },
                { "recordType": "StickyNote", "fields": {} }
            ],
            "continuationMarker": "page-2"
        }))
        .unwrap();

        let (records, next) = split_query_page(page);
        assert_eq!(next.as_deref(), Some("page-2"));
        assert_eq!(records.len(), 2);
        assert_eq!(decode(&records[0]).unwrap().content, "kept");
        assert_eq!(decode(&records[1]).unwrap().content, "also kept");
    }

    #[test]
    fn paging_stops_on_a_stuck_marker() {
        assert_eq!(next_marker(None, None, 1).unwrap(), None);
        assert_eq!(
            next_marker(None, Some("page-2".into()), 1).unwrap().as_deref(),
            Some("page-2")
        );
        assert_eq!(
            next_marker(Some("page-2"), Some("page-3".into()), 2).unwrap().as_deref(),
            Some("page-3")
        );

        let repeated = next_marker(Some("page-2"), Some("page-2".into()), 2).unwrap_err();
        assert!(repeated.to_string().contains("repeated continuation marker"));

        assert!(next_marker(Some("a"), Some("b".into()), MAX_QUERY_PAGES).is_err());
        assert_eq!(next_marker(Some("a"), None, MAX_QUERY_PAGES).unwrap(), None);
    }

    #[test]
    fn last_query_page_has_no_marker() {
        let page: QueryResponse = serde_json::from_value(json!({ "records": [] })).unwrap();
        let (records, next) = split_query_page(page);
        assert!(records.is_empty());
        assert!(next.is_none());
    }

    #[test]
    fn modify_errors_fail_the_call() {
        let rejected: ModifyResponse = serde_json::from_value(json!({
            "records": [{ "recordName": "a", "serverErrorCode": "QUOTA_EXCEEDED", "reason": "full" }]
        }))
        .unwrap();
        let err = check_modify_response(rejected, false).unwrap_err();
        assert!(err.to_string().contains("QUOTA_EXCEEDED: full"));

        let accepted: ModifyResponse = serde_json::from_value(json!({
            "records": [{ "recordName": "a", "recordType": "StickyNote", "fields": {} }]
        }))
        .unwrap();
        assert!(check_modify_response(accepted, false).is_ok());
    }

    #[test]
    fn delete_of_missing_record_succeeds() {
        let missing = || -> ModifyResponse {
            serde_json::from_value(json!({
                "records": [{ "recordName": "a", "serverErrorCode": "NOT_FOUND" }]
            }))
            .unwrap()
        };
        assert!(check_modify_response(missing(), true).is_ok());
        assert!(check_modify_response(missing(), false).is_err());
    }
}
