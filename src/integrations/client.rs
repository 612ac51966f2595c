use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::ai::render::{render, tabulate};
use crate::ai::GeneratedDocument;
use crate::config::IntegrationsConfig;
use crate::error::{AppError, UpstreamError};
use crate::integrations::platforms::Platform;
use crate::Result;

const TIMEOUT: Duration = Duration::from_secs(30);

/// Folder generated documents land in on OneDrive.
const DRIVE_FOLDER: &str = "PMBlueprints";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportResult {
    pub platform: Platform,
    /// Board, sheet, spreadsheet or drive item id on the platform.
    pub external_id: String,
    pub url: Option<String>,
    pub rows_exported: usize,
}

/// Pushes a generated document to an external platform on behalf of a user.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlatformExporter: Send + Sync {
    async fn export(&self, platform: Platform, token: &str, document: &GeneratedDocument) -> Result<ExportResult>;
}

pub struct HttpExporter {
    http: reqwest::Client,
    monday_url: String,
    smartsheet_url: String,
    google_sheets_url: String,
    graph_url: String,
}

impl HttpExporter {
    pub fn new(config: &IntegrationsConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(TIMEOUT)
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build integrations HTTP client: {}", e)))?;

        let trim = |url: &str| url.trim_end_matches('/').to_string();
        Ok(Self {
            http,
            monday_url: trim(&config.monday_api_url),
            smartsheet_url: trim(&config.smartsheet_api_url),
            google_sheets_url: trim(&config.google_sheets_api_url),
            graph_url: trim(&config.microsoft_graph_url),
        })
    }

    async fn monday_query(&self, token: &str, query: &str, variables: Value) -> Result<Value> {
        let res = self
            .http
            .post(&self.monday_url)
            .header("Authorization", token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let body: Value = read_json(Platform::Monday, res).await?;
        if let Some(errors) = body.get("errors").filter(|e| !e.is_null()) {
            warn!(errors = %errors, "Monday.com rejected the request");
            return Err(UpstreamError::RequestFailed("Monday.com GraphQL error".into()).into());
        }
        Ok(body.get("data").cloned().unwrap_or(Value::Null))
    }

    async fn export_monday(&self, token: &str, document: &GeneratedDocument) -> Result<ExportResult> {
        let (columns, rows) = tabulate(document);

        let data = self
            .monday_query(
                token,
                "mutation ($name: String!) { create_board (board_name: $name, board_kind: private) { id } }",
                json!({ "name": document.document_name }),
            )
            .await?;
        let board_id = id_at(&data, &["create_board", "id"]).ok_or_else(|| malformed(Platform::Monday))?;

        // The item name holds the first column; the rest become text columns.
        let mut column_ids = Vec::new();
        for title in columns.iter().skip(1) {
            let data = self
                .monday_query(
                    token,
                    "mutation ($board: ID!, $title: String!) { create_column (board_id: $board, title: $title, column_type: text) { id } }",
                    json!({ "board": board_id, "title": title }),
                )
                .await?;
            column_ids.push(id_at(&data, &["create_column", "id"]).ok_or_else(|| malformed(Platform::Monday))?);
        }

        for row in &rows {
            let name = row.first().cloned().unwrap_or_default();
            let values: serde_json::Map<String, Value> = column_ids
                .iter()
                .zip(row.iter().skip(1))
                .map(|(id, cell)| (id.clone(), Value::String(cell.clone())))
                .collect();
            self.monday_query(
                token,
                "mutation ($board: ID!, $name: String!, $values: JSON) { create_item (board_id: $board, item_name: $name, column_values: $values) { id } }",
                json!({ "board": board_id, "name": name, "values": Value::Object(values).to_string() }),
            )
            .await?;
        }

        Ok(ExportResult {
            platform: Platform::Monday,
            url: Some(format!("https://monday.com/boards/{}", board_id)),
            external_id: board_id,
            rows_exported: rows.len(),
        })
    }

    async fn export_smartsheet(&self, token: &str, document: &GeneratedDocument) -> Result<ExportResult> {
        let (columns, rows) = tabulate(document);

        let sheet_columns: Vec<Value> = columns
            .iter()
            .enumerate()
            .map(|(i, title)| json!({ "title": title, "type": "TEXT_NUMBER", "primary": i == 0 }))
            .collect();
        let res = self
            .http
            .post(format!("{}/sheets", self.smartsheet_url))
            .bearer_auth(token)
            .json(&json!({ "name": document.document_name, "columns": sheet_columns }))
            .send()
            .await?;
        let created: Value = read_json(Platform::Smartsheet, res).await?;

        let sheet = &created["result"];
        let sheet_id = id_at(sheet, &["id"]).ok_or_else(|| malformed(Platform::Smartsheet))?;
        let column_ids: Vec<Value> = sheet["columns"]
            .as_array()
            .map(|cols| cols.iter().map(|c| c["id"].clone()).collect())
            .unwrap_or_default();
        if column_ids.len() < columns.len() {
            return Err(malformed(Platform::Smartsheet));
        }

        if !rows.is_empty() {
            let body: Vec<Value> = rows
                .iter()
                .map(|row| {
                    let cells: Vec<Value> = column_ids
                        .iter()
                        .zip(row.iter())
                        .map(|(id, value)| json!({ "columnId": id, "value": value }))
                        .collect();
                    json!({ "toBottom": true, "cells": cells })
                })
                .collect();
            let res = self
                .http
                .post(format!("{}/sheets/{}/rows", self.smartsheet_url, sheet_id))
                .bearer_auth(token)
                .json(&body)
                .send()
                .await?;
            read_json::<Value>(Platform::Smartsheet, res).await?;
        }

        Ok(ExportResult {
            platform: Platform::Smartsheet,
            url: sheet["permalink"].as_str().map(str::to_string),
            external_id: sheet_id,
            rows_exported: rows.len(),
        })
    }

    async fn export_google_sheets(&self, token: &str, document: &GeneratedDocument) -> Result<ExportResult> {
        let (columns, rows) = tabulate(document);

        let row_data: Vec<Value> = std::iter::once(&columns)
            .chain(rows.iter())
            .map(|row| {
                let values: Vec<Value> = row
                    .iter()
                    .map(|cell| json!({ "userEnteredValue": { "stringValue": cell } }))
                    .collect();
                json!({ "values": values })
            })
            .collect();

        let body = json!({
            "properties": { "title": document.document_name },
            "sheets": [{
                "properties": { "title": document.analysis.category, "gridProperties": { "frozenRowCount": 1 } },
                "data": [{ "startRow": 0, "startColumn": 0, "rowData": row_data }]
            }]
        });

        let res = self
            .http
            .post(format!("{}/spreadsheets", self.google_sheets_url))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        let created: Value = read_json(Platform::GoogleSheets, res).await?;

        Ok(ExportResult {
            platform: Platform::GoogleSheets,
            external_id: id_at(&created, &["spreadsheetId"]).ok_or_else(|| malformed(Platform::GoogleSheets))?,
            url: created["spreadsheetUrl"].as_str().map(str::to_string),
            rows_exported: rows.len(),
        })
    }

    /// Uploads the rendered Office file to the user's OneDrive.
    async fn export_microsoft365(&self, token: &str, document: &GeneratedDocument) -> Result<ExportResult> {
        let file = render(document)?;
        let rows_exported = tabulate(document).1.len();

        let res = self
            .http
            .put(format!(
                "{}/me/drive/root:/{}/{}:/content",
                self.graph_url, DRIVE_FOLDER, file.filename
            ))
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, file.content_type)
            .body(file.bytes)
            .send()
            .await?;
        let item: Value = read_json(Platform::Microsoft365, res).await?;

        Ok(ExportResult {
            platform: Platform::Microsoft365,
            external_id: id_at(&item, &["id"]).ok_or_else(|| malformed(Platform::Microsoft365))?,
            url: item["webUrl"].as_str().map(str::to_string),
            rows_exported,
        })
    }
}

#[async_trait]
impl PlatformExporter for HttpExporter {
    async fn export(&self, platform: Platform, token: &str, document: &GeneratedDocument) -> Result<ExportResult> {
        let result = match platform {
            Platform::Monday => self.export_monday(token, document).await?,
            Platform::Smartsheet => self.export_smartsheet(token, document).await?,
            Platform::GoogleSheets => self.export_google_sheets(token, document).await?,
            Platform::Microsoft365 => self.export_microsoft365(token, document).await?,
        };
        debug!(%platform, external_id = %result.external_id, rows = result.rows_exported, "Export finished");
        Ok(result)
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(platform: Platform, res: reqwest::Response) -> Result<T> {
    let status = res.status();
    let service = platform.display_name().to_string();

    if status == StatusCode::TOO_MANY_REQUESTS {
        warn!(%platform, "Platform rate limited the export");
        return Err(UpstreamError::RateLimited(service).into());
    }
    if !status.is_success() {
        let detail = res.text().await.unwrap_or_default();
        warn!(%platform, status = status.as_u16(), body = %detail, "Platform returned an error");
        return Err(UpstreamError::BadStatus { service, status: status.as_u16() }.into());
    }

    res.json().await.map_err(|e| {
        warn!(%platform, error = %e, "Unreadable platform response");
        malformed(platform)
    })
}

/// Ids come back as strings or numbers depending on the platform.
fn id_at(value: &Value, path: &[&str]) -> Option<String> {
    let mut current = value;
    for key in path {
        current = current.get(key)?;
    }
    match current {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn malformed(platform: Platform) -> AppError {
    UpstreamError::RequestFailed(format!("Unexpected response from {}", platform.display_name())).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::render::tests::document;
    use crate::ai::DocumentFormat;
    use crate::config::Settings;
    use wiremock::matchers::{body_string_contains, header, method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn exporter(base: &str) -> HttpExporter {
        let mut config = Settings::new_for_test().unwrap().integrations;
        config.monday_api_url = format!("{}/v2", base);
        config.smartsheet_api_url = format!("{}/2.0", base);
        config.google_sheets_api_url = format!("{}/v4", base);
        config.microsoft_graph_url = format!("{}/v1.0", base);
        HttpExporter::new(&config).unwrap()
    }

    #[test]
    fn ids_accept_strings_and_numbers() {
        let value = json!({"a": {"id": 42}, "b": {"id": "x1"}, "c": {"id": ""}});
        assert_eq!(id_at(&value, &["a", "id"]), Some("42".into()));
        assert_eq!(id_at(&value, &["b", "id"]), Some("x1".into()));
        assert_eq!(id_at(&value, &["c", "id"]), None);
        assert_eq!(id_at(&value, &["missing"]), None);
    }

    #[tokio::test]
    async fn smartsheet_creates_sheet_then_rows() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2.0/sheets"))
            .and(header("authorization", "Bearer ss-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {
                    "id": 7001,
                    "permalink": "https://app.smartsheet.com/sheets/abc",
                    "columns": [{"id": 11}, {"id": 12}]
                }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/2.0/sheets/7001/rows"))
            .and(body_string_contains("\"columnId\":12"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "SUCCESS"})))
            .expect(1)
            .mount(&server)
            .await;

        let result = exporter(&server.uri())
            .export(Platform::Smartsheet, "ss-token", &document(DocumentFormat::Excel))
            .await
            .unwrap();

        assert_eq!(result.external_id, "7001");
        assert_eq!(result.rows_exported, 1);
        assert_eq!(result.url.as_deref(), Some("https://app.smartsheet.com/sheets/abc"));
    }

    #[tokio::test]
    async fn monday_graphql_errors_fail_the_export() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2"))
            .and(header("authorization", "monday-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errors": [{"message": "Not authenticated"}]
            })))
            .mount(&server)
            .await;

        let err = exporter(&server.uri())
            .export(Platform::Monday, "monday-token", &document(DocumentFormat::Excel))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UpstreamError(UpstreamError::RequestFailed(_))));
    }

    #[tokio::test]
    async fn google_sheets_writes_header_row_first() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v4/spreadsheets"))
            .and(body_string_contains("Risk & Impact"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "spreadsheetId": "sheet-1",
                "spreadsheetUrl": "https://docs.google.com/spreadsheets/d/sheet-1"
            })))
            .mount(&server)
            .await;

        let result = exporter(&server.uri())
            .export(Platform::GoogleSheets, "g-token", &document(DocumentFormat::Excel))
            .await
            .unwrap();
        assert_eq!(result.external_id, "sheet-1");
    }

    #[tokio::test]
    async fn microsoft365_uploads_rendered_file() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path_regex(r"^/v1\.0/me/drive/root:/PMBlueprints/Risk_Register_v2\.docx:/content$"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "item-1",
                "webUrl": "https://onedrive.live.com/item-1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = exporter(&server.uri())
            .export(Platform::Microsoft365, "ms-token", &document(DocumentFormat::Word))
            .await
            .unwrap();
        assert_eq!(result.external_id, "item-1");
    }

    #[tokio::test]
    async fn unauthorized_tokens_surface_as_bad_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v4/spreadsheets"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = exporter(&server.uri())
            .export(Platform::GoogleSheets, "expired", &document(DocumentFormat::Excel))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UpstreamError(UpstreamError::BadStatus { status: 401, .. })));
    }
}
