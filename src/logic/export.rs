use anyhow::{anyhow, Context};
use handlebars::Handlebars;
use itertools::Itertools;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{EngineError, EngineResult};
use crate::model::{ColumnDescriptor, ColumnType, Id, ResourceDefinition, Row};
use crate::store::RecordStore;

const DOCUMENT_HEAD: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{{title}}</title>
<style>
  body { font-family: sans-serif; font-size: 11px; }
  table { width: 100%; border-collapse: collapse; }
  th, td { border: 1px solid #999; padding: 4px; text-align: left; }
  .page { page-break-after: always; }
  .page:last-child { page-break-after: auto; }
  footer { margin-top: 8px; text-align: right; }
</style>
</head>
<body>
"#;

const PAGE_TEMPLATE: &str = r#"<section class="page">
<h1>{{title}}</h1>
<table>
<thead><tr>{{#each headers}}<th>{{this}}</th>{{/each}}</tr></thead>
<tbody>
{{#each rows}}<tr>{{#each this}}<td>{{this}}</td>{{/each}}</tr>
{{/each}}</tbody>
</table>
<footer>Page {{number}} of {{count}}</footer>
</section>
"#;

const DOCUMENT_TAIL: &str = "</body>\n</html>\n";

/// Rows rendered between two checks of the cancellation flag
const CSV_CHECK_INTERVAL: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// CSV workbook
    Spreadsheet,
    /// Paginated HTML report, served from the `/pdf` route
    Report,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Spreadsheet => "csv",
            ExportFormat::Report => "html",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Spreadsheet => "text/csv; charset=utf-8",
            ExportFormat::Report => "text/html; charset=utf-8",
        }
    }
}

/// Header row plus formatted cells, shared by both output modes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct ExportFile {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Descriptors to export, in declared order. An empty or absent selection
/// means every descriptor.
pub fn select_columns<'a>(descriptors: &'a [ColumnDescriptor], selected: Option<&[String]>) -> Vec<&'a ColumnDescriptor> {
    match selected.filter(|s| !s.is_empty()) {
        None => descriptors.iter().collect(),
        Some(selected) => descriptors
            .iter()
            .filter(|d| selected.iter().any(|s| *s == d.accessor))
            .collect(),
    }
}

/// Text of one cell. `values` holds every value reached by the accessor
/// (several when it fans out over a has-many relation).
pub fn format_cell(values: &[&Value], column_type: ColumnType) -> String {
    values
        .iter()
        .map(|value| format_value(value, column_type))
        .filter(|text| !text.is_empty())
        .join(", ")
}

fn format_value(value: &Value, column_type: ColumnType) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(true) => "Yes".to_string(),
        Value::Bool(false) => "No".to_string(),
        Value::Array(items) => items
            .iter()
            .map(|item| match (column_type, item) {
                (ColumnType::JsonCounterList, Value::Object(entry)) => {
                    let label = entry.get("label").or_else(|| entry.get("name"));
                    let count = entry.get("count").or_else(|| entry.get("value"));
                    format!(
                        "{}: {}",
                        label.map(|v| format_value(v, ColumnType::String)).unwrap_or_default(),
                        count.map(|v| format_value(v, ColumnType::String)).unwrap_or_default()
                    )
                }
                _ => format_value(item, column_type),
            })
            .filter(|text| !text.is_empty())
            .join(", "),
        Value::Object(_) => value.to_string(),
    }
}

/// Projects rows through each descriptor's accessor. A missing hop yields an
/// empty cell.
pub fn build_table(columns: &[&ColumnDescriptor], rows: &[Row]) -> ExportTable {
    ExportTable {
        headers: columns.iter().map(|c| c.header.clone()).collect(),
        rows: rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|column| format_cell(&row.resolve_all(&column.accessor), column.column_type))
                    .collect()
            })
            .collect(),
    }
}

fn ensure_running(cancelled: &AtomicBool) -> anyhow::Result<()> {
    if cancelled.load(Ordering::Relaxed) {
        return Err(anyhow!("export cancelled"));
    }
    Ok(())
}

pub fn render_csv(table: &ExportTable) -> anyhow::Result<Vec<u8>> {
    write_csv(table, &AtomicBool::new(false))
}

fn write_csv(table: &ExportTable, cancelled: &AtomicBool) -> anyhow::Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&table.headers).context("Failed to write export header")?;
    for (i, row) in table.rows.iter().enumerate() {
        if i % CSV_CHECK_INTERVAL == 0 {
            ensure_running(cancelled)?;
        }
        writer.write_record(row).context("Failed to write export row")?;
    }
    writer
        .into_inner()
        .map_err(|e| anyhow!("Failed to flush export: {}", e))
}

pub fn render_report(title: &str, table: &ExportTable, rows_per_page: usize) -> anyhow::Result<Vec<u8>> {
    write_report(title, table, rows_per_page, &AtomicBool::new(false))
}

/// Renders page by page so a cancelled export stops between pages.
fn write_report(
    title: &str,
    table: &ExportTable,
    rows_per_page: usize,
    cancelled: &AtomicBool,
) -> anyhow::Result<Vec<u8>> {
    let mut handlebars = Handlebars::new();
    handlebars
        .register_template_string("head", DOCUMENT_HEAD)
        .map_err(|e| anyhow!("Invalid report template: {}", e))?;
    handlebars
        .register_template_string("page", PAGE_TEMPLATE)
        .map_err(|e| anyhow!("Invalid report template: {}", e))?;

    let chunks: Vec<&[Vec<String>]> = if table.rows.is_empty() {
        vec![&table.rows[..]]
    } else {
        table.rows.chunks(rows_per_page.max(1)).collect()
    };
    let count = chunks.len();

    let mut html = handlebars
        .render("head", &json!({"title": title}))
        .map_err(|e| anyhow!("Failed to render report: {}", e))?;
    for (i, rows) in chunks.into_iter().enumerate() {
        ensure_running(cancelled)?;
        let page = json!({
            "title": title,
            "headers": table.headers,
            "number": i + 1,
            "count": count,
            "rows": rows,
        });
        let rendered = handlebars
            .render("page", &page)
            .map_err(|e| anyhow!("Failed to render report page {}: {}", i + 1, e))?;
        html.push_str(&rendered);
    }
    html.push_str(DOCUMENT_TAIL);
    Ok(html.into_bytes())
}

fn render(
    format: ExportFormat,
    title: &str,
    table: &ExportTable,
    rows_per_page: usize,
    cancelled: &AtomicBool,
) -> anyhow::Result<Vec<u8>> {
    match format {
        ExportFormat::Spreadsheet => write_csv(table, cancelled),
        ExportFormat::Report => write_report(title, table, rows_per_page, cancelled),
    }
}

/// Fetches the selected rows and renders them off the async runtime under a
/// time limit. When the limit expires the blocking render is told to stop
/// and gives up at its next page (or CSV row batch).
#[derive(Debug, Clone, Copy)]
pub struct ExportRenderer {
    rows_per_page: usize,
    timeout: Duration,
}

impl ExportRenderer {
    pub fn new(rows_per_page: usize, timeout: Duration) -> Self {
        Self { rows_per_page, timeout }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn export<S: RecordStore + ?Sized>(
        &self,
        store: &S,
        resource: &ResourceDefinition,
        key_field: &str,
        descriptors: &[ColumnDescriptor],
        ids: Option<&[Id]>,
        columns: Option<&[String]>,
        format: ExportFormat,
    ) -> EngineResult<ExportFile> {
        let selected = select_columns(descriptors, columns);
        let relations = resource.relations_for(selected.iter().map(|d| d.accessor.as_str()));
        let ids = ids.filter(|ids| !ids.is_empty());

        let rows = store.fetch_rows(resource, key_field, ids, &relations).await?;
        let table = build_table(&selected, &rows);
        log::debug!(
            "Exporting {} rows x {} columns of {} as {:?}",
            table.rows.len(),
            table.headers.len(),
            resource.name,
            format
        );

        let title = resource.name.clone();
        let rows_per_page = self.rows_per_page;
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let task = tokio::task::spawn_blocking(move || render(format, &title, &table, rows_per_page, &flag));

        let bytes = match tokio::time::timeout(self.timeout, task).await {
            Err(_) => {
                cancelled.store(true, Ordering::Relaxed);
                log::error!("Export of {} exceeded {:?}", resource.name, self.timeout);
                return Err(EngineError::Internal(anyhow!("export timed out")));
            }
            Ok(Err(join_error)) => {
                return Err(EngineError::Internal(
                    anyhow::Error::new(join_error).context("Export rendering task failed"),
                ));
            }
            Ok(Ok(rendered)) => rendered?,
        };

        Ok(ExportFile {
            filename: format!("{}.{}", resource.name, format.extension()),
            content_type: format.content_type(),
            bytes,
        })
    }
}
