use std::{io::ErrorKind, path::PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::AppError;
use minijinja::Environment;
use rand::Rng;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

use crate::SearchStrategyOutcome;

pub const CONTENT_PREVIEW_CHARS: usize = 300;

const ID_FIELDS: [&str; 4] = ["ChunkSequence", "chunk_id", "id", "Id"];
const CONTENT_FIELDS: [&str; 4] = ["ChunkText", "chunk", "content", "Content"];
const TITLE_FIELDS: [&str; 3] = ["DocumentTitle", "title", "Title"];
const URL_FIELD: &str = "URL";

/// Random names tried before giving up on a crowded report directory.
const MAX_NAME_DRAWS: usize = 32;

const MARKDOWN_TEMPLATE_NAME: &str = "report.md";
const MARKDOWN_TEMPLATE: &str = "# Query Result

Date: {{ date }}

## Query

{{ query }}

## Search Type

{{ strategy_name }}

## Search Results

{% for entry in entries %}
{% if entry.id %}
{{ entry.id.name }}: {{ entry.id.value }}
{% endif %}
{% if entry.content %}
Content: {{ entry.content }}
{% endif %}
{% if entry.title %}
Title: {{ entry.title }}
{% endif %}
{% if entry.url %}
URL: {{ entry.url }}
{% endif %}
Score: {{ entry.score }}
Raw Score: {{ entry.raw_score }}

{% endfor %}
";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedResult {
    pub fields: Map<String, Value>,
    pub raw_score: f64,
    pub normalized_score: f64,
}

/// What a sink receives for one strategy run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRecord {
    pub query: String,
    pub strategy_name: String,
    pub ranked_results: Vec<RankedResult>,
    pub timestamp: DateTime<Utc>,
}

impl ReportRecord {
    pub fn from_outcome(outcome: &SearchStrategyOutcome) -> Self {
        let ranked_results = outcome
            .results
            .iter()
            .map(|result| RankedResult {
                fields: result.fields.clone(),
                raw_score: result.original_score.unwrap_or(result.raw_score),
                normalized_score: result.score(),
            })
            .collect();

        Self {
            query: outcome.display_query(),
            strategy_name: outcome.label.clone(),
            ranked_results,
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
pub trait ReportSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn emit(&self, record: &ReportRecord) -> Result<(), AppError>;
}

/// Hands `record` to every sink. Sink failures are logged and never returned.
pub async fn publish(record: &ReportRecord, sinks: &[Box<dyn ReportSink>]) {
    for sink in sinks {
        if let Err(err) = sink.emit(record).await {
            error!(
                sink = sink.name(),
                strategy = %record.strategy_name,
                error = %err,
                "failed to write report"
            );
        }
    }
}

/// Prints a banner and the score of each result.
pub struct ConsoleReportSink;

impl ConsoleReportSink {
    pub fn render(record: &ReportRecord) -> String {
        let mut out = format!("\n=== {} ===\n\n", record.strategy_name.to_uppercase());
        for (rank, result) in (1_usize..).zip(&record.ranked_results) {
            out.push_str(&format!(
                "Result {rank}:\n  Score: {:.4} (raw {:.4})\n\n",
                result.normalized_score, result.raw_score
            ));
        }
        out
    }
}

#[async_trait]
impl ReportSink for ConsoleReportSink {
    fn name(&self) -> &'static str {
        "console"
    }

    async fn emit(&self, record: &ReportRecord) -> Result<(), AppError> {
        print!("{}", Self::render(record));
        Ok(())
    }
}

#[derive(Serialize)]
struct NamedValue {
    name: &'static str,
    value: String,
}

#[derive(Serialize)]
struct MarkdownEntry {
    id: Option<NamedValue>,
    content: Option<String>,
    title: Option<String>,
    url: Option<String>,
    score: String,
    raw_score: String,
}

impl MarkdownEntry {
    fn from_result(result: &RankedResult) -> Self {
        let id = first_present(&result.fields, &ID_FIELDS)
            .map(|(name, value)| NamedValue { name, value });
        let content = first_present(&result.fields, &CONTENT_FIELDS)
            .map(|(_, value)| preview(&value, CONTENT_PREVIEW_CHARS));
        let title = first_present(&result.fields, &TITLE_FIELDS).map(|(_, value)| value);
        let url = result.fields.get(URL_FIELD).map(display_value);

        Self {
            id,
            content,
            title,
            url,
            score: format!("{:.4}", result.normalized_score),
            raw_score: format!("{:.4}", result.raw_score),
        }
    }
}

fn first_present(fields: &Map<String, Value>, names: &[&'static str]) -> Option<(&'static str, String)> {
    names
        .iter()
        .find_map(|name| fields.get(*name).map(|value| (*name, display_value(value))))
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

/// Writes each record to `output_NNNN.md` in a directory.
pub struct MarkdownReportSink {
    dir: PathBuf,
    env: Environment<'static>,
}

impl MarkdownReportSink {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, AppError> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_template(MARKDOWN_TEMPLATE_NAME, MARKDOWN_TEMPLATE)
            .map_err(|e| AppError::InternalError(format!("invalid report template: {e}")))?;

        Ok(Self {
            dir: dir.into(),
            env,
        })
    }

    pub fn render(&self, record: &ReportRecord) -> Result<String, AppError> {
        let entries: Vec<MarkdownEntry> = record
            .ranked_results
            .iter()
            .map(MarkdownEntry::from_result)
            .collect();

        self.env
            .get_template(MARKDOWN_TEMPLATE_NAME)
            .and_then(|template| {
                template.render(minijinja::context! {
                    date => record.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                    query => &record.query,
                    strategy_name => &record.strategy_name,
                    entries => entries,
                })
            })
            .map_err(|e| AppError::InternalError(format!("failed to render report: {e}")))
    }

    /// Renders and writes `record` to a new file, returning its path.
    pub async fn write(&self, record: &ReportRecord) -> Result<PathBuf, AppError> {
        let suffixes =
            std::iter::repeat_with(|| rand::thread_rng().gen_range(1000..9999)).take(MAX_NAME_DRAWS);
        self.write_with_suffixes(record, suffixes).await
    }

    /// Existing reports are never overwritten; a taken name moves on to the next suffix.
    async fn write_with_suffixes(
        &self,
        record: &ReportRecord,
        suffixes: impl Iterator<Item = u32>,
    ) -> Result<PathBuf, AppError> {
        let body = self.render(record)?;

        for suffix in suffixes {
            let path = self.dir.join(format!("output_{suffix}.md"));
            let mut file = match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    debug!(path = %path.display(), "report name taken");
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            file.write_all(body.as_bytes()).await?;
            file.flush().await?;
            info!(strategy = %record.strategy_name, path = %path.display(), "results saved");
            return Ok(path);
        }

        Err(AppError::InternalError(format!(
            "no free report file name in {}",
            self.dir.display()
        )))
    }
}

#[async_trait]
impl ReportSink for MarkdownReportSink {
    fn name(&self) -> &'static str {
        "markdown"
    }

    async fn emit(&self, record: &ReportRecord) -> Result<(), AppError> {
        self.write(record).await.map(|_| ())
    }
}
