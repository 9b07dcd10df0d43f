use std::{
    io::{Cursor, Read},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use common::{error::AppError, storage::types::document::Document};
use tracing::{debug, info};

/// Supplies the documents for one ingestion run.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn load(&self) -> Result<Vec<Document>, AppError>;
}

/// Every `*.docx` file directly inside a directory, ordered by file name.
pub struct DocxDirectory {
    dir: PathBuf,
}

impl DocxDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn docx_paths(&self) -> Result<Vec<PathBuf>, AppError> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_docx(path))
            .collect();
        paths.sort();
        Ok(paths)
    }
}

fn is_docx(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("docx"))
}

#[async_trait]
impl DocumentSource for DocxDirectory {
    async fn load(&self) -> Result<Vec<Document>, AppError> {
        if !self.dir.is_dir() {
            return Err(AppError::Validation(format!(
                "Docs directory does not exist: {}",
                self.dir.display()
            )));
        }

        let paths = self.docx_paths()?;
        let mut documents = Vec::with_capacity(paths.len());

        for path in paths {
            let title = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let bytes = tokio::fs::read(&path).await?;
            let text = tokio::task::spawn_blocking(move || extract_docx_text(&bytes))
                .await
                .map_err(|e| AppError::InternalError(format!("docx extraction task failed: {e}")))?
                .map_err(|e| AppError::Document(format!("{title}: {e}")))?;

            debug!(%title, text_chars = text.chars().count(), "extracted document text");
            documents.push(Document::new(title, text));
        }

        info!(dir = %self.dir.display(), document_count = documents.len(), "loaded documents");
        Ok(documents)
    }
}

/// Plain text of a Word document body, one line per paragraph.
pub fn extract_docx_text(bytes: &[u8]) -> Result<String, AppError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| AppError::Document(format!("not a docx archive: {e}")))?;
    let mut part = archive
        .by_name("word/document.xml")
        .map_err(|e| AppError::Document(format!("missing main document part: {e}")))?;

    let mut xml = String::new();
    part.read_to_string(&mut xml)?;
    Ok(document_xml_text(&xml))
}

/// Collects `w:t` runs; paragraph ends and breaks become newlines, tabs stay tabs.
fn document_xml_text(xml: &str) -> String {
    let mut out = String::new();
    let mut in_text_run = false;
    let mut rest = xml;

    while let Some(open) = rest.find('<') {
        let (content, tail) = rest.split_at(open);
        if in_text_run {
            out.push_str(&unescape_xml(content));
        }

        let Some(close) = tail.find('>') else {
            break;
        };
        let tag = tail.get(1..close).unwrap_or_default();
        let self_closing = tag.ends_with('/');
        let name = tag
            .trim_end_matches('/')
            .split_whitespace()
            .next()
            .unwrap_or_default();

        match name {
            "w:t" => in_text_run = !self_closing,
            "/w:t" => in_text_run = false,
            "w:tab" => out.push('\t'),
            "w:br" | "w:cr" | "/w:p" => out.push('\n'),
            _ => {}
        }

        rest = tail.get(close.saturating_add(1)..).unwrap_or_default();
    }

    out
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use zip::write::SimpleFileOptions;

    use super::*;

    fn docx_bytes(document_xml: &str) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("word/document.xml", SimpleFileOptions::default())
            .expect("start part");
        writer
            .write_all(document_xml.as_bytes())
            .expect("write part");
        writer.finish().expect("finish archive").into_inner()
    }

    const BODY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>
<w:p><w:r><w:t>Primary care</w:t></w:r><w:r><w:t xml:space="preserve"> managers</w:t></w:r></w:p>
<w:p><w:r><w:t>Referrals &amp; follow-up</w:t><w:tab/><w:t>&lt;urgent&gt;</w:t></w:r><w:r><w:t/></w:r></w:p>
</w:body></w:document>"#;

    #[test]
    fn paragraphs_become_lines() {
        let text = extract_docx_text(&docx_bytes(BODY)).expect("extract");
        assert_eq!(
            text,
            "Primary care managers\nReferrals & follow-up\t<urgent>\n"
        );
    }

    #[test]
    fn non_archive_is_a_document_error() {
        assert!(matches!(
            extract_docx_text(b"plain text"),
            Err(AppError::Document(_))
        ));
    }

    #[tokio::test]
    async fn directory_source_reads_docx_files_in_name_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("b.docx"), docx_bytes(BODY)).expect("write b");
        std::fs::write(
            dir.path().join("a.DOCX"),
            docx_bytes("<w:p><w:r><w:t>first</w:t></w:r></w:p>"),
        )
        .expect("write a");
        std::fs::write(dir.path().join("notes.txt"), "ignored").expect("write txt");

        let documents = DocxDirectory::new(dir.path()).load().await.expect("load");

        let titles: Vec<&str> = documents.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, vec!["a.DOCX", "b.docx"]);
        assert_eq!(documents[0].text, "first\n");
    }

    #[tokio::test]
    async fn missing_directory_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("docs");

        match DocxDirectory::new(&missing).load().await {
            Err(AppError::Validation(msg)) => assert!(msg.contains("Docs directory does not exist")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
