use std::{fmt, path::Path, str::FromStr, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task;
use tracing::{debug, warn};

use crate::config::ExtractionConfig;

pub mod direct;
pub mod preprocess;
pub mod toolchain;

pub use toolchain::{CommandToolchain, ToolError, Toolchain};

pub const PAGE_BREAK: char = '\u{c}';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    #[default]
    Auto,
    Text,
    Image,
}

impl ExtractionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMode::Auto => "auto",
            ExtractionMode::Text => "text",
            ExtractionMode::Image => "image",
        }
    }

    pub fn chain(&self) -> &'static [ExtractionStrategy] {
        match self {
            ExtractionMode::Auto => &[ExtractionStrategy::DirectText, ExtractionStrategy::Recognition],
            ExtractionMode::Text => &[ExtractionStrategy::DirectText],
            ExtractionMode::Image => &[ExtractionStrategy::Recognition],
        }
    }
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExtractionMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(ExtractionMode::Auto),
            "text" => Ok(ExtractionMode::Text),
            "image" => Ok(ExtractionMode::Image),
            other => Err(format!("unknown mode '{other}'. Allowed modes: auto, text, image")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    DirectText,
    Recognition,
}

impl ExtractionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionStrategy::DirectText => "direct_text",
            ExtractionStrategy::Recognition => "recognition",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Pdf,
    Docx,
    PlainText,
    Image,
    Other,
}

impl SourceKind {
    // Magic bytes, then declared type, then file name.
    pub fn detect(bytes: &[u8], content_type: Option<&str>, file_name: Option<&str>) -> Self {
        if bytes.starts_with(b"%PDF") {
            return SourceKind::Pdf;
        }
        if bytes.starts_with(b"\x89PNG")
            || bytes.starts_with(&[0xFF, 0xD8, 0xFF])
            || bytes.starts_with(b"II*\0")
            || bytes.starts_with(b"MM\0*")
        {
            return SourceKind::Image;
        }
        let declared = content_type.map(|ct| ct.to_ascii_lowercase());
        match declared.as_deref() {
            Some("application/pdf") => return SourceKind::Pdf,
            Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document") => {
                return SourceKind::Docx
            }
            Some(ct) if ct.starts_with("text/plain") => return SourceKind::PlainText,
            Some(ct) if ct.starts_with("image/") => return SourceKind::Image,
            _ => {}
        }
        let ext = file_name
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("pdf") => SourceKind::Pdf,
            Some("docx") => SourceKind::Docx,
            Some("txt") => SourceKind::PlainText,
            Some("png" | "jpg" | "jpeg" | "tif" | "tiff") => SourceKind::Image,
            _ => SourceKind::Other,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Source {
    pub kind: SourceKind,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFailure {
    pub tool: String,
    pub stage: String,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub timed_out: bool,
    pub detail: String,
}

impl ToolFailure {
    fn from_error(stage: &str, err: &ToolError) -> Self {
        let exit_code = match err {
            ToolError::Failed { code, .. } => *code,
            _ => None,
        };
        Self {
            tool: err.tool().to_string(),
            stage: stage.to_string(),
            exit_code,
            timed_out: matches!(err, ToolError::TimedOut { .. }),
            detail: err.to_string(),
        }
    }

    fn note(tool: &str, stage: &str, detail: impl Into<String>) -> Self {
        Self {
            tool: tool.to_string(),
            stage: stage.to_string(),
            exit_code: None,
            timed_out: false,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrInfo {
    pub mode: ExtractionMode,
    pub method: Option<ExtractionStrategy>,
    pub attempted: Vec<ExtractionStrategy>,
    pub fallback: bool,
    pub pages: u32,
    pub total_pages: Option<u32>,
    pub truncated: bool,
    pub preprocessed: bool,
    pub languages: String,
    pub errors: Vec<ToolFailure>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_missing: Vec<String>,
    pub completed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_chars: Option<Vec<usize>>,
}

impl OcrInfo {
    fn started(mode: ExtractionMode, settings: &ExtractionSettings) -> Self {
        Self {
            mode,
            method: None,
            attempted: Vec::new(),
            fallback: false,
            pages: 0,
            total_pages: None,
            truncated: false,
            preprocessed: false,
            languages: settings.languages.clone(),
            errors: Vec::new(),
            tool_missing: Vec::new(),
            completed_at: Utc::now(),
            page_chars: None,
        }
    }

    fn record(&mut self, stage: &str, err: &ToolError) {
        if let ToolError::Missing { tool } = err {
            if !self.tool_missing.contains(tool) {
                self.tool_missing.push(tool.clone());
            }
        }
        self.errors.push(ToolFailure::from_error(stage, err));
    }
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub text: String,
    pub info: OcrInfo,
}

#[derive(Debug, Clone)]
pub struct ExtractionSettings {
    pub languages: String,
    pub dpi: u32,
    pub max_pages: u32,
    pub preprocess: bool,
    pub verbose: bool,
}

impl From<&ExtractionConfig> for ExtractionSettings {
    fn from(config: &ExtractionConfig) -> Self {
        Self {
            languages: config.languages.clone(),
            dpi: config.dpi,
            max_pages: config.max_pages.max(1),
            preprocess: config.preprocess,
            verbose: config.verbose,
        }
    }
}

pub fn has_meaningful_text(text: &str) -> bool {
    text.chars().any(|c| !c.is_whitespace() && !c.is_control())
}

struct Attempt {
    text: String,
    pages: u32,
    page_chars: Vec<usize>,
}

pub struct Extractor {
    toolchain: Arc<dyn Toolchain>,
    settings: ExtractionSettings,
}

impl Extractor {
    pub fn new(toolchain: Arc<dyn Toolchain>, settings: ExtractionSettings) -> Self {
        Self {
            toolchain,
            settings,
        }
    }

    pub async fn extract(&self, source: &Source, mode: ExtractionMode) -> Extraction {
        let mut info = OcrInfo::started(mode, &self.settings);

        for strategy in mode.chain() {
            info.attempted.push(*strategy);
            info.fallback = info.attempted.len() > 1;

            let attempt = match strategy {
                ExtractionStrategy::DirectText => self.direct_text(source, &mut info).await,
                ExtractionStrategy::Recognition => self.recognition(source, &mut info).await,
            };
            let Some(attempt) = attempt else { continue };

            if has_meaningful_text(&attempt.text) {
                info.method = Some(*strategy);
                info.pages = attempt.pages;
                if self.settings.verbose {
                    info.page_chars = Some(attempt.page_chars);
                }
                info.completed_at = Utc::now();
                debug!(
                    method = strategy.as_str(),
                    fallback = info.fallback,
                    pages = info.pages,
                    "extraction succeeded"
                );
                return Extraction {
                    text: attempt.text,
                    info,
                };
            }
            info.errors.push(ToolFailure::note(
                strategy.as_str(),
                "validate",
                "output contained no printable text",
            ));
        }

        info.completed_at = Utc::now();
        warn!(
            mode = mode.as_str(),
            errors = info.errors.len(),
            "extraction produced no text"
        );
        Extraction {
            text: String::new(),
            info,
        }
    }

    pub fn unreadable(
        &self,
        mode: ExtractionMode,
        timed_out: bool,
        detail: impl Into<String>,
    ) -> Extraction {
        let mut info = OcrInfo::started(mode, &self.settings);
        info.errors.push(ToolFailure {
            tool: "storage".into(),
            stage: "fetch".into(),
            exit_code: None,
            timed_out,
            detail: detail.into(),
        });
        Extraction {
            text: String::new(),
            info,
        }
    }

    async fn direct_text(&self, source: &Source, info: &mut OcrInfo) -> Option<Attempt> {
        let text = match source.kind {
            SourceKind::PlainText => direct::plain_text(&source.bytes),
            SourceKind::Docx => match direct::docx_text(&source.bytes) {
                Ok(text) => text,
                Err(detail) => {
                    info.errors.push(ToolFailure::note("docx", "direct_text", detail));
                    return None;
                }
            },
            SourceKind::Pdf => match self.toolchain.pdf_text(&source.bytes).await {
                Ok(text) => text,
                Err(err) => {
                    info.record("direct_text", &err);
                    return None;
                }
            },
            SourceKind::Image | SourceKind::Other => {
                info.errors.push(ToolFailure::note(
                    ExtractionStrategy::DirectText.as_str(),
                    "direct_text",
                    "source has no embedded text layer",
                ));
                return None;
            }
        };

        let all_pages: Vec<&str> = text.split(PAGE_BREAK).collect();
        let total = u32::try_from(all_pages.len()).unwrap_or(u32::MAX);
        let kept = &all_pages[..all_pages.len().min(self.settings.max_pages as usize)];
        let truncated = total > self.settings.max_pages;
        if source.kind == SourceKind::Pdf || truncated {
            info.total_pages = Some(total);
            info.truncated = truncated;
        }

        let page_chars: Vec<usize> = kept
            .iter()
            .map(|page| page.chars().filter(|c| !c.is_whitespace()).count())
            .collect();
        Some(Attempt {
            pages: u32::try_from(kept.len()).unwrap_or(u32::MAX),
            text: kept.join(&PAGE_BREAK.to_string()),
            page_chars,
        })
    }

    async fn recognition(&self, source: &Source, info: &mut OcrInfo) -> Option<Attempt> {
        let images = match source.kind {
            SourceKind::Image => {
                info.total_pages = Some(1);
                vec![source.bytes.clone()]
            }
            SourceKind::Pdf => self.rasterize_pdf(&source.bytes, info).await?,
            SourceKind::PlainText | SourceKind::Docx | SourceKind::Other => {
                info.errors.push(ToolFailure::note(
                    ExtractionStrategy::Recognition.as_str(),
                    "rasterize",
                    "recognition needs a PDF or image source",
                ));
                return None;
            }
        };

        let mut pages = Vec::with_capacity(images.len());
        for (index, image) in images.into_iter().enumerate() {
            let image = self.maybe_preprocess(image, info).await;
            match self
                .toolchain
                .recognize(&image, &self.settings.languages, self.settings.dpi)
                .await
            {
                Ok(text) => pages.push(text),
                Err(err) => {
                    info.record(&format!("recognize:page{}", index + 1), &err);
                    pages.push(String::new());
                    if matches!(err, ToolError::Missing { .. }) {
                        break;
                    }
                }
            }
        }

        let page_chars = pages
            .iter()
            .map(|page| page.chars().filter(|c| !c.is_whitespace()).count())
            .collect();
        Some(Attempt {
            pages: u32::try_from(pages.len()).unwrap_or(u32::MAX),
            text: pages.join(&PAGE_BREAK.to_string()),
            page_chars,
        })
    }

    async fn rasterize_pdf(&self, pdf: &[u8], info: &mut OcrInfo) -> Option<Vec<Vec<u8>>> {
        let max_pages = self.settings.max_pages;
        let wanted = match self.toolchain.count_pages(pdf).await {
            Ok(total) => {
                info.total_pages = Some(total);
                info.truncated = total > max_pages;
                total.min(max_pages)
            }
            Err(err) => {
                // Without a page count, render up to the cap and let the
                // rasterizer stop at the real end.
                info.record("count_pages", &err);
                max_pages
            }
        };

        match self
            .toolchain
            .rasterize(pdf, self.settings.dpi, wanted)
            .await
        {
            Ok(mut images) => {
                images.truncate(max_pages as usize);
                Some(images)
            }
            Err(err) => {
                info.record("rasterize", &err);
                None
            }
        }
    }

    async fn maybe_preprocess(&self, image: Vec<u8>, info: &mut OcrInfo) -> Vec<u8> {
        if !self.settings.preprocess {
            return image;
        }
        let input = image.clone();
        match task::spawn_blocking(move || preprocess::enhance(&input)).await {
            Ok(Ok(enhanced)) => {
                info.preprocessed = true;
                enhanced
            }
            Ok(Err(detail)) => {
                debug!(error = %detail, "preprocessing skipped; using raw page");
                image
            }
            Err(err) => {
                debug!(error = %err, "preprocessing task failed; using raw page");
                image
            }
        }
    }
}
