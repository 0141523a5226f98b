use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    process::Output,
    time::Duration,
};

use async_trait::async_trait;
use pdfium_render::prelude::*;
use thiserror::Error;
use tokio::{process::Command, task};

use crate::config::{ConfigError, ExtractionConfig};

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{tool} is not installed")]
    Missing { tool: String },
    #[error("{tool} timed out after {seconds}s")]
    TimedOut { tool: String, seconds: u64 },
    #[error("{tool} exited with {code:?}: {stderr}")]
    Failed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("{tool}: {detail}")]
    Invalid { tool: String, detail: String },
    #[error("{tool} i/o error: {source}")]
    Io {
        tool: String,
        #[source]
        source: std::io::Error,
    },
}

impl ToolError {
    pub fn tool(&self) -> &str {
        match self {
            ToolError::Missing { tool }
            | ToolError::TimedOut { tool, .. }
            | ToolError::Failed { tool, .. }
            | ToolError::Invalid { tool, .. }
            | ToolError::Io { tool, .. } => tool,
        }
    }

    fn io(tool: &str, source: std::io::Error) -> Self {
        ToolError::Io {
            tool: tool.to_string(),
            source,
        }
    }
}

#[async_trait]
pub trait Toolchain: Send + Sync + 'static {
    async fn pdf_text(&self, pdf: &[u8]) -> Result<String, ToolError>;

    async fn count_pages(&self, pdf: &[u8]) -> Result<u32, ToolError>;

    async fn rasterize(&self, pdf: &[u8], dpi: u32, pages: u32) -> Result<Vec<Vec<u8>>, ToolError>;

    async fn recognize(&self, image: &[u8], languages: &str, dpi: u32) -> Result<String, ToolError>;
}

pub struct CommandToolchain {
    pdftoppm: String,
    pdfinfo: String,
    tesseract: String,
    timeout: Duration,
}

impl CommandToolchain {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            pdftoppm: config.pdftoppm_bin.clone(),
            pdfinfo: config.pdfinfo_bin.clone(),
            tesseract: config.tesseract_bin.clone(),
            timeout: config.tool_timeout,
        }
    }

    async fn run(&self, program: &str, args: &[&str], workdir: &Path) -> Result<Output, ToolError> {
        let child = Command::new(program)
            .args(args)
            .current_dir(workdir)
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, child).await {
            Err(_) => {
                return Err(ToolError::TimedOut {
                    tool: program.to_string(),
                    seconds: self.timeout.as_secs(),
                })
            }
            Ok(Err(err)) if err.kind() == ErrorKind::NotFound => {
                return Err(ToolError::Missing {
                    tool: program.to_string(),
                })
            }
            Ok(Err(err)) => return Err(ToolError::io(program, err)),
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ToolError::Failed {
                tool: program.to_string(),
                code: output.status.code(),
                stderr: stderr.trim().chars().take(500).collect(),
            });
        }
        Ok(output)
    }
}

async fn scratch_file(name: &str, bytes: &[u8], tool: &str) -> Result<(tempfile::TempDir, PathBuf), ToolError> {
    let dir = tempfile::tempdir().map_err(|err| ToolError::io(tool, err))?;
    let path = dir.path().join(name);
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|err| ToolError::io(tool, err))?;
    Ok((dir, path))
}

#[async_trait]
impl Toolchain for CommandToolchain {
    async fn pdf_text(&self, pdf: &[u8]) -> Result<String, ToolError> {
        let bytes = pdf.to_vec();
        task::spawn_blocking(move || extract_pdf_text(&bytes))
            .await
            .map_err(|err| ToolError::Invalid {
                tool: "pdfium".into(),
                detail: format!("text extraction task panicked: {err}"),
            })?
    }

    async fn count_pages(&self, pdf: &[u8]) -> Result<u32, ToolError> {
        let (dir, path) = scratch_file("source.pdf", pdf, &self.pdfinfo).await?;
        let source = path.to_string_lossy().into_owned();
        let output = self.run(&self.pdfinfo, &[source.as_str()], dir.path()).await?;
        parse_page_count(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| ToolError::Invalid {
            tool: self.pdfinfo.clone(),
            detail: "no page count in output".into(),
        })
    }

    async fn rasterize(&self, pdf: &[u8], dpi: u32, pages: u32) -> Result<Vec<Vec<u8>>, ToolError> {
        let (dir, path) = scratch_file("source.pdf", pdf, &self.pdftoppm).await?;
        let dpi = dpi.to_string();
        let last = pages.max(1).to_string();
        let source = path.to_string_lossy().into_owned();
        let prefix = dir.path().join("page").to_string_lossy().into_owned();
        self.run(
            &self.pdftoppm,
            &[
                "-r",
                dpi.as_str(),
                "-f",
                "1",
                "-l",
                last.as_str(),
                "-png",
                source.as_str(),
                prefix.as_str(),
            ],
            dir.path(),
        )
        .await?;

        // pdftoppm zero-pads page numbers to the width of the last page.
        let mut rendered = Vec::new();
        let mut entries = tokio::fs::read_dir(dir.path())
            .await
            .map_err(|err| ToolError::io(&self.pdftoppm, err))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| ToolError::io(&self.pdftoppm, err))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(number) = page_number(&name) {
                rendered.push((number, entry.path()));
            }
        }
        rendered.sort_by_key(|(number, _)| *number);

        let mut images = Vec::with_capacity(rendered.len());
        for (_, path) in rendered {
            images.push(
                tokio::fs::read(&path)
                    .await
                    .map_err(|err| ToolError::io(&self.pdftoppm, err))?,
            );
        }
        Ok(images)
    }

    async fn recognize(&self, image: &[u8], languages: &str, dpi: u32) -> Result<String, ToolError> {
        let (dir, path) = scratch_file("page.png", image, &self.tesseract).await?;
        let dpi = dpi.to_string();
        let source = path.to_string_lossy().into_owned();
        let output = self
            .run(
                &self.tesseract,
                &[source.as_str(), "stdout", "-l", languages, "--dpi", dpi.as_str()],
                dir.path(),
            )
            .await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn extract_pdf_text(bytes: &[u8]) -> Result<String, ToolError> {
    let bindings = Pdfium::bind_to_system_library().map_err(|_| ToolError::Missing {
        tool: "pdfium".into(),
    })?;
    let pdfium = Pdfium::new(bindings);
    let invalid = |detail: String| ToolError::Invalid {
        tool: "pdfium".into(),
        detail,
    };
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|err| invalid(format!("load pdf: {err}")))?;

    let mut pages = Vec::new();
    for page in document.pages().iter() {
        let text = page
            .text()
            .map_err(|err| invalid(format!("read page text: {err}")))?;
        pages.push(text.all());
    }
    Ok(pages.join("\u{c}"))
}

fn parse_page_count(pdfinfo_stdout: &str) -> Option<u32> {
    pdfinfo_stdout
        .lines()
        .find_map(|line| line.strip_prefix("Pages:"))
        .and_then(|rest| rest.trim().parse().ok())
}

fn page_number(file_name: &str) -> Option<u32> {
    file_name
        .strip_prefix("page-")?
        .strip_suffix(".png")?
        .parse()
        .ok()
}

pub fn probe(config: &ExtractionConfig) -> Result<(), ConfigError> {
    for (binary, variable) in [
        (&config.pdfinfo_bin, "PDFINFO_BIN"),
        (&config.pdftoppm_bin, "PDFTOPPM_BIN"),
        (&config.tesseract_bin, "TESSERACT_BIN"),
    ] {
        let resolved = which::which(binary).map_err(|_| ConfigError::ToolMissing {
            tool: binary.clone(),
            variable,
        })?;
        tracing::debug!(tool = %binary, path = %resolved.display(), "extraction tool found");
    }
    Ok(())
}
