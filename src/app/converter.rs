//! Gateway to the external document-to-pages converter.
//!
//! The converter is invoked as
//! `<bin> <args...> --pdf <source> --out <output dir> --title <title>` and must
//! print a single JSON object on stdout when it exits successfully:
//!
//! ```json
//! {"pageCount": 2, "pages": [{"page": 1, "file": "page_1.html"}, {"page": 2, "file": "page_2.html"}]}
//! ```
//!
//! Page files are written by the converter itself, relative to the output directory.

use std::path::{Component, Path};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::app::error::{ConversionError, truncate_details};

pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, Copy)]
pub struct ConversionRequest<'a> {
    pub source: &'a Path,
    pub output_dir: &'a Path,
    pub title: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertedPage {
    pub page: u32,
    pub file: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionOutput {
    #[serde(default)]
    pub page_count: Option<usize>,
    #[serde(default)]
    pub pages: Vec<ConvertedPage>,
}

impl ConversionOutput {
    /// Rejects output that cannot become a consistent book.
    pub fn validate(&self) -> Result<(), ConversionError> {
        if self.pages.is_empty() {
            return Err(ConversionError::NoPages);
        }
        if let Some(reported) = self.page_count {
            if reported != self.pages.len() {
                return Err(ConversionError::PageCountMismatch {
                    reported,
                    listed: self.pages.len(),
                });
            }
        }
        if let Some(page) = self.pages.iter().find(|p| !is_safe_relative_file(&p.file)) {
            return Err(ConversionError::UnsafePageFile(page.file.clone()));
        }
        Ok(())
    }
}

fn is_safe_relative_file(file: &str) -> bool {
    if file.is_empty() || file.contains('\\') {
        return false;
    }
    let mut components = Path::new(file).components().peekable();
    components.peek().is_some() && components.all(|c| matches!(c, Component::Normal(_)))
}

#[async_trait]
pub trait Converter: Send + Sync {
    async fn convert(
        &self,
        request: ConversionRequest<'_>,
    ) -> Result<ConversionOutput, ConversionError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConverterConfig {
    pub bin: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl ConverterConfig {
    pub fn from_env() -> Self {
        let bin = std::env::var("FOLIO_CONVERTER_BIN").unwrap_or_else(|_| "python3".to_owned());
        let args = std::env::var("FOLIO_CONVERTER_ARGS")
            .map(|raw| raw.split_whitespace().map(str::to_owned).collect())
            .unwrap_or_else(|_| vec!["scripts/pdf_parser.py".to_owned()]);
        let timeout_secs = std::env::var("FOLIO_CONVERTER_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Self {
            bin,
            args,
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

/// Runs the converter as a child process.
#[derive(Debug, Clone)]
pub struct CommandConverter {
    config: ConverterConfig,
}

impl CommandConverter {
    pub fn new(config: ConverterConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Converter for CommandConverter {
    async fn convert(
        &self,
        request: ConversionRequest<'_>,
    ) -> Result<ConversionOutput, ConversionError> {
        let config = &self.config;
        tracing::info!(
            bin = %config.bin,
            source = %request.source.display(),
            out = %request.output_dir.display(),
            timeout_secs = config.timeout.as_secs(),
            "run converter"
        );

        let child = Command::new(&config.bin)
            .args(&config.args)
            .arg("--pdf")
            .arg(request.source)
            .arg("--out")
            .arg(request.output_dir)
            .arg("--title")
            .arg(request.title)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ConversionError::Spawn {
                bin: config.bin.clone(),
                source,
            })?;

        // Dropping the pending future on timeout drops the child, which kills it.
        let output = tokio::time::timeout(config.timeout, child.wait_with_output())
            .await
            .map_err(|_| ConversionError::TimedOut(config.timeout))?
            .map_err(ConversionError::Io)?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let details = if stderr.trim().is_empty() {
                &stdout
            } else {
                &stderr
            };
            return Err(ConversionError::Failed {
                status: output.status.to_string(),
                details: truncate_details(details),
            });
        }

        if !stderr.trim().is_empty() {
            tracing::debug!(stderr = %stderr.trim(), "converter stderr");
        }
        parse_output(&stdout)
    }
}

/// Parses converter stdout. Empty output counts as `{}`.
pub fn parse_output(stdout: &str) -> Result<ConversionOutput, ConversionError> {
    let trimmed = stdout.trim();
    let text = if trimmed.is_empty() { "{}" } else { trimmed };
    serde_json::from_str(text).map_err(|source| ConversionError::InvalidOutput {
        details: truncate_details(stdout),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh_converter(script: &str, timeout: Duration) -> CommandConverter {
        CommandConverter::new(ConverterConfig {
            bin: "sh".to_owned(),
            args: vec!["-c".to_owned(), script.to_owned(), "converter".to_owned()],
            timeout,
        })
    }

    fn request<'a>(dir: &'a Path) -> ConversionRequest<'a> {
        ConversionRequest {
            source: Path::new("/tmp/input.pdf"),
            output_dir: dir,
            title: "My Book",
        }
    }

    #[test]
    fn parse_output_reads_pages() -> anyhow::Result<()> {
        let out = parse_output(
            r#"{"pageCount":2,"pages":[{"page":1,"file":"p1.png"},{"page":2,"file":"p2.png"}]}"#,
        )?;
        assert_eq!(out.page_count, Some(2));
        assert_eq!(
            out.pages,
            vec![
                ConvertedPage {
                    page: 1,
                    file: "p1.png".to_owned()
                },
                ConvertedPage {
                    page: 2,
                    file: "p2.png".to_owned()
                },
            ]
        );
        out.validate()?;
        Ok(())
    }

    #[test]
    fn parse_output_treats_blank_as_empty_object() -> anyhow::Result<()> {
        let out = parse_output("  \n")?;
        assert_eq!(out, ConversionOutput::default());
        assert!(matches!(out.validate(), Err(ConversionError::NoPages)));
        Ok(())
    }

    #[test]
    fn parse_output_rejects_non_json() {
        let err = parse_output("Traceback (most recent call last)").expect_err("invalid");
        match err {
            ConversionError::InvalidOutput { details, .. } => {
                assert!(details.contains("Traceback"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_mismatched_page_count() {
        let out = ConversionOutput {
            page_count: Some(3),
            pages: vec![ConvertedPage {
                page: 1,
                file: "p1.png".to_owned(),
            }],
        };
        assert!(matches!(
            out.validate(),
            Err(ConversionError::PageCountMismatch {
                reported: 3,
                listed: 1
            })
        ));
    }

    #[test]
    fn validate_accepts_missing_page_count() {
        let out = ConversionOutput {
            page_count: None,
            pages: vec![ConvertedPage {
                page: 1,
                file: "nested/p1.png".to_owned(),
            }],
        };
        assert!(out.validate().is_ok());
    }

    #[test]
    fn validate_rejects_escaping_page_files() {
        for file in ["../secret", "/etc/passwd", "a/../../b", "", "./", "a\\b"] {
            let out = ConversionOutput {
                page_count: None,
                pages: vec![ConvertedPage {
                    page: 1,
                    file: file.to_owned(),
                }],
            };
            assert!(
                matches!(out.validate(), Err(ConversionError::UnsafePageFile(_))),
                "file={file:?}"
            );
        }
    }

    #[tokio::test]
    async fn command_converter_passes_named_arguments() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let script = r#"
[ "$1" = "--pdf" ] && [ "$3" = "--out" ] && [ "$5" = "--title" ] || exit 9
mkdir -p "$4"
printf '%s' "$6" > "$4/title.txt"
printf '{"pageCount":1,"pages":[{"page":1,"file":"page_1.html"}]}'
"#;
        let converter = sh_converter(script, Duration::from_secs(10));
        let out_dir = temp.path().join("out");

        let out = converter.convert(request(&out_dir)).await?;
        assert_eq!(out.pages.len(), 1);
        assert_eq!(std::fs::read_to_string(out_dir.join("title.txt"))?, "My Book");
        Ok(())
    }

    #[tokio::test]
    async fn command_converter_reports_nonzero_exit_with_stderr() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let converter = sh_converter(
            "echo 'ModuleNotFoundError: pypdf' >&2; exit 3",
            Duration::from_secs(10),
        );

        let err = converter
            .convert(request(temp.path()))
            .await
            .expect_err("nonzero exit");
        match err {
            ConversionError::Failed { details, .. } => {
                assert!(details.contains("ModuleNotFoundError"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn command_converter_falls_back_to_stdout_details() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let converter = sh_converter("echo 'partial output'; exit 1", Duration::from_secs(10));

        let err = converter
            .convert(request(temp.path()))
            .await
            .expect_err("nonzero exit");
        assert_eq!(err.details().as_deref(), Some("partial output\n"));
        Ok(())
    }

    #[tokio::test]
    async fn command_converter_times_out() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let converter = sh_converter("sleep 30", Duration::from_millis(200));

        let err = converter
            .convert(request(temp.path()))
            .await
            .expect_err("timeout");
        assert!(matches!(err, ConversionError::TimedOut(_)));
        Ok(())
    }

    #[tokio::test]
    async fn command_converter_reports_missing_binary() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let converter = CommandConverter::new(ConverterConfig {
            bin: "folio-converter-that-does-not-exist".to_owned(),
            args: Vec::new(),
            timeout: Duration::from_secs(1),
        });

        let err = converter
            .convert(request(temp.path()))
            .await
            .expect_err("spawn");
        assert!(matches!(err, ConversionError::Spawn { .. }));
        Ok(())
    }
}
