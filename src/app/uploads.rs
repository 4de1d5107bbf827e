//! Staging of uploaded files under the uploads directory.
//!
//! Bytes are streamed into a temporary file next to their final location and
//! renamed into place once complete, so a rejected or interrupted upload never
//! leaves a partial file under its public name.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};

use crate::app::error::UploadError;
use crate::slug::unique_millis;

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Pdf,
    Video,
    File,
}

impl UploadKind {
    pub const ALL: [UploadKind; 3] = [UploadKind::Pdf, UploadKind::Video, UploadKind::File];

    /// Subdirectory of the uploads directory, also the public URL segment.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Pdf => "pdfs",
            Self::Video => "videos",
            Self::File => "files",
        }
    }

    /// Multipart field carrying the file.
    pub fn field_name(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Video => "video",
            Self::File => "file",
        }
    }

    pub fn max_bytes(self) -> u64 {
        match self {
            Self::Pdf => 25 * MIB,
            Self::Video => 200 * MIB,
            Self::File => 50 * MIB,
        }
    }

    pub fn from_dir_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.dir_name() == name)
    }
}

/// A file that has been written to its final location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedUpload {
    pub kind: UploadKind,
    /// Name as supplied by the client.
    pub original_name: String,
    /// Name on disk, `<millis>_<safe basename>`.
    pub stored_name: String,
    pub path: PathBuf,
    pub size: u64,
}

impl StagedUpload {
    /// Public retrieval path, e.g. `/uploads/pdfs/1718000000000_report.pdf`.
    pub fn url(&self) -> String {
        format!("/uploads/{}/{}", self.kind.dir_name(), self.stored_name)
    }
}

/// Keeps the final path segment and replaces anything outside `[A-Za-z0-9._-]` with `_`.
pub fn safe_file_name(original: &str) -> String {
    let base = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original);
    base.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Reduces a client-supplied name to a bare file name, refusing dot names.
pub fn base_name(name: &str) -> Option<&str> {
    let base = name.rsplit(['/', '\\']).next()?;
    match base {
        "" | "." | ".." => None,
        _ => Some(base),
    }
}

/// Incrementally writes one upload, enforcing the kind's size limit.
#[derive(Debug)]
pub struct UploadSink {
    kind: UploadKind,
    original_name: String,
    stored_name: String,
    final_path: PathBuf,
    tmp_path: PathBuf,
    file: fs::File,
    written: u64,
}

impl UploadSink {
    pub async fn create(
        uploads_dir: &Path,
        kind: UploadKind,
        original_name: &str,
    ) -> Result<Self, UploadError> {
        let dir = uploads_dir.join(kind.dir_name());
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| UploadError::Io {
                path: dir.clone(),
                source,
            })?;

        let stored_name = format!(
            "{}_{}",
            unique_millis(),
            safe_file_name(original_name)
        );
        let final_path = dir.join(&stored_name);
        let tmp_path = dir.join(format!(".upload-{}", uuid::Uuid::new_v4().simple()));
        let file = fs::File::create(&tmp_path)
            .await
            .map_err(|source| UploadError::Io {
                path: tmp_path.clone(),
                source,
            })?;

        Ok(Self {
            kind,
            original_name: original_name.to_owned(),
            stored_name,
            final_path,
            tmp_path,
            file,
            written: 0,
        })
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), UploadError> {
        let limit = self.kind.max_bytes();
        self.written += chunk.len() as u64;
        if self.written > limit {
            return Err(UploadError::TooLarge { limit });
        }
        self.file
            .write_all(chunk)
            .await
            .map_err(|source| UploadError::Io {
                path: self.tmp_path.clone(),
                source,
            })
    }

    pub async fn finish(mut self) -> Result<StagedUpload, UploadError> {
        let io_err = |path: &Path, source| UploadError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Err(source) = self.file.flush().await {
            let _ = fs::remove_file(&self.tmp_path).await;
            return Err(io_err(&self.tmp_path, source));
        }
        drop(self.file);
        if let Err(source) = fs::rename(&self.tmp_path, &self.final_path).await {
            let _ = fs::remove_file(&self.tmp_path).await;
            return Err(io_err(&self.final_path, source));
        }

        tracing::info!(
            kind = self.kind.dir_name(),
            stored_name = %self.stored_name,
            bytes = self.written,
            "upload stored"
        );
        Ok(StagedUpload {
            kind: self.kind,
            original_name: self.original_name,
            stored_name: self.stored_name,
            path: self.final_path,
            size: self.written,
        })
    }

    /// Discards everything written so far.
    pub async fn abort(self) {
        drop(self.file);
        if let Err(err) = fs::remove_file(&self.tmp_path).await {
            tracing::warn!(path = %self.tmp_path.display(), %err, "remove aborted upload");
        }
    }
}

/// Copies a local file into the uploads directory as if it had been uploaded.
pub async fn stage_local_file(
    uploads_dir: &Path,
    kind: UploadKind,
    source: &Path,
) -> Result<StagedUpload, UploadError> {
    let original_name = source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut input = fs::File::open(source)
        .await
        .map_err(|err| UploadError::Io {
            path: source.to_path_buf(),
            source: err,
        })?;
    let mut sink = UploadSink::create(uploads_dir, kind, &original_name).await?;

    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let read = match input.read(&mut buf).await {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) => {
                sink.abort().await;
                return Err(UploadError::Io {
                    path: source.to_path_buf(),
                    source: err,
                });
            }
        };
        if let Err(err) = sink.write_chunk(&buf[..read]).await {
            sink.abort().await;
            return Err(err);
        }
    }
    sink.finish().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_file_name_replaces_unsafe_characters() {
        let cases = [
            ("report.pdf", "report.pdf"),
            ("My Report (v2).pdf", "My_Report__v2_.pdf"),
            ("../../etc/passwd", "passwd"),
            (r"C:\Users\me\cv.pdf", "cv.pdf"),
            ("naïve.pdf", "na_ve.pdf"),
        ];
        for (input, expected) in cases {
            assert_eq!(safe_file_name(input), expected, "input={input}");
        }
    }

    #[test]
    fn base_name_rejects_dot_segments() {
        assert_eq!(base_name("a/b/c.pdf"), Some("c.pdf"));
        assert_eq!(base_name(".."), None);
        assert_eq!(base_name("x/"), None);
        assert_eq!(base_name("."), None);
    }

    #[test]
    fn upload_kind_round_trips_dir_names() {
        for kind in UploadKind::ALL {
            assert_eq!(UploadKind::from_dir_name(kind.dir_name()), Some(kind));
        }
        assert_eq!(UploadKind::from_dir_name("secrets"), None);
    }

    #[tokio::test]
    async fn sink_writes_and_renames() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let mut sink = UploadSink::create(temp.path(), UploadKind::File, "notes v1.txt").await?;
        sink.write_chunk(b"hello ").await?;
        sink.write_chunk(b"world").await?;
        let staged = sink.finish().await?;

        assert!(staged.stored_name.ends_with("_notes_v1.txt"));
        assert_eq!(staged.size, 11);
        assert_eq!(std::fs::read_to_string(&staged.path)?, "hello world");
        assert_eq!(staged.url(), format!("/uploads/files/{}", staged.stored_name));

        let leftovers = std::fs::read_dir(temp.path().join("files"))?
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(".upload-"))
            .count();
        assert_eq!(leftovers, 0);
        Ok(())
    }

    #[tokio::test]
    async fn same_name_uploads_never_share_a_path() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let mut first = UploadSink::create(temp.path(), UploadKind::Pdf, "report.pdf").await?;
        let mut second = UploadSink::create(temp.path(), UploadKind::Pdf, "report.pdf").await?;
        first.write_chunk(b"AAAA").await?;
        second.write_chunk(b"BBBB").await?;
        let first = first.finish().await?;
        let second = second.finish().await?;

        assert_ne!(first.path, second.path);
        assert_ne!(first.url(), second.url());
        assert_eq!(std::fs::read(&first.path)?, b"AAAA");
        assert_eq!(std::fs::read(&second.path)?, b"BBBB");
        Ok(())
    }

    #[tokio::test]
    async fn sink_rejects_oversized_upload() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let mut sink = UploadSink::create(temp.path(), UploadKind::Pdf, "big.pdf").await?;
        let chunk = vec![0u8; MIB as usize];

        let mut result = Ok(());
        for _ in 0..26 {
            result = sink.write_chunk(&chunk).await;
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(UploadError::TooLarge { .. })));
        sink.abort().await;

        assert_eq!(std::fs::read_dir(temp.path().join("pdfs"))?.count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn stage_local_file_copies_into_uploads() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let source = temp.path().join("Annual Report.pdf");
        std::fs::write(&source, b"%PDF-1.4")?;

        let staged = stage_local_file(&temp.path().join("uploads"), UploadKind::Pdf, &source).await?;
        assert_eq!(staged.original_name, "Annual Report.pdf");
        assert!(staged.stored_name.ends_with("_Annual_Report.pdf"));
        assert_eq!(std::fs::read(&staged.path)?, b"%PDF-1.4");
        Ok(())
    }
}
