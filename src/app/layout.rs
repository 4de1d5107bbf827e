use std::path::{Path, PathBuf};

use crate::app::uploads::UploadKind;

/// On-disk locations of everything the site reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteLayout {
    data_dir: PathBuf,
    public_dir: PathBuf,
    uploads_dir: PathBuf,
}

impl SiteLayout {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        public_dir: impl Into<PathBuf>,
        uploads_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            data_dir: data_dir.into(),
            public_dir: public_dir.into(),
            uploads_dir: uploads_dir.into(),
        }
    }

    /// Layout with `data/`, `public/` and `uploads/` under one root.
    pub fn under(root: &Path) -> Self {
        Self::new(root.join("data"), root.join("public"), root.join("uploads"))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn public_dir(&self) -> &Path {
        &self.public_dir
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.uploads_dir
    }

    pub fn books_json(&self) -> PathBuf {
        self.data_dir.join("books.json")
    }

    pub fn posts_json(&self) -> PathBuf {
        self.data_dir.join("posts.json")
    }

    pub fn upload_dir(&self, kind: UploadKind) -> PathBuf {
        self.uploads_dir.join(kind.dir_name())
    }

    /// Directory receiving a book's generated pages and index.
    pub fn book_dir(&self, book_id: &str) -> PathBuf {
        self.public_dir.join("books").join(book_id)
    }

    /// Public URL prefix matching [`SiteLayout::book_dir`].
    pub fn book_url(book_id: &str) -> String {
        format!("/books/{book_id}")
    }
}
