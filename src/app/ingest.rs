use std::sync::Arc;

use chrono::Utc;

use crate::app::blog::{self, PostDraft};
use crate::app::book_index;
use crate::app::converter::{ConversionRequest, Converter};
use crate::app::error::{IngestError, ValidationError};
use crate::app::layout::SiteLayout;
use crate::app::model::{Book, Page, Post, SourceFile};
use crate::app::sanitize::strip_tags;
use crate::app::store::RecordStore;
use crate::app::uploads::StagedUpload;
use crate::slug::{make_id_from_file_name, strip_extension};

/// Turns an uploaded document into a [`Book`] plus one [`Post`] per page.
///
/// Steps run in order and the first failure aborts the run. Nothing written by
/// earlier steps is rolled back.
pub struct IngestionPipeline {
    converter: Arc<dyn Converter>,
    books: Arc<dyn RecordStore<Book>>,
    posts: Arc<dyn RecordStore<Post>>,
    layout: SiteLayout,
}

impl IngestionPipeline {
    pub fn new(
        converter: Arc<dyn Converter>,
        books: Arc<dyn RecordStore<Book>>,
        posts: Arc<dyn RecordStore<Post>>,
        layout: SiteLayout,
    ) -> Self {
        Self {
            converter,
            books,
            posts,
            layout,
        }
    }

    pub async fn ingest(
        &self,
        upload: &StagedUpload,
        title: Option<&str>,
    ) -> Result<Book, IngestError> {
        let title = book_title(&upload.original_name, title)?;
        let book_id = make_id_from_file_name(&upload.original_name, "book");
        let out_dir = self.layout.book_dir(&book_id);
        let out_url = SiteLayout::book_url(&book_id);
        tracing::info!(
            book_id = %book_id,
            title = %title,
            bytes = upload.size,
            "ingest book"
        );

        let output = self
            .converter
            .convert(ConversionRequest {
                source: &upload.path,
                output_dir: &out_dir,
                title: &title,
            })
            .await?;
        output.validate()?;

        let pages: Vec<Page> = output
            .pages
            .iter()
            .map(|p| Page {
                page: p.page,
                url: format!("{out_url}/{}", p.file),
            })
            .collect();
        tracing::info!(book_id = %book_id, pages = pages.len(), "converted");

        let index_path = out_dir.join("index.html");
        let index_html = book_index::build(&title, &pages).into_string();
        let index_err = |source| IngestError::Index {
            path: index_path.clone(),
            source,
        };
        tokio::fs::create_dir_all(&out_dir)
            .await
            .map_err(index_err)?;
        tokio::fs::write(&index_path, index_html)
            .await
            .map_err(index_err)?;

        let book = Book {
            id: book_id,
            title,
            created_at: Utc::now(),
            pdf: SourceFile {
                name: upload.original_name.clone(),
                url: upload.url(),
            },
            index_url: format!("{out_url}/index.html"),
            page_count: pages.len(),
            pages,
        };
        let book = self.books.add(book).await?;

        for page in &book.pages {
            blog::publish(
                self.posts.as_ref(),
                PostDraft::for_book_page(&book.title, page),
            )
            .await?;
        }
        tracing::info!(book_id = %book.id, posts = book.pages.len(), "book ingested");

        Ok(book)
    }
}

/// Explicit `title` if it has text after stripping tags, else the file name without extension.
pub fn book_title(file_name: &str, title: Option<&str>) -> Result<String, ValidationError> {
    let explicit = title.map(|t| strip_tags(t).trim().to_owned());
    if let Some(explicit) = explicit.filter(|t| !t.is_empty()) {
        return Ok(explicit);
    }

    let derived = strip_tags(strip_extension(file_name)).trim().to_owned();
    if derived.is_empty() {
        return Err(ValidationError::new(
            "a title is required when the file name has none",
        ));
    }
    Ok(derived)
}
