use chrono::Utc;
use maud::html;

use crate::app::error::{StorageError, ValidationError};
use crate::app::model::{CreatePostRequest, Page, Post};
use crate::app::sanitize::{clean_post_body, strip_tags};
use crate::app::store::RecordStore;
use crate::slug::make_id;

/// Validated and sanitized post content, ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDraft {
    pub title: String,
    pub body: String,
}

impl PostDraft {
    /// Requires non-blank `title` and `body`, then strips the title to text and
    /// runs the body through the post allow-list.
    pub fn from_request(request: &CreatePostRequest) -> Result<Self, ValidationError> {
        let title = request.title.as_deref().map(str::trim).unwrap_or_default();
        let body = request.body.as_deref().map(str::trim).unwrap_or_default();
        if title.is_empty() || body.is_empty() {
            return Err(ValidationError::new("title and body are required"));
        }

        let title = strip_tags(title).trim().to_owned();
        if title.is_empty() {
            return Err(ValidationError::new("title must contain text"));
        }

        let body = clean_post_body(body);
        if body.trim().is_empty() {
            return Err(ValidationError::new("body must contain text"));
        }

        Ok(Self { title, body })
    }

    /// Post announcing one page of a freshly ingested book.
    pub fn for_book_page(book_title: &str, page: &Page) -> Self {
        let body = html! {
            p { "Auto-generated from " b { (book_title) } "." }
            p {
                a href=(page.url) target="_blank" rel="noreferrer" {
                    "Open page " (page.page)
                }
            }
        };
        Self {
            title: format!("{book_title} — Page {}", page.page),
            body: clean_post_body(&body.into_string()),
        }
    }

    pub fn into_post(self) -> Post {
        Post {
            id: make_id(&self.title, "post"),
            title: self.title,
            body: self.body,
            created_at: Utc::now(),
        }
    }
}

pub async fn publish(
    store: &dyn RecordStore<Post>,
    draft: PostDraft,
) -> Result<Post, StorageError> {
    let post = store.add(draft.into_post()).await?;
    tracing::info!(post_id = %post.id, "post published");
    Ok(post)
}
