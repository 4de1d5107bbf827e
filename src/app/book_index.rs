//! Standalone HTML index for a book's generated pages.
//!
//! The page list is embedded as a JSON data block that the inline script reads
//! for search-by-page-number, pagination and prev/next navigation. A
//! `<noscript>` list carries the same links for clients without scripting.

use maud::{DOCTYPE, Markup, PreEscaped, html};

use crate::app::model::Page;

/// Entries shown per pagination step.
pub const PAGE_SIZE: usize = 16;

/// `id` of the embedded JSON data block.
pub const PAGES_DATA_ID: &str = "book-pages";

const STYLE: &str = r#"
:root{--bg:#f9fafb;--card:#fff;--text:#111827;--muted:#6b7280;--border:#e5e7eb;--accent:#2563eb}
*{box-sizing:border-box}
body{margin:0;font-family:system-ui,-apple-system,Segoe UI,Roboto,Helvetica,Arial,sans-serif;background:var(--bg);color:var(--text);line-height:1.55}
a{color:inherit;text-decoration:none}
.wrap{max-width:980px;margin:0 auto;padding:28px}
.top{display:flex;align-items:flex-start;justify-content:space-between;gap:16px}
h1{margin:0;font-size:26px}
.meta{color:var(--muted);margin-top:6px}
.card{background:var(--card);border:1px solid var(--border);border-radius:16px;box-shadow:0 10px 25px rgba(0,0,0,.06);padding:18px;margin-top:16px}
.row{display:flex;gap:12px;flex-wrap:wrap;align-items:center;justify-content:space-between}
.search{flex:1;min-width:240px}
input{width:100%;padding:12px 14px;border:1px solid var(--border);border-radius:12px;outline:none}
input:focus{border-color:rgba(37,99,235,.7);box-shadow:0 0 0 4px rgba(37,99,235,.12)}
.btn{padding:10px 14px;border-radius:999px;border:1px solid var(--border);background:#fff;cursor:pointer;font-weight:600}
.btn.primary{border-color:rgba(37,99,235,.35);color:var(--accent)}
.grid{display:grid;grid-template-columns:repeat(2,minmax(0,1fr));gap:12px;margin-top:14px}
@media (min-width:780px){.grid{grid-template-columns:repeat(4,minmax(0,1fr))}}
.item{padding:12px;border:1px solid var(--border);border-radius:14px;background:#fff}
.item a{display:block;color:var(--accent);font-weight:700}
.pager{display:flex;justify-content:flex-end;margin-top:14px;color:var(--muted)}
"#;

const SCRIPT: &str = r#"
(function () {
  const data = document.getElementById('book-pages');
  const pages = JSON.parse(data.textContent).map(function (p) {
    return { page: p.page, url: p.url, label: 'Page ' + p.page };
  });
  const grid = document.getElementById('grid');
  const pageSize = Number(grid.dataset.pageSize) || 16;
  const input = document.getElementById('q');
  const status = document.getElementById('status');
  const prev = document.getElementById('prev');
  const next = document.getElementById('next');
  let current = 1;
  let query = '';

  function filtered() {
    const q = query.trim().toLowerCase();
    if (!q) return pages;
    return pages.filter(function (p) {
      return String(p.page).includes(q) || p.label.toLowerCase().includes(q);
    });
  }

  function render() {
    const all = filtered();
    const pageCount = Math.max(1, Math.ceil(all.length / pageSize));
    current = Math.min(Math.max(current, 1), pageCount);
    const start = (current - 1) * pageSize;
    const slice = all.slice(start, start + pageSize);

    grid.replaceChildren();
    slice.forEach(function (p) {
      const item = document.createElement('div');
      item.className = 'item';
      const link = document.createElement('a');
      link.href = p.url;
      link.target = '_blank';
      link.rel = 'noreferrer';
      link.textContent = p.label;
      item.appendChild(link);
      grid.appendChild(item);
    });

    prev.disabled = current <= 1;
    next.disabled = current >= pageCount;
    status.textContent = 'Showing ' + slice.length + ' of ' + all.length +
      ' • Page ' + current + ' / ' + pageCount;
  }

  input.addEventListener('input', function (e) {
    query = e.target.value;
    current = 1;
    render();
  });
  prev.addEventListener('click', function () { current -= 1; render(); });
  next.addEventListener('click', function () { current += 1; render(); });
  render();
})();
"#;

/// Renders the complete index document for `title` and its `pages`.
pub fn build(title: &str, pages: &[Page]) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (title) }
                style { (PreEscaped(STYLE)) }
            }
            body {
                div class="wrap" {
                    div class="top" {
                        div {
                            h1 { (title) }
                            div class="meta" {
                                (pages.len()) " pages. Search supports page number (e.g., 12)."
                            }
                        }
                        a class="btn primary" href="/books" { "Back to Books" }
                    }
                    div class="card" {
                        div class="row" {
                            div class="search" {
                                input id="q" placeholder="Search pages…" autocomplete="off";
                            }
                            div class="row" {
                                button class="btn" id="prev" type="button" { "Prev" }
                                button class="btn" id="next" type="button" { "Next" }
                            }
                        }
                        div id="grid" class="grid" data-page-size=(PAGE_SIZE) {}
                        div class="pager" { span id="status" {} }
                        noscript {
                            ul {
                                @for page in pages {
                                    li {
                                        a href=(page.url) { "Page " (page.page) }
                                    }
                                }
                            }
                        }
                    }
                }
                script type="application/json" id=(PAGES_DATA_ID) {
                    (PreEscaped(pages_json(pages)))
                }
                script { (PreEscaped(SCRIPT)) }
            }
        }
    }
}

/// Serializes `pages` so the result can sit inside a `<script>` element.
fn pages_json(pages: &[Page]) -> String {
    let json = serde_json::to_string(pages).unwrap_or_else(|_| "[]".to_owned());
    escape_script_data(&json)
}

// JSON string escapes keep the data identical after `JSON.parse`.
fn escape_script_data(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    for ch in json.chars() {
        match ch {
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            '\'' => out.push_str("\\u0027"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            other => out.push(other),
        }
    }
    out
}
