use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use url::Url;

use crate::error::{AppError, Result};

/// Only this many leading characters of page text are sent for summarization.
pub const MAX_PROMPT_CHARS: usize = 8000;

static STYLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").expect("Failed to compile style regex"));

static SCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").expect("Failed to compile script regex"));

static TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[^>]+>").expect("Failed to compile tag regex"));

static TAG_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<(/?)([a-zA-Z][a-zA-Z0-9]*)[^>]*?(/?)>").expect("Failed to compile tag name regex")
});

/// Deeper documents skip readability, whose DOM walk recurses per level.
pub const MAX_READABLE_DEPTH: usize = 256;

/// Elements that never hold children or are routinely left unclosed.
const NON_NESTING_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr", "p", "li", "dt", "dd", "tr", "td", "th", "option",
];

/// Turns a fetched page into normalized plain text ready for a prompt.
///
/// Readability-style article extraction runs first; when it finds nothing the
/// raw document is tag-stripped instead. The result is never empty and is cut
/// to [`MAX_PROMPT_CHARS`].
pub fn extract_text(html: &str, url: &Url) -> Result<String> {
    let readable = if nesting_exceeds(html, MAX_READABLE_DEPTH) {
        tracing::warn!(%url, max_depth = MAX_READABLE_DEPTH, "markup nested too deeply for article extraction");
        None
    } else {
        readable_text(html, url)?
    };

    let text = match readable {
        Some(text) => text,
        None => {
            tracing::debug!(%url, "no article content found, stripping raw markup");
            strip_markup(html)
        }
    };

    if text.is_empty() {
        return Err(AppError::NoExtractableContent);
    }

    Ok(truncate_chars(&text, MAX_PROMPT_CHARS))
}

/// Runs [`extract_text`] on the blocking pool so parsing never stalls a
/// runtime worker. A panic during extraction becomes `ExtractionProcessing`.
pub async fn extract_text_blocking(html: String, url: Url) -> Result<String> {
    off_runtime(move || extract_text(&html, &url)).await
}

async fn off_runtime<F>(job: F) -> Result<String>
where
    F: FnOnce() -> Result<String> + Send + 'static,
{
    tokio::task::spawn_blocking(job).await.map_err(|e| {
        tracing::error!(error = %e, "content extraction aborted");
        AppError::ExtractionProcessing(e.to_string())
    })?
}

/// Linear scan estimating element depth from open/close tags.
fn nesting_exceeds(html: &str, max_depth: usize) -> bool {
    let mut depth = 0usize;
    for caps in TAG_NAME_RE.captures_iter(html) {
        let name = caps[2].to_ascii_lowercase();
        if NON_NESTING_TAGS.contains(&name.as_str()) || !caps[3].is_empty() {
            continue;
        }
        if caps[1].is_empty() {
            depth += 1;
            if depth > max_depth {
                return true;
            }
        } else {
            depth = depth.saturating_sub(1);
        }
    }
    false
}

fn readable_text(html: &str, url: &Url) -> Result<Option<String>> {
    let product = readability::extractor::extract(&mut html.as_bytes(), url)
        .map_err(|e| AppError::ExtractionProcessing(format!("{:?}", e)))?;

    if product.content.trim().is_empty() {
        return Ok(None);
    }

    let text = markup_to_text(&product.content);
    Ok(Some(text).filter(|text| !text.is_empty()))
}

fn markup_to_text(fragment: &str) -> String {
    let document = Html::parse_fragment(fragment);
    let text = document
        .root_element()
        .descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let parent = node.parent().and_then(|p| p.value().as_element().map(|e| e.name()));
            match parent {
                Some("script") | Some("style") => None,
                _ => Some(&**text),
            }
        })
        .collect::<Vec<_>>()
        .join(" ");
    collapse_whitespace(&text)
}

/// Fallback path: drops `<style>`/`<script>` blocks with their contents, then
/// every remaining tag.
pub fn strip_markup(html: &str) -> String {
    let without_styles = STYLE_RE.replace_all(html, "");
    let without_scripts = SCRIPT_RE.replace_all(&without_styles, "");
    let without_tags = TAG_RE.replace_all(&without_scripts, " ");
    collapse_whitespace(&without_tags)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
