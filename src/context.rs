//! Renders retrieval hits into the document context given to the model.

use crate::models::RetrievalHit;

/// Build the context block for `hits`, numbered from 1 in retrieval order.
///
/// Missing title, date or URL render as empty strings. An empty slice
/// yields an empty string.
pub fn build_context(hits: &[RetrievalHit]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| render_doc(i + 1, hit))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_doc(n: usize, hit: &RetrievalHit) -> String {
    let meta = &hit.metadata;
    format!(
        "=== DOC {n} ===\n\
         Title: {title}\n\
         Date:  {date}\n\
         URL:   {url}\n\
         Text:\n\
         {text}\n\
         === END DOC {n} ===",
        n = n,
        title = meta.title.as_deref().unwrap_or(""),
        date = meta.date().unwrap_or(""),
        url = meta.url.as_deref().unwrap_or(""),
        text = hit.document,
    )
}
