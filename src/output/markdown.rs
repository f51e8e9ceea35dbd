//! Markdown hand-off of a finished capture
//!
//! Renders a `Document` as a single Markdown file: a run header, then every
//! captured page in discovery order with its images after the text, then a
//! list of pages that could not be captured.

use crate::output::{Document, DocumentPage, OutputError, OutputResult};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes `document` as Markdown to `output_path`
///
/// # Arguments
///
/// * `document` - The finalized capture
/// * `output_path` - Path of the Markdown file; parent directories are created
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote the document
/// * `Err(OutputError)` - Failed to write the file
pub fn write_markdown(document: &Document, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown(document);
    let write_error = |source| OutputError::Write {
        path: output_path.to_path_buf(),
        source,
    };

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_error)?;
    }

    let mut file = File::create(output_path).map_err(write_error)?;
    file.write_all(markdown.as_bytes()).map_err(write_error)?;

    Ok(())
}

/// Formats a document as Markdown
pub fn format_markdown(document: &Document) -> String {
    let mut md = String::new();

    md.push_str(&format!("# Capture of {}\n\n", document.seed));

    md.push_str(&format!(
        "- **Started**: {}\n",
        document.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    md.push_str(&format!(
        "- **Finished**: {}\n",
        document.finished_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    md.push_str(&format!("- **Pages**: {}\n", document.pages.len()));
    md.push_str(&format!("- **Images**: {}\n", document.assets.len()));
    md.push_str(&format!("- **Failed Pages**: {}\n", document.failures.len()));
    if let Some(hash) = &document.config_hash {
        md.push_str(&format!("- **Config Hash**: {}\n", hash));
    }
    if document.cancelled {
        md.push_str("- **Status**: cancelled (partial capture)\n");
    } else {
        md.push_str("- **Status**: complete\n");
    }
    md.push('\n');

    for page in &document.pages {
        md.push_str("---\n\n");
        format_page(&mut md, page);
    }

    if !document.failures.is_empty() {
        md.push_str("---\n\n## Pages Not Captured\n\n");
        for failure in &document.failures {
            md.push_str(&format!(
                "- {} ({}): {}\n",
                failure.url, failure.kind, failure.reason
            ));
        }
        md.push('\n');
    }

    md
}

fn format_page(md: &mut String, page: &DocumentPage) {
    match &page.title {
        Some(title) => md.push_str(&format!("## {}\n\n", title)),
        None => md.push_str(&format!("## Content from {}\n\n", page.url)),
    }
    md.push_str(&format!("<{}>\n\n", page.url));

    if page.is_empty() {
        md.push_str("_No content found._\n\n");
        return;
    }

    if !page.text.is_empty() {
        md.push_str(&page.text);
        md.push_str("\n\n");
    }

    for asset in &page.assets {
        md.push_str(&format!("![{}]({})\n\n", asset.source, asset.path.display()));
    }

    if !page.annotations.is_empty() {
        md.push_str("Other links:\n\n");
        for href in &page.annotations {
            md.push_str(&format!("- `{}`\n", href));
        }
        md.push('\n');
    }
}
