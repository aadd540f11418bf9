//! Static file serving for `serve_files` routes.

use std::path::Path;
use std::time::SystemTime;

use hyper::http::{StatusCode, header};

use super::clean_path;
use crate::context::HttpContext;
use crate::error::Result;

pub(crate) async fn serve(ctx: &mut HttpContext, root: &Path) -> Result<()> {
    let requested = clean_path(ctx.param("filepath"));
    let full = root.join(requested.trim_start_matches('/'));
    let (list_dir, index_page) = match ctx.config() {
        Some(config) => (config.server.enabled_list_dir, config.server.index_page.clone()),
        None => (false, "index.html".to_string()),
    };

    let Ok(meta) = tokio::fs::metadata(&full).await else {
        ctx.write_string_c(StatusCode::NOT_FOUND, "Not Found")?;
        return Ok(());
    };
    if !meta.is_dir() {
        return serve_file(ctx, &full).await;
    }

    if !index_page.is_empty() {
        let index = full.join(&index_page);
        if tokio::fs::metadata(&index).await.is_ok_and(|m| m.is_file()) {
            return serve_file(ctx, &index).await;
        }
    }
    if !list_dir {
        ctx.write_string_c(StatusCode::NOT_FOUND, "Not Found")?;
        return Ok(());
    }
    list_directory(ctx, &full).await
}

/// Write the file at `path`, answering `304` when the client copy is current.
pub async fn serve_file(ctx: &mut HttpContext, path: &Path) -> Result<()> {
    let meta = tokio::fs::metadata(path).await?;
    let modified = meta.modified().ok();

    if let Some(modified) = modified {
        let since = ctx.request().header(header::IF_MODIFIED_SINCE.as_str());
        if let Ok(since) = httpdate::parse_http_date(since)
            && truncate_to_secs(modified) <= since
        {
            ctx.response_mut().write_header(StatusCode::NOT_MODIFIED)?;
            return Ok(());
        }
        ctx.response_mut().set_header(
            header::LAST_MODIFIED.as_str(),
            &httpdate::fmt_http_date(modified),
        )?;
    }

    let data = tokio::fs::read(path).await?;
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    ctx.write_blob(mime.essence_str(), data)?;
    Ok(())
}

fn truncate_to_secs(t: SystemTime) -> SystemTime {
    match t.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(d) => SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(d.as_secs()),
        Err(_) => t,
    }
}

async fn list_directory(ctx: &mut HttpContext, dir: &Path) -> Result<()> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let mut name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type().await.is_ok_and(|t| t.is_dir()) {
            name.push('/');
        }
        names.push(name);
    }
    names.sort();

    let mut html = String::from("<pre>\n");
    for name in &names {
        let escaped = escape_html(name);
        html.push_str(&format!("<a href=\"{escaped}\">{escaped}</a>\n"));
    }
    html.push_str("</pre>\n");
    ctx.write_html(html)?;
    Ok(())
}

pub(crate) fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
