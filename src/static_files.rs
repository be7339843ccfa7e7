//! Static file serving.
//!
//! [`StaticOptions`] configures a middleware that tries to serve a file
//! for every request and treats every kind of failure — no such file,
//! traversal attempt, I/O error — as "didn't handle it": the request falls
//! through to the next middleware, and an application with nothing after
//! it answers the default 404. Serving a file never raises.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{Method, StatusCode};

use crate::context::Context;
use crate::middleware::{BoxFuture, Flow, Middleware, Next};
use crate::request::Request;
use crate::response::Response;

/// Configuration for [`Server::serve_static`](crate::Server::serve_static).
///
/// ```rust
/// use std::time::Duration;
/// use trellis::StaticOptions;
///
/// StaticOptions::new("./public")
///     .index("index.html")
///     .extensions(["html"])
///     .max_age(Duration::from_secs(3600));
/// ```
#[derive(Clone, Debug)]
pub struct StaticOptions {
    root: PathBuf,
    index: Option<String>,
    extensions: Vec<String>,
    hidden: bool,
    gzip: bool,
    brotli: bool,
    max_age: Option<Duration>,
    immutable: bool,
    path: Option<String>,
    content_types: HashMap<String, String>,
}

impl StaticOptions {
    /// Options serving files under `root`. Access is restricted to `root`:
    /// traversal segments are rejected outright.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            index: None,
            extensions: Vec::new(),
            hidden: false,
            gzip: true,
            brotli: true,
            max_age: None,
            immutable: false,
            path: None,
            content_types: HashMap::new(),
        }
    }

    /// File served for directory requests (e.g. `index.html`).
    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    /// Extensions tried, in order, when the request path has none.
    pub fn extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Allow serving dotfiles. Off by default.
    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    /// Serve a precompressed `.gz` sibling when the client accepts gzip.
    /// On by default.
    pub fn gzip(mut self, gzip: bool) -> Self {
        self.gzip = gzip;
        self
    }

    /// Serve a precompressed `.br` sibling when the client accepts brotli.
    /// On by default.
    pub fn brotli(mut self, brotli: bool) -> Self {
        self.brotli = brotli;
        self
    }

    /// `Cache-Control: max-age` stamped on served files.
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Mark served files immutable for caches.
    pub fn immutable(mut self, immutable: bool) -> Self {
        self.immutable = immutable;
        self
    }

    /// Always serve this path instead of the request's.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Overrides the content type for an extension (without the dot).
    pub fn content_type(mut self, extension: impl Into<String>, value: impl Into<String>) -> Self {
        self.content_types.insert(extension.into(), value.into());
        self
    }

    pub(crate) fn into_middleware(self) -> impl Middleware {
        StaticFiles {
            options: Arc::new(self),
        }
    }
}

struct StaticFiles {
    options: Arc<StaticOptions>,
}

impl Middleware for StaticFiles {
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture<Flow> {
        let options = Arc::clone(&self.options);
        Box::pin(async move {
            if let Some(response) = try_serve(&options, &ctx.request).await {
                return Ok(response);
            }
            next.run(ctx).await
        })
    }
}

/// Resolves and reads the file for this request, or `None` when anything
/// at all goes wrong.
async fn try_serve(options: &StaticOptions, request: &Request) -> Option<Response> {
    if request.method() != Method::GET && request.method() != Method::HEAD {
        return None;
    }

    let raw = options.path.as_deref().unwrap_or_else(|| request.path());
    let decoded = urlencoding::decode(raw).ok()?;
    let relative = sanitize(&decoded, options.hidden)?;
    let mut file = options.root.join(relative);

    let mut metadata = tokio::fs::metadata(&file).await.ok();
    if metadata.as_ref().is_some_and(std::fs::Metadata::is_dir) {
        file = file.join(options.index.as_deref()?);
        metadata = tokio::fs::metadata(&file).await.ok();
    }
    if metadata.is_none() && file.extension().is_none() {
        for ext in &options.extensions {
            let candidate = file.with_extension(ext);
            if let Ok(found) = tokio::fs::metadata(&candidate).await {
                file = candidate;
                metadata = Some(found);
                break;
            }
        }
    }
    if !metadata?.is_file() {
        return None;
    }

    let content_type = content_type_for(options, &file);
    let accepts = request.header("accept-encoding").unwrap_or_default();
    let (actual, encoding) = negotiate_encoding(options, &file, accepts).await;
    let body = tokio::fs::read(&actual).await.ok()?;

    let mut builder = Response::builder().status(StatusCode::OK);
    if let Some(encoding) = encoding {
        builder = builder.header("content-encoding", encoding).header("vary", "accept-encoding");
    }
    if let Some(cache_control) = cache_control(options) {
        builder = builder.header("cache-control", &cache_control);
    }
    Some(builder.body(&content_type, Bytes::from(body)))
}

/// Splits the request path into safe segments: traversal (`..`) is refused
/// and dotfile segments are refused unless `hidden` is on.
fn sanitize(path: &str, hidden: bool) -> Option<PathBuf> {
    let mut relative = PathBuf::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return None,
            _ if segment.starts_with('.') && !hidden => return None,
            _ => relative.push(segment),
        }
    }
    Some(relative)
}

/// Picks a precompressed sibling (`.br` preferred over `.gz`) when the
/// client accepts it and the sibling exists.
async fn negotiate_encoding(
    options: &StaticOptions,
    file: &Path,
    accepts: &str,
) -> (PathBuf, Option<&'static str>) {
    if options.brotli && accepts.contains("br") {
        let sibling = sibling_with_suffix(file, ".br");
        if tokio::fs::metadata(&sibling).await.is_ok() {
            return (sibling, Some("br"));
        }
    }
    if options.gzip && accepts.contains("gzip") {
        let sibling = sibling_with_suffix(file, ".gz");
        if tokio::fs::metadata(&sibling).await.is_ok() {
            return (sibling, Some("gzip"));
        }
    }
    (file.to_path_buf(), None)
}

fn sibling_with_suffix(file: &Path, suffix: &str) -> PathBuf {
    let mut os = file.as_os_str().to_owned();
    os.push(suffix);
    PathBuf::from(os)
}

fn cache_control(options: &StaticOptions) -> Option<String> {
    let max_age = options.max_age?;
    let mut value = format!("max-age={}", max_age.as_secs());
    if options.immutable {
        value.push_str(", immutable");
    }
    Some(value)
}

fn content_type_for(options: &StaticOptions, file: &Path) -> String {
    let ext = file
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if let Some(overridden) = options.content_types.get(&ext) {
        return overridden.clone();
    }
    content_type_for_extension(&ext).to_owned()
}

/// Extension → content type for the formats a static directory actually
/// contains. Everything else is served as opaque bytes.
fn content_type_for_extension(ext: &str) -> &'static str {
    match ext {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" | "map" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "md" => "text/markdown; charset=utf-8",
        "xml" => "application/xml",
        "csv" => "text/csv",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "wasm" => "application/wasm",
        "pdf" => "application/pdf",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("trellis-static-{}-{tag}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("scratch dir");
        dir
    }

    fn get(path: &str) -> Request {
        Request::synthetic(Method::GET, path, None, b"")
    }

    #[tokio::test]
    async fn serves_an_existing_file_with_its_content_type() {
        let root = scratch_dir("plain");
        std::fs::write(root.join("hello.txt"), b"hello").expect("write");

        let options = StaticOptions::new(&root);
        let response = try_serve(&options, &get("/hello.txt")).await.expect("served");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().as_ref(), b"hello");
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/plain; charset=utf-8"
        );
    }

    #[tokio::test]
    async fn missing_file_falls_through() {
        let root = scratch_dir("missing");
        let options = StaticOptions::new(&root);
        assert!(try_serve(&options, &get("/nope.txt")).await.is_none());
    }

    #[tokio::test]
    async fn traversal_and_dotfiles_are_refused() {
        let root = scratch_dir("guard");
        std::fs::write(root.join(".secret"), b"shh").expect("write");

        let options = StaticOptions::new(&root);
        assert!(try_serve(&options, &get("/../etc/passwd")).await.is_none());
        assert!(try_serve(&options, &get("/.secret")).await.is_none());

        let permissive = StaticOptions::new(&root).hidden(true);
        assert!(try_serve(&permissive, &get("/.secret")).await.is_some());
    }

    #[tokio::test]
    async fn directory_requests_resolve_to_the_index() {
        let root = scratch_dir("index");
        std::fs::write(root.join("index.html"), b"<html></html>").expect("write");

        let options = StaticOptions::new(&root).index("index.html");
        let response = try_serve(&options, &get("/")).await.expect("served");
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/html; charset=utf-8"
        );

        // Without an index option the directory is unservable.
        let bare = StaticOptions::new(&root);
        assert!(try_serve(&bare, &get("/")).await.is_none());
    }

    #[tokio::test]
    async fn extension_probing_applies_when_the_path_has_none() {
        let root = scratch_dir("ext");
        std::fs::write(root.join("about.html"), b"about").expect("write");

        let options = StaticOptions::new(&root).extensions(["html"]);
        assert!(try_serve(&options, &get("/about")).await.is_some());
    }

    #[tokio::test]
    async fn precompressed_sibling_wins_when_negotiated() {
        let root = scratch_dir("gz");
        std::fs::write(root.join("app.js"), b"plain").expect("write");
        std::fs::write(root.join("app.js.gz"), b"gzipped").expect("write");

        let options = StaticOptions::new(&root);
        let mut request = get("/app.js");
        request.set_header("accept-encoding", "gzip, deflate");
        let response = try_serve(&options, &request).await.expect("served");
        assert_eq!(response.body().as_ref(), b"gzipped");
        assert_eq!(response.headers().get("content-encoding").unwrap(), "gzip");
        // Content type reflects the uncompressed file.
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/javascript; charset=utf-8"
        );

        // No accept-encoding → the plain file.
        let plain = try_serve(&options, &get("/app.js")).await.expect("served");
        assert_eq!(plain.body().as_ref(), b"plain");
    }

    #[tokio::test]
    async fn cache_headers_follow_the_options() {
        let root = scratch_dir("cache");
        std::fs::write(root.join("pinned.css"), b"body{}").expect("write");

        let options = StaticOptions::new(&root)
            .max_age(Duration::from_secs(3600))
            .immutable(true);
        let response = try_serve(&options, &get("/pinned.css")).await.expect("served");
        assert_eq!(
            response.headers().get("cache-control").unwrap(),
            "max-age=3600, immutable"
        );
    }

    #[tokio::test]
    async fn non_get_methods_fall_through() {
        let root = scratch_dir("method");
        std::fs::write(root.join("form.html"), b"<form/>").expect("write");

        let options = StaticOptions::new(&root);
        let request = Request::synthetic(Method::POST, "/form.html", None, b"");
        assert!(try_serve(&options, &request).await.is_none());
    }

    #[tokio::test]
    async fn fixed_path_override_ignores_the_request_path() {
        let root = scratch_dir("fixed");
        std::fs::write(root.join("app.html"), b"spa").expect("write");

        let options = StaticOptions::new(&root).path("/app.html");
        let response = try_serve(&options, &get("/whatever/route")).await.expect("served");
        assert_eq!(response.body().as_ref(), b"spa");
    }
}
