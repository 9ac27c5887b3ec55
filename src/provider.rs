use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;

use crate::chapter::ChapterDescriptor;

/// Capability surface a chapter source must provide: the descriptor listing
/// the pages, and an address for each page's raw bytes. Keeping both backends
/// behind one trait keeps the reader free of per-source branching.
pub trait ContentProvider: Send + Sync {
    fn fetch_chapter(&self) -> Result<ChapterDescriptor>;
    fn page_url(&self, chapter: &ChapterDescriptor, filename: &str) -> String;
}

/// Reads a chapter through the backend proxy's HTTP API.
pub struct ProxyProvider {
    client: Client,
    base_url: String,
    chapter_id: i64,
}

impl ProxyProvider {
    pub fn new(base_url: &str, chapter_id: i64) -> Result<Self> {
        Ok(Self {
            client: build_http_client()?,
            base_url: normalize_base_url(base_url),
            chapter_id,
        })
    }
}

impl ContentProvider for ProxyProvider {
    fn fetch_chapter(&self) -> Result<ChapterDescriptor> {
        let url = format!("{}/api/chapter/{}", self.base_url, self.chapter_id);
        let body = http_get_bytes(&self.client, &url)
            .with_context(|| format!("Failed fetching chapter descriptor from {url}"))?;
        serde_json::from_slice(&body)
            .with_context(|| format!("Chapter descriptor from {url} was not valid JSON"))
    }

    fn page_url(&self, chapter: &ChapterDescriptor, filename: &str) -> String {
        // Some sources list pages as absolute URLs; those are routed through
        // the proxy's generic image relay instead of the chapter route.
        if is_absolute_http_url(filename) {
            return format!(
                "{}/api/image-proxy?url={}",
                self.base_url,
                encode_query_component(filename)
            );
        }

        let mut url = format!(
            "{}/api/chapter_image/{}/{}?scramble_id={}",
            self.base_url, chapter.photo_id, filename, chapter.scramble_id
        );
        if let Some(domain) = chapter
            .data_original_domain
            .as_deref()
            .filter(|domain| !domain.trim().is_empty())
        {
            url.push_str("&domain=");
            url.push_str(&encode_query_component(domain));
        }
        url
    }
}

/// Reads an already-downloaded chapter from a local directory holding a
/// `chapter.json` descriptor next to the page files.
pub struct LocalDirProvider {
    dir: PathBuf,
}

impl LocalDirProvider {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

impl ContentProvider for LocalDirProvider {
    fn fetch_chapter(&self) -> Result<ChapterDescriptor> {
        let descriptor_path = self.dir.join("chapter.json");
        let body = fs::read(&descriptor_path).with_context(|| {
            format!(
                "Could not read chapter descriptor {}",
                descriptor_path.display()
            )
        })?;
        serde_json::from_slice(&body).with_context(|| {
            format!(
                "Chapter descriptor {} was not valid JSON",
                descriptor_path.display()
            )
        })
    }

    fn page_url(&self, _chapter: &ChapterDescriptor, filename: &str) -> String {
        self.dir.join(filename).display().to_string()
    }
}

/// Fetches raw page bytes from either backend: HTTP URLs go through the
/// blocking client, anything else is treated as a filesystem path (with any
/// cache-busting query suffix dropped, since the filesystem has no cache).
#[derive(Clone)]
pub struct PageFetcher {
    client: Client,
}

impl PageFetcher {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: build_http_client()?,
        })
    }

    pub fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        if is_absolute_http_url(url) {
            return http_get_bytes(&self.client, url);
        }

        let path = url.split('?').next().unwrap_or(url);
        fs::read(path).with_context(|| format!("Could not read page file {path}"))
    }
}

fn build_http_client() -> Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(120))
        .build()
        .context("Could not initialize HTTP client")
}

fn http_get_bytes(client: &Client, url: &str) -> Result<Vec<u8>> {
    let response = client
        .get(url)
        .send()
        .with_context(|| format!("HTTP request failed for {url}"))?;
    let status = response.status();
    if !status.is_success() {
        let detail = response
            .text()
            .unwrap_or_else(|_| String::from("unable to read error body"));
        bail!("HTTP {status} for {url}: {detail}");
    }

    response
        .bytes()
        .map(|body| body.to_vec())
        .with_context(|| format!("Could not read response body from {url}"))
}

pub fn normalize_base_url(base_url: &str) -> String {
    strip_query_and_fragment(base_url.trim())
        .trim()
        .trim_end_matches('/')
        .to_string()
}

fn strip_query_and_fragment(value: &str) -> &str {
    let query_index = value.find('?').unwrap_or(value.len());
    let fragment_index = value.find('#').unwrap_or(value.len());
    &value[..query_index.min(fragment_index)]
}

fn is_absolute_http_url(value: &str) -> bool {
    let bytes = value.trim_start().as_bytes();
    bytes.len() >= 7
        && (bytes[..7].eq_ignore_ascii_case(b"http://")
            || (bytes.len() >= 8 && bytes[..8].eq_ignore_ascii_case(b"https://")))
}

fn encode_query_component(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(byte as char);
            }
            other => {
                encoded.push('%');
                encoded.push(hex_digit(other >> 4));
                encoded.push(hex_digit(other & 0x0F));
            }
        }
    }
    encoded
}

fn hex_digit(value: u8) -> char {
    char::from_digit(value as u32, 16)
        .unwrap_or('0')
        .to_ascii_uppercase()
}
