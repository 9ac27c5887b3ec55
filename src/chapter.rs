use serde::Deserialize;

/// Chapter descriptor as served by the proxy's `/api/chapter/{id}` route.
/// Field names match the proxy's JSON payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ChapterDescriptor {
    pub photo_id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub scramble_id: i64,
    #[serde(default)]
    pub data_original_domain: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

/// One page of a chapter. `index` and the base `source_url` never change for
/// the lifetime of the page; retries only append a cache-busting query suffix.
#[derive(Debug, Clone)]
pub struct Page {
    pub index: usize,
    pub album_id: i64,
    pub scramble_threshold_id: i64,
    pub filename: String,
    pub source_url: String,
}

impl Page {
    pub fn from_descriptor(chapter: &ChapterDescriptor, index: usize, source_url: String) -> Self {
        Self {
            index,
            album_id: chapter.photo_id,
            scramble_threshold_id: chapter.scramble_id,
            filename: chapter.images[index].clone(),
            source_url,
        }
    }

    /// Source address for a given attempt. Attempt 0 is the bare URL; later
    /// attempts append `retry=N` so the HTTP cache cannot replay a bad body.
    pub fn attempt_url(&self, retry_count: u32) -> String {
        if retry_count == 0 {
            return self.source_url.clone();
        }
        let separator = if self.source_url.contains('?') { '&' } else { '?' };
        format!("{}{}retry={}", self.source_url, separator, retry_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_parses_proxy_json() {
        let json = r#"{
            "photo_id": 500000,
            "title": "Chapter 12",
            "scramble_id": 220980,
            "data_original_domain": "cdn.example.net",
            "images": ["00001.jpg", "00002.jpg"]
        }"#;
        let chapter: ChapterDescriptor = serde_json::from_str(json).expect("should parse");
        assert_eq!(chapter.photo_id, 500000);
        assert_eq!(chapter.scramble_id, 220980);
        assert_eq!(chapter.data_original_domain.as_deref(), Some("cdn.example.net"));
        assert_eq!(chapter.images.len(), 2);
    }

    #[test]
    fn descriptor_tolerates_missing_optional_fields() {
        let chapter: ChapterDescriptor =
            serde_json::from_str(r#"{"photo_id": 42}"#).expect("should parse");
        assert_eq!(chapter.photo_id, 42);
        assert_eq!(chapter.scramble_id, 0);
        assert!(chapter.data_original_domain.is_none());
        assert!(chapter.images.is_empty());
    }

    #[test]
    fn attempt_url_appends_cache_buster_only_on_retry() {
        let page = Page {
            index: 0,
            album_id: 1,
            scramble_threshold_id: 0,
            filename: "00001.jpg".to_string(),
            source_url: "http://localhost:7000/api/chapter_image/1/00001.jpg?scramble_id=0"
                .to_string(),
        };
        assert_eq!(page.attempt_url(0), page.source_url);
        assert_eq!(page.attempt_url(2), format!("{}&retry=2", page.source_url));

        let bare = Page {
            source_url: "/downloads/1/00001.jpg".to_string(),
            ..page
        };
        assert_eq!(bare.attempt_url(1), "/downloads/1/00001.jpg?retry=1");
    }
}
