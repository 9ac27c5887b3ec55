use std::sync::mpsc::Sender;
use std::thread;

use anyhow::{Context, Result};
use egui::ColorImage;

use crate::chapter::Page;
use crate::provider::PageFetcher;
use crate::reassemble;
use crate::segmentation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
    Error,
    Done,
}

/// Result of one load attempt, delivered over the owning chapter's outcome
/// channel. `token` identifies the attempt; the owning controller drops the
/// outcome if a newer attempt has started since. The channel itself is scoped
/// to the chapter view, so outcomes cannot outlive the chapter they belong to.
pub struct PageOutcome {
    pub index: usize,
    pub token: u64,
    pub result: Result<ColorImage, String>,
}

/// Owns one page's load lifecycle: admission against the reader window,
/// the fetch/decode/descramble worker, retry with cache busting, and the
/// token check that silently discards superseded attempts.
pub struct PageLoadController {
    page: Page,
    state: LoadState,
    load_token: u64,
    retry_count: u32,
    slice_count: u32,
    last_error: Option<String>,
}

impl PageLoadController {
    pub fn new(page: Page) -> Self {
        Self {
            page,
            state: LoadState::Idle,
            load_token: 0,
            retry_count: 0,
            slice_count: 0,
            last_error: None,
        }
    }

    pub fn index(&self) -> usize {
        self.page.index
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn load_started(&self) -> bool {
        self.load_token > 0
    }

    /// Start loading if the reader window has admitted this page. Calling
    /// again after a load has started is a no-op; retries go through `retry`.
    pub fn admit(&mut self, load_limit: usize, fetcher: &PageFetcher, sender: &Sender<PageOutcome>) {
        if self.load_started() {
            return;
        }
        if self.page.index < load_limit {
            self.start_load(fetcher, sender);
        }
    }

    /// Operator-initiated reload. Only meaningful once a load has started;
    /// bumps the cache-busting retry counter and supersedes any in-flight
    /// attempt by advancing the token.
    pub fn retry(&mut self, fetcher: &PageFetcher, sender: &Sender<PageOutcome>) {
        if !self.load_started() {
            return;
        }
        self.retry_count += 1;
        self.start_load(fetcher, sender);
    }

    fn start_load(&mut self, fetcher: &PageFetcher, sender: &Sender<PageOutcome>) {
        self.load_token += 1;
        self.state = LoadState::Loading;
        self.last_error = None;

        // Animated pages are never sliced by the origin, whatever the hash
        // would say for their name.
        self.slice_count = if segmentation::is_animated(&self.page.filename) {
            1
        } else {
            segmentation::slice_count(
                self.page.album_id,
                self.page.scramble_threshold_id,
                &self.page.filename,
            )
        };

        let url = self.page.attempt_url(self.retry_count);
        let index = self.page.index;
        let token = self.load_token;
        let slice_count = self.slice_count;
        let fetcher = fetcher.clone();
        let sender = sender.clone();
        thread::spawn(move || {
            let result =
                load_page_image(&fetcher, &url, slice_count).map_err(|err| format!("{err:#}"));
            let _ = sender.send(PageOutcome {
                index,
                token,
                result,
            });
        });
    }

    /// Apply a worker outcome. Returns the honored result for the app to
    /// render and report upward, or `None` when the outcome belonged to a
    /// superseded attempt and must not change visible state.
    pub fn handle_outcome(&mut self, outcome: PageOutcome) -> Option<Result<ColorImage, String>> {
        if outcome.token != self.load_token {
            log::debug!(
                "dropping stale result for page {} (attempt {} superseded by {})",
                self.page.index,
                outcome.token,
                self.load_token
            );
            return None;
        }

        match outcome.result {
            Ok(color_image) => {
                self.state = LoadState::Done;
                Some(Ok(color_image))
            }
            Err(message) => {
                log::warn!("page {} failed to load: {message}", self.page.index);
                self.state = LoadState::Error;
                self.last_error = Some(message.clone());
                Some(Err(message))
            }
        }
    }
}

fn load_page_image(fetcher: &PageFetcher, url: &str, slice_count: u32) -> Result<ColorImage> {
    let bytes = fetcher.fetch(url)?;
    let decoded = image::load_from_memory(&bytes)
        .with_context(|| format!("Could not decode image from {url}"))?
        .to_rgba8();

    let reconstructed = if slice_count > 1 {
        reassemble::descramble(&decoded, slice_count)
    } else {
        decoded
    };

    let size = [
        reconstructed.width() as usize,
        reconstructed.height() as usize,
    ];
    Ok(ColorImage::from_rgba_unmultiplied(
        size,
        reconstructed.as_raw(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    fn page_with_source(index: usize, source_url: &str) -> Page {
        Page {
            index,
            album_id: 100,
            scramble_threshold_id: 220980,
            filename: "00001.jpg".to_string(),
            source_url: source_url.to_string(),
        }
    }

    fn write_test_png(name: &str) -> String {
        let path = std::env::temp_dir().join(format!("bandview-test-{}-{name}", std::process::id()));
        let mut source = image::RgbaImage::new(4, 6);
        for pixel in source.pixels_mut() {
            *pixel = image::Rgba([9, 9, 9, 255]);
        }
        image::DynamicImage::ImageRgba8(source)
            .save_with_format(&path, image::ImageFormat::Png)
            .expect("test image should save");
        path.display().to_string()
    }

    #[test]
    fn admit_is_gated_by_the_load_limit() {
        let fetcher = PageFetcher::new().expect("client");
        let (sender, receiver) = mpsc::channel::<PageOutcome>();
        let mut controller = PageLoadController::new(page_with_source(5, "/nonexistent"));

        controller.admit(5, &fetcher, &sender);
        assert_eq!(controller.state(), LoadState::Idle);
        assert!(receiver.try_recv().is_err());

        controller.admit(6, &fetcher, &sender);
        assert_eq!(controller.state(), LoadState::Loading);
    }

    #[test]
    fn missing_page_file_reports_error_completion() {
        let fetcher = PageFetcher::new().expect("client");
        let (sender, receiver) = mpsc::channel::<PageOutcome>();
        let mut controller =
            PageLoadController::new(page_with_source(0, "/nonexistent/bandview-page.jpg"));

        controller.admit(1, &fetcher, &sender);
        let outcome = receiver
            .recv_timeout(Duration::from_secs(10))
            .expect("worker should report");
        let honored = controller.handle_outcome(outcome).expect("current attempt");
        assert!(honored.is_err());
        assert_eq!(controller.state(), LoadState::Error);
        assert!(controller.last_error().is_some());
    }

    #[test]
    fn local_page_loads_to_done() {
        let path = write_test_png("done.png");
        let fetcher = PageFetcher::new().expect("client");
        let (sender, receiver) = mpsc::channel::<PageOutcome>();
        let mut controller = PageLoadController::new(page_with_source(0, &path));

        controller.admit(1, &fetcher, &sender);
        let outcome = receiver
            .recv_timeout(Duration::from_secs(10))
            .expect("worker should report");
        let honored = controller.handle_outcome(outcome).expect("current attempt");
        let color_image = honored.expect("decode should succeed");
        assert_eq!(color_image.size, [4, 6]);
        assert_eq!(controller.state(), LoadState::Done);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn stale_outcome_never_changes_state() {
        let fetcher = PageFetcher::new().expect("client");
        let (sender, receiver) = mpsc::channel::<PageOutcome>();
        let mut controller =
            PageLoadController::new(page_with_source(0, "/nonexistent/bandview-page.jpg"));

        // First attempt, then an immediate retry before the first outcome is
        // processed: only the second attempt may affect visible state.
        controller.admit(1, &fetcher, &sender);
        controller.retry(&fetcher, &sender);

        let mut honored = 0;
        for _ in 0..2 {
            let outcome = receiver
                .recv_timeout(Duration::from_secs(10))
                .expect("worker should report");
            let is_current = outcome.token == 2;
            match controller.handle_outcome(outcome) {
                Some(_) => {
                    assert!(is_current, "only the live token may be honored");
                    honored += 1;
                }
                None => assert!(!is_current, "the live token must not be dropped"),
            }
        }
        assert_eq!(honored, 1);
        assert_eq!(controller.state(), LoadState::Error);
    }

    #[test]
    fn retry_before_any_load_is_a_no_op() {
        let fetcher = PageFetcher::new().expect("client");
        let (sender, receiver) = mpsc::channel::<PageOutcome>();
        let mut controller = PageLoadController::new(page_with_source(3, "/nonexistent"));

        controller.retry(&fetcher, &sender);
        assert_eq!(controller.state(), LoadState::Idle);
        assert!(receiver.try_recv().is_err());
    }
}
