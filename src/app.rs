use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use egui::{TextureHandle, TextureOptions};

use crate::chapter::{ChapterDescriptor, Page};
use crate::launch::LaunchRequest;
use crate::loader::{LoadState, PageLoadController, PageOutcome};
use crate::provider::{ContentProvider, LocalDirProvider, PageFetcher, ProxyProvider};
use crate::window::ReaderWindow;

const APP_TITLE: &str = "Bandview Reader";
const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_INITIAL_COUNT: usize = 4;
const DEFAULT_BATCH_SIZE: usize = 3;
const PAGE_PLACEHOLDER_HEIGHT: f32 = 320.0;
const ERROR_PANEL_HEIGHT: f32 = 160.0;

struct ReaderSettings {
    initial_count: usize,
    batch_size: usize,
}

/// Everything owned by one open chapter. Dropped wholesale when another
/// chapter is opened, which also resets the admission window. The outcome
/// channel lives here so that dropping the view drops the receiver; workers
/// still running for a closed chapter then have nowhere to deliver, and can
/// never be mistaken for the new chapter's results.
struct ChapterView {
    descriptor: ChapterDescriptor,
    controllers: Vec<PageLoadController>,
    textures: Vec<Option<TextureHandle>>,
    window: ReaderWindow,
    highest_completed: Option<usize>,
    outcome_sender: Sender<PageOutcome>,
    outcome_receiver: Receiver<PageOutcome>,
}

pub struct ReaderApp {
    provider: Option<Arc<dyn ContentProvider>>,
    pending_launch_request: Option<LaunchRequest>,
    chapter_receiver: Option<Receiver<Result<ChapterDescriptor, String>>>,
    view: Option<ChapterView>,
    fetcher: Option<PageFetcher>,
    settings: ReaderSettings,
    status_line: String,
}

impl ReaderApp {
    pub fn new(initial_request: Option<LaunchRequest>, initial_status: Option<String>) -> Self {
        let (fetcher, fetcher_status) = match PageFetcher::new() {
            Ok(fetcher) => (Some(fetcher), None),
            Err(err) => (None, Some(format!("HTTP client error: {err:#}"))),
        };

        Self {
            provider: None,
            pending_launch_request: initial_request,
            chapter_receiver: None,
            view: None,
            fetcher,
            settings: ReaderSettings {
                initial_count: DEFAULT_INITIAL_COUNT,
                batch_size: DEFAULT_BATCH_SIZE,
            },
            status_line: initial_status.or(fetcher_status).unwrap_or_default(),
        }
    }

    fn apply_reader_background(ctx: &egui::Context) {
        let mut visuals = egui::Visuals::dark();
        visuals.panel_fill = egui::Color32::BLACK;
        visuals.window_fill = egui::Color32::BLACK;
        visuals.extreme_bg_color = egui::Color32::BLACK;
        ctx.set_visuals(visuals);
    }

    fn is_loading(&self) -> bool {
        if self.chapter_receiver.is_some() {
            return true;
        }
        self.view.as_ref().is_some_and(|view| {
            view.controllers
                .iter()
                .any(|controller| controller.state() == LoadState::Loading)
        })
    }

    fn handle_launch_request(&mut self, request: LaunchRequest) {
        let provider: Arc<dyn ContentProvider> = match request {
            LaunchRequest::Remote {
                base_url,
                chapter_id,
            } => match ProxyProvider::new(&base_url, chapter_id) {
                Ok(provider) => Arc::new(provider),
                Err(err) => {
                    self.status_line = format!("Could not reach proxy: {err:#}");
                    return;
                }
            },
            LaunchRequest::LocalDir(dir) => Arc::new(LocalDirProvider::new(dir)),
        };

        self.open_chapter(provider);
    }

    fn open_chapter(&mut self, provider: Arc<dyn ContentProvider>) {
        if self.chapter_receiver.is_some() {
            self.status_line = "A chapter is already loading.".to_string();
            return;
        }

        self.view = None;
        self.provider = Some(provider.clone());
        self.status_line = "Loading chapter...".to_string();

        let (tx, rx) = mpsc::channel::<Result<ChapterDescriptor, String>>();
        thread::spawn(move || {
            let result = provider.fetch_chapter().map_err(|err| format!("{err:#}"));
            let _ = tx.send(result);
        });
        self.chapter_receiver = Some(rx);
    }

    fn poll_chapter_fetch(&mut self, ctx: &egui::Context) {
        let Some(receiver) = self.chapter_receiver.take() else {
            return;
        };

        match receiver.try_recv() {
            Ok(Ok(descriptor)) => {
                self.install_chapter(descriptor);
                ctx.request_repaint();
            }
            Ok(Err(err)) => {
                self.status_line = format!("Chapter error: {err}");
            }
            Err(TryRecvError::Empty) => {
                self.chapter_receiver = Some(receiver);
                ctx.request_repaint_after(Duration::from_millis(16));
            }
            Err(TryRecvError::Disconnected) => {
                self.status_line = "Chapter fetch worker disconnected.".to_string();
            }
        }
    }

    fn install_chapter(&mut self, descriptor: ChapterDescriptor) {
        let Some(provider) = self.provider.as_ref() else {
            return;
        };

        let total = descriptor.images.len();
        let controllers = (0..total)
            .map(|index| {
                let source_url = provider.page_url(&descriptor, &descriptor.images[index]);
                PageLoadController::new(Page::from_descriptor(&descriptor, index, source_url))
            })
            .collect::<Vec<_>>();

        log::info!(
            "opened chapter {} ({total} pages, scramble threshold {})",
            descriptor.photo_id,
            descriptor.scramble_id
        );
        let (outcome_sender, outcome_receiver) = mpsc::channel::<PageOutcome>();
        self.view = Some(ChapterView {
            window: ReaderWindow::new(
                total,
                self.settings.initial_count,
                self.settings.batch_size,
            ),
            controllers,
            textures: (0..total).map(|_| None).collect(),
            highest_completed: None,
            descriptor,
            outcome_sender,
            outcome_receiver,
        });
        self.status_line.clear();
    }

    fn poll_page_outcomes(&mut self, ctx: &egui::Context) {
        let Some(view) = self.view.as_mut() else {
            return;
        };
        loop {
            let outcome = match view.outcome_receiver.try_recv() {
                Ok(outcome) => outcome,
                Err(_) => break,
            };

            let Some(controller) = view.controllers.get_mut(outcome.index) else {
                continue;
            };

            let index = outcome.index;
            match controller.handle_outcome(outcome) {
                Some(Ok(color_image)) => {
                    let texture = ctx.load_texture(
                        format!("page-{index}"),
                        color_image,
                        TextureOptions::LINEAR,
                    );
                    view.textures[index] = Some(texture);
                    view.highest_completed = Some(
                        view.highest_completed
                            .map_or(index, |highest| highest.max(index)),
                    );
                    view.window.on_page_completed(index);
                }
                Some(Err(_)) => {
                    // Failure still counts as completion so one broken page
                    // cannot stall the rest of the chapter.
                    view.window.on_page_completed(index);
                }
                None => {}
            }
        }
    }

    fn admit_pages(&mut self) {
        let Some(view) = self.view.as_mut() else {
            return;
        };
        let Some(fetcher) = self.fetcher.as_ref() else {
            return;
        };

        let ChapterView {
            controllers,
            window,
            outcome_sender,
            ..
        } = view;
        let load_limit = window.load_limit();
        for controller in controllers.iter_mut() {
            controller.admit(load_limit, fetcher, outcome_sender);
        }
    }

    fn open_local_chapter_dialog(&mut self) {
        let picked = rfd::FileDialog::new()
            .set_title("Open downloaded chapter")
            .pick_folder();
        if let Some(dir) = picked {
            self.handle_launch_request(LaunchRequest::LocalDir(dir));
        }
    }

    fn show_reader_settings(&mut self, ui: &mut egui::Ui) {
        let mut initial = self.settings.initial_count;
        let mut batch = self.settings.batch_size;

        ui.label("Visible at start:");
        ui.add(egui::DragValue::new(&mut initial).range(1..=40));
        ui.label("Batch:");
        ui.add(egui::DragValue::new(&mut batch).range(1..=20));

        if initial != self.settings.initial_count {
            let raised = initial > self.settings.initial_count;
            self.settings.initial_count = initial;
            if let Some(view) = self.view.as_mut() {
                if raised {
                    view.window.on_initial_count_raised(initial);
                }
            }
        }
        if batch != self.settings.batch_size {
            self.settings.batch_size = batch;
            if let Some(view) = self.view.as_mut() {
                view.window.set_batch_size(batch);
            }
        }
    }

    fn show_page_list(&mut self, ui: &mut egui::Ui) {
        let Some(fetcher) = self.fetcher.clone() else {
            ui.label("HTTP client unavailable; see status line.");
            return;
        };
        let Some(view) = self.view.as_mut() else {
            return;
        };
        let ChapterView {
            controllers,
            textures,
            outcome_sender,
            ..
        } = view;

        let available_width = ui.available_width();
        egui::ScrollArea::vertical()
            .id_salt("reader-pages")
            .show(ui, |ui| {
                for controller in controllers.iter_mut() {
                    let index = controller.index();
                    match controller.state() {
                        LoadState::Idle => {
                            show_placeholder_slot(ui, available_width, "...");
                        }
                        LoadState::Loading => {
                            ui.allocate_ui_with_layout(
                                egui::vec2(available_width, PAGE_PLACEHOLDER_HEIGHT),
                                egui::Layout::centered_and_justified(egui::Direction::TopDown),
                                |ui| {
                                    ui.add(egui::Spinner::new().size(28.0));
                                },
                            );
                        }
                        LoadState::Error => {
                            let retry_clicked = show_error_slot(
                                ui,
                                available_width,
                                index,
                                controller.last_error(),
                            );
                            if retry_clicked {
                                controller.retry(&fetcher, outcome_sender);
                            }
                        }
                        LoadState::Done => {
                            if let Some(texture) = textures[index].as_ref() {
                                let texture_size = texture.size_vec2();
                                if texture_size.x > 0.0 {
                                    let scale = available_width / texture_size.x;
                                    let draw_size = texture_size * scale;
                                    ui.add(egui::Image::new((texture.id(), draw_size)));
                                }
                            }
                        }
                    }
                }
            });
    }

    fn status_text(&self) -> String {
        if !self.status_line.is_empty() {
            return self.status_line.clone();
        }

        let Some(view) = self.view.as_ref() else {
            return "Open a chapter with bandview://read?... or a downloaded folder.".to_string();
        };

        let total = view.controllers.len();
        let loaded = view
            .controllers
            .iter()
            .filter(|controller| controller.state() == LoadState::Done)
            .count();
        let mut text = format!(
            "{} — {loaded}/{total} pages, window at {}",
            view.descriptor.title,
            view.window.load_limit()
        );
        if let Some(highest) = view.highest_completed {
            text.push_str(&format!(", continue at page {}", highest + 1));
        }
        text
    }
}

fn show_placeholder_slot(ui: &mut egui::Ui, width: f32, label: &str) {
    ui.allocate_ui_with_layout(
        egui::vec2(width, PAGE_PLACEHOLDER_HEIGHT),
        egui::Layout::centered_and_justified(egui::Direction::TopDown),
        |ui| {
            ui.colored_label(egui::Color32::from_gray(60), label);
        },
    );
}

fn show_error_slot(
    ui: &mut egui::Ui,
    width: f32,
    index: usize,
    error: Option<&str>,
) -> bool {
    let mut retry_clicked = false;
    ui.allocate_ui_with_layout(
        egui::vec2(width, ERROR_PANEL_HEIGHT),
        egui::Layout::centered_and_justified(egui::Direction::TopDown),
        |ui| {
            ui.vertical_centered(|ui| {
                ui.colored_label(
                    egui::Color32::from_rgb(220, 90, 90),
                    format!("Page {} failed to load", index + 1),
                );
                if let Some(error) = error {
                    ui.colored_label(egui::Color32::from_gray(120), error);
                }
                if ui.button("Retry").clicked() {
                    retry_clicked = true;
                }
            });
        },
    );
    retry_clicked
}

impl eframe::App for ReaderApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        Self::apply_reader_background(ctx);
        if self.is_loading() {
            ctx.set_cursor_icon(egui::CursorIcon::Progress);
        } else {
            ctx.set_cursor_icon(egui::CursorIcon::Default);
        }

        if let Some(request) = self.pending_launch_request.take() {
            self.handle_launch_request(request);
        }

        self.poll_chapter_fetch(ctx);
        self.poll_page_outcomes(ctx);
        self.admit_pages();

        egui::TopBottomPanel::top("reader-toolbar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(format!("{APP_TITLE} v{APP_VERSION}"));
                ui.separator();
                if ui.button("Open downloaded chapter...").clicked() {
                    self.open_local_chapter_dialog();
                }
                ui.separator();
                self.show_reader_settings(ui);
            });
        });

        egui::TopBottomPanel::bottom("reader-status").show(ctx, |ui| {
            ui.label(self.status_text());
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.show_page_list(ui);
        });

        if self.is_loading() {
            ctx.request_repaint_after(Duration::from_millis(16));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn descriptor(photo_id: i64, page: &str) -> ChapterDescriptor {
        ChapterDescriptor {
            photo_id,
            title: format!("Chapter {photo_id}"),
            scramble_id: 220980,
            data_original_domain: None,
            images: vec![page.to_string()],
        }
    }

    #[test]
    fn chapter_switch_discards_outcomes_from_the_closed_chapter() {
        let ctx = egui::Context::default();
        let mut app = ReaderApp::new(None, None);

        app.provider = Some(Arc::new(LocalDirProvider::new(PathBuf::from("/downloads/1"))));
        app.install_chapter(descriptor(1, "00001.jpg"));
        let late_sender = app
            .view
            .as_ref()
            .map(|view| view.outcome_sender.clone())
            .expect("first chapter installed");

        app.provider = Some(Arc::new(LocalDirProvider::new(PathBuf::from("/downloads/2"))));
        app.install_chapter(descriptor(2, "00001.jpg"));

        // A worker from the closed chapter reports late. Its receiver died
        // with the old view, so even a token that happens to match the new
        // chapter's controller can never reach it.
        let late = PageOutcome {
            index: 0,
            token: 1,
            result: Err("request aborted".to_string()),
        };
        assert!(late_sender.send(late).is_err());

        app.poll_page_outcomes(&ctx);
        let view = app.view.as_ref().expect("second chapter installed");
        assert_eq!(view.controllers[0].state(), LoadState::Idle);
        assert!(view.controllers[0].last_error().is_none());
    }

    #[test]
    fn installing_a_chapter_resets_the_window_to_settings() {
        let mut app = ReaderApp::new(None, None);
        app.provider = Some(Arc::new(LocalDirProvider::new(PathBuf::from("/downloads/1"))));

        let chapter = ChapterDescriptor {
            images: (1..=12).map(|n| format!("{n:05}.jpg")).collect(),
            ..descriptor(1, "00001.jpg")
        };
        app.install_chapter(chapter);

        let view = app.view.as_ref().expect("chapter installed");
        assert_eq!(view.controllers.len(), 12);
        assert_eq!(view.window.load_limit(), DEFAULT_INITIAL_COUNT);
        assert!(view.highest_completed.is_none());
    }
}
