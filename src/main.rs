mod app;
mod chapter;
mod launch;
mod loader;
mod provider;
mod reassemble;
mod segmentation;
mod window;

fn main() -> eframe::Result<()> {
    env_logger::init();

    let cli_args = std::env::args().skip(1).collect::<Vec<_>>();
    let (initial_request, initial_status) = match launch::parse_launch_request_from_args(&cli_args)
    {
        Ok(request) => (request, None),
        Err(err) => (None, Some(format!("Launch URL/args error: {err}"))),
    };

    let native_options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default()
            .with_inner_size([900.0, 1000.0])
            .with_resizable(true),
        ..Default::default()
    };

    eframe::run_native(
        "Bandview Reader",
        native_options,
        Box::new(move |_cc| {
            Ok(Box::new(app::ReaderApp::new(
                initial_request.clone(),
                initial_status.clone(),
            )))
        }),
    )
}
