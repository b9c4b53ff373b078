use midiroll::{AudioEngine, MidiLibrary, MidirollApp, PlaybackController, SynthPatch};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let library = match MidiLibrary::open("midi-library") {
        Ok(library) => library,
        Err(err) => {
            eprintln!("Failed to open midi library: {err}");
            std::process::exit(1);
        }
    };

    let controller = PlaybackController::new(AudioEngine::new(SynthPatch::default()));

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 800.0])
            .with_title("Midiroll"),
        ..Default::default()
    };

    let _ = eframe::run_native(
        "Midiroll",
        options,
        Box::new(|_cc| Ok(Box::new(MidirollApp::new(controller, library)))),
    );
}
