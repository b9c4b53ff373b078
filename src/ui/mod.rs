mod keyboard;
mod piano_roll;

use crate::audio::{AudioEngine, SynthPatch, Wave};
use crate::library::MidiLibrary;
use crate::playback::{PlaybackController, PlaybackSnapshot};
use crossbeam::channel::Receiver;
use eframe::egui;
use keyboard::Keyboard;
use piano_roll::PianoRollView;
use std::time::{Duration, Instant};

/// How long a clicked key stays highlighted.
const KEY_FLASH: Duration = Duration::from_millis(200);

pub struct MidirollApp {
    controller: PlaybackController<AudioEngine>,
    library: MidiLibrary,
    updates: Receiver<PlaybackSnapshot>,
    current_time: f64,
    active_notes: Vec<u8>,
    playing: bool,
    clicked_keys: Vec<(u8, Instant)>,
    loaded_file: Option<String>,
    error_message: Option<String>,
    wave: Wave,
}

impl MidirollApp {
    pub fn new(mut controller: PlaybackController<AudioEngine>, library: MidiLibrary) -> Self {
        let updates = controller.subscribe();
        Self {
            controller,
            library,
            updates,
            current_time: 0.0,
            active_notes: Vec::new(),
            playing: false,
            clicked_keys: Vec::new(),
            loaded_file: None,
            error_message: None,
            wave: Wave::Sine,
        }
    }

    fn process_updates(&mut self) {
        while let Ok(snapshot) = self.updates.try_recv() {
            self.current_time = snapshot.current_time;
            self.active_notes = snapshot.active_notes;
            self.playing = snapshot.is_playing;
        }
    }

    fn upload_file(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .set_title("Upload MIDI")
            .add_filter("MIDI", &["mid", "midi"])
            .pick_file()
        else {
            return;
        };

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "untitled.mid".to_string());

        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.error_message = Some(format!("Could not read {name}: {err}"));
                return;
            }
        };

        match self.controller.load_composition(&bytes) {
            Ok(()) => {
                if let Err(err) =
                    self.library
                        .import(&name, &bytes, self.controller.duration())
                {
                    self.error_message = Some(format!("Import failed: {err}"));
                } else {
                    self.error_message = None;
                }
                self.loaded_file = Some(name);
            }
            Err(err) => {
                self.error_message = Some(format!("Error processing MIDI file: {err}"));
                self.loaded_file = None;
            }
        }
    }

    fn load_entry(&mut self, index: usize) {
        let Some(entry) = self.library.entries().get(index).cloned() else {
            return;
        };
        match self.library.read(&entry) {
            Ok(bytes) => match self.controller.load_composition(&bytes) {
                Ok(()) => {
                    self.loaded_file = Some(entry.name);
                    self.error_message = None;
                }
                Err(err) => {
                    self.error_message = Some(format!("Error processing MIDI file: {err}"));
                    self.loaded_file = None;
                }
            },
            Err(err) => {
                self.error_message = Some(format!("Error loading {}: {err}", entry.name));
            }
        }
    }

    fn remove_entry(&mut self, index: usize) {
        let removed_name = self
            .library
            .entries()
            .get(index)
            .map(|entry| entry.name.clone());
        if let Err(err) = self.library.remove(index) {
            self.error_message = Some(format!("Error deleting file: {err}"));
            return;
        }
        if removed_name.is_some() && removed_name == self.loaded_file {
            self.controller.unload();
            self.loaded_file = None;
            self.current_time = 0.0;
            self.active_notes.clear();
        }
    }

    fn library_panel(&mut self, ui: &mut egui::Ui) {
        ui.heading("Library");
        if ui.button("⬆ Upload MIDI").clicked() {
            self.upload_file();
        }
        ui.separator();

        let mut load_request = None;
        let mut remove_request = None;
        for (index, entry) in self.library.entries().iter().enumerate() {
            ui.horizontal(|ui| {
                let selected = self.loaded_file.as_deref() == Some(entry.name.as_str());
                if ui.selectable_label(selected, &entry.name).clicked() {
                    load_request = Some(index);
                }
                if ui.small_button("✕").clicked() {
                    remove_request = Some(index);
                }
            });
        }

        if let Some(index) = load_request {
            self.load_entry(index);
        }
        if let Some(index) = remove_request {
            self.remove_entry(index);
        }
    }

    fn transport_bar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if ui.button("⏹").clicked() {
                self.controller.stop();
            }

            let play_label = if self.playing { "⏸" } else { "▶" };
            if ui.button(play_label).clicked() {
                if self.playing {
                    self.controller.pause();
                } else if let Err(err) = self.controller.play() {
                    self.error_message = Some(format!("Error starting playback: {err}"));
                }
            }

            self.seek_bar(ui);

            ui.label(format!(
                "{} / {}",
                format_time(self.current_time),
                format_time(self.controller.duration())
            ));

            ui.separator();
            if ui.button("−").clicked() {
                self.nudge_rate(-0.25);
            }
            ui.label(format!("{}x", self.controller.rate()));
            if ui.button("+").clicked() {
                self.nudge_rate(0.25);
            }

            ui.separator();
            let previous = self.wave;
            egui::ComboBox::from_id_salt("wave")
                .selected_text(self.wave.label())
                .show_ui(ui, |ui| {
                    for wave in [Wave::Sine, Wave::Square, Wave::Saw] {
                        ui.selectable_value(&mut self.wave, wave, wave.label());
                    }
                });
            if self.wave != previous {
                self.controller
                    .engine_mut()
                    .set_patch(SynthPatch::with_wave(self.wave));
            }
        });
    }

    fn seek_bar(&mut self, ui: &mut egui::Ui) {
        let width = (ui.available_width() - 260.0).max(80.0);
        let (response, painter) =
            ui.allocate_painter(egui::Vec2::new(width, 8.0), egui::Sense::click());
        let rect = response.rect;

        painter.rect_filled(rect, 3.0, egui::Color32::from_gray(70));

        let duration = self.controller.duration();
        if duration > 0.0 {
            let fraction = (self.current_time / duration).clamp(0.0, 1.0) as f32;
            let filled = egui::Rect::from_min_size(
                rect.min,
                egui::Vec2::new(rect.width() * fraction, rect.height()),
            );
            painter.rect_filled(filled, 3.0, egui::Color32::from_rgb(79, 209, 199));

            if response.clicked() {
                if let Some(pos) = response.interact_pointer_pos() {
                    let fraction = f64::from((pos.x - rect.left()) / rect.width());
                    if let Err(err) = self.controller.seek(fraction * duration) {
                        self.error_message = Some(format!("Error starting playback: {err}"));
                    }
                }
            }
        }
    }

    fn highlighted_keys(&self) -> Vec<u8> {
        let mut keys = self.active_notes.clone();
        keys.extend(self.clicked_keys.iter().map(|&(pitch, _)| pitch));
        keys.sort_unstable();
        keys.dedup();
        keys
    }

    fn nudge_rate(&mut self, delta: f64) {
        let target = self.controller.rate() + delta;
        if let Err(err) = self.controller.set_rate(target) {
            self.error_message = Some(format!("Error starting playback: {err}"));
        }
    }
}

impl eframe::App for MidirollApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if self.controller.is_playing() {
            self.controller.tick();
        }
        self.process_updates();

        let now = Instant::now();
        self.clicked_keys
            .retain(|&(_, clicked_at)| now.duration_since(clicked_at) < KEY_FLASH);

        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("Piano Roll");
                if let Some(name) = &self.loaded_file {
                    ui.label(name);
                }
            });
        });

        if let Some(error) = self.error_message.clone() {
            egui::TopBottomPanel::top("error").show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.colored_label(egui::Color32::RED, error);
                    if ui.small_button("✕").clicked() {
                        self.error_message = None;
                    }
                });
            });
        }

        egui::SidePanel::left("library")
            .min_width(200.0)
            .show(ctx, |ui| {
                self.library_panel(ui);
            });

        egui::TopBottomPanel::bottom("transport").show(ctx, |ui| {
            self.transport_bar(ui);
        });

        egui::TopBottomPanel::bottom("keyboard").show(ctx, |ui| {
            let highlighted = self.highlighted_keys();
            if let Some(pitch) = Keyboard::show(ui, &highlighted) {
                self.clicked_keys.push((pitch, Instant::now()));
            }
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            if self.controller.has_composition() {
                let seek_to = PianoRollView::show(
                    ui,
                    self.controller.notes(),
                    self.controller.duration(),
                    self.current_time,
                    self.playing,
                );
                if let Some(time) = seek_to {
                    if let Err(err) = self.controller.seek(time) {
                        self.error_message = Some(format!("Error starting playback: {err}"));
                    }
                }
            } else {
                ui.vertical_centered(|ui| {
                    ui.heading("Upload a MIDI file to view the piano roll");
                });
            }
        });

        ctx.request_repaint();
    }
}

fn format_time(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "0:00".to_string();
    }
    let total = seconds as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_formatting() {
        assert_eq!(format_time(0.0), "0:00");
        assert_eq!(format_time(7.4), "0:07");
        assert_eq!(format_time(65.0), "1:05");
        assert_eq!(format_time(600.0), "10:00");
        assert_eq!(format_time(f64::NAN), "0:00");
    }
}
