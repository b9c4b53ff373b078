use crate::midi::NoteEvent;
use eframe::egui;

const NOTE_HEIGHT: f32 = 12.0;
const PIXELS_PER_SECOND: f32 = 200.0;
const TOTAL_KEYS: u8 = 88;
const START_NOTE: u8 = 21;

/// Scrolling, read-only piano roll with a playhead. Returns the song time
/// the user clicked, if any.
pub struct PianoRollView;

impl PianoRollView {
    pub fn show(
        ui: &mut egui::Ui,
        notes: &[NoteEvent],
        duration: f64,
        current_time: f64,
        follow_playhead: bool,
    ) -> Option<f64> {
        let mut seek_to = None;

        let canvas_width = (duration as f32 * PIXELS_PER_SECOND).max(800.0) + 100.0;
        let canvas_height = f32::from(TOTAL_KEYS) * NOTE_HEIGHT;

        egui::ScrollArea::both()
            .auto_shrink([false, false])
            .show(ui, |ui| {
                let (response, painter) = ui.allocate_painter(
                    egui::Vec2::new(canvas_width, canvas_height),
                    egui::Sense::click(),
                );
                let rect = response.rect;

                painter.rect_filled(rect, 0.0, egui::Color32::from_rgb(26, 26, 26));

                Self::draw_grid(&painter, rect, duration);
                Self::draw_notes(&painter, rect, notes);
                Self::draw_playhead(&painter, rect, current_time);

                if response.clicked() {
                    if let Some(pos) = response.interact_pointer_pos() {
                        let time = f64::from((pos.x - rect.left()) / PIXELS_PER_SECOND);
                        seek_to = Some(time.clamp(0.0, duration));
                    }
                }

                if follow_playhead {
                    let x = rect.left() + current_time as f32 * PIXELS_PER_SECOND;
                    let playhead = egui::Rect::from_min_max(
                        egui::Pos2::new(x - 120.0, rect.top()),
                        egui::Pos2::new(x + 120.0, rect.top() + 1.0),
                    );
                    ui.scroll_to_rect(playhead, None);
                }
            });

        seek_to
    }

    fn draw_grid(painter: &egui::Painter, rect: egui::Rect, duration: f64) {
        let line_color = egui::Color32::from_rgb(51, 51, 51);

        for i in 0..=TOTAL_KEYS {
            let y = rect.top() + f32::from(i) * NOTE_HEIGHT;
            painter.line_segment(
                [
                    egui::Pos2::new(rect.left(), y),
                    egui::Pos2::new(rect.right(), y),
                ],
                egui::Stroke::new(1.0, line_color),
            );
        }

        // Half-second time grid.
        let mut t = 0.0;
        while t <= duration {
            let x = rect.left() + t as f32 * PIXELS_PER_SECOND;
            painter.line_segment(
                [
                    egui::Pos2::new(x, rect.top()),
                    egui::Pos2::new(x, rect.bottom()),
                ],
                egui::Stroke::new(1.0, line_color),
            );
            t += 0.5;
        }
    }

    fn draw_notes(painter: &egui::Painter, rect: egui::Rect, notes: &[NoteEvent]) {
        for note in notes {
            if note.pitch < START_NOTE || note.pitch >= START_NOTE + TOTAL_KEYS {
                continue;
            }
            let key_index = note.pitch - START_NOTE;

            let y = rect.top() + f32::from(TOTAL_KEYS - key_index - 1) * NOTE_HEIGHT;
            let x = rect.left() + note.start as f32 * PIXELS_PER_SECOND;
            let width = (note.duration as f32 * PIXELS_PER_SECOND).max(2.0);

            let alpha = (0.5 + note.velocity / 2.0).min(0.9);
            let color =
                egui::Color32::from_rgba_unmultiplied(66, 153, 225, (alpha * 255.0) as u8);

            let note_rect = egui::Rect::from_min_size(
                egui::Pos2::new(x, y + 1.0),
                egui::Vec2::new(width, NOTE_HEIGHT - 2.0),
            );
            painter.rect_filled(note_rect, 2.0, color);
        }
    }

    fn draw_playhead(painter: &egui::Painter, rect: egui::Rect, current_time: f64) {
        let x = rect.left() + current_time as f32 * PIXELS_PER_SECOND;
        painter.line_segment(
            [
                egui::Pos2::new(x, rect.top()),
                egui::Pos2::new(x, rect.bottom()),
            ],
            egui::Stroke::new(2.0, egui::Color32::from_rgb(79, 209, 199)),
        );
    }
}
