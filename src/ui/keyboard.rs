use eframe::egui;

pub const KEYBOARD_START: u8 = 21;
pub const KEY_COUNT: u8 = 88;

const WHITE_KEY_COUNT: f32 = 52.0;
const KEYBOARD_HEIGHT: f32 = 80.0;

fn is_black_key(pitch: u8) -> bool {
    matches!(pitch % 12, 1 | 3 | 6 | 8 | 10)
}

/// White keys strictly below `pitch` within the keyboard range.
fn white_keys_below(pitch: u8) -> u8 {
    (KEYBOARD_START..pitch).filter(|&p| !is_black_key(p)).count() as u8
}

/// 88-key strip with highlighted pitches. Returns a clicked pitch, if any.
pub struct Keyboard;

impl Keyboard {
    pub fn show(ui: &mut egui::Ui, highlighted: &[u8]) -> Option<u8> {
        let (response, painter) = ui.allocate_painter(
            egui::Vec2::new(ui.available_width(), KEYBOARD_HEIGHT),
            egui::Sense::click(),
        );
        let rect = response.rect;
        let white_width = rect.width() / WHITE_KEY_COUNT;
        let black_width = white_width * 0.6;
        let black_height = rect.height() * 0.6;

        let mut clicked = None;
        let click_pos = if response.clicked() {
            response.interact_pointer_pos()
        } else {
            None
        };

        // White keys first, black keys painted over them.
        for pitch in KEYBOARD_START..KEYBOARD_START + KEY_COUNT {
            if is_black_key(pitch) {
                continue;
            }
            let x = rect.left() + f32::from(white_keys_below(pitch)) * white_width;
            let key_rect = egui::Rect::from_min_size(
                egui::Pos2::new(x, rect.top()),
                egui::Vec2::new(white_width, rect.height()),
            );

            let color = if highlighted.contains(&pitch) {
                egui::Color32::from_rgb(79, 209, 199)
            } else {
                egui::Color32::from_rgb(200, 200, 200)
            };
            painter.rect_filled(key_rect, 0.0, color);
            painter.rect_stroke(
                key_rect,
                0.0,
                egui::Stroke::new(1.0, egui::Color32::from_rgb(100, 100, 100)),
                egui::StrokeKind::Inside,
            );

            // Label C notes
            if pitch % 12 == 0 {
                let octave = i32::from(pitch / 12) - 1;
                painter.text(
                    egui::Pos2::new(key_rect.center().x, key_rect.bottom() - 8.0),
                    egui::Align2::CENTER_CENTER,
                    format!("C{octave}"),
                    egui::FontId::proportional(9.0),
                    egui::Color32::BLACK,
                );
            }
        }

        for pitch in KEYBOARD_START..KEYBOARD_START + KEY_COUNT {
            if !is_black_key(pitch) {
                continue;
            }
            let boundary = rect.left() + f32::from(white_keys_below(pitch)) * white_width;
            let key_rect = egui::Rect::from_min_size(
                egui::Pos2::new(boundary + white_width - black_width / 2.0, rect.top()),
                egui::Vec2::new(black_width, black_height),
            );

            let color = if highlighted.contains(&pitch) {
                egui::Color32::from_rgb(20, 140, 130)
            } else {
                egui::Color32::from_rgb(20, 20, 20)
            };
            painter.rect_filled(key_rect, 0.0, color);
        }

        if let Some(pos) = click_pos {
            clicked = Self::pitch_at(pos, rect, white_width, black_width, black_height);
        }
        clicked
    }

    fn pitch_at(
        pos: egui::Pos2,
        rect: egui::Rect,
        white_width: f32,
        black_width: f32,
        black_height: f32,
    ) -> Option<u8> {
        // Black keys sit on top, so test them first.
        for pitch in KEYBOARD_START..KEYBOARD_START + KEY_COUNT {
            if !is_black_key(pitch) {
                continue;
            }
            let boundary = rect.left() + f32::from(white_keys_below(pitch)) * white_width;
            let key_rect = egui::Rect::from_min_size(
                egui::Pos2::new(boundary + white_width - black_width / 2.0, rect.top()),
                egui::Vec2::new(black_width, black_height),
            );
            if key_rect.contains(pos) {
                return Some(pitch);
            }
        }

        for pitch in KEYBOARD_START..KEYBOARD_START + KEY_COUNT {
            if is_black_key(pitch) {
                continue;
            }
            let x = rect.left() + f32::from(white_keys_below(pitch)) * white_width;
            let key_rect = egui::Rect::from_min_size(
                egui::Pos2::new(x, rect.top()),
                egui::Vec2::new(white_width, rect.height()),
            );
            if key_rect.contains(pos) {
                return Some(pitch);
            }
        }
        None
    }
}
