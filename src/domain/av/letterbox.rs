//! Uniform scale + symmetric pad into an exact target box.

/// Geometry of a letterboxed frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f64,
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub pad_x: u32,
    pub pad_y: u32,
    pub width: u32,
    pub height: u32,
}

impl Letterbox {
    /// Fit `source` into `target` preserving aspect ratio.
    ///
    /// Scaled dimensions are floored to even values (4:2:0 chroma) and never
    /// exceed the target. Output is always exactly `target_width x target_height`.
    pub fn fit(source_width: u32, source_height: u32, target_width: u32, target_height: u32) -> Self {
        let source_width = source_width.max(1);
        let source_height = source_height.max(1);

        let scale = f64::min(
            target_width as f64 / source_width as f64,
            target_height as f64 / source_height as f64,
        );

        let scaled_width = even_floor(((source_width as f64 * scale).round() as u32).min(target_width));
        let scaled_height =
            even_floor(((source_height as f64 * scale).round() as u32).min(target_height));

        Self {
            scale,
            scaled_width,
            scaled_height,
            pad_x: (target_width - scaled_width) / 2,
            pad_y: (target_height - scaled_height) / 2,
            width: target_width,
            height: target_height,
        }
    }

    /// ffmpeg `-vf` expression.
    pub fn filter(&self) -> String {
        format!(
            "scale={}:{},pad={}:{}:{}:{},setsar=1",
            self.scaled_width, self.scaled_height, self.width, self.height, self.pad_x, self.pad_y
        )
    }
}

fn even_floor(value: u32) -> u32 {
    (value & !1).max(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ladder::LADDER;

    #[test]
    fn test_same_aspect_fills_box() {
        let fit = Letterbox::fit(1920, 1080, 1280, 720);
        assert_eq!((fit.scaled_width, fit.scaled_height), (1280, 720));
        assert_eq!((fit.pad_x, fit.pad_y), (0, 0));
        assert!((fit.scale - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_four_by_three_is_pillarboxed() {
        let fit = Letterbox::fit(640, 480, 1280, 720);
        assert!((fit.scale - 1.5).abs() < 1e-9);
        assert_eq!((fit.scaled_width, fit.scaled_height), (960, 720));
        assert_eq!((fit.pad_x, fit.pad_y), (160, 0));
        assert_eq!(fit.filter(), "scale=960:720,pad=1280:720:160:0,setsar=1");
    }

    #[test]
    fn test_ultrawide_is_letterboxed() {
        let fit = Letterbox::fit(2560, 1080, 1920, 1080);
        assert_eq!(fit.scaled_width, 1920);
        assert_eq!(fit.scaled_height, 810);
        assert_eq!(fit.pad_y, 135);
    }

    #[test]
    fn test_odd_target_width_stays_in_box() {
        let fit = Letterbox::fit(1280, 720, 854, 480);
        assert!(fit.scaled_width <= 854);
        assert_eq!(fit.scaled_height, 480);
        assert_eq!((fit.width, fit.height), (854, 480));
    }

    #[test]
    fn test_padded_output_always_matches_target() {
        let sources = (360..4000).step_by(97).flat_map(|w| (360..2500).step_by(131).map(move |h| (w, h)));

        for (source_width, source_height) in sources {
            for &(target_height, target_width) in LADDER.iter() {
                let fit = Letterbox::fit(source_width, source_height, target_width, target_height);

                let expected_scale = f64::min(
                    target_width as f64 / source_width as f64,
                    target_height as f64 / source_height as f64,
                );
                assert!((fit.scale - expected_scale).abs() < 1e-12);

                assert!(fit.scaled_width <= target_width);
                assert!(fit.scaled_height <= target_height);
                assert_eq!(fit.scaled_width % 2, 0);
                assert_eq!(fit.scaled_height % 2, 0);

                let slack_x = target_width - fit.scaled_width - 2 * fit.pad_x;
                let slack_y = target_height - fit.scaled_height - 2 * fit.pad_y;
                assert!(slack_x <= 1, "{}x{} -> {}", source_width, source_height, target_width);
                assert!(slack_y <= 1, "{}x{} -> {}", source_width, source_height, target_height);

                assert_eq!((fit.width, fit.height), (target_width, target_height));
            }
        }
    }
}
