/// ISO/IEC 7810 ID-1 card: 85.60 mm x 53.98 mm.
pub const CARD_ASPECT_RATIO: f32 = 85.60 / 53.98;

/// Consecutive-ish detections required before a capture ("more than N").
pub const DEFAULT_TRIGGER_THRESHOLD: usize = 10;

/// Retained candidates; must exceed the trigger threshold.
pub const DEFAULT_ACCUMULATOR_CAPACITY: usize = 16;

pub const DEFAULT_MAX_LONG_SIDE: u32 = 1024;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];

pub const CONFIG_DIR_NAME: &str = "cardscan";
pub const CONFIG_FILE_NAME: &str = "config.json";
