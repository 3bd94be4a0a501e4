use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical emotion categories, in report column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Happy,
    Sad,
    Angry,
    Surprise,
    Neutral,
    Disgusted,
    Fearful,
}

impl Emotion {
    /// All categories in column order.
    pub const ALL: [Emotion; 7] = [
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Surprise,
        Emotion::Neutral,
        Emotion::Disgusted,
        Emotion::Fearful,
    ];

    /// Column key used in records and reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Surprise => "surprise",
            Emotion::Neutral => "neutral",
            Emotion::Disgusted => "disgusted",
            Emotion::Fearful => "fearful",
        }
    }

    /// Human-facing metric title.
    pub fn display_name(self) -> &'static str {
        match self {
            Emotion::Happy => "Happy",
            Emotion::Sad => "Sad",
            Emotion::Angry => "Angry",
            Emotion::Surprise => "Surprised",
            Emotion::Neutral => "Neutral",
            Emotion::Disgusted => "Disgusted",
            Emotion::Fearful => "Fearful",
        }
    }

    /// Map a raw classifier label onto its canonical category.
    ///
    /// Matching is case-insensitive and folds the known synonym spellings
    /// (`surprised`, `disgust`, `fear`). Anything else maps to `None`.
    pub fn from_label(label: &str) -> Option<Emotion> {
        match label.trim().to_lowercase().as_str() {
            "happy" => Some(Emotion::Happy),
            "sad" => Some(Emotion::Sad),
            "angry" => Some(Emotion::Angry),
            "surprise" | "surprised" => Some(Emotion::Surprise),
            "neutral" => Some(Emotion::Neutral),
            "disgust" | "disgusted" => Some(Emotion::Disgusted),
            "fear" | "fearful" => Some(Emotion::Fearful),
            _ => None,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dominant emotion label for one face, as emitted by a classifier.
///
/// Always stored lower-case. The label may be outside the canonical set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmotionLabel(String);

impl EmotionLabel {
    pub fn new(label: impl AsRef<str>) -> Self {
        Self(label.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical category, if the label belongs to one.
    pub fn emotion(&self) -> Option<Emotion> {
        Emotion::from_label(&self.0)
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Axis-aligned face bounding box in image pixel coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl BoundingBox {
    /// Integer pixel rectangle `(x, y, w, h)` clipped to an image of the given size.
    ///
    /// Returns `None` when nothing of the box lies inside the image.
    pub fn clamp_to(&self, image_width: u32, image_height: u32) -> Option<(u32, u32, u32, u32)> {
        let x0 = self.x.max(0.0).floor() as i64;
        let y0 = self.y.max(0.0).floor() as i64;
        let x1 = ((self.x + self.width).ceil() as i64).min(image_width as i64);
        let y1 = ((self.y + self.height).ceil() as i64).min(image_height as i64);

        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32))
    }
}

/// Number of faces seen per canonical emotion.
///
/// Every canonical key is always present, so all records share one schema.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmotionCounts {
    pub happy: u32,
    pub sad: u32,
    pub angry: u32,
    pub surprise: u32,
    pub neutral: u32,
    pub disgusted: u32,
    pub fearful: u32,
}

impl EmotionCounts {
    pub fn get(&self, emotion: Emotion) -> u32 {
        self.as_array()[emotion.index()]
    }

    pub fn add(&mut self, emotion: Emotion, n: u32) {
        let slot = match emotion {
            Emotion::Happy => &mut self.happy,
            Emotion::Sad => &mut self.sad,
            Emotion::Angry => &mut self.angry,
            Emotion::Surprise => &mut self.surprise,
            Emotion::Neutral => &mut self.neutral,
            Emotion::Disgusted => &mut self.disgusted,
            Emotion::Fearful => &mut self.fearful,
        };
        *slot = slot.saturating_add(n);
    }

    /// Counts in canonical column order.
    pub fn as_array(&self) -> [u32; 7] {
        [
            self.happy,
            self.sad,
            self.angry,
            self.surprise,
            self.neutral,
            self.disgusted,
            self.fearful,
        ]
    }

    pub fn total(&self) -> u64 {
        self.as_array().iter().map(|&n| n as u64).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// One timestamped tally produced from a single analyzed frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmotionRecord {
    #[serde(with = "timestamp_format")]
    pub recorded_at: NaiveDateTime,
    #[serde(flatten)]
    pub counts: EmotionCounts,
}

/// `YYYY-MM-DD HH:MM:SS`, second resolution.
pub mod timestamp_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&ts.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }
}
