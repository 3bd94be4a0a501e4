//! Session reporting: tables, totals, metrics and chart data.
//!
//! Every report is recomputed from the full record list. The functions here
//! are pure, so calling them twice on the same log gives the same output.

use crate::types::{timestamp_format, Emotion, EmotionRecord};
use serde::Serialize;
use std::fmt;

/// Placeholder shown while the session log is empty.
pub const EMPTY_MESSAGE: &str =
    "No emotion data yet. Start the camera and wait for detections to appear.";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Report {
    Empty { message: String },
    Ready(SessionReport),
}

impl Report {
    pub fn is_empty(&self) -> bool {
        matches!(self, Report::Empty { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionReport {
    /// Records in insertion order.
    pub records: Vec<EmotionRecord>,
    /// Records ordered by timestamp; equal seconds keep insertion order.
    pub indexed: Vec<EmotionRecord>,
    /// Per-emotion totals, highest first.
    pub totals: Vec<EmotionTotal>,
    /// One metric per emotion, in column order.
    pub metrics: Vec<Metric>,
    /// Emotion with the highest total.
    pub top: EmotionTotal,
    pub timeline: Timeline,
    pub bar_chart: Vec<BarEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EmotionTotal {
    pub emotion: Emotion,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metric {
    pub emotion: Emotion,
    pub label: &'static str,
    pub value: u64,
}

/// Per-emotion counts at each record timestamp, for the line chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Timeline {
    pub timestamps: Vec<String>,
    pub series: Vec<Series>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Series {
    pub emotion: Emotion,
    pub values: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BarEntry {
    pub emotion: Emotion,
    pub total_students: u64,
}

/// Build the report for a record list.
pub fn build(records: &[EmotionRecord]) -> Report {
    if records.is_empty() {
        return Report::Empty {
            message: EMPTY_MESSAGE.to_string(),
        };
    }

    let mut indexed = records.to_vec();
    indexed.sort_by_key(|r| r.recorded_at);

    let totals = rank(totals(records));
    // `records` is non-empty and `rank` keeps all seven entries.
    let top = totals[0];

    let metrics = Emotion::ALL
        .iter()
        .map(|&emotion| Metric {
            emotion,
            label: emotion.display_name(),
            value: totals
                .iter()
                .find(|t| t.emotion == emotion)
                .map_or(0, |t| t.total),
        })
        .collect();

    let bar_chart = totals
        .iter()
        .map(|t| BarEntry {
            emotion: t.emotion,
            total_students: t.total,
        })
        .collect();

    let timeline = timeline(&indexed);

    Report::Ready(SessionReport {
        records: records.to_vec(),
        indexed,
        totals,
        metrics,
        top,
        timeline,
        bar_chart,
    })
}

/// Column sums in canonical order.
pub fn totals(records: &[EmotionRecord]) -> Vec<EmotionTotal> {
    Emotion::ALL
        .iter()
        .map(|&emotion| EmotionTotal {
            emotion,
            total: records.iter().map(|r| r.counts.get(emotion) as u64).sum(),
        })
        .collect()
}

/// Sort totals descending; ties go to the alphabetically first emotion.
pub fn rank(mut totals: Vec<EmotionTotal>) -> Vec<EmotionTotal> {
    totals.sort_by(|a, b| {
        b.total
            .cmp(&a.total)
            .then_with(|| a.emotion.as_str().cmp(b.emotion.as_str()))
    });
    totals
}

fn timeline(indexed: &[EmotionRecord]) -> Timeline {
    Timeline {
        timestamps: indexed
            .iter()
            .map(|r| r.recorded_at.format(timestamp_format::FORMAT).to_string())
            .collect(),
        series: Emotion::ALL
            .iter()
            .map(|&emotion| Series {
                emotion,
                values: indexed.iter().map(|r| r.counts.get(emotion)).collect(),
            })
            .collect(),
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Report::Empty { message } => writeln!(f, "{message}"),
            Report::Ready(report) => fmt::Display::fmt(report, f),
        }
    }
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Emotion records ({})", self.indexed.len())?;
        write!(f, "{:<20}", "recorded_at")?;
        for emotion in Emotion::ALL {
            write!(f, " {:>9}", emotion.as_str())?;
        }
        writeln!(f)?;
        for record in &self.indexed {
            write!(f, "{:<20}", record.recorded_at.format(timestamp_format::FORMAT).to_string())?;
            for n in record.counts.as_array() {
                write!(f, " {n:>9}")?;
            }
            writeln!(f)?;
        }

        writeln!(f, "\nTotal students by emotion")?;
        for t in &self.totals {
            writeln!(f, "  {:<10} {:>6}", t.emotion.as_str(), t.total)?;
        }

        writeln!(f, "\nEmotion with the highest total: {} ({})", self.top.emotion, self.top.total)
    }
}
