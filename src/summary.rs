// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Aggregation of detections into a natural-language summary

use std::collections::HashMap;

use crate::detector::Detection;

/// Returned when the detector saw nothing above threshold.
pub const EMPTY_SCENE_MESSAGE: &str = "I cannot see anything recognizable clearly.";

/// Tally detections per label in a single pass.
///
/// The returned pairs preserve first-appearance order, which is what keeps
/// the rendered summary deterministic for a given detection sequence.
pub fn tally_labels(detections: &[Detection]) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for detection in detections {
        if let Some(&i) = index.get(detection.label.as_str()) {
            counts[i].1 += 1;
        } else {
            index.insert(detection.label.as_str(), counts.len());
            counts.push((detection.label.clone(), 1));
        }
    }

    counts
}

/// Render the summary sentence for a detection sequence.
///
/// Labels are kept grammatically singular regardless of count ("2 chair"),
/// matching the model vocabulary verbatim.
pub fn render_summary(detections: &[Detection]) -> String {
    if detections.is_empty() {
        return EMPTY_SCENE_MESSAGE.to_string();
    }

    let fragments: Vec<String> = tally_labels(detections)
        .into_iter()
        .map(|(label, count)| format!("{} {}", count, label))
        .collect();

    format!("I see {}", fragments.join(", "))
}
