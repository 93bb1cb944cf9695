//! JSON timeline exporter.
//!
//! Exports what each slot showed at each host refresh so a run can be
//! diffed or plotted offline.

use replay_core::{LoadSummary, SlotId, TickOutcome};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;

/// One slot's resolution at one host refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineSample {
    /// Host (virtual) time in seconds
    pub host_time_sec: f64,

    /// Slot number (1 or 2)
    pub slot: u8,

    pub frame: usize,

    /// Logical time of `frame`
    pub quantized_time: f64,

    /// Poses were pushed to the scene at this refresh
    pub pose_applied: bool,
}

impl TimelineSample {
    /// Builds a sample from a resolved tick; other outcomes yield nothing.
    pub fn from_outcome(host_time_sec: f64, slot: SlotId, outcome: &TickOutcome) -> Option<Self> {
        match *outcome {
            TickOutcome::Resolved {
                frame,
                quantized_time,
                pose_applied,
                ..
            } => Some(Self {
                host_time_sec,
                slot: slot.number(),
                frame,
                quantized_time,
                pose_applied,
            }),
            _ => None,
        }
    }
}

/// A slot's loaded animation, as the control panel saw it.
#[derive(Debug, Clone, Serialize)]
pub struct SlotExport {
    pub slot: u8,
    pub summary: LoadSummary,
}

/// Complete playback export.
#[derive(Debug, Clone, Serialize)]
pub struct PlaybackExport {
    /// Log origin or scenario name
    pub source: String,

    /// Seed used
    pub seed: u64,

    /// Host time covered, in seconds
    pub duration_sec: f64,

    pub slots: Vec<SlotExport>,

    pub samples: Vec<TimelineSample>,

    /// Host refreshes that were rendered
    pub rendered_frames: u64,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub faults: Vec<String>,
}

impl PlaybackExport {
    /// Creates a new export container.
    pub fn new(source: &str, seed: u64) -> Self {
        Self {
            source: source.to_string(),
            seed,
            duration_sec: 0.0,
            slots: Vec::new(),
            samples: Vec::new(),
            rendered_frames: 0,
            faults: Vec::new(),
        }
    }

    pub fn add_slot(&mut self, slot: SlotId, summary: LoadSummary) {
        self.slots.push(SlotExport {
            slot: slot.number(),
            summary,
        });
    }

    /// Adds a sample.
    pub fn add_sample(&mut self, sample: TimelineSample) {
        self.duration_sec = sample.host_time_sec;
        self.samples.push(sample);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, rendered_frames: u64, faults: Vec<String>) {
        self.rendered_frames = rendered_frames;
        self.faults = faults;
    }

    /// Frames visited by `slot`, in order, with repeats collapsed.
    pub fn frame_sequence(&self, slot: SlotId) -> Vec<usize> {
        let mut frames: Vec<usize> = self
            .samples
            .iter()
            .filter(|s| s.slot == slot.number())
            .map(|s| s.frame)
            .collect();
        frames.dedup();
        frames
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = self.to_json()?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(frame: usize) -> TickOutcome {
        TickOutcome::Resolved {
            frame,
            quantized_time: frame as f64 * 0.1,
            pose_applied: true,
            notified: false,
        }
    }

    #[test]
    fn test_only_resolved_ticks_become_samples() {
        assert!(TimelineSample::from_outcome(0.0, SlotId::One, &TickOutcome::Empty).is_none());
        assert!(TimelineSample::from_outcome(0.0, SlotId::One, &TickOutcome::Halted).is_none());

        let sample = TimelineSample::from_outcome(0.5, SlotId::Two, &resolved(3)).unwrap();
        assert_eq!(sample.slot, 2);
        assert_eq!(sample.frame, 3);
    }

    #[test]
    fn test_frame_sequence_collapses_repeats() {
        let mut export = PlaybackExport::new("test", 42);
        for (t, frame) in [(0.0, 0), (0.1, 0), (0.2, 1), (0.3, 1), (0.4, 0)] {
            export.add_sample(TimelineSample::from_outcome(t, SlotId::One, &resolved(frame)).unwrap());
        }
        export.add_sample(TimelineSample::from_outcome(0.4, SlotId::Two, &resolved(7)).unwrap());

        assert_eq!(export.frame_sequence(SlotId::One), vec![0, 1, 0]);
        assert_eq!(export.frame_sequence(SlotId::Two), vec![7]);
        assert!((export.duration_sec - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_json_shape() {
        let mut export = PlaybackExport::new("cylinder_box", 7);
        export.add_sample(TimelineSample::from_outcome(0.0, SlotId::One, &resolved(0)).unwrap());
        export.finalize(1, Vec::new());

        let value: serde_json::Value = serde_json::from_str(&export.to_json().unwrap()).unwrap();
        assert_eq!(value["source"], "cylinder_box");
        assert_eq!(value["rendered_frames"], 1);
        assert_eq!(value["samples"][0]["slot"], 1);
        assert!(value.get("faults").is_none());
    }
}
