//! Headless scene and control-panel stand-ins that record what they receive.

use nalgebra::Vector3;
use replay_core::{Group, Pose, SceneSink, TimeObserver};
use std::collections::HashMap;

/// One `apply_pose` call.
#[derive(Debug, Clone, PartialEq)]
pub struct PosePush {
    pub group: String,
    pub pose: Pose,
}

/// A [`SceneSink`] that keeps every pose it is given.
#[derive(Debug, Default)]
pub struct RecordingScene {
    groups: Vec<String>,
    builds: usize,
    pushes: Vec<PosePush>,
    latest: HashMap<String, Pose>,
}

impl RecordingScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group names of the most recently built scene.
    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    /// How many times a scene was built (once per load).
    pub fn builds(&self) -> usize {
        self.builds
    }

    pub fn pushes(&self) -> &[PosePush] {
        &self.pushes
    }

    pub fn push_count(&self) -> usize {
        self.pushes.len()
    }

    /// Where `group` was last placed.
    pub fn position_of(&self, group: &str) -> Option<Vector3<f64>> {
        self.latest.get(group).map(|pose| pose.position)
    }

    /// Total distance `group` travelled across all recorded pushes.
    pub fn path_length(&self, group: &str) -> f64 {
        let positions: Vec<Vector3<f64>> = self
            .pushes
            .iter()
            .filter(|push| push.group == group)
            .map(|push| push.pose.position)
            .collect();
        positions.windows(2).map(|w| (w[1] - w[0]).norm()).sum()
    }
}

impl SceneSink for RecordingScene {
    fn build_scene(&mut self, groups: &[Group]) {
        self.groups = groups.iter().map(|g| g.name.clone()).collect();
        self.latest.clear();
        self.builds += 1;
    }

    fn apply_pose(&mut self, group: &str, pose: &Pose) {
        self.latest.insert(group.to_string(), *pose);
        self.pushes.push(PosePush {
            group: group.to_string(),
            pose: *pose,
        });
    }
}

/// A [`TimeObserver`] that keeps every quantized time it is shown.
#[derive(Debug, Default, Clone)]
pub struct RecordingObserver {
    times: Vec<f64>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn last(&self) -> Option<f64> {
        self.times.last().copied()
    }

    pub fn clear(&mut self) {
        self.times.clear();
    }
}

impl TimeObserver for RecordingObserver {
    fn notify_time(&mut self, quantized_time: f64) {
        self.times.push(quantized_time);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_tracks_latest_and_path() {
        let mut scene = RecordingScene::new();
        scene.apply_pose("arm", &Pose::from_arrays([0.0, 0.0, 0.0], [0.0, 0.0, 0.0, 1.0]));
        scene.apply_pose("arm", &Pose::from_arrays([3.0, 4.0, 0.0], [0.0, 0.0, 0.0, 1.0]));

        assert_eq!(scene.push_count(), 2);
        assert_eq!(scene.position_of("arm"), Some(Vector3::new(3.0, 4.0, 0.0)));
        assert!((scene.path_length("arm") - 5.0).abs() < 1e-12);
        assert_eq!(scene.position_of("leg"), None);
    }

    #[test]
    fn test_observer_records_in_order() {
        let mut observer = RecordingObserver::new();
        observer.notify_time(0.1);
        observer.notify_time(0.2);
        assert_eq!(observer.times(), &[0.1, 0.2]);
        assert_eq!(observer.last(), Some(0.2));

        observer.clear();
        assert!(observer.times().is_empty());
    }
}
