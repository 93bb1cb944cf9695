//! Instance Registry - the two viewport slots and which one the controls drive.
//!
//! Slots are owned values, not globals: every controller lives inside the
//! registry and is reached through a [`SlotId`]. Each slot carries a load
//! sequence number so a load that finishes after its slot was reloaded or
//! evicted is discarded instead of overwriting newer state.

use crate::config::ViewerConfig;
use crate::controller::{LoadSummary, PlaybackController, PlaybackFault, SceneSink, TickOutcome, TimeObserver};
use crate::loader::LoadError;
use crate::record::AnimationRecord;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Number of concurrent viewports.
pub const MAX_SLOTS: usize = 2;

/// Identifies a viewport slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SlotId {
    One,
    Two,
}

impl SlotId {
    /// Both slots, in preference and tick order.
    pub const ALL: [SlotId; MAX_SLOTS] = [SlotId::One, SlotId::Two];

    fn index(self) -> usize {
        match self {
            SlotId::One => 0,
            SlotId::Two => 1,
        }
    }

    /// The 1-based number shown to users.
    pub fn number(self) -> u8 {
        self.index() as u8 + 1
    }
}

impl TryFrom<u8> for SlotId {
    type Error = RegistryError;

    fn try_from(number: u8) -> Result<Self, Self::Error> {
        match number {
            1 => Ok(SlotId::One),
            2 => Ok(SlotId::Two),
            other => Err(RegistryError::UnknownSlot(other)),
        }
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    /// Both slots are occupied
    #[error("Both viewport slots are occupied; evict one first")]
    Capacity,

    /// The slot has no controller
    #[error("Slot {0} is not occupied")]
    InvalidSlot(SlotId),

    /// Slot numbers are 1 and 2
    #[error("No slot numbered {0}")]
    UnknownSlot(u8),

    /// The slot was reloaded or evicted after this load began
    #[error("Load #{sequence} for slot {slot} was superseded")]
    StaleLoad { slot: SlotId, sequence: u64 },

    /// The load itself failed; the slot keeps its previous animation
    #[error("Load for slot {slot} failed: {source}")]
    Load {
        slot: SlotId,
        #[source]
        source: LoadError,
    },
}

/// Handed out by [`InstanceRegistry::begin_load`], redeemed by
/// [`InstanceRegistry::finish_load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    slot: SlotId,
    sequence: u64,
}

impl LoadTicket {
    pub fn slot(&self) -> SlotId {
        self.slot
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// Per-tick summary across both slots.
#[derive(Debug, Default)]
pub struct TickReport {
    pub outcomes: Vec<(SlotId, TickOutcome)>,
    /// Faults raised this tick; each halted only its own slot
    pub faults: Vec<(SlotId, PlaybackFault)>,
}

impl TickReport {
    /// Slots whose scene received new poses this tick.
    pub fn rendered_slots(&self) -> impl Iterator<Item = SlotId> + '_ {
        self.outcomes.iter().filter_map(|(slot, outcome)| match outcome {
            TickOutcome::Resolved { pose_applied: true, .. } => Some(*slot),
            _ => None,
        })
    }
}

struct Slot<S: SceneSink> {
    controller: Option<PlaybackController<S>>,
    load_sequence: u64,
}

impl<S: SceneSink> Slot<S> {
    fn vacant() -> Self {
        Self {
            controller: None,
            load_sequence: 0,
        }
    }
}

/// Owns up to two [`PlaybackController`]s.
pub struct InstanceRegistry<S: SceneSink> {
    slots: [Slot<S>; MAX_SLOTS],
    active: Option<SlotId>,
    config: ViewerConfig,
}

impl<S: SceneSink> InstanceRegistry<S> {
    pub fn new(config: ViewerConfig) -> Self {
        Self {
            slots: [Slot::vacant(), Slot::vacant()],
            active: None,
            config,
        }
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    /// Creates an Empty controller around `scene` in a free slot.
    ///
    /// `preferred` is honored when free; otherwise slot 1 is tried before
    /// slot 2. The new controller becomes the active one.
    pub fn assign_slot(&mut self, preferred: Option<SlotId>, scene: S) -> Result<SlotId, RegistryError> {
        let slot = preferred
            .filter(|slot| !self.is_occupied(*slot))
            .or_else(|| SlotId::ALL.into_iter().find(|slot| !self.is_occupied(*slot)))
            .ok_or(RegistryError::Capacity)?;

        self.slots[slot.index()].controller = Some(PlaybackController::new(scene, &self.config));
        self.activate(slot);

        info!("Assigned viewport slot {}", slot);
        Ok(slot)
    }

    /// Tears down the controller in `slot` and cancels its pending loads.
    ///
    /// If it was active, activation moves to the other occupied slot, if any.
    pub fn evict(&mut self, slot: SlotId) -> Result<(), RegistryError> {
        let entry = &mut self.slots[slot.index()];
        if entry.controller.take().is_none() {
            return Err(RegistryError::InvalidSlot(slot));
        }
        entry.load_sequence += 1;

        if self.active == Some(slot) {
            self.active = None;
            if let Some(other) = SlotId::ALL.into_iter().find(|s| self.is_occupied(*s)) {
                self.activate(other);
            }
        }

        info!("Evicted viewport slot {} (active: {:?})", slot, self.active);
        Ok(())
    }

    /// Routes the controls to `slot`.
    pub fn set_active(&mut self, slot: SlotId) -> Result<(), RegistryError> {
        if !self.is_occupied(slot) {
            return Err(RegistryError::InvalidSlot(slot));
        }
        self.activate(slot);
        debug!("Active slot is now {}", slot);
        Ok(())
    }

    fn activate(&mut self, slot: SlotId) {
        for candidate in SlotId::ALL {
            if let Some(controller) = self.slots[candidate.index()].controller.as_mut() {
                controller.set_is_active(candidate == slot);
            }
        }
        self.active = Some(slot);
    }

    pub fn active(&self) -> Option<SlotId> {
        self.active
    }

    pub fn is_occupied(&self, slot: SlotId) -> bool {
        self.slots[slot.index()].controller.is_some()
    }

    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|s| s.controller.is_some()).count()
    }

    pub fn controller(&self, slot: SlotId) -> Option<&PlaybackController<S>> {
        self.slots[slot.index()].controller.as_ref()
    }

    pub fn controller_mut(&mut self, slot: SlotId) -> Option<&mut PlaybackController<S>> {
        self.slots[slot.index()].controller.as_mut()
    }

    /// The controller the controls currently drive.
    pub fn active_controller_mut(&mut self) -> Option<&mut PlaybackController<S>> {
        let slot = self.active?;
        self.controller_mut(slot)
    }

    /// Master play: resumes every occupied slot.
    pub fn play_all(&mut self) {
        self.controllers_mut().for_each(|c| c.play());
    }

    /// Master pause: pauses every occupied slot.
    pub fn pause_all(&mut self) {
        self.controllers_mut().for_each(|c| c.pause());
    }

    fn controllers_mut(&mut self) -> impl Iterator<Item = &mut PlaybackController<S>> {
        self.slots.iter_mut().filter_map(|s| s.controller.as_mut())
    }

    /// Starts a load into `slot`, superseding any load still in flight.
    pub fn begin_load(&mut self, slot: SlotId) -> Result<LoadTicket, RegistryError> {
        if !self.is_occupied(slot) {
            return Err(RegistryError::InvalidSlot(slot));
        }
        let entry = &mut self.slots[slot.index()];
        entry.load_sequence += 1;
        debug!("Load #{} started for slot {}", entry.load_sequence, slot);
        Ok(LoadTicket {
            slot,
            sequence: entry.load_sequence,
        })
    }

    /// Completes a load started with [`begin_load`](Self::begin_load).
    ///
    /// A superseded ticket is rejected without touching the slot. A failed
    /// load leaves the slot's current animation playing.
    pub fn finish_load(
        &mut self,
        ticket: LoadTicket,
        result: Result<AnimationRecord, LoadError>,
    ) -> Result<LoadSummary, RegistryError> {
        let slot = ticket.slot;
        let entry = &mut self.slots[slot.index()];

        let controller = match entry.controller.as_mut() {
            Some(controller) if entry.load_sequence == ticket.sequence => controller,
            _ => {
                warn!(
                    "Discarding stale load #{} for slot {} (current #{})",
                    ticket.sequence, slot, entry.load_sequence
                );
                return Err(RegistryError::StaleLoad {
                    slot,
                    sequence: ticket.sequence,
                });
            }
        };

        match result {
            Ok(record) => Ok(controller.load(record)),
            Err(source) => {
                warn!("Load for slot {} failed, keeping current animation: {}", slot, source);
                Err(RegistryError::Load { slot, source })
            }
        }
    }

    /// Loads a record into `slot` immediately.
    pub fn load(&mut self, slot: SlotId, record: AnimationRecord) -> Result<LoadSummary, RegistryError> {
        let ticket = self.begin_load(slot)?;
        self.finish_load(ticket, Ok(record))
    }

    /// Ticks slot 1 then slot 2.
    ///
    /// A fault in one slot is logged and reported; the other slot still ticks.
    pub fn tick_all<O: TimeObserver>(&mut self, now: Duration, observer: &mut O) -> TickReport {
        let mut report = TickReport::default();

        for slot in SlotId::ALL {
            let Some(controller) = self.slots[slot.index()].controller.as_mut() else {
                continue;
            };
            match controller.tick(now, observer) {
                Ok(outcome) => report.outcomes.push((slot, outcome)),
                Err(fault) => {
                    error!("Slot {} halted: {}", slot, fault);
                    report.faults.push((slot, fault));
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ControllerState;
    use crate::loader::load_from_str;
    use crate::record::{Frame, Pose, Timing};
    use replay_env::EnvError;
    use std::collections::HashMap;

    const CYLINDER_BOX: &str = include_str!("../fixtures/cylinder_box.json");
    const ORBIT_LEGACY: &str = include_str!("../fixtures/orbit_legacy.json");

    #[derive(Default)]
    struct TestScene {
        pushes: usize,
    }

    impl SceneSink for TestScene {
        fn apply_pose(&mut self, _group: &str, _pose: &Pose) {
            self.pushes += 1;
        }
    }

    fn registry() -> InstanceRegistry<TestScene> {
        InstanceRegistry::new(ViewerConfig::default())
    }

    fn cylinder_box() -> AnimationRecord {
        load_from_str(CYLINDER_BOX).unwrap()
    }

    #[test]
    fn test_assign_prefers_slot_one() {
        let mut reg = registry();
        assert_eq!(reg.assign_slot(None, TestScene::default()).unwrap(), SlotId::One);
        assert_eq!(reg.assign_slot(None, TestScene::default()).unwrap(), SlotId::Two);
        assert_eq!(reg.occupied_count(), 2);
    }

    #[test]
    fn test_preferred_slot_honored_when_free() {
        let mut reg = registry();
        assert_eq!(reg.assign_slot(Some(SlotId::Two), TestScene::default()).unwrap(), SlotId::Two);
        assert_eq!(reg.assign_slot(Some(SlotId::Two), TestScene::default()).unwrap(), SlotId::One);
    }

    #[test]
    fn test_capacity_then_evict_frees_slot_one() {
        let mut reg = registry();
        reg.assign_slot(None, TestScene::default()).unwrap();
        reg.assign_slot(None, TestScene::default()).unwrap();

        assert!(matches!(
            reg.assign_slot(None, TestScene::default()),
            Err(RegistryError::Capacity)
        ));

        reg.evict(SlotId::One).unwrap();
        assert_eq!(reg.assign_slot(None, TestScene::default()).unwrap(), SlotId::One);
    }

    #[test]
    fn test_new_slot_becomes_active() {
        let mut reg = registry();
        reg.assign_slot(None, TestScene::default()).unwrap();
        reg.assign_slot(None, TestScene::default()).unwrap();

        assert_eq!(reg.active(), Some(SlotId::Two));
        assert!(!reg.controller(SlotId::One).unwrap().is_active());
        assert!(reg.controller(SlotId::Two).unwrap().is_active());
    }

    #[test]
    fn test_evicting_active_falls_back_to_other_slot() {
        let mut reg = registry();
        reg.assign_slot(None, TestScene::default()).unwrap();
        reg.assign_slot(None, TestScene::default()).unwrap();

        reg.evict(SlotId::Two).unwrap();
        assert_eq!(reg.active(), Some(SlotId::One));
        assert!(reg.controller(SlotId::One).unwrap().is_active());

        reg.evict(SlotId::One).unwrap();
        assert_eq!(reg.active(), None);
        assert!(reg.active_controller_mut().is_none());
    }

    #[test]
    fn test_evicting_inactive_keeps_active() {
        let mut reg = registry();
        reg.assign_slot(None, TestScene::default()).unwrap();
        reg.assign_slot(None, TestScene::default()).unwrap();
        reg.set_active(SlotId::One).unwrap();

        reg.evict(SlotId::Two).unwrap();
        assert_eq!(reg.active(), Some(SlotId::One));
    }

    #[test]
    fn test_operations_on_empty_slot_fail() {
        let mut reg = registry();
        assert!(matches!(reg.evict(SlotId::One), Err(RegistryError::InvalidSlot(SlotId::One))));
        assert!(matches!(reg.set_active(SlotId::Two), Err(RegistryError::InvalidSlot(SlotId::Two))));
        assert!(matches!(reg.begin_load(SlotId::One), Err(RegistryError::InvalidSlot(_))));
    }

    #[test]
    fn test_slot_numbers() {
        assert_eq!(SlotId::try_from(1).unwrap(), SlotId::One);
        assert_eq!(SlotId::try_from(2).unwrap(), SlotId::Two);
        assert!(matches!(SlotId::try_from(3), Err(RegistryError::UnknownSlot(3))));
        assert_eq!(SlotId::Two.to_string(), "2");
    }

    #[test]
    fn test_stale_load_is_rejected() {
        let mut reg = registry();
        let slot = reg.assign_slot(None, TestScene::default()).unwrap();

        let first = reg.begin_load(slot).unwrap();
        let second = reg.begin_load(slot).unwrap();

        reg.finish_load(second, Ok(cylinder_box())).unwrap();
        let err = reg
            .finish_load(first, Ok(load_from_str(ORBIT_LEGACY).unwrap()))
            .unwrap_err();

        assert!(matches!(err, RegistryError::StaleLoad { sequence, .. } if sequence == first.sequence()));
        let summary = reg.controller(slot).unwrap().summary().unwrap();
        assert_eq!(summary.groups.len(), 2);
    }

    #[test]
    fn test_load_into_evicted_slot_is_stale() {
        let mut reg = registry();
        let slot = reg.assign_slot(None, TestScene::default()).unwrap();
        let ticket = reg.begin_load(slot).unwrap();

        reg.evict(slot).unwrap();
        reg.assign_slot(Some(slot), TestScene::default()).unwrap();

        assert!(matches!(
            reg.finish_load(ticket, Ok(cylinder_box())),
            Err(RegistryError::StaleLoad { .. })
        ));
        assert_eq!(reg.controller(slot).unwrap().state(), ControllerState::Empty);
    }

    #[test]
    fn test_failed_load_keeps_current_animation() {
        let mut reg = registry();
        let slot = reg.assign_slot(None, TestScene::default()).unwrap();
        reg.load(slot, cylinder_box()).unwrap();

        let ticket = reg.begin_load(slot).unwrap();
        let err = reg
            .finish_load(ticket, Err(LoadError::Transport(EnvError::not_found("gone.json"))))
            .unwrap_err();

        assert!(matches!(err, RegistryError::Load { .. }));
        let controller = reg.controller(slot).unwrap();
        assert_eq!(controller.state(), ControllerState::Loaded);
        assert_eq!(controller.summary().unwrap().groups.len(), 2);
    }

    #[test]
    fn test_play_all_and_pause_all() {
        let mut reg = registry();
        reg.assign_slot(None, TestScene::default()).unwrap();
        reg.assign_slot(None, TestScene::default()).unwrap();

        reg.pause_all();
        assert!(SlotId::ALL.iter().all(|s| !reg.controller(*s).unwrap().is_playing()));
        reg.play_all();
        assert!(SlotId::ALL.iter().all(|s| reg.controller(*s).unwrap().is_playing()));
    }

    #[test]
    fn test_only_active_slot_notifies() {
        let mut reg = registry();
        let one = reg.assign_slot(None, TestScene::default()).unwrap();
        let two = reg.assign_slot(None, TestScene::default()).unwrap();
        reg.load(one, cylinder_box()).unwrap();
        reg.load(two, load_from_str(ORBIT_LEGACY).unwrap()).unwrap();
        reg.set_active(one).unwrap();

        let mut times = Vec::new();
        reg.tick_all(Duration::ZERO, &mut |t: f64| times.push(t));

        // cylinder_box starts at 0.12; orbit_legacy would report 0.0
        assert_eq!(times.len(), 1);
        assert!((times[0] - 0.12).abs() < 1e-12);
    }

    #[test]
    fn test_fault_in_one_slot_does_not_stop_the_other() {
        let mut reg = registry();
        let healthy = reg.assign_slot(None, TestScene::default()).unwrap();
        let broken = reg.assign_slot(None, TestScene::default()).unwrap();
        reg.load(healthy, cylinder_box()).unwrap();

        let record = cylinder_box();
        let truncated = AnimationRecord::from_parts_unchecked(
            None,
            record.groups().to_vec(),
            vec![Frame::new(HashMap::new())],
            Timing::new(0.1, 0.0, 0.9).unwrap(),
        );
        reg.load(broken, truncated).unwrap();

        let report = reg.tick_all(Duration::ZERO, &mut |_t: f64| {});
        assert_eq!(report.faults.len(), 1);
        assert_eq!(report.faults[0].0, broken);
        assert_eq!(report.rendered_slots().collect::<Vec<_>>(), vec![healthy]);

        let report = reg.tick_all(Duration::from_millis(40), &mut |_t: f64| {});
        assert!(report.faults.is_empty());
        assert!(report.outcomes.contains(&(broken, TickOutcome::Halted)));
        assert_eq!(reg.controller(healthy).unwrap().current_frame(), Some(1));
        assert_eq!(reg.controller(healthy).unwrap().scene().pushes, 4);
    }
}
