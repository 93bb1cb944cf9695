//! Scripted playback scenarios.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// Two slots playing different logs; only the active one drives the controls
    DualPlayback,

    /// Negative speed through the start of the loop
    ReverseWrap,

    /// Absolute seek while the clock keeps playing
    ScrubWhilePlaying,

    /// Overlapping loads into one slot; the older one must lose
    StaleLoad,

    /// Third viewport refused, eviction frees a slot and moves activation
    CapacityEvict,

    /// Zero speed freezes time; double speed doubles it
    SpeedFreeze,

    /// A malformed record halts its own slot only
    FaultIsolation,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::DualPlayback,
            ScenarioId::ReverseWrap,
            ScenarioId::ScrubWhilePlaying,
            ScenarioId::StaleLoad,
            ScenarioId::CapacityEvict,
            ScenarioId::SpeedFreeze,
            ScenarioId::FaultIsolation,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::DualPlayback => "dual_playback",
            ScenarioId::ReverseWrap => "reverse_wrap",
            ScenarioId::ScrubWhilePlaying => "scrub_while_playing",
            ScenarioId::StaleLoad => "stale_load",
            ScenarioId::CapacityEvict => "capacity_evict",
            ScenarioId::SpeedFreeze => "speed_freeze",
            ScenarioId::FaultIsolation => "fault_isolation",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::DualPlayback => "Two viewports, two logs; notifications come from the active slot only",
            ScenarioId::ReverseWrap => "Speed -1 from the first frame; playback wraps to the loop end",
            ScenarioId::ScrubWhilePlaying => "Seek mid-playback; the next tick shows the target frame and keeps playing",
            ScenarioId::StaleLoad => "Slow load overtaken by a fast one, then a failed load; the slot keeps the fast log",
            ScenarioId::CapacityEvict => "Third viewport refused; evicting slot 1 frees it and moves activation",
            ScenarioId::SpeedFreeze => "Speed 0 holds the frame; speed 2 advances twice as fast as the host",
            ScenarioId::FaultIsolation => "Broken record in slot 2 halts slot 2; slot 1 keeps animating",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dual_playback" | "dualplayback" | "dual" => Ok(ScenarioId::DualPlayback),
            "reverse_wrap" | "reversewrap" | "reverse" => Ok(ScenarioId::ReverseWrap),
            "scrub_while_playing" | "scrub" => Ok(ScenarioId::ScrubWhilePlaying),
            "stale_load" | "staleload" => Ok(ScenarioId::StaleLoad),
            "capacity_evict" | "capacity" => Ok(ScenarioId::CapacityEvict),
            "speed_freeze" | "speedfreeze" | "freeze" => Ok(ScenarioId::SpeedFreeze),
            "fault_isolation" | "faultisolation" | "fault" => Ok(ScenarioId::FaultIsolation),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>().unwrap(), scenario);
            assert!(!scenario.description().is_empty());
        }
    }

    #[test]
    fn test_aliases_and_unknown() {
        assert_eq!("SCRUB".parse::<ScenarioId>().unwrap(), ScenarioId::ScrubWhilePlaying);
        assert!("time_warp".parse::<ScenarioId>().is_err());
    }
}
