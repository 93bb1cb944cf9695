//! The "RECORD" - immutable representation of one loaded animation log
//!
//! Parsing validates the log's structure once and normalizes the two
//! historical timing shapes into a single [`Timing`], so nothing downstream
//! ever branches on log format:
//!
//! ```text
//! Shape A: { "speed": s, "totalTime": T }         ─┐
//!                                                  ├─► Timing { step, start, stop }
//! Shape B: { "step": s, "start": a, "stop": b }   ─┘
//! ```

use nalgebra::{Quaternion, Vector3};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// Structural problems found while parsing a log.
///
/// A parse error aborts the load attempt only; whatever was already playing
/// in the target slot is left untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("Malformed log: {0}")]
    Malformed(String),

    #[error("Missing required field `{0}`")]
    MissingField(&'static str),

    #[error("missing-timing-fields: expected `step`/`stop` or `speed`/`totalTime`")]
    MissingTimingFields,

    #[error("Step must be positive, got {0}")]
    NonPositiveStep(f64),

    #[error("Empty timing span: stop {stop} <= start {start}")]
    EmptySpan { start: f64, stop: f64 },

    #[error("Non-finite value in `{0}`")]
    NonFinite(String),

    #[error("Duplicate group name: {0}")]
    DuplicateGroup(String),

    #[error("Unknown geometry type `{kind}` in group {group}")]
    UnknownGeometry { group: String, kind: String },

    #[error("Invalid color: {0}")]
    InvalidColor(String),

    #[error("Transparency {value} of group {group} is outside [0, 1]")]
    InvalidTransparency { group: String, value: f64 },

    #[error("Invalid frame key: {0}")]
    InvalidFrameKey(String),

    #[error("Frame {0} appears more than once")]
    DuplicateFrame(usize),

    #[error("Frame indices are not contiguous: expected {expected}, found {found}")]
    NonContiguousFrames { expected: usize, found: usize },

    #[error("Frame {frame} has no entry for group {group}")]
    MissingGroupEntry { frame: usize, group: String },

    #[error("Log holds {found} frames but its timing needs {required}")]
    InsufficientFrames { required: usize, found: usize },

    #[error("Timing addresses too many frames: span {span} / step {step} exceeds {max}")]
    TooManyFrames { span: f64, step: f64, max: usize },
}

// =============================================================================
// TIMING
// =============================================================================

/// Upper bound on the frames a single timing may address.
pub const MAX_FRAME_COUNT: usize = 1 << 24;

/// Normalized timing parameters.
///
/// `step` is the logical time between two recorded frames, `start` the time
/// of frame 0 and `stop` the loop point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Timing {
    pub step: f64,
    pub start: f64,
    pub stop: f64,
}

impl Timing {
    /// Validates and builds a timing triple.
    pub fn new(step: f64, start: f64, stop: f64) -> Result<Self, ParseError> {
        for (field, value) in [("step", step), ("start", start), ("stop", stop)] {
            if !value.is_finite() {
                return Err(ParseError::NonFinite(field.to_string()));
            }
        }
        if step <= 0.0 {
            return Err(ParseError::NonPositiveStep(step));
        }
        if stop <= start {
            return Err(ParseError::EmptySpan { start, stop });
        }
        let span = stop - start;
        if !((span / step).round_ties_even() < MAX_FRAME_COUNT as f64) {
            return Err(ParseError::TooManyFrames {
                span,
                step,
                max: MAX_FRAME_COUNT,
            });
        }
        Ok(Self { step, start, stop })
    }

    /// Length of one loop in logical time.
    pub fn span(&self) -> f64 {
        self.stop - self.start
    }

    /// Number of frames the timing addresses: `round(span / step) + 1`.
    ///
    /// Saturates for hand-built timings that never went through [`Timing::new`].
    pub fn frame_count(&self) -> usize {
        ((self.span() / self.step).round_ties_even() as usize).saturating_add(1)
    }

    /// Logical time of a frame index (the quantized time reported to Controls).
    pub fn time_of(&self, frame: usize) -> f64 {
        frame as f64 * self.step + self.start
    }
}

// =============================================================================
// GROUPS & GEOMETRY
// =============================================================================

/// A 24-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color(pub u32);

impl Color {
    pub const WHITE: Color = Color(0xff_ffff);

    /// Reads a color from a JSON number or string.
    pub fn from_json(value: &Value) -> Result<Self, ParseError> {
        match value {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))
                .filter(|v| *v <= 0xff_ffff)
                .map(|v| Color(v as u32))
                .ok_or_else(|| ParseError::InvalidColor(n.to_string())),
            Value::String(s) => s.parse(),
            other => Err(ParseError::InvalidColor(other.to_string())),
        }
    }

    /// CSS-style `#rrggbb` form, as the control panel displays it.
    pub fn to_hex_string(&self) -> String {
        format!("#{:06x}", self.0)
    }
}

impl FromStr for Color {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let parsed = if let Some(hex) = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .or_else(|| trimmed.strip_prefix('#'))
        {
            u32::from_str_radix(hex, 16).ok()
        } else {
            trimmed.parse::<u32>().ok()
        };

        parsed
            .filter(|v| *v <= 0xff_ffff)
            .map(Color)
            .ok_or_else(|| ParseError::InvalidColor(s.to_string()))
    }
}

/// Primitive shapes a group can be built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveKind {
    Box,
    Cylinder,
    Ellipsoid,
    Sphere,
    Mesh,
}

impl FromStr for PrimitiveKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "box" => Ok(PrimitiveKind::Box),
            "cylinder" => Ok(PrimitiveKind::Cylinder),
            "ellipsoid" => Ok(PrimitiveKind::Ellipsoid),
            "sphere" => Ok(PrimitiveKind::Sphere),
            "mesh" => Ok(PrimitiveKind::Mesh),
            _ => Err(format!("Unknown geometry type: {}", s)),
        }
    }
}

/// Static geometry of one object inside a group.
///
/// The engine never interprets geometry; it is carried through for the
/// renderer, unknown fields included.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeometryDescriptor {
    pub kind: PrimitiveKind,
    pub scale: Option<[f64; 3]>,
    pub diameter: Option<f64>,
    pub color: Option<Color>,
    pub extra: Map<String, Value>,
}

/// A named rigid sub-assembly with its own pose per frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group {
    pub name: String,
    pub initial_color: Color,
    /// Opacity in [0, 1]; 1.0 is fully opaque
    pub initial_transparency: f64,
    pub geometry: Vec<GeometryDescriptor>,
}

// =============================================================================
// POSES & FRAMES
// =============================================================================

/// Pose of one group at one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vector3<f64>,
    pub orientation: Quaternion<f64>,
}

impl Pose {
    /// Builds a pose from the log's `[x, y, z]` and `[x, y, z, w]` arrays.
    pub fn from_arrays(position: [f64; 3], quaternion: [f64; 4]) -> Self {
        Self {
            position: Vector3::new(position[0], position[1], position[2]),
            orientation: Quaternion::new(quaternion[3], quaternion[0], quaternion[1], quaternion[2]),
        }
    }

    /// Position as `[x, y, z]`.
    pub fn position_array(&self) -> [f64; 3] {
        [self.position.x, self.position.y, self.position.z]
    }

    /// Orientation as `[x, y, z, w]`, the order the renderer expects.
    pub fn orientation_xyzw(&self) -> [f64; 4] {
        [self.orientation.i, self.orientation.j, self.orientation.k, self.orientation.w]
    }
}

/// One recorded sample of every group's pose.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    poses: HashMap<String, Pose>,
}

impl Frame {
    pub fn new(poses: HashMap<String, Pose>) -> Self {
        Self { poses }
    }

    pub fn pose(&self, group: &str) -> Option<&Pose> {
        self.poses.get(group)
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }
}

// =============================================================================
// RAW LOG SHAPE
// =============================================================================

#[derive(Debug, Deserialize)]
struct RawLog {
    name: Option<String>,
    groups: Option<Vec<RawGroup>>,
    frames: Option<HashMap<String, HashMap<String, RawPose>>>,
    step: Option<f64>,
    start: Option<f64>,
    stop: Option<f64>,
    speed: Option<f64>,
    #[serde(rename = "totalTime")]
    total_time: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawGroup {
    name: String,
    #[serde(default)]
    objs: Vec<RawObj>,
    color: Option<Value>,
    transparency: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawObj {
    #[serde(rename = "type")]
    kind: String,
    scale: Option<[f64; 3]>,
    diameter: Option<f64>,
    color: Option<Value>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawPose {
    position: [f64; 3],
    #[serde(alias = "orientation")]
    quaternion: Option<[f64; 4]>,
}

const IDENTITY_XYZW: [f64; 4] = [0.0, 0.0, 0.0, 1.0];

// =============================================================================
// ANIMATION RECORD
// =============================================================================

/// An immutable, validated animation log.
///
/// Invariants established by [`AnimationRecord::parse`]:
/// - group names are unique
/// - frames are indexed `0..n-1` with `n >= timing.frame_count()`
/// - every frame holds a pose for every group
#[derive(Debug, Clone)]
pub struct AnimationRecord {
    name: Option<String>,
    groups: Vec<Group>,
    frames: Vec<Frame>,
    timing: Timing,
}

impl AnimationRecord {
    /// Parses and validates a raw JSON log.
    pub fn parse(raw: &[u8]) -> Result<Self, ParseError> {
        let log: RawLog =
            serde_json::from_slice(raw).map_err(|e| ParseError::Malformed(e.to_string()))?;
        Self::from_raw(log)
    }

    /// Validates an already-decoded JSON document.
    pub fn from_value(value: Value) -> Result<Self, ParseError> {
        let log: RawLog =
            serde_json::from_value(value).map_err(|e| ParseError::Malformed(e.to_string()))?;
        Self::from_raw(log)
    }

    /// Assembles a record without validating it.
    ///
    /// Every lookup the controller performs is still checked, so a record
    /// built this way degrades its own slot instead of panicking.
    pub fn from_parts_unchecked(
        name: Option<String>,
        groups: Vec<Group>,
        frames: Vec<Frame>,
        timing: Timing,
    ) -> Self {
        Self {
            name,
            groups,
            frames,
            timing,
        }
    }

    fn from_raw(log: RawLog) -> Result<Self, ParseError> {
        let raw_groups = log.groups.ok_or(ParseError::MissingField("groups"))?;
        let raw_frames = log.frames.ok_or(ParseError::MissingField("frames"))?;

        let timing = match (log.step, log.stop, log.speed, log.total_time) {
            (Some(step), Some(stop), _, _) => Timing::new(step, log.start.unwrap_or(0.0), stop)?,
            (_, _, Some(speed), Some(total_time)) => {
                Timing::new(speed, log.start.unwrap_or(0.0), total_time)?
            }
            _ => return Err(ParseError::MissingTimingFields),
        };

        let groups = parse_groups(raw_groups)?;
        let frames = parse_frames(raw_frames, &groups, &timing)?;

        debug!(
            "Parsed log: {} groups, {} frames (step={}, start={}, stop={})",
            groups.len(),
            frames.len(),
            timing.step,
            timing.start,
            timing.stop
        );

        Ok(Self {
            name: log.name,
            groups,
            frames,
            timing,
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    /// Number of recorded frames.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn frame(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    /// Pose of `group` at `frame`, if recorded.
    pub fn pose(&self, frame: usize, group: &str) -> Option<&Pose> {
        self.frames.get(frame)?.pose(group)
    }
}

fn parse_groups(raw_groups: Vec<RawGroup>) -> Result<Vec<Group>, ParseError> {
    let mut seen = HashSet::new();
    let mut groups = Vec::with_capacity(raw_groups.len());

    for raw in raw_groups {
        if !seen.insert(raw.name.clone()) {
            return Err(ParseError::DuplicateGroup(raw.name));
        }

        let mut geometry = Vec::with_capacity(raw.objs.len());
        for obj in raw.objs {
            let kind = obj.kind.parse::<PrimitiveKind>().map_err(|_| ParseError::UnknownGeometry {
                group: raw.name.clone(),
                kind: obj.kind.clone(),
            })?;
            let color = obj.color.as_ref().map(Color::from_json).transpose()?;
            geometry.push(GeometryDescriptor {
                kind,
                scale: obj.scale,
                diameter: obj.diameter,
                color,
                extra: obj.extra,
            });
        }

        let initial_color = match raw.color.as_ref() {
            Some(value) => Color::from_json(value)?,
            None => geometry.iter().find_map(|g| g.color).unwrap_or(Color::WHITE),
        };

        let initial_transparency = raw.transparency.unwrap_or(1.0);
        if !(0.0..=1.0).contains(&initial_transparency) {
            return Err(ParseError::InvalidTransparency {
                group: raw.name,
                value: initial_transparency,
            });
        }

        groups.push(Group {
            name: raw.name,
            initial_color,
            initial_transparency,
            geometry,
        });
    }

    Ok(groups)
}

/// Maps a frame key to its index.
///
/// Integer keys are indices. Fractional keys come from logs keyed by frame
/// time and are converted with the normalized timing.
fn frame_index(key: &str, timing: &Timing) -> Result<usize, ParseError> {
    let trimmed = key.trim();
    if let Ok(index) = trimmed.parse::<usize>() {
        return Ok(index);
    }

    let time: f64 = trimmed
        .parse()
        .map_err(|_| ParseError::InvalidFrameKey(key.to_string()))?;
    if !time.is_finite() {
        return Err(ParseError::InvalidFrameKey(key.to_string()));
    }

    let index = ((time - timing.start) / timing.step).round_ties_even();
    if index < 0.0 {
        return Err(ParseError::InvalidFrameKey(key.to_string()));
    }
    Ok(index as usize)
}

fn parse_frames(
    raw_frames: HashMap<String, HashMap<String, RawPose>>,
    groups: &[Group],
    timing: &Timing,
) -> Result<Vec<Frame>, ParseError> {
    let mut indexed = BTreeMap::new();
    for (key, poses) in raw_frames {
        let index = frame_index(&key, timing)?;
        if indexed.insert(index, poses).is_some() {
            return Err(ParseError::DuplicateFrame(index));
        }
    }

    let mut frames = Vec::with_capacity(indexed.len());
    for (expected, (index, mut raw_poses)) in indexed.into_iter().enumerate() {
        if index != expected {
            return Err(ParseError::NonContiguousFrames {
                expected,
                found: index,
            });
        }

        let mut poses = HashMap::with_capacity(groups.len());
        for group in groups {
            let raw = raw_poses
                .remove(&group.name)
                .ok_or_else(|| ParseError::MissingGroupEntry {
                    frame: index,
                    group: group.name.clone(),
                })?;
            let quaternion = raw.quaternion.unwrap_or(IDENTITY_XYZW);
            if raw.position.iter().chain(quaternion.iter()).any(|v| !v.is_finite()) {
                return Err(ParseError::NonFinite(format!("frames.{}.{}", index, group.name)));
            }
            poses.insert(group.name.clone(), Pose::from_arrays(raw.position, quaternion));
        }

        if !raw_poses.is_empty() {
            debug!("Frame {} carries {} undeclared group(s), ignored", index, raw_poses.len());
        }

        frames.push(Frame::new(poses));
    }

    let required = timing.frame_count();
    if frames.len() < required {
        return Err(ParseError::InsufficientFrames {
            required,
            found: frames.len(),
        });
    }

    Ok(frames)
}
