//! Type definitions for body tracking and the depth sensor

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};

/// Default temporal smoothing factor applied by a new tracker
pub const DEFAULT_TRACKER_SMOOTHING_FACTOR: f32 = 0.0;

/// Pixel value of the body index map where no body was detected
pub const BODY_INDEX_MAP_BACKGROUND: u8 = u8::MAX;

/// Number of captures the tracker can hold in flight before enqueue has to wait
pub const MAX_TRACKING_QUEUE_SIZE: usize = 3;

/// Skeleton joints, ordered by index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JointType {
    Pelvis = 0,
    SpineNavel,
    SpineChest,
    Neck,
    ClavicleLeft,
    ShoulderLeft,
    ElbowLeft,
    WristLeft,
    ClavicleRight,
    ShoulderRight,
    ElbowRight,
    WristRight,
    HipLeft,
    KneeLeft,
    AnkleLeft,
    FootLeft,
    HipRight,
    KneeRight,
    AnkleRight,
    FootRight,
    Head,
    Nose,
    EyeLeft,
    EarLeft,
    EyeRight,
    EarRight,
}

impl JointType {
    pub const COUNT: usize = 26;

    const ALL: [JointType; Self::COUNT] = [
        Self::Pelvis,
        Self::SpineNavel,
        Self::SpineChest,
        Self::Neck,
        Self::ClavicleLeft,
        Self::ShoulderLeft,
        Self::ElbowLeft,
        Self::WristLeft,
        Self::ClavicleRight,
        Self::ShoulderRight,
        Self::ElbowRight,
        Self::WristRight,
        Self::HipLeft,
        Self::KneeLeft,
        Self::AnkleLeft,
        Self::FootLeft,
        Self::HipRight,
        Self::KneeRight,
        Self::AnkleRight,
        Self::FootRight,
        Self::Head,
        Self::Nose,
        Self::EyeLeft,
        Self::EarLeft,
        Self::EyeRight,
        Self::EarRight,
    ];

    /// All joints in index order
    pub fn all() -> &'static [JointType] {
        &Self::ALL
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Pelvis => "pelvis",
            Self::SpineNavel => "spine navel",
            Self::SpineChest => "spine chest",
            Self::Neck => "neck",
            Self::ClavicleLeft => "left clavicle",
            Self::ShoulderLeft => "left shoulder",
            Self::ElbowLeft => "left elbow",
            Self::WristLeft => "left wrist",
            Self::ClavicleRight => "right clavicle",
            Self::ShoulderRight => "right shoulder",
            Self::ElbowRight => "right elbow",
            Self::WristRight => "right wrist",
            Self::HipLeft => "left hip",
            Self::KneeLeft => "left knee",
            Self::AnkleLeft => "left ankle",
            Self::FootLeft => "left foot",
            Self::HipRight => "right hip",
            Self::KneeRight => "right knee",
            Self::AnkleRight => "right ankle",
            Self::FootRight => "right foot",
            Self::Head => "head",
            Self::Nose => "nose",
            Self::EyeLeft => "left eye",
            Self::EarLeft => "left ear",
            Self::EyeRight => "right eye",
            Self::EarRight => "right ear",
        }
    }

    /// Parent joint in the skeleton hierarchy; `None` for the root (pelvis)
    pub fn parent(self) -> Option<Self> {
        let parent = match self {
            Self::Pelvis => return None,
            Self::SpineNavel | Self::HipLeft | Self::HipRight => Self::Pelvis,
            Self::SpineChest => Self::SpineNavel,
            Self::Neck | Self::ClavicleLeft | Self::ClavicleRight => Self::SpineChest,
            Self::ShoulderLeft => Self::ClavicleLeft,
            Self::ElbowLeft => Self::ShoulderLeft,
            Self::WristLeft => Self::ElbowLeft,
            Self::ShoulderRight => Self::ClavicleRight,
            Self::ElbowRight => Self::ShoulderRight,
            Self::WristRight => Self::ElbowRight,
            Self::KneeLeft => Self::HipLeft,
            Self::AnkleLeft => Self::KneeLeft,
            Self::FootLeft => Self::AnkleLeft,
            Self::KneeRight => Self::HipRight,
            Self::AnkleRight => Self::KneeRight,
            Self::FootRight => Self::AnkleRight,
            Self::Head => Self::Neck,
            Self::Nose | Self::EyeLeft | Self::EarLeft | Self::EyeRight | Self::EarRight => {
                Self::Head
            }
        };
        Some(parent)
    }

    /// Left/right counterpart; joints on the body axis map to themselves
    pub fn mirror(self) -> Self {
        match self {
            Self::ClavicleLeft => Self::ClavicleRight,
            Self::ShoulderLeft => Self::ShoulderRight,
            Self::ElbowLeft => Self::ElbowRight,
            Self::WristLeft => Self::WristRight,
            Self::ClavicleRight => Self::ClavicleLeft,
            Self::ShoulderRight => Self::ShoulderLeft,
            Self::ElbowRight => Self::ElbowLeft,
            Self::WristRight => Self::WristLeft,
            Self::HipLeft => Self::HipRight,
            Self::KneeLeft => Self::KneeRight,
            Self::AnkleLeft => Self::AnkleRight,
            Self::FootLeft => Self::FootRight,
            Self::HipRight => Self::HipLeft,
            Self::KneeRight => Self::KneeLeft,
            Self::AnkleRight => Self::AnkleLeft,
            Self::FootRight => Self::FootLeft,
            Self::EyeLeft => Self::EyeRight,
            Self::EarLeft => Self::EarRight,
            Self::EyeRight => Self::EyeLeft,
            Self::EarRight => Self::EarLeft,
            other => other,
        }
    }
}

impl fmt::Display for JointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How much the estimator trusts a joint position
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum JointConfidenceLevel {
    /// Joint is out of range (too far from the depth camera)
    #[default]
    None = 0,
    /// Joint is not observed (likely occluded), position is predicted
    Low = 1,
    /// Joint is observed
    Medium = 2,
    /// Reserved for future models
    High = 3,
}

/// 3D vector in millimetres, depth camera coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Float3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Float3 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Linear interpolation: `t = 0` keeps `self`, `t = 1` gives `other`
    pub fn lerp(&self, other: &Self, t: f32) -> Self {
        Self {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
            z: self.z + (other.z - self.z) * t,
        }
    }

    pub fn distance(&self, other: &Self) -> f32 {
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Joint orientation as a unit quaternion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Quaternion {
    pub const IDENTITY: Self = Self::new(1.0, 0.0, 0.0, 0.0);

    pub const fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, x, y, z }
    }

    pub fn dot(&self, other: &Self) -> f32 {
        self.w * other.w + self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn norm(&self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Unit quaternion in the same direction; identity for a zero quaternion
    pub fn normalized(&self) -> Self {
        let n = self.norm();
        if n <= f32::EPSILON {
            return Self::IDENTITY;
        }
        Self::new(self.w / n, self.x / n, self.y / n, self.z / n)
    }

    /// Normalised linear interpolation along the shorter arc
    pub fn nlerp(&self, other: &Self, t: f32) -> Self {
        // q and -q are the same rotation
        let sign = if self.dot(other) < 0.0 { -1.0 } else { 1.0 };
        Self::new(
            self.w + (sign * other.w - self.w) * t,
            self.x + (sign * other.x - self.x) * t,
            self.y + (sign * other.y - self.y) * t,
            self.z + (sign * other.z - self.z) * t,
        )
        .normalized()
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Position, orientation and confidence of one joint
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Joint {
    /// Position in millimetres
    pub position: Float3,
    /// Orientation relative to the depth camera
    pub orientation: Quaternion,
    pub confidence: JointConfidenceLevel,
}

/// All joints of one body, indexed by [`JointType`]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Skeleton {
    joints: [Joint; JointType::COUNT],
}

impl Skeleton {
    pub fn new(joints: [Joint; JointType::COUNT]) -> Self {
        Self { joints }
    }

    pub fn joints(&self) -> &[Joint; JointType::COUNT] {
        &self.joints
    }

    pub fn joints_mut(&mut self) -> &mut [Joint; JointType::COUNT] {
        &mut self.joints
    }

    /// Joints paired with their type, in index order
    pub fn iter(&self) -> impl Iterator<Item = (JointType, &Joint)> {
        JointType::all().iter().copied().zip(self.joints.iter())
    }
}

impl Index<JointType> for Skeleton {
    type Output = Joint;

    fn index(&self, joint: JointType) -> &Joint {
        &self.joints[joint.index()]
    }
}

impl IndexMut<JointType> for Skeleton {
    fn index_mut(&mut self, joint: JointType) -> &mut Joint {
        &mut self.joints[joint.index()]
    }
}

/// Identifier of a tracked body, stable across frames while the body stays in view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyId(pub u32);

impl BodyId {
    pub const INVALID: Self = Self(u32::MAX);

    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.0)
        } else {
            f.write_str("<invalid>")
        }
    }
}

/// One detected body
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Body {
    pub id: BodyId,
    pub skeleton: Skeleton,
}

impl Body {
    pub fn new(id: BodyId, skeleton: Skeleton) -> Self {
        Self { id, skeleton }
    }
}

/// Depth camera operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DepthMode {
    /// Depth sensor is off
    Off,
    /// Narrow field of view, 2x2 binned
    NarrowView2x2Binned,
    /// Narrow field of view, full resolution
    NarrowViewUnbinned,
    /// Wide field of view, 2x2 binned
    WideView2x2Binned,
    /// Wide field of view, full resolution
    WideViewUnbinned,
    /// IR only, no depth
    PassiveIr,
}

impl DepthMode {
    /// Whether the mode produces depth images at all
    pub fn has_depth(&self) -> bool {
        !matches!(self, Self::Off | Self::PassiveIr)
    }

    pub fn width_pixels(&self) -> u32 {
        self.resolution().0
    }

    pub fn height_pixels(&self) -> u32 {
        self.resolution().1
    }

    /// (width, height) of depth and IR images produced in this mode
    pub fn resolution(&self) -> (u32, u32) {
        match self {
            Self::Off => (0, 0),
            Self::NarrowView2x2Binned => (320, 288),
            Self::NarrowViewUnbinned => (640, 576),
            Self::WideView2x2Binned => (512, 512),
            Self::WideViewUnbinned | Self::PassiveIr => (1024, 1024),
        }
    }
}

/// Pixel format of a sensor image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageFormat {
    /// 16-bit depth in millimetres
    Depth16,
    /// 16-bit infrared brightness
    Ir16,
    /// 8-bit BGRA color
    ColorBgra32,
    /// 8-bit single channel, e.g. a body index map
    Custom8,
}

impl ImageFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            Self::Depth16 | Self::Ir16 => 2,
            Self::ColorBgra32 => 4,
            Self::Custom8 => 1,
        }
    }
}

/// How the sensor is mounted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SensorOrientation {
    /// Upright, cable pointing down
    #[default]
    Default,
    /// Rotated 90 degrees clockwise
    Clockwise90,
    /// Rotated 90 degrees counter-clockwise
    Counterclockwise90,
    /// Upside down
    Flip180,
}

/// Backend the pose estimator runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProcessingMode {
    /// Platform default GPU backend
    Gpu,
    Cpu,
    #[default]
    GpuCuda,
    GpuTensorRt,
    /// Windows only
    GpuDirectMl,
}

impl ProcessingMode {
    pub fn is_gpu(&self) -> bool {
        !matches!(self, Self::Cpu)
    }

    /// Whether the backend can run on the platform this crate was built for
    pub fn is_supported(&self) -> bool {
        match self {
            Self::GpuDirectMl => cfg!(windows),
            _ => true,
        }
    }
}

/// Sensor calibration the tracker was created with
///
/// Only the depth mode is interpreted here; the raw calibration blob is
/// passed through to the pose estimator untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Calibration {
    pub depth_mode: DepthMode,
    raw: Vec<u8>,
}

impl Calibration {
    pub fn new(depth_mode: DepthMode) -> Self {
        Self {
            depth_mode,
            raw: Vec::new(),
        }
    }

    pub fn with_raw(depth_mode: DepthMode, raw: Vec<u8>) -> Self {
        Self { depth_mode, raw }
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// (width, height) every depth image must have
    pub fn depth_resolution(&self) -> (u32, u32) {
        self.depth_mode.resolution()
    }
}
