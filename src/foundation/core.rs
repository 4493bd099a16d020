use crate::foundation::error::{HeadlessError, HeadlessResult};

/// Absolute 0-based frame index in composition timeline space.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u64);

/// Half-open frame range `[start, end)` in timeline space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FrameRange {
    /// Inclusive range start.
    pub start: FrameIndex,
    /// Exclusive range end.
    pub end: FrameIndex,
}

impl FrameRange {
    /// Create a validated range with `start <= end`.
    pub fn new(start: FrameIndex, end: FrameIndex) -> HeadlessResult<Self> {
        if start.0 > end.0 {
            return Err(HeadlessError::config("FrameRange start must be <= end"));
        }
        Ok(Self { start, end })
    }

    /// Range covering a whole composition, `[0, duration_in_frames)`.
    pub fn whole(duration_in_frames: u64) -> Self {
        Self {
            start: FrameIndex(0),
            end: FrameIndex(duration_in_frames),
        }
    }

    /// Number of frames contained in the range.
    pub fn len_frames(self) -> u64 {
        self.end.0.saturating_sub(self.start.0)
    }

    /// Return `true` when the range has no frames.
    pub fn is_empty(self) -> bool {
        self.start.0 == self.end.0
    }

    /// Return `true` when `f` is inside `[start, end)`.
    pub fn contains(self, f: FrameIndex) -> bool {
        self.start.0 <= f.0 && f.0 < self.end.0
    }

    /// Iterate the frames of the range in timeline order.
    pub fn frames(self) -> impl Iterator<Item = FrameIndex> {
        (self.start.0..self.end.0).map(FrameIndex)
    }
}

/// Output canvas dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Who is responsible for releasing an acquired resource.
///
/// Resources passed in by a caller are `Borrowed` and are never torn down by the call that
/// received them; everything a call acquires itself is `Owned`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Ownership {
    /// Acquired by this call; released by this call.
    Owned,
    /// Supplied by the caller; the caller releases it.
    Borrowed,
}

impl Ownership {
    /// Tag for an optional caller-supplied resource.
    pub fn of<T>(supplied: &Option<T>) -> Self {
        if supplied.is_some() {
            Self::Borrowed
        } else {
            Self::Owned
        }
    }

    /// Return `true` when disposal is this call's responsibility.
    pub fn should_release(self) -> bool {
        matches!(self, Self::Owned)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
