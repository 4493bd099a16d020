use std::collections::BTreeMap;

use url::Url;

/// Kind of media element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// `<video>`-like element.
    Video,
    /// `<audio>`-like element.
    Audio,
}

/// One media element observed as mounted at one output frame.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaMountEvent {
    /// Identity of the logical element, stable for as long as it stays mounted.
    pub id: String,
    /// Element kind.
    #[serde(rename = "type")]
    pub kind: MediaKind,
    /// Source locator (URL or local path).
    pub src: String,
    /// Playback position inside the element's timeline, in frames.
    pub media_frame: f64,
    /// Frames skipped from the start of the source.
    #[serde(default)]
    pub trim: f64,
    /// Volume sampled at this frame.
    #[serde(default = "unit")]
    pub volume: f64,
    /// Source frames advanced per output frame.
    #[serde(default = "unit")]
    pub playback_rate: f64,
    /// Whether `src` was remote when the element mounted.
    pub is_remote: bool,
}

fn unit() -> f64 {
    1.0
}

impl MediaMountEvent {
    /// Position inside the source file, in frames.
    pub fn source_frame(&self) -> f64 {
        self.trim + self.media_frame
    }
}

/// Classify a source locator: `http(s)` URLs are remote, everything else is local.
pub fn is_remote_src(src: &str) -> bool {
    Url::parse(src).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
}

/// Mount samples keyed by output frame. Frames may be negative for content that starts
/// before the visible timeline.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct MountTimeline {
    frames: BTreeMap<i64, Vec<MediaMountEvent>>,
}

impl MountTimeline {
    /// Create an empty timeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record everything mounted at `frame`. A frame may be recorded more than once; the
    /// samples accumulate.
    pub fn record(&mut self, frame: i64, events: impl IntoIterator<Item = MediaMountEvent>) {
        self.frames.entry(frame).or_default().extend(events);
    }

    /// Samples at `frame`.
    pub fn at(&self, frame: i64) -> &[MediaMountEvent] {
        self.frames.get(&frame).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Frames in ascending order with their samples.
    pub fn iter(&self) -> impl Iterator<Item = (i64, &[MediaMountEvent])> {
        self.frames.iter().map(|(f, evs)| (*f, evs.as_slice()))
    }

    /// Number of sampled frames.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Return `true` when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/timeline/mount.rs"]
mod tests;
