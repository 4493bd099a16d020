use std::collections::{HashMap, HashSet};

use crate::foundation::error::{HeadlessError, HeadlessResult};
use crate::timeline::mount::{MediaKind, MediaMountEvent, MountTimeline};
use crate::timeline::volume::Volume;

/// Tuning for [`flatten`].
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FlattenOpts {
    /// Largest drift, in source frames, between the expected and the observed source
    /// position that still counts as continuous playback.
    pub epsilon: f64,
}

impl Default for FlattenOpts {
    fn default() -> Self {
        Self { epsilon: 0.5 }
    }
}

impl FlattenOpts {
    /// Reject a negative or non-finite epsilon.
    pub fn validate(&self) -> HeadlessResult<()> {
        if !self.epsilon.is_finite() || self.epsilon < 0.0 {
            return Err(HeadlessError::config(format!(
                "flatten epsilon must be finite and >= 0, got {}",
                self.epsilon
            )));
        }
        Ok(())
    }
}

/// One continuous appearance of a media source in the output timeline.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetPosition {
    /// `<element id>:<appearance index>`, unique per appearance.
    pub id: String,
    /// Element kind.
    #[serde(rename = "type")]
    pub kind: MediaKind,
    /// Source locator.
    pub src: String,
    /// Output frames covered.
    pub duration: u64,
    /// First output frame.
    pub start_in_video: u64,
    /// Source frames skipped before the first output frame.
    pub trim_left: f64,
    /// Constant volume, or one sample per covered frame.
    pub volume: Volume,
    /// Whether the source is remote.
    pub is_remote: bool,
}

#[derive(Debug)]
struct Run<'a> {
    element: &'a str,
    kind: MediaKind,
    src: &'a str,
    is_remote: bool,
    first_frame: i64,
    last_frame: i64,
    last_rate: f64,
    sources: Vec<f64>,
    volumes: Vec<f64>,
}

impl<'a> Run<'a> {
    fn open(frame: i64, ev: &'a MediaMountEvent) -> Self {
        Self {
            element: &ev.id,
            kind: ev.kind,
            src: &ev.src,
            is_remote: ev.is_remote,
            first_frame: frame,
            last_frame: frame,
            last_rate: ev.playback_rate,
            sources: vec![ev.source_frame()],
            volumes: vec![ev.volume],
        }
    }

    fn continues(&self, frame: i64, ev: &MediaMountEvent, epsilon: f64) -> bool {
        let Some(&last_source) = self.sources.last() else {
            return false;
        };
        self.last_frame + 1 == frame
            && self.kind == ev.kind
            && self.src == ev.src
            && (ev.source_frame() - (last_source + self.last_rate)).abs() <= epsilon
    }

    fn extend(&mut self, frame: i64, ev: &MediaMountEvent) {
        self.last_frame = frame;
        self.last_rate = ev.playback_rate;
        self.sources.push(ev.source_frame());
        self.volumes.push(ev.volume);
    }

    /// Clip the run to frames `>= 0`. Runs that end before frame 0 yield `None`.
    fn clip(mut self) -> Option<Clipped<'a>> {
        if self.last_frame < 0 {
            return None;
        }
        let skip = usize::try_from(self.first_frame.min(0).unsigned_abs()).ok()?;
        let trim_left = *self.sources.get(skip)?;
        let volumes = self.volumes.split_off(skip);
        Some(Clipped {
            element: self.element,
            first_frame: self.first_frame,
            position: AssetPosition {
                id: String::new(),
                kind: self.kind,
                src: self.src.to_owned(),
                duration: volumes.len() as u64,
                start_in_video: self.first_frame.max(0) as u64,
                trim_left,
                volume: Volume::from_samples(volumes),
                is_remote: self.is_remote,
            },
        })
    }
}

struct Clipped<'a> {
    element: &'a str,
    first_frame: i64,
    position: AssetPosition,
}

/// Turn per-frame mount samples into render-ready asset positions.
///
/// Samples of one element split into maximal runs of consecutive frames with continuous
/// source time; a gap, a seek or a change of source starts a new position. Runs are clipped
/// at frame 0 and the result is ordered by first frame, then element id.
pub fn flatten(timeline: &MountTimeline, opts: &FlattenOpts) -> HeadlessResult<Vec<AssetPosition>> {
    opts.validate()?;

    let mut open = HashMap::<&str, Run<'_>>::new();
    let mut closed = Vec::<Run<'_>>::new();
    for (frame, events) in timeline.iter() {
        let mut seen = HashSet::with_capacity(events.len());
        for ev in events {
            check_event(frame, ev)?;
            let id = ev.id.as_str();
            if !seen.insert(id) {
                return Err(HeadlessError::config(format!(
                    "element '{id}' is mounted twice at frame {frame}"
                )));
            }
            if let Some(run) = open.get_mut(id)
                && run.continues(frame, ev, opts.epsilon)
            {
                run.extend(frame, ev);
                continue;
            }
            if let Some(done) = open.insert(id, Run::open(frame, ev)) {
                closed.push(done);
            }
        }
    }
    closed.extend(open.into_values());

    let mut clipped = closed.into_iter().filter_map(Run::clip).collect::<Vec<_>>();
    clipped.sort_by(|a, b| {
        a.position
            .start_in_video
            .cmp(&b.position.start_in_video)
            .then_with(|| a.element.cmp(b.element))
            .then_with(|| a.first_frame.cmp(&b.first_frame))
    });

    let mut appearances = HashMap::<&str, usize>::new();
    Ok(clipped
        .into_iter()
        .map(|c| {
            let n = appearances.entry(c.element).or_default();
            let mut position = c.position;
            position.id = format!("{}:{n}", c.element);
            *n += 1;
            position
        })
        .collect())
}

fn check_event(frame: i64, ev: &MediaMountEvent) -> HeadlessResult<()> {
    let fields = [
        ("mediaFrame", ev.media_frame),
        ("trim", ev.trim),
        ("volume", ev.volume),
        ("playbackRate", ev.playback_rate),
    ];
    for (name, value) in fields {
        if !value.is_finite() {
            return Err(HeadlessError::config(format!(
                "element '{}' at frame {frame}: {name} must be finite, got {value}",
                ev.id
            )));
        }
    }
    if ev.id.is_empty() {
        return Err(HeadlessError::config(format!(
            "media element at frame {frame} has an empty id"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/timeline/flatten.rs"]
mod tests;
