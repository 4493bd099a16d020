use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::foundation::core::{Canvas, FrameRange};
use crate::foundation::error::{HeadlessError, HeadlessResult};

/// One composition reported by a bundle.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositionMetadata {
    /// Identifier, unique within one discovery call.
    pub id: String,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Frames per second.
    pub fps: f64,
    /// Length in frames.
    pub duration_in_frames: u64,
    /// Props the composition renders with when none are supplied.
    #[serde(default)]
    pub default_props: Value,
}

impl CompositionMetadata {
    /// Output canvas size.
    pub fn canvas(&self) -> Canvas {
        Canvas {
            width: self.width,
            height: self.height,
        }
    }

    /// Every frame of the composition.
    pub fn frame_range(&self) -> FrameRange {
        FrameRange::whole(self.duration_in_frames)
    }
}

/// Check the raw page result and turn it into metadata.
///
/// All-or-nothing: the first malformed entry fails the whole list.
pub fn validate_compositions(raw: Value) -> HeadlessResult<Vec<CompositionMetadata>> {
    let entries = match raw {
        Value::Array(entries) => entries,
        other => {
            return Err(HeadlessError::invalid_composition(
                "<list>",
                format!("expected an array of compositions, got {}", type_name(&other)),
            ));
        }
    };

    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        let meta = validate_entry(index, entry)?;
        if !seen.insert(meta.id.clone()) {
            return Err(HeadlessError::invalid_composition(
                meta.id,
                "id is used by more than one composition",
            ));
        }
        out.push(meta);
    }
    Ok(out)
}

fn validate_entry(index: usize, entry: Value) -> HeadlessResult<CompositionMetadata> {
    let mut obj = match entry {
        Value::Object(obj) => obj,
        other => {
            return Err(HeadlessError::invalid_composition(
                format!("#{index}"),
                format!("expected an object, got {}", type_name(&other)),
            ));
        }
    };

    let id = match obj.get("id") {
        Some(Value::String(id)) if !id.is_empty() => id.clone(),
        Some(Value::String(_)) => {
            return Err(HeadlessError::invalid_composition(
                format!("#{index}"),
                "id must be non-empty",
            ));
        }
        _ => {
            return Err(HeadlessError::invalid_composition(
                format!("#{index}"),
                "missing string id",
            ));
        }
    };

    let width = positive_int(&obj, &id, "width")?;
    let height = positive_int(&obj, &id, "height")?;
    let duration_in_frames = positive_int(&obj, &id, "durationInFrames")?;
    let fps = match obj.get("fps").and_then(Value::as_f64) {
        Some(fps) if fps.is_finite() && fps > 0.0 => fps,
        Some(fps) => {
            return Err(HeadlessError::invalid_composition(
                id,
                format!("fps must be positive and finite, got {fps}"),
            ));
        }
        None => return Err(HeadlessError::invalid_composition(id, "missing numeric fps")),
    };

    let width = u32::try_from(width)
        .map_err(|_| HeadlessError::invalid_composition(&id, "width does not fit in u32"))?;
    let height = u32::try_from(height)
        .map_err(|_| HeadlessError::invalid_composition(&id, "height does not fit in u32"))?;

    Ok(CompositionMetadata {
        default_props: obj.remove("defaultProps").unwrap_or(Value::Null),
        id,
        width,
        height,
        fps,
        duration_in_frames,
    })
}

fn positive_int(obj: &Map<String, Value>, id: &str, field: &str) -> HeadlessResult<u64> {
    let Some(value) = obj.get(field) else {
        return Err(HeadlessError::invalid_composition(
            id,
            format!("missing {field}"),
        ));
    };
    if let Some(n) = value.as_u64() {
        if n > 0 {
            return Ok(n);
        }
    } else if let Some(f) = value.as_f64()
        && f.is_finite()
        && f > 0.0
        && f.fract() == 0.0
        && f <= u64::MAX as f64
    {
        return Ok(f as u64);
    }
    Err(HeadlessError::invalid_composition(
        id,
        format!("{field} must be a positive integer, got {value}"),
    ))
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
#[path = "../../tests/unit/discovery/metadata.rs"]
mod tests;
