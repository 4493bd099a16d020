/// Resolved volume of one asset position.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum Volume {
    /// Same volume for every frame.
    Constant(f64),
    /// One sample per frame of the position, starting at its first frame.
    PerFrame(Vec<f64>),
}

impl Volume {
    /// Collapse per-frame samples: a uniform run becomes [`Volume::Constant`].
    pub fn from_samples(samples: Vec<f64>) -> Self {
        match samples.first() {
            Some(&first) if samples.iter().all(|v| *v == first) => Self::Constant(first),
            None => Self::Constant(1.0),
            Some(_) => Self::PerFrame(samples),
        }
    }

    /// Volume at position-local frame `frame`. Out-of-range frames read the last sample.
    pub fn at(&self, frame: usize) -> f64 {
        match self {
            Self::Constant(v) => *v,
            Self::PerFrame(samples) => samples
                .get(frame)
                .or_else(|| samples.last())
                .copied()
                .unwrap_or(1.0),
        }
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self::Constant(1.0)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/timeline/volume.rs"]
mod tests;
