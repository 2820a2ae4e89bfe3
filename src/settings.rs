//! Persistent render settings.
//!
//! JSON file describing one render job. Missing fields fall back to their
//! defaults, so a settings file only has to name what it changes.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::device::KernelFeatures;
use crate::integrator::PathTraceConfig;
use crate::render::{BufferParams, SceneParams};
use crate::util::{Error, Result};

/// Everything needed to run a render from the command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    // Frame
    pub width: u32,
    pub height: u32,

    // Sampling
    pub samples: u32,
    pub start_sample: u32,
    pub samples_per_batch: u32,

    // Progress
    pub update_interval_secs: f64,
    /// Stop after this many seconds, `None` renders all samples.
    pub time_limit_secs: Option<f64>,

    // Execution
    /// Worker threads, `None` uses all cores.
    pub threads: Option<usize>,
    pub features: KernelFeatures,

    pub scene: SceneParams,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            samples: 16,
            start_sample: 0,
            samples_per_batch: 4,
            update_interval_secs: 1.0,
            time_limit_secs: None,
            threads: None,
            features: KernelFeatures::default(),
            scene: SceneParams::default(),
        }
    }
}

impl RenderSettings {
    /// Load and validate settings from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let settings: Self = serde_json::from_str(&json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Save settings as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    /// Reject settings no render could run with.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::Settings(format!(
                "resolution must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.threads == Some(0) {
            return Err(Error::Settings("threads must be at least 1".into()));
        }
        seconds_to_duration("update interval", self.update_interval_secs)?;
        if let Some(limit) = self.time_limit_secs {
            seconds_to_duration("time limit", limit)?;
        }
        if self.start_sample.checked_add(self.samples).is_none() {
            return Err(Error::Settings("sample range overflows".into()));
        }
        Ok(())
    }

    pub fn buffer_params(&self) -> BufferParams {
        BufferParams::new(self.width, self.height)
    }

    pub fn to_config(&self) -> PathTraceConfig {
        PathTraceConfig {
            update_interval: Duration::try_from_secs_f64(self.update_interval_secs).unwrap_or(Duration::MAX),
            samples_per_batch: self.samples_per_batch.max(1),
            num_threads: self.threads,
            features: self.features,
        }
    }

    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit_secs
            .map(|s| Duration::try_from_secs_f64(s).unwrap_or(Duration::MAX))
    }
}

/// Non-negative seconds that fit a `Duration`.
fn seconds_to_duration(what: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| Error::Settings(format!("invalid {what} {secs}: {e}")))
}
