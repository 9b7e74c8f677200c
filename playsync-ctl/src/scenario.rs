//! Scripted controller sessions
//!
//! A scenario is a TOML document describing an initial desired state, the
//! simulated backend's behavior and a timed list of steps:
//!
//! ```toml
//! [initial]
//! source = "https://media.example/intro.mp4"
//! playing = true
//!
//! [backend]
//! ready_after_ms = 400
//!
//! [[step]]
//! after_ms = 1500
//! seek = 0.5
//!
//! [[step]]
//! after_ms = 1000
//! set = { volume = 0.3, muted = true }
//! ```
//!
//! Each step's `after_ms` is measured from the previous step. Patches only
//! touch the fields they name; an empty `source` string clears the source.

use std::path::Path;
use std::time::Duration;

use playsync_common::{DesiredState, Error, Result};
use serde::Deserialize;
use tracing::{info, warn};

use crate::service::ControllerHandle;
use crate::sim::SimProfile;

/// Scenario run when no file is given
pub const DEMO_SCENARIO: &str = r#"
[initial]
playing = true
volume = 0.6

[backend]
preload_source = "blank://"
ended_after_ms = 4000

[[step]]
after_ms = 800
set = { source = "https://media.example/intro.mp4" }
seek = 30.0

[[step]]
after_ms = 1500
set = { playback_rate = 1.5 }

[[step]]
after_ms = 500
set = { muted = true }

[[step]]
after_ms = 500
set = { playing = false, muted = false }

[[step]]
after_ms = 300
set = { source = "https://media.example/outro.mp4", playing = true, loop = true }

[[step]]
after_ms = 200
seek = 0.25

[[step]]
after_ms = 5000
unmount = true
"#;

/// Partial desired state
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DesiredPatch {
    pub source: Option<String>,
    pub playing: Option<bool>,
    pub volume: Option<f64>,
    pub muted: Option<bool>,
    pub playback_rate: Option<f64>,
    #[serde(rename = "loop")]
    pub loop_playback: Option<bool>,
}

impl DesiredPatch {
    /// Overlay this patch on `base`
    pub fn apply(&self, base: &DesiredState) -> DesiredState {
        let mut next = base.clone();
        if let Some(source) = &self.source {
            next.source = if source.is_empty() {
                None
            } else {
                Some(source.clone())
            };
        }
        if let Some(playing) = self.playing {
            next.playing = playing;
        }
        if let Some(volume) = self.volume {
            next.volume = volume;
        }
        if let Some(muted) = self.muted {
            next.muted = muted;
        }
        if let Some(rate) = self.playback_rate {
            next.playback_rate = rate;
        }
        if let Some(loop_playback) = self.loop_playback {
            next.loop_playback = loop_playback;
        }
        next
    }
}

/// One timed action
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Step {
    /// Delay since the previous step
    pub after_ms: u64,
    pub set: Option<DesiredPatch>,
    /// Seconds, or a fraction of duration when in (0, 1)
    pub seek: Option<f64>,
    pub unmount: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Scenario {
    pub initial: DesiredState,
    pub backend: SimProfile,
    #[serde(rename = "step")]
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_toml(text: &str) -> Result<Self> {
        let scenario: Scenario = toml::from_str(text)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn demo() -> Result<Self> {
        Self::from_toml(DEMO_SCENARIO)
    }

    /// Check the initial state and every state the steps produce
    pub fn validate(&self) -> Result<()> {
        self.initial
            .validate()
            .map_err(|e| Error::InvalidInput(format!("initial state: {}", e)))?;

        let mut desired = self.initial.clone();
        for (index, step) in self.steps.iter().enumerate() {
            if let Some(patch) = &step.set {
                desired = patch.apply(&desired);
                desired
                    .validate()
                    .map_err(|e| Error::InvalidInput(format!("step {}: {}", index + 1, e)))?;
            }
            if let Some(amount) = step.seek {
                if !amount.is_finite() || amount < 0.0 {
                    return Err(Error::InvalidInput(format!(
                        "step {}: seek must be a non-negative number, got {}",
                        index + 1,
                        amount
                    )));
                }
            }
        }
        Ok(())
    }

    /// Time from start to the last step
    pub fn total_duration(&self) -> Duration {
        Duration::from_millis(self.steps.iter().map(|s| s.after_ms).sum())
    }

    /// Drive `handle` through every step, then unmount
    pub async fn run(&self, handle: ControllerHandle) -> Result<()> {
        let mut desired = self.initial.clone();

        for (index, step) in self.steps.iter().enumerate() {
            tokio::time::sleep(Duration::from_millis(step.after_ms)).await;
            let number = index + 1;

            if let Some(patch) = &step.set {
                desired = patch.apply(&desired);
                info!(step = number, ?patch, "Updating desired state");
                handle.update(desired.clone())?;
            }

            if let Some(amount) = step.seek {
                match handle.seek_to(amount).await? {
                    Ok(position) => info!(step = number, amount, position, "Seek issued"),
                    Err(e) => warn!(step = number, "Seek not applied yet: {}", e),
                }
            }

            if step.unmount {
                info!(step = number, "Unmounting");
                return handle.unmount().await;
            }
        }

        handle.unmount().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::spawn_controller;
    use crate::sim::{AdapterCall, SimulatedAdapter};
    use playsync_common::{ControllerConfig, EventBus, PlayerEvent};

    #[test]
    fn test_demo_parses() {
        let demo = Scenario::demo().unwrap();

        assert!(demo.initial.playing);
        assert_eq!(demo.initial.source, None);
        assert_eq!(demo.backend.preload_source.as_deref(), Some("blank://"));
        // Unset backend fields keep realistic values
        assert_eq!(demo.backend.ready_after_ms, Some(300));
        assert!(demo.steps.last().is_some_and(|s| s.unmount));
        assert_eq!(demo.total_duration(), Duration::from_millis(8800));
    }

    #[test]
    fn test_patch_touches_named_fields_only() {
        let base = DesiredState::with_source("a.mp4").volume(0.5);
        let patch = DesiredPatch {
            muted: Some(true),
            ..DesiredPatch::default()
        };

        let next = patch.apply(&base);
        assert!(next.muted);
        assert_eq!(next.volume, 0.5);
        assert_eq!(next.source.as_deref(), Some("a.mp4"));
    }

    #[test]
    fn test_empty_source_clears() {
        let base = DesiredState::with_source("a.mp4");
        let patch = DesiredPatch {
            source: Some(String::new()),
            ..DesiredPatch::default()
        };

        assert_eq!(patch.apply(&base).source, None);
    }

    #[test]
    fn test_rejects_invalid_step() {
        let text = r#"
[[step]]
after_ms = 10
set = { volume = 3.0 }
"#;
        let err = Scenario::from_toml(text).unwrap_err();
        assert!(err.to_string().contains("step 1"));

        let text = r#"
[[step]]
seek = -4.0
"#;
        assert!(Scenario::from_toml(text).is_err());
    }

    #[test]
    fn test_rejects_unknown_keys() {
        let text = r#"
[[step]]
after_ms = 10
sek = 3.0
"#;
        assert!(matches!(
            Scenario::from_toml(text),
            Err(Error::TomlParse(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenario.toml");
        std::fs::write(&path, "[initial]\nsource = \"a.mp4\"\n\n[[step]]\nafter_ms = 5\nunmount = true\n").unwrap();

        let scenario = Scenario::from_file(&path).unwrap();
        assert_eq!(scenario.initial.source.as_deref(), Some("a.mp4"));
        assert_eq!(scenario.steps.len(), 1);

        assert!(matches!(
            Scenario::from_file(&dir.path().join("missing.toml")),
            Err(Error::Io(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_applies_steps_in_order() {
        let scenario = Scenario::from_toml(
            r#"
[initial]
source = "a.mp4"

[[step]]
after_ms = 1000
set = { playing = true }

[[step]]
after_ms = 500
seek = 12.0
"#,
        )
        .unwrap();

        let bus = EventBus::new(64);
        let mut events = bus.subscribe();
        let mut probe = None;
        let backend = scenario.backend.clone();
        let handle = spawn_controller(
            ControllerConfig::default(),
            bus,
            scenario.initial.clone(),
            |sender| {
                let adapter = SimulatedAdapter::new(backend, Some(sender));
                probe = Some(adapter.probe());
                adapter
            },
        );
        let probe = probe.unwrap();

        scenario.run(handle).await.unwrap();

        let calls = probe.calls();
        assert!(calls.contains(&AdapterCall::Play));
        assert!(calls.contains(&AdapterCall::SeekTo(12.0)));
        assert_eq!(calls.last(), Some(&AdapterCall::Stop));

        let mut seen = Vec::new();
        while let Ok(envelope) = events.try_recv() {
            seen.push(envelope.event);
        }
        assert_eq!(seen.first(), Some(&PlayerEvent::Ready));
        assert!(seen.contains(&PlayerEvent::Start));
    }
}
