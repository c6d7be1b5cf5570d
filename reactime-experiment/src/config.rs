use crate::error::ConfigurationError;
use crate::tasks::{
    FingerTappingConfig, FlankerConfig, GoNoGoConfig, NBackConfig, PosnerConfig, PvtConfig,
    StroopConfig, TaskProtocol, TrailMakingConfig,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    FingerTapping,
    GoNoGo,
    Pvt,
    TrailMaking,
    Flanker,
    NBack,
    Stroop,
    Posner,
}

impl TaskKind {
    pub const ALL: [TaskKind; 8] = [
        TaskKind::FingerTapping,
        TaskKind::GoNoGo,
        TaskKind::Pvt,
        TaskKind::TrailMaking,
        TaskKind::Flanker,
        TaskKind::NBack,
        TaskKind::Stroop,
        TaskKind::Posner,
    ];

    /// Stable snake_case name used as the prefix of recorded game names.
    pub fn game_name(self) -> &'static str {
        match self {
            TaskKind::FingerTapping => "finger_tapping",
            TaskKind::GoNoGo => "go_no_go",
            TaskKind::Pvt => "pvt",
            TaskKind::TrailMaking => "trail_making",
            TaskKind::Flanker => "flanker",
            TaskKind::NBack => "n_back",
            TaskKind::Stroop => "stroop",
            TaskKind::Posner => "posner",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.game_name())
    }
}

/// A phase duration: either fixed or drawn uniformly from `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Delay {
    Fixed(u64),
    Uniform { min: u64, max: u64 },
}

impl Delay {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        match *self {
            Delay::Fixed(ms) => ms,
            Delay::Uniform { min, max } if min >= max => min,
            Delay::Uniform { min, max } => rng.random_range(min..=max),
        }
    }

    fn validate(&self, field: &'static str) -> Result<(), ConfigurationError> {
        match *self {
            Delay::Uniform { min, max } if min > max => Err(ConfigurationError::InvalidTiming {
                field,
                reason: format!("range min {min} exceeds max {max}"),
            }),
            _ => Ok(()),
        }
    }
}

/// How a keypress before stimulus onset is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EarlyInputPolicy {
    /// Dropped silently; the trial continues.
    Ignore,
    /// Ends the trial with a `falseStart` outcome.
    FalseStart,
}

/// Which responses contribute to mean reaction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RtPolicy {
    /// Hits and correct choices only.
    CorrectOnly,
    /// Every stimulus-driven response (excludes false starts and omissions).
    ValidResponses,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CueTiming {
    pub cue_ms: u64,
    pub cue_target_interval_ms: u64,
}

/// Phase durations of one trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrialTiming {
    pub fixation: Delay,
    pub cue: Option<CueTiming>,
    /// Maximum time the stimulus stays up waiting for a response.
    pub response_window_ms: u64,
    /// Close the window on the first response instead of waiting it out.
    pub end_on_response: bool,
    /// When the window is waited out, swap the stimulus for the fixation
    /// cross as soon as a response lands.
    pub hide_on_response: bool,
    pub feedback_ms: u64,
    pub inter_trial: Delay,
    /// Responses faster than this are false starts.
    pub min_valid_rt_ms: Option<u64>,
    pub early_input: EarlyInputPolicy,
}

impl Default for TrialTiming {
    fn default() -> Self {
        Self {
            fixation: Delay::Uniform { min: 500, max: 1500 },
            cue: None,
            response_window_ms: 2000,
            end_on_response: true,
            hide_on_response: false,
            feedback_ms: 0,
            inter_trial: Delay::Fixed(1000),
            min_valid_rt_ms: None,
            early_input: EarlyInputPolicy::Ignore,
        }
    }
}

impl TrialTiming {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.fixation.validate("fixation")?;
        self.inter_trial.validate("inter_trial")?;
        if self.response_window_ms == 0 {
            return Err(ConfigurationError::InvalidTiming {
                field: "response_window_ms",
                reason: "response window must be longer than 0 ms".into(),
            });
        }
        if let Some(min_rt) = self.min_valid_rt_ms {
            if min_rt >= self.response_window_ms {
                return Err(ConfigurationError::InvalidTiming {
                    field: "min_valid_rt_ms",
                    reason: format!(
                        "{min_rt} ms leaves no valid responses in a {} ms window",
                        self.response_window_ms
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Practice, round count and rest schedule shared by the timed tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundPlan {
    /// Trials in the unrecorded practice round; 0 skips practice.
    pub practice_trials: usize,
    pub trials_per_round: usize,
    pub rounds: usize,
    pub rest_ms: u64,
    /// Show feedback after main-round trials too, not only in practice.
    pub feedback_in_main: bool,
}

impl Default for RoundPlan {
    fn default() -> Self {
        Self {
            practice_trials: 10,
            trials_per_round: 30,
            rounds: 2,
            rest_ms: 2000,
            feedback_in_main: false,
        }
    }
}

impl RoundPlan {
    pub fn validate(&self, task: TaskKind) -> Result<(), ConfigurationError> {
        if self.rounds == 0 {
            return Err(ConfigurationError::NoRounds { task });
        }
        if self.trials_per_round == 0 {
            return Err(ConfigurationError::EmptyRound { task });
        }
        Ok(())
    }
}

/// Static configuration of one task, tagged by `"task"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum TaskConfig {
    FingerTapping(FingerTappingConfig),
    GoNoGo(GoNoGoConfig),
    Pvt(PvtConfig),
    TrailMaking(TrailMakingConfig),
    Flanker(FlankerConfig),
    NBack(NBackConfig),
    Stroop(StroopConfig),
    Posner(PosnerConfig),
}

impl TaskConfig {
    pub fn default_for(kind: TaskKind) -> Self {
        match kind {
            TaskKind::FingerTapping => TaskConfig::FingerTapping(Default::default()),
            TaskKind::GoNoGo => TaskConfig::GoNoGo(Default::default()),
            TaskKind::Pvt => TaskConfig::Pvt(Default::default()),
            TaskKind::TrailMaking => TaskConfig::TrailMaking(Default::default()),
            TaskKind::Flanker => TaskConfig::Flanker(Default::default()),
            TaskKind::NBack => TaskConfig::NBack(Default::default()),
            TaskKind::Stroop => TaskConfig::Stroop(Default::default()),
            TaskKind::Posner => TaskConfig::Posner(Default::default()),
        }
    }

    pub fn kind(&self) -> TaskKind {
        self.protocol().kind()
    }

    pub fn protocol(&self) -> Box<dyn TaskProtocol> {
        match self {
            TaskConfig::FingerTapping(c) => Box::new(c.clone()),
            TaskConfig::GoNoGo(c) => Box::new(c.clone()),
            TaskConfig::Pvt(c) => Box::new(c.clone()),
            TaskConfig::TrailMaking(c) => Box::new(c.clone()),
            TaskConfig::Flanker(c) => Box::new(c.clone()),
            TaskConfig::NBack(c) => Box::new(c.clone()),
            TaskConfig::Stroop(c) => Box::new(c.clone()),
            TaskConfig::Posner(c) => Box::new(c.clone()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.protocol().validate()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOrder {
    #[default]
    Fixed,
    /// Random order without repeats, like the original test picker.
    Shuffled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryConfig {
    pub tasks: Vec<TaskConfig>,
    pub order: TaskOrder,
    pub seed: Option<u64>,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            tasks: TaskKind::ALL
                .into_iter()
                .map(TaskConfig::default_for)
                .collect(),
            order: TaskOrder::Fixed,
            seed: None,
        }
    }
}

impl BatteryConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Reads a battery file; a missing file yields the default battery.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no battery config found, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn delay_parses_number_or_range() {
        let fixed: Delay = serde_json::from_str("500").unwrap();
        assert_eq!(fixed, Delay::Fixed(500));
        let range: Delay = serde_json::from_str(r#"{"min": 500, "max": 1000}"#).unwrap();
        assert_eq!(range, Delay::Uniform { min: 500, max: 1000 });
    }

    #[test]
    fn uniform_delay_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let d = Delay::Uniform { min: 500, max: 1000 };
        for _ in 0..200 {
            let v = d.sample(&mut rng);
            assert!((500..=1000).contains(&v));
        }
    }

    #[test]
    fn inverted_range_is_rejected() {
        let timing = TrialTiming {
            fixation: Delay::Uniform { min: 900, max: 100 },
            ..Default::default()
        };
        assert!(matches!(
            timing.validate(),
            Err(ConfigurationError::InvalidTiming { field: "fixation", .. })
        ));
    }

    #[test]
    fn zero_response_window_is_rejected() {
        let timing = TrialTiming {
            response_window_ms: 0,
            ..Default::default()
        };
        assert!(timing.validate().is_err());
    }

    #[test]
    fn default_battery_has_every_task_once() {
        let battery = BatteryConfig::default();
        let kinds: Vec<_> = battery.tasks.iter().map(TaskConfig::kind).collect();
        assert_eq!(kinds, TaskKind::ALL.to_vec());
        for task in &battery.tasks {
            task.validate().unwrap();
        }
    }

    #[test]
    fn task_config_is_tagged() {
        let json = r#"{"tasks": [{"task": "n_back", "target_ratio": 0.25}], "order": "shuffled"}"#;
        let battery = BatteryConfig::from_json(json).unwrap();
        assert_eq!(battery.order, TaskOrder::Shuffled);
        match &battery.tasks[0] {
            TaskConfig::NBack(c) => assert_eq!(c.target_ratio, 0.25),
            other => panic!("unexpected task {other:?}"),
        }
    }

    #[test]
    fn missing_battery_file_falls_back_to_defaults() {
        let battery = BatteryConfig::load(Path::new("/nonexistent/battery.json")).unwrap();
        assert_eq!(battery.tasks.len(), 8);
    }
}
