pub mod aggregator;
pub mod battery;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod generator;
pub mod presentation;
pub mod recorder;
pub mod runner;
pub mod session;
pub mod summary;
pub mod tasks;

pub use aggregator::{
    ClassificationCounts, ConditionSummary, Continuation, RoundAggregator, RoundSummary,
    RunningTally,
};
pub use battery::{BatteryDriver, BatteryEvent};
pub use classifier::classify;
pub use clock::TrialClock;
pub use config::{
    BatteryConfig, CueTiming, Delay, EarlyInputPolicy, RoundPlan, RtPolicy, TaskConfig,
    TaskKind, TaskOrder, TrialTiming,
};
pub use engine::{EngineEvent, RoundEngine};
pub use error::{ConfigurationError, ExperimentError, ParticipantError, RecorderError};
pub use generator::{SequenceConfig, generate};
pub use presentation::{FeedbackTone, Presentation, RenderCommand};
pub use recorder::{
    DataPoint, JsonSessionRecorder, MemoryRecorder, ParticipantInfo, RoundRecord, SessionFile,
    SessionRecorder,
};
pub use runner::{RunnerEvent, TaskRunner};
pub use session::{DerivedMetrics, SessionStatus, TaskSession};
pub use summary::{SummaryRow, SummaryTable, flatten_summary};
pub use tasks::{RoundKind, TaskProtocol};
