pub mod input;
pub mod phase;
pub mod stimulus;
pub mod trial;

pub use input::{InputEvent, KeyCode};
pub use phase::{Phase, RunnerStage, TrialPhase};
pub use stimulus::{
    CueSide, Direction, FlankerKind, Side, SquareColor, Stimulus, StroopColor, StroopInk,
    TrailItem,
};
pub use trial::{
    Classification, Condition, Expected, Response, ResponseTiming, TrialOutcome, TrialSpec,
};
