//! Response Classifier: maps an expected response and what the participant
//! did into exactly one [`Classification`].

use reactime_core::{Classification, Expected, Response, ResponseTiming, TrialOutcome, TrialSpec};

/// Classifies one trial.
///
/// `response` is `None` when the response window closed without input.
/// Reactions faster than `min_valid_rt_ms` are treated as anticipations on
/// target trials and as false alarms on non-target trials.
pub fn classify(
    spec: &TrialSpec,
    response: Option<&Response>,
    min_valid_rt_ms: Option<u64>,
) -> Classification {
    let Some(response) = response else {
        return match spec.expected {
            Expected::Go => Classification::Miss,
            Expected::Withhold => Classification::CorrectRejection,
            Expected::Key(_) => Classification::NoResponse,
        };
    };

    let rt = match response.timing {
        ResponseTiming::Anticipatory => return Classification::FalseStart,
        ResponseTiming::Reaction(rt) => rt,
    };
    let too_fast = min_valid_rt_ms.is_some_and(|min| rt < min);

    match spec.expected {
        Expected::Withhold => Classification::FalseAlarm,
        _ if too_fast => Classification::FalseStart,
        Expected::Go => Classification::Hit,
        Expected::Key(key) if key == response.key => Classification::Correct,
        Expected::Key(_) => Classification::Incorrect,
    }
}

/// Builds the immutable outcome record for a finished trial.
pub fn outcome(
    trial_index: usize,
    spec: &TrialSpec,
    response: Option<&Response>,
    min_valid_rt_ms: Option<u64>,
    timestamp_ms: u64,
) -> TrialOutcome {
    TrialOutcome {
        trial_index,
        condition: spec.condition,
        response: response.map(|r| r.key),
        reaction_time_ms: response.and_then(Response::reaction_time_ms),
        classification: classify(spec, response, min_valid_rt_ms),
        timestamp_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reactime_core::{Condition, Direction, KeyCode, SquareColor, Stimulus};

    fn go() -> TrialSpec {
        TrialSpec::new(
            Condition::Go,
            Stimulus::Square {
                color: SquareColor::Orange,
            },
            Expected::Go,
        )
    }

    fn no_go() -> TrialSpec {
        TrialSpec::new(
            Condition::NoGo,
            Stimulus::Square {
                color: SquareColor::Blue,
            },
            Expected::Withhold,
        )
    }

    fn left_arrow() -> TrialSpec {
        TrialSpec::new(
            Condition::Congruent,
            Stimulus::Arrows {
                target: Direction::Left,
                flankers: reactime_core::FlankerKind::Congruent,
            },
            Expected::Key(KeyCode::ArrowLeft),
        )
    }

    #[test]
    fn decision_table() {
        let press = Response::reaction(KeyCode::Space, 320);
        let fast = Response::reaction(KeyCode::Space, 60);
        let early = Response::anticipatory(KeyCode::Space);

        assert_eq!(classify(&go(), Some(&press), Some(100)), Classification::Hit);
        assert_eq!(classify(&go(), Some(&fast), Some(100)), Classification::FalseStart);
        assert_eq!(classify(&go(), Some(&early), None), Classification::FalseStart);
        assert_eq!(classify(&go(), None, Some(100)), Classification::Miss);
        assert_eq!(classify(&no_go(), Some(&press), None), Classification::FalseAlarm);
        assert_eq!(classify(&no_go(), Some(&fast), Some(100)), Classification::FalseAlarm);
        assert_eq!(classify(&no_go(), None, None), Classification::CorrectRejection);
    }

    #[test]
    fn discrete_choice_matches_key() {
        let spec = left_arrow();
        assert_eq!(
            classify(&spec, Some(&Response::reaction(KeyCode::ArrowLeft, 400)), None),
            Classification::Correct
        );
        assert_eq!(
            classify(&spec, Some(&Response::reaction(KeyCode::ArrowRight, 400)), None),
            Classification::Incorrect
        );
        assert_eq!(classify(&spec, None, None), Classification::NoResponse);
    }

    #[test]
    fn rt_exactly_at_threshold_is_valid() {
        let press = Response::reaction(KeyCode::Space, 100);
        assert_eq!(classify(&go(), Some(&press), Some(100)), Classification::Hit);
    }

    #[test]
    fn outcome_keeps_rt_only_for_reactions() {
        let o = outcome(4, &go(), Some(&Response::anticipatory(KeyCode::Space)), None, 9_000);
        assert_eq!(o.trial_index, 4);
        assert_eq!(o.response, Some(KeyCode::Space));
        assert_eq!(o.reaction_time_ms, None);
        assert_eq!(o.classification, Classification::FalseStart);

        let o = outcome(5, &go(), None, None, 9_500);
        assert_eq!(o.response, None);
        assert_eq!(o.classification, Classification::Miss);
    }
}
