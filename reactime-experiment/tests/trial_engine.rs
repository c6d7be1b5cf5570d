mod common;

use common::{drive_engine, perfect_participant};
use rand::SeedableRng;
use rand::rngs::StdRng;
use reactime_core::{
    Classification, Condition, Expected, InputEvent, KeyCode, SquareColor, Stimulus, TrailItem,
    TrialPhase, TrialSpec,
};
use reactime_experiment::generator::{self, SequenceConfig};
use reactime_experiment::tasks::TrailRound;
use reactime_experiment::{
    Delay, EarlyInputPolicy, EngineEvent, RoundAggregator, RoundEngine, RtPolicy, TrialClock,
    TrialTiming,
};

fn timing(window_ms: u64) -> TrialTiming {
    TrialTiming {
        fixation: Delay::Fixed(500),
        cue: None,
        response_window_ms: window_ms,
        end_on_response: true,
        hide_on_response: false,
        feedback_ms: 0,
        inter_trial: Delay::Fixed(500),
        min_valid_rt_ms: None,
        early_input: EarlyInputPolicy::Ignore,
    }
}

fn square(condition: Condition) -> TrialSpec {
    match condition {
        Condition::Go => TrialSpec::new(
            condition,
            Stimulus::Square {
                color: SquareColor::Orange,
            },
            Expected::Go,
        ),
        _ => TrialSpec::new(
            condition,
            Stimulus::Square {
                color: SquareColor::Blue,
            },
            Expected::Withhold,
        ),
    }
}

#[test]
fn go_no_go_seven_hits_three_false_alarms() {
    let mut sequence: Vec<TrialSpec> = (0..7).map(|_| square(Condition::Go)).collect();
    sequence.extend((0..3).map(|_| square(Condition::NoGo)));

    let mut clock = TrialClock::new(
        timing(1000),
        sequence,
        vec![KeyCode::Space],
        StdRng::seed_from_u64(11),
    );
    // Presses on every stimulus, go or not.
    let outcomes = drive_engine(&mut clock, |event| match event {
        EngineEvent::StimulusShown { at_ms, .. } => Some(InputEvent::key(KeyCode::Space, at_ms + 250)),
        _ => None,
    });

    let mut agg = RoundAggregator::new(0, "go_no_go_round_1", RtPolicy::CorrectOnly, 0);
    for o in outcomes {
        agg.record(o);
    }
    let summary = agg.summary();
    assert_eq!(summary.trials, 10);
    assert_eq!(summary.correct, 7);
    assert_eq!(summary.wrong, 3);
    assert_eq!(summary.accuracy, 0.7);
    assert_eq!(summary.counts.false_alarm, 3);
    assert_eq!(summary.mean_rt_ms, Some(250.0));
}

#[test]
fn all_timeouts_still_produce_one_outcome_per_trial() {
    let mut rng = StdRng::seed_from_u64(5);
    let sequence = generator::generate(9, &SequenceConfig::Flanker, &mut rng).unwrap();
    let mut clock = TrialClock::new(
        timing(1500),
        sequence,
        vec![KeyCode::ArrowLeft, KeyCode::ArrowRight],
        rng,
    );
    let outcomes = drive_engine(&mut clock, |_| None);

    assert_eq!(outcomes.len(), 9);
    assert!(outcomes
        .iter()
        .all(|o| o.classification == Classification::NoResponse));
    let indices: Vec<_> = outcomes.iter().map(|o| o.trial_index).collect();
    assert_eq!(indices, (0..9).collect::<Vec<_>>());
    assert!(clock.is_finished());
}

#[test]
fn abort_during_stimulus_emits_no_outcome() {
    let mut clock = TrialClock::new(
        timing(1000),
        vec![square(Condition::Go), square(Condition::Go)],
        vec![KeyCode::Space],
        StdRng::seed_from_u64(1),
    );
    clock.start(0);
    clock.advance(500);
    assert_eq!(clock.phase(), TrialPhase::StimulusVisible);

    let events = clock.abort(700);
    assert_eq!(events, vec![EngineEvent::Aborted { at_ms: 700 }]);
    assert_eq!(clock.pending_timers(), 0);
    assert!(clock.outcomes().is_empty());
    assert!(clock.advance(10_000).is_empty());
    let late = clock.handle_input(InputEvent::key(KeyCode::Space, 10_100));
    assert!(late.iter().all(|e| e.outcome().is_none()));
}

#[test]
fn pvt_press_under_minimum_rt_is_a_false_start() {
    let rng = StdRng::seed_from_u64(2);
    let pvt = TrialTiming {
        fixation: Delay::Fixed(1000),
        min_valid_rt_ms: Some(100),
        early_input: EarlyInputPolicy::FalseStart,
        inter_trial: Delay::Fixed(2000),
        ..timing(1000)
    };
    let sequence = generator::generate(3, &SequenceConfig::Pvt, &mut StdRng::seed_from_u64(0)).unwrap();
    let mut clock = TrialClock::new(pvt, sequence, vec![KeyCode::Space], rng);

    // Trial 0: 60 ms after onset. Trial 1: during the fixation. Trial 2: 240 ms.
    let outcomes = drive_engine(&mut clock, |event| match *event {
        EngineEvent::StimulusShown { trial: 0, at_ms } => Some(InputEvent::key(KeyCode::Space, at_ms + 60)),
        EngineEvent::PhaseEntered {
            trial: 1,
            phase: TrialPhase::Fixation,
            at_ms,
        } => Some(InputEvent::key(KeyCode::Space, at_ms + 300)),
        EngineEvent::StimulusShown { trial: 2, at_ms } => Some(InputEvent::key(KeyCode::Space, at_ms + 240)),
        _ => None,
    });

    let classes: Vec<_> = outcomes.iter().map(|o| o.classification).collect();
    assert_eq!(
        classes,
        vec![
            Classification::FalseStart,
            Classification::FalseStart,
            Classification::Hit
        ]
    );
    assert_eq!(outcomes[2].reaction_time_ms, Some(240));
}

#[test]
fn press_tied_with_the_window_deadline_is_scored() {
    let sequence: Vec<TrialSpec> = (0..4).map(|_| square(Condition::Go)).collect();
    let mut clock = TrialClock::new(
        timing(800),
        sequence,
        vec![KeyCode::Space],
        StdRng::seed_from_u64(5),
    );
    let outcomes = drive_engine(&mut clock, perfect_participant(800));
    assert_eq!(outcomes.len(), 4);
    assert!(outcomes
        .iter()
        .all(|o| o.classification == Classification::Hit && o.reaction_time_ms == Some(800)));
}

#[test]
fn pvt_presses_between_trials_are_flagged_not_scored() {
    let pvt = TrialTiming {
        fixation: Delay::Fixed(1000),
        min_valid_rt_ms: Some(100),
        early_input: EarlyInputPolicy::FalseStart,
        inter_trial: Delay::Fixed(2000),
        ..timing(1000)
    };
    let sequence = generator::generate(3, &SequenceConfig::Pvt, &mut StdRng::seed_from_u64(0)).unwrap();
    let mut clock = TrialClock::new(pvt, sequence, vec![KeyCode::Space], StdRng::seed_from_u64(4));

    let mut flagged = 0;
    let outcomes = drive_engine(&mut clock, |event| match *event {
        EngineEvent::StimulusShown { at_ms, .. } => Some(InputEvent::key(KeyCode::Space, at_ms + 300)),
        EngineEvent::PhaseEntered {
            phase: TrialPhase::InterTrialInterval,
            at_ms,
            ..
        } => Some(InputEvent::key(KeyCode::Space, at_ms + 700)),
        EngineEvent::FalseStart { .. } => {
            flagged += 1;
            None
        }
        _ => None,
    });
    assert_eq!(flagged, 3);
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.iter().all(|o| o.classification == Classification::Hit));
}

#[test]
fn zero_back_targets_are_exactly_the_x_letters() {
    let mut rng = StdRng::seed_from_u64(21);
    let alphabet: Vec<char> = "ABCDEFGHJKLNPQRSTXYZ".chars().collect();
    let config = SequenceConfig::NBack {
        n: 0,
        target_ratio: 0.3,
        alphabet,
        zero_back_target: 'X',
    };
    let sequence = generator::generate(30, &config, &mut rng).unwrap();
    assert_eq!(sequence.len(), 30);
    for spec in &sequence {
        let Stimulus::Letter { letter } = spec.stimulus else {
            panic!("n-back produced {:?}", spec.stimulus);
        };
        assert_eq!(letter == 'X', spec.condition == Condition::Target);
    }
    let targets = sequence
        .iter()
        .filter(|s| s.condition == Condition::Target)
        .count();
    assert_eq!(targets, 9);
}

#[test]
fn trail_wrong_selection_keeps_cursor() {
    let order = generator::trail_order(0).unwrap();
    let layout = generator::trail_layout(0, &mut StdRng::seed_from_u64(3)).unwrap();
    assert_eq!(layout[0], TrailItem::Number(1));

    let mut round = TrailRound::new(order, layout);
    round.start(0);
    for n in 1..=4 {
        round.handle_input(InputEvent::select(TrailItem::Number(n), n as u64 * 1_000));
    }
    let events = round.handle_input(InputEvent::select(TrailItem::Number(7), 5_000));
    let outcome = events.iter().find_map(EngineEvent::outcome).unwrap();
    assert_eq!(outcome.classification, Classification::Incorrect);
    assert_eq!(round.expected_item(), Some(TrailItem::Number(5)));
    assert_eq!(round.outcomes().len(), 5);
}

#[test]
fn perfect_flanker_round_is_fully_correct() {
    let mut rng = StdRng::seed_from_u64(8);
    let sequence = generator::generate(12, &SequenceConfig::Flanker, &mut rng).unwrap();
    let mut clock = TrialClock::new(
        timing(1500),
        sequence,
        vec![KeyCode::ArrowLeft, KeyCode::ArrowRight],
        rng,
    );
    let outcomes = drive_engine(&mut clock, perfect_participant(420));
    assert_eq!(outcomes.len(), 12);
    assert!(outcomes
        .iter()
        .all(|o| o.classification == Classification::Correct && o.reaction_time_ms == Some(420)));
}
