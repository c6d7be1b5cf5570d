mod common;

use common::drive_engine;
use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use reactime_core::{
    Classification, Condition, InputEvent, KeyCode, Stimulus, TrialOutcome,
};
use reactime_experiment::generator::{self, SequenceConfig};
use reactime_experiment::tasks::PosnerConfig;
use reactime_experiment::{EngineEvent, RoundAggregator, RoundKind, RtPolicy, TaskProtocol};

const ALPHABET: &str = "ABCDEFGHJKLNPQRSTXYZ";

fn classification() -> impl Strategy<Value = Classification> {
    prop::sample::select(Classification::ALL.to_vec())
}

fn condition() -> impl Strategy<Value = Condition> {
    prop::sample::select(vec![
        Condition::Congruent,
        Condition::Incongruent,
        Condition::Neutral,
    ])
}

prop_compose! {
    fn outcome()(
        condition in condition(),
        classification in classification(),
        rt in prop::option::of(100u64..2_000),
        timestamp in 0u64..600_000,
    ) -> TrialOutcome {
        TrialOutcome {
            trial_index: 0,
            condition,
            response: rt.map(|_| KeyCode::ArrowLeft),
            reaction_time_ms: rt,
            classification,
            timestamp_ms: timestamp,
        }
    }
}

proptest! {
    #[test]
    fn go_ratio_is_exact(n in 1usize..200, go_ratio in 0.0f64..=1.0, seed in any::<u64>()) {
        let mut rng = StdRng::seed_from_u64(seed);
        let seq = generator::generate(n, &SequenceConfig::GoNoGo { go_ratio }, &mut rng).unwrap();
        let go = seq.iter().filter(|s| s.condition == Condition::Go).count();
        prop_assert_eq!(seq.len(), n);
        prop_assert!((go as f64 - go_ratio * n as f64).abs() <= 1.0);
    }

    #[test]
    fn ratio_counts_sum_to_total(n in 0usize..500, a in 0.0f64..=1.0, b in 0.0f64..=1.0) {
        let (a, b) = (a * (1.0 - b), b);
        let ratios = [a, b, (1.0 - a - b).max(0.0)];
        let counts = generator::ratio_counts(n, &ratios).unwrap();
        prop_assert_eq!(counts.iter().sum::<usize>(), n);
        for (count, ratio) in counts.iter().zip(ratios) {
            prop_assert!((*count as f64 - ratio * n as f64).abs() < 1.0 + 1e-9);
        }
    }

    #[test]
    fn n_back_targets_match_lookback(
        lookback in 1usize..4,
        trials in 5usize..60,
        target_ratio in 0.0f64..=1.0,
        seed in any::<u64>(),
    ) {
        prop_assume!(trials > lookback);
        let config = SequenceConfig::NBack {
            n: lookback,
            target_ratio,
            alphabet: ALPHABET.chars().collect(),
            zero_back_target: 'X',
        };
        let seq = generator::generate(trials, &config, &mut StdRng::seed_from_u64(seed)).unwrap();
        let letters: Vec<char> = seq
            .iter()
            .map(|s| match s.stimulus {
                Stimulus::Letter { letter } => letter,
                _ => '?',
            })
            .collect();
        for (i, spec) in seq.iter().enumerate() {
            let is_target = spec.condition == Condition::Target;
            if i < lookback {
                prop_assert!(!is_target);
            } else {
                prop_assert_eq!(is_target, letters[i] == letters[i - lookback]);
            }
        }
        let targets = seq.iter().filter(|s| s.condition == Condition::Target).count();
        let expected = target_ratio * (trials - lookback) as f64;
        prop_assert!((targets as f64 - expected).abs() <= 1.0);
    }

    #[test]
    fn summaries_are_idempotent_and_match_the_running_tally(
        outcomes in prop::collection::vec(outcome(), 0..60),
        policy in prop::sample::select(vec![RtPolicy::CorrectOnly, RtPolicy::ValidResponses]),
    ) {
        let mut agg = RoundAggregator::new(0, "flanker_block_1", policy, 0);
        for (i, mut o) in outcomes.into_iter().enumerate() {
            o.trial_index = i;
            agg.record(o);
        }
        agg.finish(600_000);
        let first = agg.summary();
        prop_assert_eq!(&first, &agg.summary());
        prop_assert_eq!(&first, &agg.summary_from_tally());
        prop_assert_eq!(first.counts.total(), first.trials);
        if let Some(mean) = first.mean_rt_ms {
            prop_assert!((100.0..2_000.0).contains(&mean));
        }
    }

    #[test]
    fn cued_rounds_never_hold_two_timers(
        seed in any::<u64>(),
        delays in prop::collection::vec(0u64..2_500, 1..40),
    ) {
        let config = PosnerConfig::default();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut engine = config.build_round(RoundKind::Practice, &mut rng).unwrap();
        let mut delays = delays.into_iter().cycle();
        // Presses at arbitrary offsets from each phase change, including
        // during the cue and the cue-target interval.
        let outcomes = drive_engine(engine.as_mut(), |event| match event {
            EngineEvent::PhaseEntered { at_ms, .. } => {
                let key = if at_ms % 2 == 0 { KeyCode::ArrowLeft } else { KeyCode::ArrowRight };
                delays.next().map(|d| InputEvent::key(key, at_ms + d))
            }
            _ => None,
        });
        prop_assert_eq!(outcomes.len(), config.plan.practice_trials);
        prop_assert_eq!(engine.pending_timers(), 0);
    }
}
