//! Stimulus Sequence Generator.
//!
//! Every function here is a pure function of the requested length, the
//! sequence configuration and the random source. Condition ratios are met
//! exactly (largest remainder), then the order is shuffled uniformly.

use crate::error::ConfigurationError;
use rand::Rng;
use rand::seq::{IndexedRandom, SliceRandom};
use reactime_core::{
    Condition, CueSide, Direction, Expected, FlankerKind, KeyCode, SquareColor, Stimulus,
    StroopColor, StroopInk, TrailItem, TrialSpec,
};
use serde::{Deserialize, Serialize};

const RATIO_TOLERANCE: f64 = 1e-6;

/// Trail making sheets hold 25 circles.
pub const TRAIL_LENGTH: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StroopBlock {
    #[serde(rename = "word")]
    WordReading,
    #[serde(rename = "color")]
    ColorNaming,
    Interference,
}

impl StroopBlock {
    pub fn condition(self) -> Condition {
        match self {
            StroopBlock::WordReading => Condition::WordReading,
            StroopBlock::ColorNaming => Condition::ColorNaming,
            StroopBlock::Interference => Condition::Interference,
        }
    }

    pub fn short_name(self) -> &'static str {
        match self {
            StroopBlock::WordReading => "word",
            StroopBlock::ColorNaming => "color",
            StroopBlock::Interference => "interference",
        }
    }
}

/// Which trial family to build and its ratios.
#[derive(Debug, Clone, PartialEq)]
pub enum SequenceConfig {
    GoNoGo {
        go_ratio: f64,
    },
    Pvt,
    Flanker,
    NBack {
        n: usize,
        target_ratio: f64,
        alphabet: Vec<char>,
        /// Sole target when `n == 0`.
        zero_back_target: char,
    },
    Stroop(StroopBlock),
    Posner {
        valid: f64,
        invalid: f64,
        neutral: f64,
    },
}

pub fn generate<R: Rng + ?Sized>(
    n: usize,
    config: &SequenceConfig,
    rng: &mut R,
) -> Result<Vec<TrialSpec>, ConfigurationError> {
    match config {
        SequenceConfig::GoNoGo { go_ratio } => go_no_go_sequence(n, *go_ratio, rng),
        SequenceConfig::Pvt => Ok((0..n)
            .map(|_| TrialSpec::new(Condition::Vigilance, Stimulus::Counter, Expected::Go))
            .collect()),
        SequenceConfig::Flanker => Ok(flanker_sequence(n, rng)),
        SequenceConfig::NBack {
            n: lookback,
            target_ratio,
            alphabet,
            zero_back_target,
        } => nback_sequence(n, *lookback, *target_ratio, alphabet, *zero_back_target, rng),
        SequenceConfig::Stroop(block) => Ok(stroop_sequence(n, *block, rng)),
        SequenceConfig::Posner {
            valid,
            invalid,
            neutral,
        } => posner_sequence(n, [*valid, *invalid, *neutral], rng),
    }
}

pub fn check_ratio(field: &'static str, value: f64) -> Result<(), ConfigurationError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigurationError::RatioOutOfRange { field, value });
    }
    Ok(())
}

/// Splits `n` by `ratios` so the counts sum to `n` exactly. Leftover trials
/// go to the largest fractional parts, earlier entries first on ties.
pub fn ratio_counts(n: usize, ratios: &[f64]) -> Result<Vec<usize>, ConfigurationError> {
    for &r in ratios {
        check_ratio("ratio", r)?;
    }
    let sum: f64 = ratios.iter().sum();
    if (sum - 1.0).abs() > RATIO_TOLERANCE {
        return Err(ConfigurationError::RatiosDoNotSum { sum });
    }

    let exact: Vec<f64> = ratios.iter().map(|r| r * n as f64).collect();
    let mut counts: Vec<usize> = exact.iter().map(|x| x.floor() as usize).collect();
    let assigned: usize = counts.iter().sum();

    let mut order: Vec<usize> = (0..ratios.len()).collect();
    order.sort_by(|&a, &b| {
        let fa = exact[a] - exact[a].floor();
        let fb = exact[b] - exact[b].floor();
        fb.total_cmp(&fa).then(a.cmp(&b))
    });
    for &i in order.iter().take(n.saturating_sub(assigned)) {
        counts[i] += 1;
    }
    Ok(counts)
}

/// `n / k` of each condition; the remainder goes to `default`.
pub fn balanced_conditions(n: usize, conditions: &[Condition], default: Condition) -> Vec<Condition> {
    if conditions.is_empty() {
        return vec![default; n];
    }
    let per = n / conditions.len();
    let mut out = Vec::with_capacity(n);
    for &c in conditions {
        out.extend(std::iter::repeat_n(c, per));
    }
    out.extend(std::iter::repeat_n(default, n - out.len()));
    out
}

fn expand(counts: &[usize], conditions: &[Condition]) -> Vec<Condition> {
    conditions
        .iter()
        .zip(counts)
        .flat_map(|(&c, &k)| std::iter::repeat_n(c, k))
        .collect()
}

fn random_direction<R: Rng + ?Sized>(rng: &mut R) -> Direction {
    if rng.random_bool(0.5) {
        Direction::Left
    } else {
        Direction::Right
    }
}

fn go_no_go_sequence<R: Rng + ?Sized>(
    n: usize,
    go_ratio: f64,
    rng: &mut R,
) -> Result<Vec<TrialSpec>, ConfigurationError> {
    check_ratio("go_ratio", go_ratio)?;
    let counts = ratio_counts(n, &[go_ratio, 1.0 - go_ratio])?;
    let mut conditions = expand(&counts, &[Condition::Go, Condition::NoGo]);
    conditions.shuffle(rng);
    Ok(conditions
        .into_iter()
        .map(|c| match c {
            Condition::Go => TrialSpec::new(
                c,
                Stimulus::Square {
                    color: SquareColor::Orange,
                },
                Expected::Go,
            ),
            _ => TrialSpec::new(
                c,
                Stimulus::Square {
                    color: SquareColor::Blue,
                },
                Expected::Withhold,
            ),
        })
        .collect())
}

fn flanker_sequence<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<TrialSpec> {
    let mut conditions = balanced_conditions(
        n,
        &[Condition::Congruent, Condition::Incongruent, Condition::Neutral],
        Condition::Congruent,
    );
    conditions.shuffle(rng);
    conditions
        .into_iter()
        .map(|condition| {
            let target = random_direction(rng);
            let flankers = match condition {
                Condition::Incongruent => FlankerKind::Incongruent,
                Condition::Neutral => FlankerKind::Neutral,
                _ => FlankerKind::Congruent,
            };
            TrialSpec::new(
                condition,
                Stimulus::Arrows { target, flankers },
                Expected::Key(KeyCode::for_direction(target)),
            )
        })
        .collect()
}

pub fn nback_sequence<R: Rng + ?Sized>(
    trials: usize,
    lookback: usize,
    target_ratio: f64,
    alphabet: &[char],
    zero_back_target: char,
    rng: &mut R,
) -> Result<Vec<TrialSpec>, ConfigurationError> {
    check_ratio("target_ratio", target_ratio)?;
    let mut symbols = alphabet.to_vec();
    symbols.sort_unstable();
    symbols.dedup();
    if symbols.len() < 2 {
        return Err(ConfigurationError::AlphabetTooSmall(alphabet.iter().collect()));
    }
    if lookback == 0 && !symbols.contains(&zero_back_target) {
        return Err(ConfigurationError::TargetNotInAlphabet(zero_back_target));
    }
    if lookback > 0 && trials <= lookback {
        return Err(ConfigurationError::SequenceTooShort { trials, lookback });
    }

    // Positions before the lookback window cannot be targets.
    let mut eligible: Vec<usize> = (lookback..trials).collect();
    let targets = ratio_counts(eligible.len(), &[target_ratio, 1.0 - target_ratio])?[0];
    eligible.shuffle(rng);
    let mut is_target = vec![false; trials];
    for &i in eligible.iter().take(targets) {
        is_target[i] = true;
    }

    let mut letters: Vec<char> = Vec::with_capacity(trials);
    for (i, &target) in is_target.iter().enumerate() {
        let letter = match (lookback, target) {
            (0, true) => zero_back_target,
            (0, false) => pick_except(&symbols, zero_back_target, rng),
            (_, true) => letters[i - lookback],
            (_, false) if i >= lookback => pick_except(&symbols, letters[i - lookback], rng),
            (_, false) => *symbols.choose(rng).unwrap_or(&symbols[0]),
        };
        letters.push(letter);
    }

    Ok(letters
        .into_iter()
        .zip(is_target)
        .map(|(letter, target)| {
            let stimulus = Stimulus::Letter { letter };
            if target {
                TrialSpec::new(Condition::Target, stimulus, Expected::Go)
            } else {
                TrialSpec::new(Condition::NonTarget, stimulus, Expected::Withhold)
            }
        })
        .collect())
}

fn pick_except<R: Rng + ?Sized>(symbols: &[char], excluded: char, rng: &mut R) -> char {
    let pool: Vec<char> = symbols.iter().copied().filter(|&c| c != excluded).collect();
    // `symbols` holds at least two distinct entries, so `pool` is never empty.
    *pool.choose(rng).unwrap_or(&symbols[0])
}

fn stroop_sequence<R: Rng + ?Sized>(n: usize, block: StroopBlock, rng: &mut R) -> Vec<TrialSpec> {
    let mut specs: Vec<TrialSpec> = (0..n)
        .map(|i| {
            let word = StroopColor::ALL[i % StroopColor::ALL.len()];
            match block {
                StroopBlock::WordReading => TrialSpec::new(
                    block.condition(),
                    Stimulus::ColorWord {
                        word,
                        ink: StroopInk::Black,
                    },
                    Expected::Key(KeyCode::for_color(word)),
                ),
                StroopBlock::ColorNaming => TrialSpec::new(
                    block.condition(),
                    Stimulus::ColorPatch { color: word },
                    Expected::Key(KeyCode::for_color(word)),
                ),
                StroopBlock::Interference => {
                    let others: Vec<StroopColor> =
                        StroopColor::ALL.into_iter().filter(|&c| c != word).collect();
                    let ink = *others.choose(rng).unwrap_or(&StroopColor::Red);
                    TrialSpec::new(
                        block.condition(),
                        Stimulus::ColorWord {
                            word,
                            ink: StroopInk::Color(ink),
                        },
                        Expected::Key(KeyCode::for_color(ink)),
                    )
                }
            }
        })
        .collect();
    specs.shuffle(rng);
    specs
}

fn posner_sequence<R: Rng + ?Sized>(
    n: usize,
    ratios: [f64; 3],
    rng: &mut R,
) -> Result<Vec<TrialSpec>, ConfigurationError> {
    for (field, r) in ["valid_ratio", "invalid_ratio", "neutral_ratio"].into_iter().zip(ratios) {
        check_ratio(field, r)?;
    }
    let counts = ratio_counts(n, &ratios)?;
    let mut conditions = expand(
        &counts,
        &[Condition::Valid, Condition::Invalid, Condition::Neutral],
    );
    conditions.shuffle(rng);
    Ok(conditions
        .into_iter()
        .map(|condition| {
            let side = random_direction(rng);
            let cue = match condition {
                Condition::Valid => CueSide::from(side),
                Condition::Invalid => CueSide::from(side.opposite()),
                _ => CueSide::Both,
            };
            TrialSpec::new(
                condition,
                Stimulus::Target { side },
                Expected::Key(KeyCode::for_direction(side)),
            )
            .with_cue(cue)
        })
        .collect())
}

/// Canonical selection order of a trail round: A is 1..=25, B alternates
/// numbers and letters `1, A, 2, B, .., 13`.
pub fn trail_order(round: usize) -> Result<Vec<TrailItem>, ConfigurationError> {
    match round {
        0 => Ok((1..=TRAIL_LENGTH as u32).map(TrailItem::Number).collect()),
        1 => Ok((0..TRAIL_LENGTH)
            .map(|i| {
                if i % 2 == 0 {
                    TrailItem::Number(i as u32 / 2 + 1)
                } else {
                    TrailItem::Letter((b'A' + (i / 2) as u8) as char)
                }
            })
            .collect()),
        other => Err(ConfigurationError::UnknownTrailRound(other)),
    }
}

/// Sheet layout: the first item stays in place, the rest are shuffled.
pub fn trail_layout<R: Rng + ?Sized>(
    round: usize,
    rng: &mut R,
) -> Result<Vec<TrailItem>, ConfigurationError> {
    let mut items = trail_order(round)?;
    if let Some(rest) = items.get_mut(1..) {
        rest.shuffle(rng);
    }
    Ok(items)
}
