// Next-chord sampling.
//
// Turns one raw probability vector from the predictor into a single chord
// index. Three stages, each exposed on its own so the distribution can be
// inspected in tests:
//
// 1. `temperature_scale`: log, divide by temperature, exponentiate,
//    normalize. Temperatures below 1 sharpen the distribution toward the most
//    likely chord, above 1 flatten it toward uniform.
// 2. `apply_repetition`: multiply the probability of every chord in the
//    recent history by the repetitiveness factor, then renormalize. The factor
//    is applied once per occurrence, so a chord appearing twice in the window
//    gets the factor squared. Below 1 discourages repeats, above 1 encourages
//    them.
// 3. `draw_index`: cumulative walk against one uniform draw.
//
// There is no argmax shortcut, even at very low temperature.

use crate::error::ModelError;
use rand::Rng;

/// Added to every probability before taking the logarithm.
pub const EPSILON: f64 = 1e-8;

/// Sample one chord index from raw predictor output.
pub fn sample(
    probabilities: &[f64],
    temperature: f64,
    history: &[usize],
    repetitiveness: f64,
    rng: &mut impl Rng,
) -> Result<usize, ModelError> {
    let mut distribution = temperature_scale(probabilities, temperature)?;
    apply_repetition(&mut distribution, history, repetitiveness)?;
    Ok(draw_index(&distribution, rng))
}

/// Temperature-scale a probability vector and normalize it to sum to 1.
pub fn temperature_scale(probabilities: &[f64], temperature: f64) -> Result<Vec<f64>, ModelError> {
    if !temperature.is_finite() || temperature <= 0.0 {
        return Err(ModelError::invalid(
            "temperature",
            format!("must be a positive number, got {temperature}"),
        ));
    }
    if probabilities.is_empty() {
        return Err(ModelError::PredictorFailure(
            "empty probability vector".into(),
        ));
    }

    let scaled: Vec<f64> = probabilities
        .iter()
        .map(|&p| (p + EPSILON).ln() / temperature)
        .collect();
    if let Some(i) = scaled.iter().position(|v| !v.is_finite()) {
        return Err(ModelError::PredictorFailure(format!(
            "probability {} at index {i} is not usable",
            probabilities[i]
        )));
    }

    // Shifting by the max cancels out in the normalization and keeps small
    // temperatures from underflowing every entry to zero.
    let max = scaled.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut distribution: Vec<f64> = scaled.iter().map(|v| (v - max).exp()).collect();
    normalize(&mut distribution).ok_or_else(|| {
        ModelError::PredictorFailure("scaled probabilities do not sum to a finite value".into())
    })?;
    Ok(distribution)
}

/// Multiply each history entry's probability by `repetitiveness`, once per
/// occurrence, then renormalize.
pub fn apply_repetition(
    distribution: &mut [f64],
    history: &[usize],
    repetitiveness: f64,
) -> Result<(), ModelError> {
    if !repetitiveness.is_finite() || repetitiveness < 0.0 {
        return Err(ModelError::invalid(
            "repetitiveness",
            format!("must be a non-negative number, got {repetitiveness}"),
        ));
    }
    let len = distribution.len();
    for &index in history {
        let p = distribution
            .get_mut(index)
            .ok_or(ModelError::IndexOutOfRange { index, len })?;
        *p *= repetitiveness;
    }
    normalize(distribution).ok_or_else(|| ModelError::DegenerateDistribution {
        history: history.to_vec(),
    })
}

/// Draw an index with probability proportional to its weight. Zero-weight
/// entries are never returned.
pub fn draw_index(distribution: &[f64], rng: &mut impl Rng) -> usize {
    let target: f64 = rng.random();
    let mut cumulative = 0.0;
    for (i, &p) in distribution.iter().enumerate() {
        cumulative += p;
        if cumulative > target {
            return i;
        }
    }
    // Rounding left the total just under `target`.
    distribution.iter().rposition(|&p| p > 0.0).unwrap_or(0)
}

/// Scale `values` in place to sum to 1. Returns `None` when the total is zero
/// or not finite.
fn normalize(values: &mut [f64]) -> Option<()> {
    let total: f64 = values.iter().sum();
    if !total.is_finite() || total <= 0.0 {
        return None;
    }
    for v in values.iter_mut() {
        *v /= total;
    }
    Some(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn sum(values: &[f64]) -> f64 {
        values.iter().sum()
    }

    #[test]
    fn scaled_distribution_sums_to_one() {
        let inputs: [&[f64]; 4] = [
            &[0.2, 0.3, 0.5],
            &[1.0, 0.0, 0.0, 0.0],
            &[3.0, 7.0],
            &[1e-12, 0.5, 0.25, 0.25, 0.0],
        ];
        for probs in inputs {
            for temperature in [0.01, 0.5, 1.0, 2.0, 50.0] {
                let d = temperature_scale(probs, temperature).unwrap();
                assert!(
                    (sum(&d) - 1.0).abs() < 1e-9,
                    "{probs:?} at T={temperature} summed to {}",
                    sum(&d)
                );
            }
        }
    }

    #[test]
    fn unit_temperature_preserves_shape() {
        let d = temperature_scale(&[0.2, 0.3, 0.5], 1.0).unwrap();
        assert!((d[0] - 0.2).abs() < 1e-6);
        assert!((d[1] - 0.3).abs() < 1e-6);
        assert!((d[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn low_temperature_approaches_argmax() {
        let d = temperature_scale(&[0.2, 0.3, 0.5], 1e-4).unwrap();
        assert!(d[2] > 0.999_999, "got {d:?}");
    }

    #[test]
    fn high_temperature_approaches_uniform() {
        let d = temperature_scale(&[0.05, 0.15, 0.8], 1e6).unwrap();
        for p in d {
            assert!((p - 1.0 / 3.0).abs() < 1e-4);
        }
    }

    #[test]
    fn rejects_bad_temperature() {
        for temperature in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                temperature_scale(&[0.5, 0.5], temperature),
                Err(ModelError::InvalidParameter { name: "temperature", .. })
            ));
        }
    }

    #[test]
    fn malformed_predictor_output_is_surfaced() {
        assert!(matches!(
            temperature_scale(&[0.5, f64::NAN], 1.0),
            Err(ModelError::PredictorFailure(_))
        ));
        assert!(matches!(
            temperature_scale(&[0.5, -2.0], 1.0),
            Err(ModelError::PredictorFailure(_))
        ));
        assert!(matches!(
            temperature_scale(&[], 1.0),
            Err(ModelError::PredictorFailure(_))
        ));
    }

    #[test]
    fn neutral_repetitiveness_is_a_no_op() {
        let before = temperature_scale(&[0.1, 0.2, 0.3, 0.4], 1.0).unwrap();
        let mut after = before.clone();
        apply_repetition(&mut after, &[0, 2, 2, 3], 1.0).unwrap();
        for (a, b) in after.iter().zip(&before) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn zero_repetitiveness_removes_history() {
        let mut d = vec![0.25; 4];
        apply_repetition(&mut d, &[1, 3], 0.0).unwrap();
        assert_eq!(d[1], 0.0);
        assert_eq!(d[3], 0.0);
        assert!((d[0] - 0.5).abs() < 1e-12);
        assert!((d[2] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn duplicate_history_entries_compound() {
        let mut d = vec![0.5, 0.5];
        apply_repetition(&mut d, &[0, 0], 2.0).unwrap();
        // 0.5 * 2 * 2 = 2.0 against 0.5.
        assert!((d[0] - 0.8).abs() < 1e-12, "got {d:?}");
        assert!((d[1] - 0.2).abs() < 1e-12, "got {d:?}");
    }

    #[test]
    fn empty_history_leaves_distribution_alone() {
        let mut d = vec![0.25, 0.75];
        apply_repetition(&mut d, &[], 0.0).unwrap();
        assert_eq!(d, vec![0.25, 0.75]);
    }

    #[test]
    fn repetition_errors() {
        let mut d = vec![0.5, 0.5];
        assert!(matches!(
            apply_repetition(&mut d, &[5], 2.0),
            Err(ModelError::IndexOutOfRange { index: 5, len: 2 })
        ));

        let mut d = vec![0.5, 0.5];
        assert!(matches!(
            apply_repetition(&mut d, &[0, 1], 0.0),
            Err(ModelError::DegenerateDistribution { .. })
        ));

        let mut d = vec![0.5, 0.5];
        assert!(matches!(
            apply_repetition(&mut d, &[0], -1.0),
            Err(ModelError::InvalidParameter { name: "repetitiveness", .. })
        ));
    }

    #[test]
    fn zero_repetitiveness_never_samples_history() {
        let mut rng = StdRng::seed_from_u64(7);
        let probs = [0.4, 0.3, 0.2, 0.1];
        for _ in 0..5_000 {
            let idx = sample(&probs, 1.0, &[0, 2], 0.0, &mut rng).unwrap();
            assert!(idx == 1 || idx == 3, "sampled history chord {idx}");
        }
    }

    #[test]
    fn draw_follows_weights() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut counts = [0usize; 3];
        let n = 20_000;
        for _ in 0..n {
            counts[draw_index(&[0.2, 0.0, 0.8], &mut rng)] += 1;
        }
        assert_eq!(counts[1], 0);
        let share = counts[2] as f64 / n as f64;
        assert!((0.77..0.83).contains(&share), "expected ~80%, got {share}");
    }

    #[test]
    fn seeded_sampling_is_reproducible() {
        let probs = [0.1, 0.2, 0.3, 0.4];
        let run = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..50)
                .map(|_| sample(&probs, 0.8, &[3], 2.0, &mut rng).unwrap())
                .collect::<Vec<_>>()
        };
        assert_eq!(run(11), run(11));
    }
}
