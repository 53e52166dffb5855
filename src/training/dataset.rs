// Training set selection: cap, shuffle, train/validation split

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::data::TrainingExample;

/// Train/validation partition of one run's examples.
#[derive(Debug, Clone, Default)]
pub struct Split {
    pub train: Vec<TrainingExample>,
    pub validation: Vec<TrainingExample>,
}

/// Shuffle `examples` with `seed`, keep at most `max_examples` and split off
/// `validation_fraction` of them (rounded up) for validation.
///
/// With two or more examples the training side is never left empty.
pub fn split(
    mut examples: Vec<TrainingExample>,
    max_examples: usize,
    validation_fraction: f64,
    seed: u64,
) -> Split {
    let mut rng = StdRng::seed_from_u64(seed);
    examples.shuffle(&mut rng);
    examples.truncate(max_examples);

    let n = examples.len();
    let fraction = validation_fraction.clamp(0.0, 1.0);
    let mut n_val = (n as f64 * fraction).ceil() as usize;
    if n > 1 {
        n_val = n_val.min(n - 1);
    } else {
        n_val = 0;
    }

    let validation = examples.split_off(n - n_val);
    Split {
        train: examples,
        validation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Turn;

    fn examples(n: usize) -> Vec<TrainingExample> {
        (0..n)
            .map(|i| TrainingExample::Chat {
                messages: vec![Turn::user(format!("q{i}")), Turn::assistant(format!("a{i}"))],
            })
            .collect()
    }

    #[test]
    fn test_ninety_ten() {
        let s = split(examples(100), 10_000, 0.1, 42);
        assert_eq!(s.train.len(), 90);
        assert_eq!(s.validation.len(), 10);
    }

    #[test]
    fn test_cap_applies_before_split() {
        let s = split(examples(50), 20, 0.1, 42);
        assert_eq!(s.train.len() + s.validation.len(), 20);
        assert_eq!(s.validation.len(), 2);
    }

    #[test]
    fn test_rounds_validation_up() {
        let s = split(examples(5), 100, 0.1, 1);
        assert_eq!(s.validation.len(), 1);
        assert_eq!(s.train.len(), 4);
    }

    #[test]
    fn test_tiny_inputs() {
        let s = split(examples(1), 100, 0.5, 1);
        assert_eq!(s.train.len(), 1);
        assert!(s.validation.is_empty());

        let s = split(examples(2), 100, 1.0, 1);
        assert_eq!(s.train.len(), 1);
        assert_eq!(s.validation.len(), 1);

        let s = split(Vec::new(), 100, 0.1, 1);
        assert!(s.train.is_empty() && s.validation.is_empty());
    }

    #[test]
    fn test_seeded_and_disjoint() {
        let a = split(examples(30), 100, 0.2, 7);
        let b = split(examples(30), 100, 0.2, 7);
        assert_eq!(a.train, b.train);
        assert_eq!(a.validation, b.validation);
        assert!(a.validation.iter().all(|e| !a.train.contains(e)));
    }
}
