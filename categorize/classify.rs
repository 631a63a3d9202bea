use crate::types::ClassificationLabel;

/// Labels a sensitivity coefficient against a noise floor derived from the model RMSE.
///
/// The floor is `rmse / divisor`. Coefficients at or above the floor are complements,
/// those at or below its negation are substitutes, and everything strictly between is
/// neutral. With a zero RMSE the floor vanishes and any nonzero coefficient is labelled
/// by its sign; an exactly zero coefficient stays neutral. NaN coefficients are neutral.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classifier {
    divisor: f64,
}

impl Classifier {
    pub fn new(divisor: f64) -> Self {
        Self { divisor }
    }

    pub fn threshold(&self, rmse: f64) -> f64 {
        rmse / self.divisor
    }

    pub fn classify(&self, coefficient: f64, rmse: f64) -> ClassificationLabel {
        let threshold = self.threshold(rmse);
        if coefficient == 0.0 && threshold == 0.0 {
            ClassificationLabel::Neutral
        } else if coefficient >= threshold {
            ClassificationLabel::Complement
        } else if coefficient <= -threshold {
            ClassificationLabel::Substitute
        } else {
            ClassificationLabel::Neutral
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ClassificationLabel::*;

    #[test]
    fn small_coefficient_below_the_floor_is_neutral() {
        // floor = 0.10 / 4 = 0.025
        let classifier = Classifier::new(4.0);
        assert_eq!(classifier.classify(0.02, 0.10), Neutral);
        assert_eq!(classifier.classify(-0.02, 0.10), Neutral);
        assert_eq!(classifier.classify(0.03, 0.10), Complement);
        assert_eq!(classifier.classify(-0.03, 0.10), Substitute);
    }

    #[test]
    fn the_floor_itself_is_inclusive() {
        let classifier = Classifier::new(2.0);
        assert_eq!(classifier.classify(0.25, 0.5), Complement);
        assert_eq!(classifier.classify(-0.25, 0.5), Substitute);
    }

    #[test]
    fn zero_rmse_labels_by_sign() {
        let classifier = Classifier::new(4.0);
        assert_eq!(classifier.classify(1.0, 0.0), Complement);
        assert_eq!(classifier.classify(1e-12, 0.0), Complement);
        assert_eq!(classifier.classify(-1e-12, 0.0), Substitute);
        assert_eq!(classifier.classify(0.0, 0.0), Neutral);
        assert_eq!(classifier.classify(-0.0, 0.0), Neutral);
    }

    #[test]
    fn labels_are_ordered_along_the_line() {
        let classifier = Classifier::new(4.0);
        let rank = |label: ClassificationLabel| match label {
            Substitute => 0,
            Neutral => 1,
            Complement => 2,
        };
        for rmse in [0.01, 0.2, 3.0] {
            let threshold = classifier.threshold(rmse);
            let labels: Vec<ClassificationLabel> = (-400..=400)
                .map(|step| classifier.classify(step as f64 * 0.005, rmse))
                .collect();
            assert!(labels.windows(2).all(|w| rank(w[0]) <= rank(w[1])));
            assert_eq!(labels[0], Substitute);
            assert_eq!(labels[400], Neutral);
            assert_eq!(labels[800], Complement);
            assert_eq!(classifier.classify(threshold, rmse), Complement);
            assert_eq!(classifier.classify(-threshold, rmse), Substitute);
        }
    }

    #[test]
    fn nan_is_neutral() {
        assert_eq!(Classifier::new(4.0).classify(f64::NAN, 0.1), Neutral);
    }
}
