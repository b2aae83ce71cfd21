//! Zero-shot "is there a bird?" classification with a CLIP image/text model.
//!
//! The image is scored against two fixed prompts and the softmax over the
//! image-to-text logits decides the label.

mod device;
mod model;
mod preprocess;

pub use device::DevicePreference;
pub use model::ClipModel;

use image::RgbImage;

use crate::error::ClassifyError;
use crate::models::{Classification, Label};
use model::PROMPTS;

/// Anything that can label a decoded image. Shared read-only across workers.
pub trait ImageClassifier: Send + Sync {
    fn classify(&self, image: &RgbImage) -> Result<Classification, ClassifyError>;
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Turns the `[bird, not bird]` logits into a label and confidence.
pub fn classification_from_logits(logits: &[f32]) -> Result<Classification, ClassifyError> {
    if logits.len() != PROMPTS.len() {
        return Err(ClassifyError::UnexpectedOutput { len: logits.len() });
    }
    if logits.iter().any(|l| !l.is_finite()) {
        return Err(ClassifyError::NonFiniteLogits);
    }

    let probs = softmax(logits);
    let (bird, not_bird) = (probs[0], probs[1]);
    // Ties go to not_bird.
    let classification = if bird > not_bird {
        Classification {
            label: Label::Bird,
            confidence: bird,
        }
    } else {
        Classification {
            label: Label::NotBird,
            confidence: not_bird,
        }
    };
    Ok(classification)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn softmax_sums_to_one() {
        let probs = softmax(&[24.5, 19.25]);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!(probs[0] > probs[1]);
    }

    #[test]
    fn softmax_handles_large_logits() {
        let probs = softmax(&[1000.0, 999.0]);
        assert!(probs.iter().all(|p| p.is_finite()));
        assert!((probs[0] - 0.7310586).abs() < 1e-5);
    }

    #[test]
    fn bird_wins_with_higher_logit() {
        let result = classification_from_logits(&[26.0, 21.0]).unwrap();
        assert_eq!(result.label, Label::Bird);
        let expected = softmax(&[26.0, 21.0])[0];
        assert_eq!(result.confidence, expected);
        assert!(result.confidence > 0.5 && result.confidence < 1.0);
    }

    #[test]
    fn not_bird_wins_with_higher_logit() {
        let result = classification_from_logits(&[18.0, 22.5]).unwrap();
        assert_eq!(result.label, Label::NotBird);
        assert!(result.confidence > 0.5);
    }

    #[test]
    fn tie_is_not_bird_at_half_confidence() {
        let result = classification_from_logits(&[20.0, 20.0]).unwrap();
        assert_eq!(result.label, Label::NotBird);
        assert_eq!(result.confidence, 0.5);
    }

    #[test]
    fn same_logits_give_same_result() {
        let a = classification_from_logits(&[23.1, 22.9]).unwrap();
        let b = classification_from_logits(&[23.1, 22.9]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn wrong_logit_count_is_rejected() {
        assert!(matches!(
            classification_from_logits(&[1.0, 2.0, 3.0]),
            Err(ClassifyError::UnexpectedOutput { len: 3 })
        ));
    }

    #[test]
    fn nan_logits_are_rejected() {
        assert!(matches!(
            classification_from_logits(&[f32::NAN, 1.0]),
            Err(ClassifyError::NonFiniteLogits)
        ));
    }
}
