//! Buy/no-buy classification of feature vectors.

use std::path::Path;

use tracing::{info, warn};
use tract_onnx::prelude::*;

use crate::agent::features::{FEATURE_LEN, FEATURE_SHAPE, FeatureVector};
use crate::agent::types::AgentError;

pub trait Classifier: Send + Sync {
    /// `true` means buy.
    fn should_buy(&self, features: &FeatureVector) -> Result<bool, AgentError>;
}

/// Fallback used when no model is available: never buys.
#[derive(Debug, Default)]
pub struct RejectAll;

impl Classifier for RejectAll {
    fn should_buy(&self, _features: &FeatureVector) -> Result<bool, AgentError> {
        Ok(false)
    }
}

/// ONNX model over the feature tensor. The first output element rounded to
/// the nearest integer is the class; 1 is buy.
pub struct OnnxClassifier {
    plan: TypedRunnableModel<TypedModel>,
}

impl std::fmt::Debug for OnnxClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxClassifier")
            .field("input_shape", &FEATURE_SHAPE)
            .finish()
    }
}

impl OnnxClassifier {
    pub fn load(path: &Path) -> Result<Self, AgentError> {
        let model = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(|e| AgentError::Classifier(format!("onnx load failed: {e}")))?;

        let shape: TVec<usize> = FEATURE_SHAPE.iter().copied().collect();
        let plan = model
            .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), shape))
            .map_err(|e| AgentError::Classifier(format!("onnx input fact failed: {e}")))?
            .into_optimized()
            .map_err(|e| AgentError::Classifier(format!("onnx optimize failed: {e}")))?
            .into_runnable()
            .map_err(|e| AgentError::Classifier(format!("onnx runnable failed: {e}")))?;

        info!("Loaded classifier from {}", path.display());
        Ok(Self { plan })
    }

    /// Load the model, falling back to [`RejectAll`] when it cannot be read.
    pub fn load_or_reject(path: &Path) -> Box<dyn Classifier> {
        match Self::load(path) {
            Ok(model) => Box::new(model),
            Err(e) => {
                warn!("No usable classifier at {} ({}), agent will not buy", path.display(), e);
                Box::new(RejectAll)
            }
        }
    }

    fn predict(&self, input: Vec<f32>) -> Result<f32, AgentError> {
        let tensor = tract_ndarray::ArrayD::<f32>::from_shape_vec(tract_ndarray::IxDyn(&FEATURE_SHAPE), input)
            .map_err(|e| AgentError::Classifier(format!("onnx input reshape failed: {e}")))?
            .into_tvalue();

        let outputs = self
            .plan
            .run(tvec!(tensor))
            .map_err(|e| AgentError::Classifier(format!("onnx run failed: {e}")))?;
        let first = outputs
            .first()
            .ok_or_else(|| AgentError::Classifier("onnx produced no outputs".to_string()))?;
        let view = first
            .to_array_view::<f32>()
            .map_err(|e| AgentError::Classifier(format!("onnx output decode failed: {e}")))?;
        view.iter()
            .next()
            .copied()
            .ok_or_else(|| AgentError::Classifier("onnx output has zero elements".to_string()))
    }
}

impl Classifier for OnnxClassifier {
    fn should_buy(&self, features: &FeatureVector) -> Result<bool, AgentError> {
        let input = features.to_f32();
        debug_assert_eq!(input.len(), FEATURE_LEN);
        let score = self.predict(input)?;
        Ok(score.round() as i64 == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_all_never_buys() {
        assert!(!RejectAll.should_buy(&FeatureVector::neutral()).unwrap());
    }

    #[test]
    fn missing_model_is_a_classifier_error() {
        let path = std::env::temp_dir().join(format!("missing-{}.onnx", uuid::Uuid::new_v4()));
        assert!(matches!(OnnxClassifier::load(&path), Err(AgentError::Classifier(_))));

        let fallback = OnnxClassifier::load_or_reject(&path);
        assert!(!fallback.should_buy(&FeatureVector::neutral()).unwrap());
    }
}
