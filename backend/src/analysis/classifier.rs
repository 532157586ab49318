use image::DynamicImage;
use shared::Detection;

/// Classification seam of the pipeline: pixel data in, labeled
/// structural elements out. The pipeline only depends on this trait, so
/// a model-backed implementation can replace the placeholder without
/// touching the pipeline contract.
pub trait Classifier: Send + Sync {
    fn classify(&self, image: &DynamicImage) -> Vec<Detection>;
}

/// Placeholder classifier returning a fixed label set regardless of
/// image content. No model backs this list.
pub struct NullClassifier;

impl Classifier for NullClassifier {
    fn classify(&self, _image: &DynamicImage) -> Vec<Detection> {
        vec![
            Detection {
                label: "Window".to_string(),
                confidence: 0.95,
            },
            Detection {
                label: "Door".to_string(),
                confidence: 0.90,
            },
            Detection {
                label: "Beam".to_string(),
                confidence: 0.85,
            },
        ]
    }
}
