use serde::{Deserialize, Serialize};

/// Axis-aligned bounding rectangle of one detected contour, in pixel
/// coordinates of the uploaded image.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// One labeled structural element reported by the classifier.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct AnalysisResponse {
    pub message: String,
    pub output_image: String,
    pub number_of_parts: usize,
    pub bounding_boxes: Vec<BoundingBox>,
    pub detected_objects: Vec<String>,
}
