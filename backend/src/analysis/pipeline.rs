use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use image::{GrayImage, Rgb, RgbImage};
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::contrast::equalize_histogram;
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::edges::canny;
use imageproc::point::Point;
use imageproc::rect::Rect;
use serde_json::json;
use shared::{BoundingBox, Detection};
use std::fs;
use std::sync::Arc;

use crate::analysis::classifier::Classifier;
use crate::storage::local_store::{InputHandle, StoredArtifact};

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Image decode failed: {0}")]
    Decode(String),
    #[error("Pipeline stage failed: {0}")]
    Stage(String),
    #[error("Failed to write result artifact: {0}")]
    ArtifactWrite(String),
    #[error("Analysis timed out")]
    Timeout,
}

impl ResponseError for AnalysisError {
    fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}

/// Tunable policy constants for the transformation stages. The defaults
/// mirror the production settings; none of them is derived from the
/// image being analyzed.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub canny_low: f32,
    pub canny_high: f32,
    /// Equalize the grayscale histogram before edge detection.
    pub equalize: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            canny_low: 50.0,
            canny_high: 150.0,
            equalize: false,
        }
    }
}

/// Everything the upload handler reports back to the client for one
/// successful analysis. Produced exactly once per request.
#[derive(Debug, Clone)]
pub struct AnalysisSummary {
    pub output_image: String,
    pub part_count: usize,
    pub bounding_boxes: Vec<BoundingBox>,
    pub detections: Vec<Detection>,
}

/// Structural analysis pipeline. Stages run in a fixed order and share
/// no state between invocations; the first failure aborts the request.
#[derive(Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    classifier: Arc<dyn Classifier>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, classifier: Arc<dyn Classifier>) -> Self {
        Self { config, classifier }
    }

    /// Run decode -> grayscale -> edges -> contours -> artifact write ->
    /// classify on a stored upload, persisting the annotated image to
    /// the pre-allocated artifact path.
    pub fn analyze(
        &self,
        input: &InputHandle,
        artifact: &StoredArtifact,
    ) -> Result<AnalysisSummary, AnalysisError> {
        let bytes = fs::read(input.path())
            .map_err(|e| AnalysisError::Decode(format!("cannot read stored upload: {e}")))?;
        let image =
            image::load_from_memory(&bytes).map_err(|e| AnalysisError::Decode(e.to_string()))?;

        let mut gray = image.to_luma8();
        if self.config.equalize {
            gray = equalize_histogram(&gray);
        }

        let edges = canny(&gray, self.config.canny_low, self.config.canny_high);
        let contours = external_contours(&edges);
        let bounding_boxes: Vec<BoundingBox> = contours
            .iter()
            .map(|c| bounding_box(&drop_collinear(&c.points)))
            .collect();

        let annotated = annotate(&image.to_rgb8(), &bounding_boxes);
        write_artifact(&annotated, artifact)?;

        let detections = self.classifier.classify(&image);

        Ok(AnalysisSummary {
            output_image: artifact.public_path(),
            part_count: contours.len(),
            bounding_boxes,
            detections,
        })
    }
}

/// External (outer-border) contours of a binary edge map. Hole borders
/// nested inside other shapes are excluded, so the count reflects the
/// number of distinct structural parts.
fn external_contours(edges: &GrayImage) -> Vec<Contour<i32>> {
    find_contours::<i32>(edges)
        .into_iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer))
        .collect()
}

/// Drop redundant collinear points from a closed contour, keeping the
/// vertices where the boundary turns or reverses direction.
fn drop_collinear(points: &[Point<i32>]) -> Vec<Point<i32>> {
    let n = points.len();
    if n < 3 {
        return points.to_vec();
    }
    let mut kept = Vec::with_capacity(n);
    for i in 0..n {
        let prev = points[(i + n - 1) % n];
        let cur = points[i];
        let next = points[(i + 1) % n];
        let cross = i64::from(cur.x - prev.x) * i64::from(next.y - cur.y)
            - i64::from(cur.y - prev.y) * i64::from(next.x - cur.x);
        // A point is redundant only when the boundary passes straight
        // through it. The turn-around vertex of an out-and-back trace
        // (a one-pixel-wide feature) has zero cross product too, but is
        // a contour extreme and must survive simplification.
        let dot = i64::from(cur.x - prev.x) * i64::from(next.x - cur.x)
            + i64::from(cur.y - prev.y) * i64::from(next.y - cur.y);
        if cross != 0 || dot <= 0 {
            kept.push(cur);
        }
    }
    if kept.is_empty() {
        // Degenerate contour lying on a single line.
        vec![points[0]]
    } else {
        kept
    }
}

fn bounding_box(points: &[Point<i32>]) -> BoundingBox {
    if points.is_empty() {
        return BoundingBox {
            x: 0,
            y: 0,
            width: 0,
            height: 0,
        };
    }
    let mut min_x = i32::MAX;
    let mut min_y = i32::MAX;
    let mut max_x = i32::MIN;
    let mut max_y = i32::MIN;
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    BoundingBox {
        x: min_x,
        y: min_y,
        width: (max_x - min_x + 1) as u32,
        height: (max_y - min_y + 1) as u32,
    }
}

/// Overlay one hollow rectangle per detected part on the decoded image.
fn annotate(image: &RgbImage, boxes: &[BoundingBox]) -> RgbImage {
    let mut canvas = image.clone();
    for b in boxes {
        if b.width == 0 || b.height == 0 {
            continue;
        }
        draw_hollow_rect_mut(
            &mut canvas,
            Rect::at(b.x, b.y).of_size(b.width, b.height),
            Rgb([255, 0, 0]),
        );
    }
    canvas
}

fn write_artifact(image: &RgbImage, artifact: &StoredArtifact) -> Result<(), AnalysisError> {
    if let Err(e) = image.save(artifact.path()) {
        // Do not leave a partial artifact behind.
        let _ = fs::remove_file(artifact.path());
        return Err(AnalysisError::ArtifactWrite(e.to_string()));
    }
    Ok(())
}
