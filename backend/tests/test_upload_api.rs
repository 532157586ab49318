use actix_http::Request;
use actix_web::dev::{Service, ServiceResponse};
use actix_web::{test, web, App, Error};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use backend::analysis::classifier::NullClassifier;
use backend::analysis::pipeline::{Pipeline, PipelineConfig};
use backend::config::AppConfig;
use backend::routes::configure_routes;
use backend::storage::local_store::LocalStore;
use image::{ImageFormat, Rgb, RgbImage};
use shared::AnalysisResponse;
use tempfile::TempDir;

const BOUNDARY: &str = "------------------------aa11bb22cc33dd44";

fn test_config(dir: &TempDir) -> AppConfig {
    AppConfig {
        port: 0,
        upload_dir: dir.path().join("uploads").to_string_lossy().into_owned(),
        result_dir: dir.path().join("results").to_string_lossy().into_owned(),
        max_payload_bytes: 16 * 1024 * 1024,
        pipeline_timeout: Duration::from_secs(30),
    }
}

async fn spawn_app(
    config: AppConfig,
) -> impl Service<Request, Response = ServiceResponse, Error = Error> {
    let store = LocalStore::new(
        &config.upload_dir,
        &config.result_dir,
        config.max_payload_bytes,
    );
    store.ensure_dirs().unwrap();
    let pipeline = Pipeline::new(PipelineConfig::default(), Arc::new(NullClassifier));
    let result_dir = config.result_dir.clone();

    test::init_service(
        App::new()
            .app_data(web::Data::new(config))
            .app_data(web::Data::new(store))
            .app_data(web::Data::new(pipeline))
            .configure(move |cfg| configure_routes(cfg, result_dir)),
    )
    .await
}

fn multipart_body(field_name: &str, filename: &str, data: &[u8]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{field_name}\"; filename=\"{filename}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    (
        format!("multipart/form-data; boundary={BOUNDARY}"),
        body,
    )
}

fn upload_request(field_name: &str, filename: &str, data: &[u8]) -> Request {
    let (content_type, body) = multipart_body(field_name, filename, data);
    test::TestRequest::post()
        .uri("/upload")
        .insert_header(("content-type", content_type))
        .set_payload(body)
        .to_request()
}

fn png_bytes(img: &RgbImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

fn square_on_white() -> RgbImage {
    let mut img = RgbImage::from_pixel(100, 100, Rgb([255, 255, 255]));
    for y in 30..70 {
        for x in 30..70 {
            img.put_pixel(x, y, Rgb([0, 0, 0]));
        }
    }
    img
}

fn dir_is_empty(path: &str) -> bool {
    std::fs::read_dir(path).unwrap().next().is_none()
}

#[actix_web::test]
async fn square_upload_round_trips_through_the_results_route() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let upload_dir = config.upload_dir.clone();
    let app = spawn_app(config).await;

    let resp = test::call_service(
        &app,
        upload_request("file", "square.png", &png_bytes(&square_on_white())),
    )
    .await;
    assert!(resp.status().is_success());

    let summary: AnalysisResponse = test::read_body_json(resp).await;
    assert_eq!(summary.message, "Analysis complete");
    assert_eq!(summary.number_of_parts, 1);
    assert_eq!(summary.bounding_boxes.len(), 1);
    assert_eq!(summary.detected_objects, vec!["Window", "Door", "Beam"]);
    assert!(summary.output_image.starts_with("/results/"));

    // The input temp file is released once analysis finishes.
    assert!(dir_is_empty(&upload_dir));

    // The returned reference resolves to a decodable image.
    let fetch = test::TestRequest::get()
        .uri(&summary.output_image)
        .to_request();
    let resp = test::call_service(&app, fetch).await;
    assert!(resp.status().is_success());
    let artifact = test::read_body(resp).await;
    assert!(image::load_from_memory(&artifact).is_ok());
}

#[actix_web::test]
async fn solid_color_upload_reports_zero_parts() {
    let dir = tempfile::tempdir().unwrap();
    let app = spawn_app(test_config(&dir)).await;

    let flat = RgbImage::from_pixel(100, 100, Rgb([90, 90, 90]));
    let resp = test::call_service(&app, upload_request("file", "flat.png", &png_bytes(&flat))).await;
    assert!(resp.status().is_success());

    let summary: AnalysisResponse = test::read_body_json(resp).await;
    assert_eq!(summary.number_of_parts, 0);
    assert!(summary.bounding_boxes.is_empty());
}

#[actix_web::test]
async fn missing_file_field_is_rejected_without_running_the_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let result_dir = config.result_dir.clone();
    let app = spawn_app(config).await;

    let resp = test::call_service(
        &app,
        upload_request("attachment", "square.png", &png_bytes(&square_on_white())),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 400);
    assert!(dir_is_empty(&result_dir));
}

#[actix_web::test]
async fn empty_file_field_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let result_dir = config.result_dir.clone();
    let app = spawn_app(config).await;

    let resp = test::call_service(&app, upload_request("file", "square.png", &[])).await;
    assert_eq!(resp.status().as_u16(), 400);
    assert!(dir_is_empty(&result_dir));
}

#[actix_web::test]
async fn text_renamed_to_png_fails_as_processing_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let upload_dir = config.upload_dir.clone();
    let result_dir = config.result_dir.clone();
    let app = spawn_app(config).await;

    let resp = test::call_service(
        &app,
        upload_request("file", "fake.png", b"just some text pretending to be pixels"),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 500);

    // No artifact written, and the stored input was cleaned up too.
    assert!(dir_is_empty(&result_dir));
    assert!(dir_is_empty(&upload_dir));
}

#[actix_web::test]
async fn repeated_uploads_get_distinct_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let app = spawn_app(test_config(&dir)).await;
    let bytes = png_bytes(&square_on_white());

    let first: AnalysisResponse = test::read_body_json(
        test::call_service(&app, upload_request("file", "a.png", &bytes)).await,
    )
    .await;
    let second: AnalysisResponse = test::read_body_json(
        test::call_service(&app, upload_request("file", "a.png", &bytes)).await,
    )
    .await;

    assert_ne!(first.output_image, second.output_image);
    assert_eq!(first.number_of_parts, second.number_of_parts);
}

#[actix_web::test]
async fn exhausted_timeout_is_a_server_error_and_releases_the_upload() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir);
    config.pipeline_timeout = Duration::ZERO;
    let upload_dir = config.upload_dir.clone();
    let app = spawn_app(config).await;

    let resp = test::call_service(
        &app,
        upload_request("file", "square.png", &png_bytes(&square_on_white())),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 500);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Analysis timed out");

    // The abandoned analysis still finishes on the blocking pool; its
    // input handle drops there and removes the stored upload.
    for _ in 0..100 {
        if dir_is_empty(&upload_dir) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(dir_is_empty(&upload_dir));
}

#[actix_web::test]
async fn unknown_artifact_reference_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let app = spawn_app(test_config(&dir)).await;

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/results/0000000000000000000000000000dead.png")
            .to_request(),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 404);
}
