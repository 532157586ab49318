use actix_files::Files;
use actix_multipart::Multipart;
use actix_web::{web, Error, HttpResponse};
use futures::{StreamExt, TryStreamExt};
use log::{error, info};
use shared::AnalysisResponse;
use std::io::Write;

use crate::analysis::pipeline::{AnalysisError, Pipeline};
use crate::config::AppConfig;
use crate::storage::local_store::LocalStore;

pub fn configure_routes(cfg: &mut web::ServiceConfig, result_dir: String) {
    cfg.service(web::resource("/upload").route(web::post().to(handle_upload)))
        .service(Files::new("/results", result_dir));
}

async fn handle_upload(
    store: web::Data<LocalStore>,
    pipeline: web::Data<Pipeline>,
    config: web::Data<AppConfig>,
    mut payload: Multipart,
) -> Result<HttpResponse, Error> {
    let mut image_data = Vec::new();
    let mut original_name = String::new();

    while let Ok(Some(mut field)) = payload.try_next().await {
        if field.name() != Some("file") {
            continue;
        }
        if let Some(filename) = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
        {
            original_name = filename.to_string();
        }
        while let Some(chunk) = field.next().await {
            let data = chunk?;
            image_data.write_all(&data)?;
        }
    }

    // Fails with a client error before the pipeline ever runs.
    let input = store.receive(&image_data, &original_name)?;
    let artifact = store.allocate_output();
    info!(
        "Received upload ({} bytes), analyzing as artifact {}",
        image_data.len(),
        artifact.id()
    );

    let pipeline = pipeline.into_inner();
    let analysis = tokio::time::timeout(
        config.pipeline_timeout,
        web::block(move || pipeline.analyze(&input, &artifact)),
    )
    .await
    .map_err(|_| AnalysisError::Timeout)?
    .map_err(|e| AnalysisError::Stage(format!("analysis worker failed: {e}")))?;

    let summary = match analysis {
        Ok(summary) => summary,
        Err(e) => {
            error!("Analysis failed: {e}");
            return Err(e.into());
        }
    };

    info!(
        "Analysis complete: {} parts, artifact {}",
        summary.part_count, summary.output_image
    );

    Ok(HttpResponse::Ok().json(AnalysisResponse {
        message: "Analysis complete".to_string(),
        output_image: summary.output_image,
        number_of_parts: summary.part_count,
        bounding_boxes: summary.bounding_boxes,
        detected_objects: summary.detections.into_iter().map(|d| d.label).collect(),
    }))
}
