use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use std::sync::Arc;

use backend::analysis::classifier::NullClassifier;
use backend::analysis::pipeline::{Pipeline, PipelineConfig};
use backend::config::AppConfig;
use backend::routes::configure_routes;
use backend::storage::local_store::LocalStore;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    dotenv::dotenv().ok();

    let config = AppConfig::from_env();

    let store = LocalStore::new(
        &config.upload_dir,
        &config.result_dir,
        config.max_payload_bytes,
    );
    store.ensure_dirs()?;

    let pipeline = Pipeline::new(PipelineConfig::default(), Arc::new(NullClassifier));

    let bind_address = format!("0.0.0.0:{}", config.port);
    log::info!("Starting server on {}", bind_address);

    let result_dir = config.result_dir.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .max_age(3600),
            )
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(store.clone()))
            .app_data(web::Data::new(pipeline.clone()))
            .configure(|cfg| configure_routes(cfg, result_dir.clone()))
    })
    .bind(&bind_address)?
    .run()
    .await
}
