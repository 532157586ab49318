pub mod analysis;
pub mod config;
pub mod routes;
pub mod storage;
