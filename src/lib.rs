// Library for tests to access modules

pub mod config;
pub mod exporter;
pub mod measurement_repo;
pub mod models;
pub mod poller;
pub mod publisher;
pub mod routes;
pub mod sampler;
pub mod sources;
pub mod version;
pub mod writer;
