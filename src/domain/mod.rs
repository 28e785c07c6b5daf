// Domain layer: models and services.
pub mod models;
pub mod services;
