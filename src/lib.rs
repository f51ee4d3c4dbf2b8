//! batchflow: lanzador de línea de comandos sobre `batch-core`.
//!
//! - `config`: configuración desde entorno (.env) con valores por defecto.
//! - `cli`: definición de comandos (`clap`).
//! - `app`: ejecución de comandos sobre el backend en memoria o Postgres.

pub mod app;
pub mod cli;
pub mod config;
