//! batch-adapters: piezas concretas sobre los contratos de `batch-core`.
//!
//! - `delimited`: fuente de texto delimitado (csv) con columnas configurables.
//! - `paging`: fuente paginada sobre una consulta Postgres.
//! - `people`: dominio de ejemplo (Person, transformador a mayúsculas,
//!   sinks en memoria y Postgres).
//! - `listeners`: notificación de fin de job.
//! - `tasklets`: tasklet "hello world".
//! - `jobs`: definiciones `importUserJob` y `helloJob`.

pub mod delimited;
pub mod jobs;
pub mod listeners;
pub mod paging;
pub mod people;
pub mod tasklets;

pub use delimited::DelimitedSource;
pub use jobs::{hello_job, import_user_job, ImportSettings, HELLO_JOB, IMPORT_USER_JOB};
pub use listeners::JobCompletionNotificationListener;
pub use paging::PgPagingSource;
pub use people::{PeopleDirectory, PeopleStore, Person, PgPeopleDirectory, PgPeopleSink, UppercaseTransformer};
pub use tasklets::HelloWorldTasklet;
