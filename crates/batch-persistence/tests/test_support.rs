#![allow(dead_code)]

use batch_persistence::config::DbConfig;
use batch_persistence::pg::{build_pool, PgPool};
use once_cell::sync::Lazy;

pub static TEST_POOL: Lazy<Option<PgPool>> = Lazy::new(|| {
    let cfg = match DbConfig::from_env_optional() {
        Ok(Some(cfg)) => cfg,
        _ => return None,
    };
    match build_pool(&cfg.url, 1, 4) {
        Ok(p) => Some(p),
        Err(e) => {
            eprintln!("No se pudo construir pool de test: {e}");
            None
        }
    }
});

pub fn with_pool<F, R>(f: F) -> Option<R>
    where F: FnOnce(&PgPool) -> R
{
    TEST_POOL.as_ref().map(f)
}

/// Nombre de job único por test (las tablas se comparten entre ejecuciones).
pub fn unique_job(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4())
}
