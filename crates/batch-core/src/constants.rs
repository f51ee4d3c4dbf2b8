//! Constantes del motor batch.
//!
//! Claves reservadas del `ExecutionContext` y valores por defecto de la
//! configuración de steps. Cambiar las claves rompe la compatibilidad de
//! restart con ejecuciones persistidas previamente.

/// Versión lógica del motor. Se persiste en cada `JobExecution` para
/// diagnosticar reinicios entre versiones incompatibles.
pub const ENGINE_VERSION: &str = "B1.0";

/// Tamaño de chunk por defecto cuando el builder no recibe uno explícito.
pub const DEFAULT_CHUNK_SIZE: usize = 10;

/// Intentos máximos de escritura de un chunk, contando el primero.
pub const DEFAULT_RETRY_LIMIT: u32 = 3;

/// Clave del contexto donde las fuentes guardan cuántos registros
/// consumieron hasta el último commit.
pub const SOURCE_OFFSET_KEY: &str = "source.offset";

/// Parámetro usado por `RunIdIncrementer`.
pub const RUN_ID_KEY: &str = "run.id";
