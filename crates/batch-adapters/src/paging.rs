//! Fuente paginada sobre Postgres.
//!
//! Ejecuta `query` (que debe incluir un `ORDER BY` estable) con
//! `LIMIT page_size OFFSET n`, página a página. La posición confirmada en el
//! contexto es el número de filas ya entregadas; al reabrir se continúa desde
//! ahí. Usa su propia conexión del pool, distinta de la del chunk, así que el
//! pool necesita al menos dos conexiones.

use std::collections::VecDeque;

use batch_core::constants::SOURCE_OFFSET_KEY;
use batch_core::{ExecutionContext, ItemSource, SourceError};
use batch_persistence::ConnectionProvider;
use diesel::pg::{Pg, PgConnection};
use diesel::prelude::*;
use diesel::deserialize::QueryableByName;
use log::debug;

pub struct PgPagingSource<T, P: ConnectionProvider> {
    provider: P,
    query: String,
    page_size: usize,
    position: u64,
    buffer: VecDeque<T>,
    exhausted: bool,
}

impl<T, P> PgPagingSource<T, P>
    where T: QueryableByName<Pg> + Send + 'static,
          P: ConnectionProvider
{
    pub fn new(provider: P, query: impl Into<String>, page_size: usize) -> Self {
        Self { provider,
               query: query.into(),
               page_size: page_size.max(1),
               position: 0,
               buffer: VecDeque::new(),
               exhausted: false }
    }

    fn fetch_page(&mut self) -> Result<(), SourceError> {
        let start = self.position;
        let sql = format!("{} LIMIT {} OFFSET {}", self.query, self.page_size, start);
        let mut pooled = self.provider
                             .connection()
                             .map_err(|e| SourceError::Unreadable(e.to_string()))?;
        let conn: &mut PgConnection = &mut pooled;
        let rows: Vec<T> = diesel::sql_query(sql).load(conn)
                                                 .map_err(|e| SourceError::Unreadable(format!("page at {start}: {e}")))?;
        debug!("source:page offset={} rows={}", start, rows.len());
        if rows.len() < self.page_size {
            self.exhausted = true;
        }
        self.buffer.extend(rows);
        Ok(())
    }
}

impl<T, P> ItemSource<T> for PgPagingSource<T, P>
    where T: QueryableByName<Pg> + Send + 'static,
          P: ConnectionProvider
{
    fn open(&mut self, context: &ExecutionContext) -> Result<(), SourceError> {
        self.position = context.get_u64(SOURCE_OFFSET_KEY).unwrap_or(0);
        self.buffer.clear();
        self.exhausted = false;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<T>, SourceError> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fetch_page()?;
        }
        let item = self.buffer.pop_front();
        if item.is_some() {
            self.position += 1;
        }
        Ok(item)
    }

    fn update(&mut self, context: &mut ExecutionContext) {
        context.put(SOURCE_OFFSET_KEY, self.position);
    }

    fn close(&mut self) {
        self.buffer.clear();
    }
}
