use batch_core::{BatchError, BatchEvent, BatchEventKind, EventStore};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::{debug, error};
use uuid::Uuid;

use super::rows::{EventRow, NewEventRow};
use super::{with_retry, ConnectionProvider};
use crate::error::PersistenceError;
use crate::schema::batch_event_log;

/// Bitácora de eventos en Postgres. `seq` (BIGSERIAL) da el orden total; la
/// tabla rechaza UPDATE/DELETE mediante trigger.
pub struct PgEventStore<P: ConnectionProvider> {
    provider: P,
}

impl<P: ConnectionProvider> PgEventStore<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

fn decode(row: EventRow) -> Result<BatchEvent, PersistenceError> {
    let kind: BatchEventKind = serde_json::from_value(row.payload)?;
    if kind.name() != row.event_type {
        return Err(PersistenceError::Corrupt(format!("event_type '{}' does not match payload '{}'",
                                                     row.event_type,
                                                     kind.name())));
    }
    Ok(BatchEvent { seq: u64::try_from(row.seq).unwrap_or_default(),
                    job_execution_id: row.job_execution_id,
                    kind,
                    ts: row.ts })
}

impl<P: ConnectionProvider> EventStore for PgEventStore<P> {
    fn append_kind(&self, job_execution_id: Uuid, kind: BatchEventKind) -> Result<BatchEvent, BatchError> {
        let payload = serde_json::to_value(&kind).map_err(PersistenceError::from)?;
        let event_type = kind.name();
        let (seq, ts): (i64, DateTime<Utc>) = with_retry(|| {
            let mut conn = self.provider.connection()?;
            let inserted = diesel::insert_into(batch_event_log::table)
                .values(NewEventRow { job_execution_id: &job_execution_id,
                                      event_type,
                                      payload: &payload })
                .returning((batch_event_log::seq, batch_event_log::ts))
                .get_result(&mut conn)?;
            Ok(inserted)
        }).map_err(|e| {
              error!("event:append failed execution={job_execution_id} type={event_type}: {e}");
              e
          })?;
        debug!("event:append execution={job_execution_id} seq={seq} type={event_type}");
        Ok(BatchEvent { seq: u64::try_from(seq).unwrap_or_default(),
                        job_execution_id,
                        kind,
                        ts })
    }

    fn list(&self, job_execution_id: Uuid) -> Result<Vec<BatchEvent>, BatchError> {
        let rows: Vec<EventRow> = with_retry(|| {
            let mut conn = self.provider.connection()?;
            let rows = batch_event_log::table.filter(batch_event_log::job_execution_id.eq(job_execution_id))
                                             .order(batch_event_log::seq.asc())
                                             .select(EventRow::as_select())
                                             .load(&mut conn)?;
            Ok(rows)
        })?;
        Ok(rows.into_iter().map(decode).collect::<Result<Vec<_>, _>>()?)
    }
}
