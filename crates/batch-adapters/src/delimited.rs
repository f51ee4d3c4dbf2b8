//! Fuente de registros de texto delimitado.
//!
//! Cada línea se mapea a `T` usando los nombres de columna configurados
//! (no se leen cabeceras del archivo; las primeras `lines_to_skip` líneas se
//! descartan). La posición guardada en el contexto cuenta registros de
//! datos consumidos, incluidos los malformados, de modo que un restart nunca
//! vuelve a leer un registro ya confirmado ni uno ya saltado.

use std::fs::File;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use batch_core::constants::SOURCE_OFFSET_KEY;
use batch_core::{ExecutionContext, ItemSource, SourceError};
use csv::{ReaderBuilder, StringRecord, StringRecordsIntoIter};
use log::debug;
use serde::de::DeserializeOwned;

pub struct DelimitedSource<T> {
    path: PathBuf,
    columns: StringRecord,
    delimiter: u8,
    lines_to_skip: usize,
    records: Option<StringRecordsIntoIter<File>>,
    position: u64,
    _item: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> DelimitedSource<T> {
    pub fn new<S: AsRef<str>>(path: impl AsRef<Path>, columns: &[S]) -> Self {
        Self { path: path.as_ref().to_path_buf(),
               columns: columns.iter().map(|c| c.as_ref()).collect(),
               delimiter: b',',
               lines_to_skip: 0,
               records: None,
               position: 0,
               _item: PhantomData }
    }

    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn lines_to_skip(mut self, lines: usize) -> Self {
        self.lines_to_skip = lines;
        self
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    fn decode(&self, record: &StringRecord) -> Result<T, SourceError> {
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        if record.len() != self.columns.len() {
            return Err(SourceError::Malformed { line,
                                                reason: format!("expected {} fields, found {}",
                                                                self.columns.len(),
                                                                record.len()) });
        }
        record.deserialize(Some(&self.columns))
              .map_err(|e| SourceError::Malformed { line,
                                                    reason: e.to_string() })
    }
}

impl<T: DeserializeOwned> ItemSource<T> for DelimitedSource<T> {
    fn open(&mut self, context: &ExecutionContext) -> Result<(), SourceError> {
        let offset = context.get_u64(SOURCE_OFFSET_KEY).unwrap_or(0);
        let reader = ReaderBuilder::new().has_headers(false)
                                         .delimiter(self.delimiter)
                                         .flexible(true)
                                         .trim(csv::Trim::All)
                                         .from_path(&self.path)
                                         .map_err(|e| {
                                             SourceError::Unreadable(format!("{}: {e}", self.path.display()))
                                         })?;
        let mut records = reader.into_records();
        for _ in 0..self.lines_to_skip {
            if records.next().is_none() {
                break;
            }
        }
        for skipped in 0..offset {
            if records.next().is_none() {
                return Err(SourceError::Unreadable(format!("{}: restart offset {offset} beyond {skipped} records",
                                                           self.path.display())));
            }
        }
        debug!("source:open path={} offset={}", self.path.display(), offset);
        self.records = Some(records);
        self.position = offset;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<T>, SourceError> {
        let records = self.records
                          .as_mut()
                          .ok_or_else(|| SourceError::Unreadable(format!("{} not opened", self.path.display())))?;
        let Some(record) = records.next() else {
            return Ok(None);
        };
        self.position += 1;
        match record {
            Ok(record) => self.decode(&record).map(Some),
            Err(e) => Err(SourceError::Malformed { line: e.position().map(|p| p.line()).unwrap_or(0),
                                                   reason: e.to_string() }),
        }
    }

    fn update(&mut self, context: &mut ExecutionContext) {
        context.put(SOURCE_OFFSET_KEY, self.position);
    }

    fn close(&mut self) {
        self.records = None;
    }
}
