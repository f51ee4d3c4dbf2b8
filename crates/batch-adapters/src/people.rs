//! Dominio de ejemplo: personas importadas desde texto delimitado.

use std::fmt;
use std::sync::Arc;

use batch_core::{BatchError, ItemSink, ItemTransformer, MemoryTransaction, SharedVecSink, SinkError, TransformError,
                 Transformed};
use batch_persistence::schema::people;
use batch_persistence::ConnectionProvider;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, QueryableByName)]
#[serde(rename_all = "camelCase")]
#[diesel(table_name = people)]
pub struct Person {
    pub first_name: String,
    pub last_name: String,
}

impl Person {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self { first_name: first_name.into(),
               last_name: last_name.into() }
    }
}

impl fmt::Display for Person {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "firstName: {}, lastName: {}", self.first_name, self.last_name)
    }
}

/// Pasa nombre y apellido a mayúsculas.
#[derive(Debug, Clone, Copy, Default)]
pub struct UppercaseTransformer;

impl ItemTransformer<Person, Person> for UppercaseTransformer {
    fn transform(&self, person: Person) -> Result<Transformed<Person>, TransformError> {
        let transformed = Person::new(person.first_name.to_uppercase(), person.last_name.to_uppercase());
        info!("Converting ({person}) into ({transformed})");
        Ok(Transformed::Keep(transformed))
    }
}

/// Lectura de las personas almacenadas, en orden de inserción.
pub trait PeopleDirectory: Send + Sync {
    fn all(&self) -> Result<Vec<Person>, BatchError>;
}

/// Almacén de personas en memoria. Las escrituras de un chunk sólo son
/// visibles tras el commit de su transacción.
#[derive(Clone, Default)]
pub struct PeopleStore {
    rows: SharedVecSink<Person>,
}

impl PeopleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<Person> {
        self.rows.snapshot()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl ItemSink<Person, MemoryTransaction> for PeopleStore {
    fn write(&mut self, items: &[Person], tx: &mut MemoryTransaction) -> Result<(), SinkError> {
        self.rows.write(items, tx)
    }
}

impl PeopleDirectory for PeopleStore {
    fn all(&self) -> Result<Vec<Person>, BatchError> {
        Ok(self.snapshot())
    }
}

#[derive(Insertable)]
#[diesel(table_name = people)]
struct NewPerson<'a> {
    first_name: &'a str,
    last_name: &'a str,
}

/// Inserta cada chunk en la tabla `people` con la conexión de la
/// transacción del chunk.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgPeopleSink;

impl ItemSink<Person, PgConnection> for PgPeopleSink {
    fn write(&mut self, items: &[Person], conn: &mut PgConnection) -> Result<(), SinkError> {
        let rows: Vec<NewPerson<'_>> = items.iter()
                                            .map(|p| NewPerson { first_name: &p.first_name,
                                                                 last_name: &p.last_name })
                                            .collect();
        diesel::insert_into(people::table).values(&rows)
                                          .execute(conn)
                                          .map(|_| ())
                                          .map_err(|e| SinkError::Write(format!("insert people: {e}")))
    }
}

/// Lectura de `people` ordenada por `person_id`.
pub struct PgPeopleDirectory<P: ConnectionProvider> {
    provider: Arc<P>,
}

impl<P: ConnectionProvider> PgPeopleDirectory<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }
}

impl<P: ConnectionProvider> PeopleDirectory for PgPeopleDirectory<P> {
    fn all(&self) -> Result<Vec<Person>, BatchError> {
        let mut pooled = self.provider.connection()?;
        let conn: &mut PgConnection = &mut pooled;
        let rows: Vec<(String, String)> = people::table.order(people::person_id.asc())
                                                       .select((people::first_name, people::last_name))
                                                       .load(conn)
                                                       .map_err(|e| BatchError::Repository(e.to_string()))?;
        Ok(rows.into_iter().map(|(first, last)| Person::new(first, last)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uppercases_both_fields() {
        let out = UppercaseTransformer.transform(Person::new("Jill", "Doe")).expect("transform");
        assert_eq!(out, Transformed::Keep(Person::new("JILL", "DOE")));
    }

    #[test]
    fn store_only_shows_committed_rows() {
        let mut store = PeopleStore::new();
        let mut tx = MemoryTransaction::default();
        store.write(&[Person::new("A", "B")], &mut tx).expect("write");
        assert!(store.is_empty());
        tx.commit();
        assert_eq!(store.all().expect("all"), vec![Person::new("A", "B")]);

        let mut discarded = MemoryTransaction::default();
        store.write(&[Person::new("C", "D")], &mut discarded).expect("write");
        drop(discarded);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn csv_columns_map_to_fields() {
        let p: Person = serde_json::from_str(r#"{"firstName":"Joe","lastName":"Doe"}"#).expect("json");
        assert_eq!(p, Person::new("Joe", "Doe"));
        assert_eq!(p.to_string(), "firstName: Joe, lastName: Doe");
    }
}
