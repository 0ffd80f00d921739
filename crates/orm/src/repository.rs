//! Repositories - typed data access for one entity
//!
//! [`Repository`] carries every operation as a default method over
//! [`Repository::database`]; custom repositories implement that one method
//! and add their own queries on top. [`EntityRepository`] is the stock
//! implementation.

use std::marker::PhantomData;

use crate::converter::ResultSet;
use crate::database::Database;
use crate::entity::Entity;
use crate::error::ModelResult;
use crate::query::{PredicateBuilder, Root};
use crate::transaction::StoreOutcome;

pub trait Repository<T: Entity> {
    fn database(&self) -> &Database;

    /// Find an entity by its identifier
    fn find(&self, id: i64) -> ModelResult<Option<T>> {
        self.database().find_by_id::<T>(id)
    }

    fn find_all(&self) -> ModelResult<Vec<T>> {
        self.database().find_all::<T, _>(|_, _| {})
    }

    fn find_where<F>(&self, filter: F) -> ModelResult<Vec<T>>
    where
        F: FnOnce(&mut Root, &mut PredicateBuilder),
    {
        self.database().find_all::<T, F>(filter)
    }

    fn find_one<F>(&self, filter: F) -> ModelResult<Option<T>>
    where
        F: FnOnce(&mut Root, &mut PredicateBuilder),
    {
        self.database().find_one::<T, F>(filter)
    }

    fn query_raw<F, R, G>(&self, filter: F, transformer: G) -> ModelResult<Vec<R>>
    where
        F: FnOnce(&mut Root, &mut PredicateBuilder),
        G: FnMut(ResultSet) -> R,
    {
        self.database().query_raw::<T, F, R, G>(filter, transformer)
    }

    fn count(&self) -> ModelResult<u64> {
        self.database().count::<T, _>(|_, _| {})
    }

    fn count_where<F>(&self, filter: F) -> ModelResult<u64>
    where
        F: FnOnce(&mut Root, &mut PredicateBuilder),
    {
        self.database().count::<T, F>(filter)
    }

    /// Store an entity and its cascade
    fn store(&self, entity: &mut T) -> ModelResult<StoreOutcome> {
        self.database().store(entity)
    }

    fn store_all(&self, entities: &mut [T]) -> ModelResult<Vec<StoreOutcome>> {
        self.database().store_all(entities)
    }

    fn delete(&self, id: i64) -> ModelResult<bool> {
        Ok(self.database().delete::<T>(&[id])? > 0)
    }

    fn delete_all(&self, ids: &[i64]) -> ModelResult<usize> {
        self.database().delete::<T>(ids)
    }

    fn delete_where<F>(&self, filter: F) -> ModelResult<usize>
    where
        F: FnOnce(&mut Root, &mut PredicateBuilder),
    {
        self.database().delete_where::<T, F>(filter)
    }
}

/// Repository with no queries beyond the defaults
pub struct EntityRepository<'a, T: Entity> {
    database: &'a Database,
    _entity: PhantomData<fn() -> T>,
}

impl<'a, T: Entity> EntityRepository<'a, T> {
    pub fn new(database: &'a Database) -> Self {
        Self {
            database,
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> Repository<T> for EntityRepository<'_, T> {
    fn database(&self) -> &Database {
        self.database
    }
}

impl Database {
    /// Repository for `T` over this database
    pub fn repository<T: Entity>(&self) -> EntityRepository<'_, T> {
        EntityRepository::new(self)
    }
}
