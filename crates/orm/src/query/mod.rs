//! Query Builder Module - join trees, predicates and SQL rendering
//!
//! A query filter receives a [`Root`] and a [`PredicateBuilder`]; the
//! [`QueryProcessor`] resolves both against the schema and renders a
//! [`Query`].

pub mod alias;
pub mod association;
pub mod builder;
pub mod joins;
pub mod ordering;
pub mod pagination;
pub mod sql_generation;
pub mod types;
pub mod where_clause;

pub use alias::AliasContext;
pub use association::{Association, AssociationProcessor, JoinKeys, JoinResolution};
pub use builder::{Condition, Junction, Predicate, PredicateBuilder};
pub use joins::Root;
pub use sql_generation::QueryProcessor;
pub use types::{JoinMode, JunctionKind, OrderDirection, Query};
