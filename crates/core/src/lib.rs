//! `garments-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod event;
pub mod id;
pub mod pagination;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, execute};
pub use entity::Entity;
pub use error::{DomainError, DomainResult, check_max_len, check_required};
pub use event::Event;
pub use id::{TenantId, UserId, parse_id};
pub use pagination::{Page, PageInfo, PageRequest};
pub use value_object::{Money, ValueObject};

#[doc(hidden)]
pub use uuid;
