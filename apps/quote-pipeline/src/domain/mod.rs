//! Domain Layer
//!
//! The innermost layer containing business logic with zero infrastructure dependencies.
//! This layer defines:
//!
//! - **Value Objects**: Immutable domain types with equality by value
//! - **Domain Services**: Stateless business logic (validation, bisection, SMA)
//!
//! # Bounded Contexts
//!
//! - [`quote`]: Quote normalization, points and validation rules
//! - [`ingest`]: Stream batches, cursors and bisection bookkeeping
//! - [`aggregation`]: Window sets, SMA computation and aggregate records

pub mod aggregation;
pub mod ingest;
pub mod quote;
pub mod shared;
