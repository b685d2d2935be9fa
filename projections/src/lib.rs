//! Projection implementations for paysaga.
//!
//! # Overview
//!
//! [`PostgresProjectionStore`] keeps the two read models of the settlement
//! saga in their own tables:
//!
//! ```text
//! Stream ──► Choreographer ──► payment_promises
//!                         └──► member_bills
//!                                   ▲
//!                   status page ────┘ (queries by user)
//! ```
//!
//! The store shares its database with the event log in the default
//! deployment, but only needs a pool; pointing it at a separate database
//! works the same way.

pub mod postgres;

pub use postgres::PostgresProjectionStore;
