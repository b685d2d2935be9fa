//! # Paysaga Consumer
//!
//! Process that runs the settlement saga: it tails the saga topic, persists
//! every event, choreographs the follow-up events and projections, and serves
//! the intake, status and live-update routes.
//!
//! Configuration comes from the environment, see [`config::Config`].

pub mod config;
