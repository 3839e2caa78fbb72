//! Handler sets and connect helpers for the application's channels.
//!
//! Each submodule covers one channel family: a `handlers` function wiring a
//! view model into a [`Handlers`](crate::dispatch::Handlers) set, and (with
//! the `transport-websocket` feature) a `connect` helper that registers the
//! channel with a [`ChannelRegistry`](crate::registry::ChannelRegistry) under
//! its well-known name.
//!
//! The notifications and owner-dashboard channels are skipped on development
//! hosts; per-project and per-team channels connect everywhere.

pub mod dashboard;
pub mod notifications;
pub mod project;
pub mod team;
