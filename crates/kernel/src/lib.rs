//! Curato kernel library.
//!
//! Enrichment proxy for a registry of server documents: compiles client
//! filters into safe two-stage queries, joins engagement statistics,
//! derives quality signals, and caches the default listing.
//! The `curato` binary serves it over HTTP.

pub mod cache;
pub mod config;
pub mod db;
pub mod enrich;
pub mod error;
pub mod models;
pub mod query;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
