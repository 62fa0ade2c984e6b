#![deny(missing_docs)]

//! Core library for the project cost estimator.
//!
//! A project document is stored and analyzed, similar historical tasks are retrieved from a
//! search index, and a generative model turns both into a priced task table.

/// Document-analysis client and its poll loop.
pub mod analysis;
/// HTTP routing and REST handlers.
pub mod api;
/// Generative-text client abstraction.
pub mod completion;
/// Environment-driven configuration management.
pub mod config;
/// Estimation pipeline: prompts, formulas, materialization, orchestration.
pub mod estimate;
/// Knowledge-base loading and synthetic data.
pub mod knowledge_base;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline metrics helpers.
pub mod metrics;
/// Profile rate tables and their sources.
pub mod rates;
/// Lenient number and text coercion shared by parsers.
pub mod sanitize;
/// Search index client.
pub mod search;
/// Workbook reading and writing.
pub mod spreadsheet;
/// Object storage for uploaded documents and knowledge-base files.
pub mod storage;
/// Closed vocabularies and formula revisions.
pub mod vocabulary;
