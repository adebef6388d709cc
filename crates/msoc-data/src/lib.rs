//! MicroSociety Data - experience collection and datasets
//!
//! `DataCollector` records `(state, action, reward, next_state, done)`
//! tuples from running worlds into batched JSON session files. `Dataset`
//! reads those files (or exports) back as `msoc-rl` experiences.

// Clippy pedantic allows - these are intentional design choices
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod collector;
pub mod dataset;
pub mod error;
pub mod record;

pub use collector::{CollectionStats, DataCollector, DEFAULT_MAX_PER_FILE};
pub use dataset::Dataset;
pub use error::{DataError, Result};
pub use record::ExperienceRecord;
