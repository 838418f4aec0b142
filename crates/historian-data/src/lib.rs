//! Historian data layer.
//!
//! - [`historian`]: Postgres repository over the time-series historian table
//! - [`sql`]: SQL extraction from model output and the read-only guard
//! - [`knowledge`]: DDL, documentation and question/SQL pairs for prompting
//! - [`generator`]: text-to-SQL, plot spec generation, SQL explanation
//! - [`chart`]: QuickChart (Chart.js) configs, URLs and HTML pages
//! - [`report`]: markdown report assembly and result analysis

pub mod chart;
pub mod error;
pub mod generator;
pub mod historian;
pub mod knowledge;
pub mod report;
pub mod sql;

pub use chart::{ChartConfig, ChartKind, ChartOptions, PlotSpec};
pub use error::{DataError, Result};
pub use generator::{SqlGenerator, TextCompletion};
pub use historian::{HistorianRepository, PgHistorian, QueryResult, Row};
pub use knowledge::{KnowledgeBase, TrainingExample};
pub use report::{Analysis, ReportRequest};
pub use sql::SqlGuardError;
