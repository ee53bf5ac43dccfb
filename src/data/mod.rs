//! Tabular input and its preparation into an observation series.

pub mod prepare;
pub mod synthetic;
pub mod table;

pub use prepare::{PrepareError, parse_date, prepare};
pub use synthetic::{OutbreakSpec, SyntheticError, generate_outbreak};
pub use table::{Column, ColumnType, Dataset, TableError};
