//! Outer surfaces: the command line and CSV import.

pub mod cli;
pub mod csv;
