pub mod balance_reader;
