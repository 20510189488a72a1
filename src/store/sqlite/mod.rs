//! SQLite implementation of the storage traits.
//!
//! Dynamic SQL is generated from the model's column attributes; all values
//! travel as bound parameters. Composite (JSON) values are stored as text.

mod connection;
mod sql;


pub use connection::SqliteDatabase;
