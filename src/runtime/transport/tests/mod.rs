//! Transport unit tests

mod comm;
