//! MemTable test suite

mod table_tests;
