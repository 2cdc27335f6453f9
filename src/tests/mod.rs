pub mod common;

mod batch_tests;
mod store_tests;
