//! Test modules for the ctm crate

mod checkpoint_tests;
mod cli_tests;
mod extractor_tests;
mod trigger_tests;
