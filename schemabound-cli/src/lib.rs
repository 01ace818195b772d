//! Schemabound command line front end.

pub mod config;
pub mod constant;
pub mod document;
pub mod exception;
pub mod retrieve;
pub mod share;
pub mod utils;

pub mod cli;
