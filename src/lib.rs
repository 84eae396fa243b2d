//! Status checks for the Python documentation and PEP sites: fetch pages,
//! extract their status fields and report where they differ from what is
//! expected.

pub mod cache;
pub mod compare;
pub mod error;
pub mod fetcher;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod report;
pub mod settings;

#[cfg(test)]
pub(crate) mod testing;
