//! Driven adapters: HTTP clients, prompt rendering and report output.

pub mod backend;
pub mod llm;
pub mod report;
pub mod similarity;
pub mod templating;
