pub mod outbound;

pub use outbound::{backend, llm, report, similarity, templating};
