pub mod knowledge;
pub mod parsers;
pub mod registry;
pub mod samtools;
pub mod validation;

pub use knowledge::{EnsemblSource, KnowledgeRouter, KnowledgeSource};
pub use parsers::FormatRegistry;
pub use registry::ToolRegistry;
pub use validation::GenomicValidator;
