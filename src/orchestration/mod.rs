pub mod pipeline;

pub use pipeline::MangaTranslatorPipeline;
