pub mod news_repository;
pub mod polly_synthesis_provider;
pub mod synthesis_provider;

pub use news_repository::{NewsRepository, NewsStore};
pub use polly_synthesis_provider::PollySynthesisProvider;
pub use synthesis_provider::SynthesisProvider;
