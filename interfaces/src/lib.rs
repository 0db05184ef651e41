pub mod defs;
pub mod empty;
pub mod state;

pub use defs::{
    FeatureVector, FilingEntry, LanguageModel, LlmTask, MarketauxArticle, MarketauxSymbol,
    NewsApiArticle, NewsApiSource, RawRecord, TrainingRow,
};
pub use empty::EmptyLanguageModel;
pub use state::TrainingLog;
