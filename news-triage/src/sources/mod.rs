pub mod edgar;
pub mod marketaux;
pub mod newsapi;

pub use edgar::EdgarFilingSource;
pub use marketaux::MarketauxSource;
pub use newsapi::NewsApiSource;
