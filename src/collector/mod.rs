pub mod fetcher;
pub mod rates;
pub mod scheduler;

pub use fetcher::{FetchError, StatsFetcher};
pub use rates::{DerivedStats, RateComputer};
pub use scheduler::{CollectionScheduler, SchedulerSettings};
