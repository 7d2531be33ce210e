pub mod disposal;
pub mod error;
pub mod events;
pub mod fifo;
pub mod lots;
pub mod normalize;
pub mod pooling;
pub mod price;
pub mod run;
pub mod tax_year;
pub mod warnings;

pub use disposal::DisposalRecord;
pub use events::Event;
pub use normalize::RawInput;
pub use pooling::PoolingPolicy;
pub use price::{CachedPrices, PriceTable};
pub use run::{run_all, AssetRun, Method};
pub use tax_year::TaxYear;
