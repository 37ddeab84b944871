pub mod ethereum;
pub mod traits;

pub use ethereum::EthereumFeed;
pub use traits::{ChainFeed, FeedError, PendingTransaction};
