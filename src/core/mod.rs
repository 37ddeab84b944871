pub mod errors;
pub mod transaction;

pub use errors::ServiceError;
pub use transaction::ClassifiedTransaction;
