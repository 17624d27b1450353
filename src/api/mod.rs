//! Client operations built from node routes, proof-of-work and signing

pub mod block;
pub mod high_level;
pub mod input_selection;
pub mod transaction;

pub use self::block::PowMode;
pub use high_level::{DEFAULT_RETRY_UNTIL_INCLUDED_INTERVAL, DEFAULT_RETRY_UNTIL_INCLUDED_MAX_ATTEMPTS};
pub use input_selection::{select_inputs, InputReservations};
pub use transaction::PrepareTransactionOptions;
