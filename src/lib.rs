pub mod config;
pub mod contract;
pub mod error;
pub mod indexer;
pub mod logging;
pub mod nft;
pub mod ownership;
pub mod session;
pub mod wallet;
pub mod workflow;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use error::{
    TxStage,
    WorkflowError,
};
