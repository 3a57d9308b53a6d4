//! Providers Module - External data sources
//!
//! JSON-RPC for deployed bytecode and the Etherscan V2 explorer for
//! verified source.

pub mod explorer;
pub mod rpc;

pub use explorer::{ExplorerClient, VerifiedSource};
pub use rpc::RpcProvider;
