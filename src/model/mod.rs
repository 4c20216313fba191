pub mod chain;
pub mod price;
pub mod token;

pub use chain::{BSC_CHAIN_ID, ChainDescriptor, NativeCurrency};
pub use price::{Price, PriceSource};
pub use token::TokenBalance;
