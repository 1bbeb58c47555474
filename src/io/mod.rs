// Export of computed group data (balances, settlements) to files.

pub mod export;

pub use export::*;
