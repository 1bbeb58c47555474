mod balance;
mod bill;
mod group;
mod integrity;
mod ledger;
mod money;
mod settlement;

pub use balance::*;
pub use bill::*;
pub use group::*;
pub use integrity::*;
pub use ledger::*;
pub use money::*;
pub use settlement::*;
