// Application layer - use cases and orchestration on top of the domain.
// The service owns per-group state (ledger, cached results, revision) and
// talks to storage through the `BillStore` port.

mod cache;
pub mod error;
pub mod service;

pub use cache::LedgerSnapshot;
pub use error::*;
pub use service::*;
