pub mod directory;
pub mod ledger;

pub use directory::{CustomerSummary, Directory, UserSummary};
pub use ledger::{CallHistoryPage, Ledger, PaginationMetadata};
