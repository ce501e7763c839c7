pub mod history;
pub mod temp_unblocks;

pub use history::{BlockRecord, BypassRecord};
pub use temp_unblocks::TempUnblocks;
