//! Concrete metric implementations populating the default registry, so a
//! deployment has at least one of each kind of computation to dispatch to
//! out of the box.
mod blocks;
mod bytes_added;
mod edit_count;
mod live_account;
mod namespace_of_edits;
mod revert_rate;
mod survival;
mod threshold;
mod time_to_threshold;

pub use blocks::Blocks;
pub use bytes_added::BytesAdded;
pub use edit_count::EditCount;
pub use live_account::LiveAccount;
pub use namespace_of_edits::NamespaceOfEdits;
pub use revert_rate::RevertRate;
pub use survival::Survival;
pub use threshold::Threshold;
pub use time_to_threshold::TimeToThreshold;
