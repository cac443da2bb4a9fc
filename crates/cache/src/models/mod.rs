mod entry;

pub use self::entry::CacheEntry;
pub(crate) use self::entry::{EntryRow, unix_millis};
