use catalog_client::CollectionSort;
use parking_lot::RwLock;
use tracing::debug;

/// The user's chosen collections sort order.
///
/// Constructed once and shared by `Arc` with whoever reads or changes it.
#[derive(Debug, Default)]
pub struct SortOptionStore {
    current: RwLock<CollectionSort>,
}

impl SortOptionStore {
    pub fn new(initial: CollectionSort) -> Self {
        Self {
            current: RwLock::new(initial),
        }
    }

    pub fn get(&self) -> CollectionSort {
        *self.current.read()
    }

    pub fn set(&self, sort: CollectionSort) {
        *self.current.write() = sort;
        debug!(sort = %sort, "Collections sort changed");
    }
}
