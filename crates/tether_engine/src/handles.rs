//! Table of script objects pinned for the host.
//!
//! Ids are `index + 1` so zero stays free for the empty handle. Freed ids are
//! reused most-recent-first.

use tether_wire::ForeignHandle;

pub(crate) struct HandleTable<T> {
    entries: Vec<Option<T>>,
    free: Vec<u32>,
    live: usize,
}

impl<T> HandleTable<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    /// `None` once every `u32` id is taken.
    pub fn insert(&mut self, value: T) -> Option<ForeignHandle> {
        let index = match self.free.pop() {
            Some(index) => {
                self.entries[index as usize] = Some(value);
                index
            }
            None => {
                let index = u32::try_from(self.entries.len()).ok().filter(|&i| i < u32::MAX)?;
                self.entries.push(Some(value));
                index
            }
        };
        self.live += 1;
        ForeignHandle::new(index + 1)
    }

    pub fn get(&self, handle: ForeignHandle) -> Option<&T> {
        self.entries.get(Self::index(handle))?.as_ref()
    }

    /// The caller drops the returned value, outside any borrow of the table.
    pub fn remove(&mut self, handle: ForeignHandle) -> Option<T> {
        let index = Self::index(handle);
        let value = self.entries.get_mut(index)?.take()?;
        self.free.push(index as u32);
        self.live -= 1;
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn drain(&mut self) -> Vec<T> {
        self.free.clear();
        self.live = 0;
        self.entries.drain(..).flatten().collect()
    }

    fn index(handle: ForeignHandle) -> usize {
        (handle.get() - 1) as usize
    }
}
