//! Fixed-capacity file table.
//!
//! The table is an arena of `capacity` slots; a slot index is the object
//! handle baked into every capability the server issues. Indices stay
//! stable from the open that creates a file until the close that releases
//! it, and are recycled lowest-first afterwards.

use ramdiskfs_types::SlotIndex;

use crate::memory::Buffer;

/// One named in-memory file.
#[derive(Debug)]
pub struct FileEntry {
    name: Vec<u8>,
    buffer: Buffer,
    current_size: usize,
    mode: u32,
    open_count: u32,
}

impl FileEntry {
    pub(crate) fn new(name: &[u8], buffer: Buffer, mode: u32) -> Self {
        Self {
            name: name.to_vec(),
            buffer,
            current_size: 0,
            mode,
            open_count: 1,
        }
    }

    /// Rebuild an entry from saved state. Caller guarantees
    /// `current_size <= buffer.len()`.
    pub(crate) fn restored(
        name: Vec<u8>,
        buffer: Buffer,
        current_size: usize,
        mode: u32,
        open_count: u32,
    ) -> Self {
        debug_assert!(current_size <= buffer.len());
        Self {
            name,
            buffer,
            current_size,
            mode,
            open_count,
        }
    }

    pub fn name(&self) -> &[u8] {
        &self.name
    }

    /// Logical length of valid data.
    pub fn current_size(&self) -> usize {
        self.current_size
    }

    /// Capacity of the backing buffer.
    pub fn allocated_size(&self) -> usize {
        self.buffer.len()
    }

    /// Mode bits given by the creating open.
    pub fn mode(&self) -> u32 {
        self.mode
    }

    /// Opens not yet matched by a close.
    pub fn open_count(&self) -> u32 {
        self.open_count
    }

    /// The valid bytes of the file.
    pub fn data(&self) -> &[u8] {
        &self.buffer.as_slice()[..self.current_size]
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut Buffer {
        &mut self.buffer
    }

    /// Extend the logical size to `size` if it is larger. Never shrinks.
    pub(crate) fn extend_to(&mut self, size: usize) {
        debug_assert!(size <= self.buffer.len());
        if size > self.current_size {
            self.current_size = size;
        }
    }

    pub(crate) fn retain(&mut self) {
        self.open_count = self.open_count.saturating_add(1);
    }

    /// Drop one open; returns the remaining count.
    pub(crate) fn release(&mut self) -> u32 {
        self.open_count = self.open_count.saturating_sub(1);
        self.open_count
    }

    pub(crate) fn into_buffer(self) -> Buffer {
        self.buffer
    }
}

/// Registry of in-memory files.
#[derive(Debug)]
pub struct FileTable {
    slots: Vec<Option<FileEntry>>,
}

impl FileTable {
    /// Create a table with `capacity` free slots.
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots in use.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Slot holding a file called `name`.
    pub fn find_by_name(&self, name: &[u8]) -> Option<SlotIndex> {
        self.iter()
            .find(|(_, entry)| entry.name == name)
            .map(|(slot, _)| slot)
    }

    /// Lowest free slot.
    pub fn find_free_slot(&self) -> Option<SlotIndex> {
        self.slots
            .iter()
            .position(Option::is_none)
            .map(|i| SlotIndex::new(i as u32))
    }

    /// Put a fresh file into a free slot.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is out of range or already occupied; callers obtain
    /// it from [`FileTable::find_free_slot`].
    pub fn occupy(&mut self, slot: SlotIndex, name: &[u8], buffer: Buffer, mode: u32) {
        let cell = &mut self.slots[slot.as_usize()];
        assert!(cell.is_none(), "occupy of busy {slot}");
        *cell = Some(FileEntry::new(name, buffer, mode));
    }

    /// Put a restored entry into `slot`. Fails if the slot is out of range or
    /// taken.
    pub(crate) fn insert(&mut self, slot: SlotIndex, entry: FileEntry) -> Result<(), FileEntry> {
        match self.slots.get_mut(slot.as_usize()) {
            Some(cell) if cell.is_none() => {
                *cell = Some(entry);
                Ok(())
            }
            _ => Err(entry),
        }
    }

    /// Clear a slot, handing its entry (and buffer) back for freeing.
    pub fn release(&mut self, slot: SlotIndex) -> Option<FileEntry> {
        self.slots.get_mut(slot.as_usize()).and_then(Option::take)
    }

    /// Bounds-checked lookup; `None` for out-of-range or free slots.
    pub fn get(&self, slot: SlotIndex) -> Option<&FileEntry> {
        self.slots.get(slot.as_usize()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, slot: SlotIndex) -> Option<&mut FileEntry> {
        self.slots.get_mut(slot.as_usize()).and_then(Option::as_mut)
    }

    /// In-use slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = (SlotIndex, &FileEntry)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|e| (SlotIndex::new(i as u32), e)))
    }

    /// Empty every slot, returning the entries that were in use.
    pub fn drain(&mut self) -> Vec<FileEntry> {
        self.slots.iter_mut().filter_map(Option::take).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buf(n: usize) -> Buffer {
        Buffer::from_vec(vec![0; n])
    }

    #[test]
    fn test_free_slots_low_to_high() {
        let mut table = FileTable::new(3);
        assert_eq!(table.find_free_slot(), Some(SlotIndex::new(0)));

        table.occupy(SlotIndex::new(0), b"a", buf(1), 0o644);
        table.occupy(SlotIndex::new(1), b"b", buf(1), 0o644);
        assert_eq!(table.find_free_slot(), Some(SlotIndex::new(2)));

        table.release(SlotIndex::new(0));
        assert_eq!(table.find_free_slot(), Some(SlotIndex::new(0)));
    }

    #[test]
    fn test_full_table_has_no_free_slot() {
        let mut table = FileTable::new(1);
        table.occupy(SlotIndex::new(0), b"only", buf(1), 0);
        assert_eq!(table.find_free_slot(), None);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_find_by_name_is_exact() {
        let mut table = FileTable::new(4);
        table.occupy(SlotIndex::new(2), b"foo", buf(1), 0);
        assert_eq!(table.find_by_name(b"foo"), Some(SlotIndex::new(2)));
        assert_eq!(table.find_by_name(b"fo"), None);
        assert_eq!(table.find_by_name(b"foo\0"), None);
    }

    #[test]
    fn test_get_bounds_and_occupancy() {
        let mut table = FileTable::new(2);
        assert!(table.get(SlotIndex::new(0)).is_none());
        assert!(table.get(SlotIndex::new(7)).is_none());
        assert!(table.get_mut(SlotIndex::new(u32::MAX)).is_none());

        table.occupy(SlotIndex::new(1), b"x", buf(8), 0o600);
        let entry = table.get(SlotIndex::new(1)).unwrap();
        assert_eq!(entry.current_size(), 0);
        assert_eq!(entry.allocated_size(), 8);
        assert_eq!(entry.open_count(), 1);
        assert_eq!(entry.mode(), 0o600);
    }

    #[test]
    fn test_release_returns_buffer() {
        let mut table = FileTable::new(1);
        table.occupy(SlotIndex::new(0), b"x", buf(8), 0);
        let entry = table.release(SlotIndex::new(0)).unwrap();
        assert_eq!(entry.into_buffer().len(), 8);
        assert!(table.release(SlotIndex::new(0)).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_extend_never_shrinks() {
        let mut entry = FileEntry::new(b"x", buf(10), 0);
        entry.extend_to(6);
        entry.extend_to(3);
        assert_eq!(entry.current_size(), 6);
        assert_eq!(entry.data().len(), 6);
    }

    #[test]
    fn test_insert_rejects_busy_or_out_of_range() {
        let mut table = FileTable::new(1);
        assert!(table.insert(SlotIndex::new(0), FileEntry::new(b"a", buf(1), 0)).is_ok());
        assert!(table.insert(SlotIndex::new(0), FileEntry::new(b"b", buf(1), 0)).is_err());
        assert!(table.insert(SlotIndex::new(5), FileEntry::new(b"c", buf(1), 0)).is_err());
    }

    #[test]
    #[should_panic]
    fn test_occupy_busy_slot_panics() {
        let mut table = FileTable::new(1);
        table.occupy(SlotIndex::new(0), b"a", buf(1), 0);
        table.occupy(SlotIndex::new(0), b"b", buf(1), 0);
    }
}
