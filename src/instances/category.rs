use super::*;

/// Ordinal of the "unallocated" window. It is always physically last and never
/// takes part in before/after comparisons.
pub const UNALLOCATED_ORDINAL: i32 = -1;

/// Bookkeeping for one category: the contiguous slot range it owns and its
/// neighbours in ordinal order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CategoryWindow {
    pub(super) id: Option<BlockId>,
    pub(super) start: usize,
    pub(super) len: usize,
    pub(super) ordinal: i32,
    pub(super) prev: Option<CategoryHandle>,
    pub(super) next: Option<CategoryHandle>,
}

impl CategoryWindow {
    /// Block id of a real category, `None` for the pseudo-categories.
    pub fn id(&self) -> Option<BlockId> {
        self.id
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn ordinal(&self) -> i32 {
        self.ordinal
    }

    pub fn prev(&self) -> Option<CategoryHandle> {
        self.prev
    }

    pub fn next(&self) -> Option<CategoryHandle> {
        self.next
    }

    pub fn range(&self) -> CategoryRange {
        CategoryRange {
            start: self.start,
            len: self.len,
        }
    }

    pub fn first_index(&self) -> usize {
        self.start
    }

    /// Last owned slot. For a zero-length window this is the slot just before it.
    pub fn last_index(&self) -> usize {
        debug_assert!(self.start + self.len > 0);
        self.start + self.len - 1
    }

    pub fn contains(&self, slot: usize) -> bool {
        self.range().contains(slot)
    }

    fn end(&self) -> usize {
        self.start + self.len
    }
}

/// Arena of category windows linked in ordinal order: every real category, then
/// "empty", then "unallocated". Together they partition `[0, total_slots)`.
#[derive(Clone, Debug)]
pub struct CategoryChain {
    windows: Vec<CategoryWindow>,
    by_id: Arc<HashMap<BlockId, CategoryHandle>>,
    empty: CategoryHandle,
    unallocated: CategoryHandle,
}

impl CategoryChain {
    pub fn new(block_ids: &[BlockId], total_slots: usize) -> Result<Self, InstanceBufferError> {
        let category_count = block_ids.len();
        let mut windows = Vec::with_capacity(category_count + 2);
        let mut by_id = HashMap::with_capacity(category_count);
        for (ordinal, &id) in block_ids.iter().enumerate() {
            if by_id.insert(id, CategoryHandle(ordinal)).is_some() {
                return Err(InstanceBufferError::DuplicateCategory(id));
            }
            windows.push(CategoryWindow {
                id: Some(id),
                start: 0,
                len: 0,
                ordinal: ordinal as i32,
                prev: ordinal.checked_sub(1).map(CategoryHandle),
                next: Some(CategoryHandle(ordinal + 1)),
            });
        }
        let empty = CategoryHandle(category_count);
        let unallocated = CategoryHandle(category_count + 1);
        windows.push(CategoryWindow {
            id: None,
            start: 0,
            len: 0,
            ordinal: category_count as i32,
            prev: category_count.checked_sub(1).map(CategoryHandle),
            next: Some(unallocated),
        });
        windows.push(CategoryWindow {
            id: None,
            start: 0,
            len: total_slots,
            ordinal: UNALLOCATED_ORDINAL,
            prev: Some(empty),
            next: None,
        });
        Ok(Self {
            windows,
            by_id: Arc::new(by_id),
            empty,
            unallocated,
        })
    }

    pub fn window(&self, handle: CategoryHandle) -> &CategoryWindow {
        &self.windows[handle.0]
    }

    pub fn windows(&self) -> impl Iterator<Item = (CategoryHandle, &CategoryWindow)> {
        self.windows
            .iter()
            .enumerate()
            .map(|(index, window)| (CategoryHandle(index), window))
    }

    pub fn empty(&self) -> CategoryHandle {
        self.empty
    }

    pub fn unallocated(&self) -> CategoryHandle {
        self.unallocated
    }

    pub fn total_slots(&self) -> usize {
        self.window(self.unallocated).end()
    }

    pub fn unallocated_count(&self) -> usize {
        self.window(self.unallocated).len
    }

    pub fn allocated_count(&self) -> usize {
        self.window(self.unallocated).start
    }

    /// Window owning `slot`. Windows are stored in chain order, so their ends are
    /// non-decreasing and the first window ending after `slot` holds it.
    pub fn handle_for_slot(&self, slot: usize) -> CategoryHandle {
        assert!(
            slot < self.total_slots(),
            "slot {slot} is outside the instance buffer of {} slots",
            self.total_slots()
        );
        CategoryHandle(self.windows.partition_point(|window| window.end() <= slot))
    }

    /// `None` resolves to the "empty" category; an unregistered id has no window.
    pub fn handle_for_id(&self, id: Option<BlockId>) -> Option<CategoryHandle> {
        match id {
            Some(id) => self.by_id.get(&id).copied(),
            None => Some(self.empty),
        }
    }

    /// Moves the first unallocated slot to the back of "empty".
    pub fn allocate_from_unallocated(&mut self) -> Option<usize> {
        if self.unallocated_count() == 0 {
            return None;
        }
        debug_assert_eq!(
            self.window(self.empty).end(),
            self.window(self.unallocated).start
        );
        self.expand_right(self.empty);
        Some(self.window(self.empty).last_index())
    }

    /// Returns the last slot of "empty" to "unallocated".
    pub fn release_to_unallocated(&mut self) -> usize {
        assert!(
            !self.window(self.empty).is_empty(),
            "no empty slot left to release"
        );
        self.expand_left(self.unallocated);
        self.window(self.unallocated).first_index()
    }

    /// Grows `handle` one slot to the left, taking the last slot of the nearest
    /// non-empty predecessor.
    pub(super) fn expand_left(&mut self, handle: CategoryHandle) {
        let window = &mut self.windows[handle.0];
        assert!(window.start > 0, "cannot expand the first slot leftwards");
        window.start -= 1;
        window.len += 1;
        if let Some(prev) = window.prev {
            self.shrink_left(prev);
        }
        debug_assert!(self.is_linked_contiguously(handle));
    }

    fn shrink_left(&mut self, handle: CategoryHandle) {
        let window = &self.windows[handle.0];
        assert!(window.len > 0 || window.prev.is_some());
        if window.len > 0 {
            self.windows[handle.0].len -= 1;
        } else {
            if let Some(prev) = window.prev {
                self.shrink_left(prev);
            }
            let start = self.prev_end(handle);
            self.windows[handle.0].start = start;
        }
    }

    /// Grows `handle` one slot to the right, taking the first slot of the nearest
    /// non-empty successor.
    pub(super) fn expand_right(&mut self, handle: CategoryHandle) {
        let window = &mut self.windows[handle.0];
        let next = window
            .next
            .expect("the unallocated category cannot expand rightwards");
        window.len += 1;
        self.shrink_right(next);
        debug_assert!(self.is_linked_contiguously(handle));
    }

    fn shrink_right(&mut self, handle: CategoryHandle) {
        let window = &self.windows[handle.0];
        assert!(window.len > 0 || window.next.is_some());
        if window.len > 0 {
            let window = &mut self.windows[handle.0];
            window.start += 1;
            window.len -= 1;
        } else {
            let next = window.next;
            let start = self.prev_end(handle);
            self.windows[handle.0].start = start;
            if let Some(next) = next {
                self.shrink_right(next);
            }
        }
    }

    fn prev_end(&self, handle: CategoryHandle) -> usize {
        self.window(handle)
            .prev
            .map(|prev| self.window(prev).end())
            .unwrap_or(0)
    }

    fn is_linked_contiguously(&self, handle: CategoryHandle) -> bool {
        let window = self.window(handle);
        let after_prev = window
            .prev
            .map(|prev| self.window(prev).end() == window.start)
            .unwrap_or(true);
        let before_next = window
            .next
            .map(|next| window.end() == self.window(next).start)
            .unwrap_or(true);
        after_prev && before_next
    }

    /// True when the chain covers `[0, total_slots)` with no gaps or overlaps.
    pub fn is_contiguous(&self) -> bool {
        let mut expected_start = 0;
        let mut cursor = Some(CategoryHandle(0));
        let mut visited = 0;
        while let Some(handle) = cursor {
            let window = self.window(handle);
            if window.start != expected_start {
                return false;
            }
            expected_start = window.end();
            cursor = window.next;
            visited += 1;
        }
        visited == self.windows.len() && expected_start == self.total_slots()
    }

    pub fn snapshot(&self) -> CategorySnapshot {
        CategorySnapshot {
            ranges: self.windows.iter().map(CategoryWindow::range).collect(),
            ids: self.windows.iter().map(|window| window.id).collect(),
            by_id: self.by_id.clone(),
            empty: self.empty,
            unallocated: self.unallocated,
        }
    }
}

/// Frozen copy of every window's bounds. The renderer only ever reads these.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CategorySnapshot {
    ranges: Vec<CategoryRange>,
    ids: Vec<Option<BlockId>>,
    by_id: Arc<HashMap<BlockId, CategoryHandle>>,
    empty: CategoryHandle,
    unallocated: CategoryHandle,
}

impl CategorySnapshot {
    pub fn range_for(&self, id: BlockId) -> Option<CategoryRange> {
        self.by_id.get(&id).map(|handle| self.ranges[handle.0])
    }

    pub fn range(&self, handle: CategoryHandle) -> CategoryRange {
        self.ranges[handle.0]
    }

    pub fn empty_range(&self) -> CategoryRange {
        self.ranges[self.empty.0]
    }

    pub fn unallocated_range(&self) -> CategoryRange {
        self.ranges[self.unallocated.0]
    }

    /// Non-empty real categories in ordinal order, one instanced draw each.
    pub fn draw_ranges(&self) -> impl Iterator<Item = (BlockId, CategoryRange)> + '_ {
        self.ids
            .iter()
            .zip(self.ranges.iter())
            .filter_map(|(id, range)| id.map(|id| (id, *range)))
            .filter(|(_, range)| !range.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(count: u32) -> Vec<BlockId> {
        (0..count).map(BlockId).collect()
    }

    fn bounds(chain: &CategoryChain) -> Vec<(usize, usize)> {
        chain
            .windows()
            .map(|(_, window)| (window.start(), window.len()))
            .collect()
    }

    #[test]
    fn new_chain_is_all_unallocated() {
        let chain = CategoryChain::new(&ids(3), 10).unwrap();
        assert_eq!(bounds(&chain), vec![(0, 0), (0, 0), (0, 0), (0, 0), (0, 10)]);
        assert_eq!(chain.window(chain.empty()).ordinal(), 3);
        assert_eq!(
            chain.window(chain.unallocated()).ordinal(),
            UNALLOCATED_ORDINAL
        );
        assert!(chain.is_contiguous());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let error = CategoryChain::new(&[BlockId(4), BlockId(4)], 10).unwrap_err();
        assert_eq!(error, InstanceBufferError::DuplicateCategory(BlockId(4)));
    }

    #[test]
    fn allocate_shifts_the_empty_unallocated_boundary() {
        let mut chain = CategoryChain::new(&ids(2), 3).unwrap();
        assert_eq!(chain.allocate_from_unallocated(), Some(0));
        assert_eq!(chain.allocate_from_unallocated(), Some(1));
        assert_eq!(chain.allocate_from_unallocated(), Some(2));
        assert_eq!(chain.allocate_from_unallocated(), None);
        assert_eq!(chain.window(chain.empty()).range(), CategoryRange { start: 0, len: 3 });
        assert_eq!(chain.unallocated_count(), 0);
        assert!(chain.is_contiguous());
    }

    #[test]
    fn release_returns_the_back_of_empty() {
        let mut chain = CategoryChain::new(&ids(1), 4).unwrap();
        for _ in 0..3 {
            chain.allocate_from_unallocated();
        }
        assert_eq!(chain.release_to_unallocated(), 2);
        assert_eq!(chain.allocated_count(), 2);
        assert_eq!(chain.unallocated_count(), 2);
        assert!(chain.is_contiguous());
    }

    #[test]
    fn expand_right_cascades_through_empty_windows() {
        let mut chain = CategoryChain::new(&ids(3), 6).unwrap();
        for _ in 0..6 {
            chain.allocate_from_unallocated();
        }
        // Category 0 takes a slot from "empty" across the two zero-length windows.
        chain.expand_right(CategoryHandle(0));
        assert_eq!(bounds(&chain), vec![(0, 1), (1, 0), (1, 0), (1, 5), (6, 0)]);
        assert!(chain.is_contiguous());
    }

    #[test]
    fn expand_left_cascades_through_empty_windows() {
        let mut chain = CategoryChain::new(&ids(3), 6).unwrap();
        for _ in 0..6 {
            chain.allocate_from_unallocated();
        }
        chain.expand_right(CategoryHandle(0));
        chain.expand_right(CategoryHandle(0));
        // "empty" grows back over the zero-length windows into category 0.
        chain.expand_left(chain.empty());
        assert_eq!(bounds(&chain), vec![(0, 1), (1, 0), (1, 0), (1, 5), (6, 0)]);
        assert!(chain.is_contiguous());
    }

    #[test]
    fn handle_for_slot_skips_zero_length_windows() {
        let mut chain = CategoryChain::new(&ids(3), 8).unwrap();
        for _ in 0..6 {
            chain.allocate_from_unallocated();
        }
        chain.expand_right(CategoryHandle(0));
        chain.expand_right(CategoryHandle(2));
        chain.expand_right(CategoryHandle(2));
        assert_eq!(chain.handle_for_slot(0), CategoryHandle(0));
        assert_eq!(chain.handle_for_slot(1), CategoryHandle(2));
        assert_eq!(chain.handle_for_slot(2), CategoryHandle(2));
        assert_eq!(chain.handle_for_slot(3), chain.empty());
        assert_eq!(chain.handle_for_slot(5), chain.empty());
        assert_eq!(chain.handle_for_slot(6), chain.unallocated());
        assert_eq!(chain.handle_for_slot(7), chain.unallocated());
    }

    #[test]
    fn handle_for_id_maps_none_to_empty() {
        let chain = CategoryChain::new(&[BlockId(7), BlockId(3)], 4).unwrap();
        assert_eq!(chain.handle_for_id(Some(BlockId(3))), Some(CategoryHandle(1)));
        assert_eq!(chain.handle_for_id(None), Some(chain.empty()));
        assert_eq!(chain.handle_for_id(Some(BlockId(99))), None);
    }

    #[test]
    #[should_panic]
    fn handle_for_slot_past_the_end_panics() {
        let chain = CategoryChain::new(&ids(1), 4).unwrap();
        chain.handle_for_slot(4);
    }

    #[test]
    fn snapshot_reports_draw_ranges_in_ordinal_order() {
        let mut chain = CategoryChain::new(&[BlockId(10), BlockId(20), BlockId(30)], 8).unwrap();
        for _ in 0..5 {
            chain.allocate_from_unallocated();
        }
        chain.expand_right(CategoryHandle(0));
        chain.expand_right(CategoryHandle(2));
        let snapshot = chain.snapshot();
        let draws: Vec<_> = snapshot.draw_ranges().collect();
        assert_eq!(
            draws,
            vec![
                (BlockId(10), CategoryRange { start: 0, len: 1 }),
                (BlockId(30), CategoryRange { start: 1, len: 1 }),
            ]
        );
        assert_eq!(snapshot.range_for(BlockId(20)), Some(CategoryRange { start: 1, len: 0 }));
        assert_eq!(snapshot.empty_range(), CategoryRange { start: 2, len: 3 });
        assert_eq!(snapshot.unallocated_range(), CategoryRange { start: 5, len: 3 });
        assert_eq!(snapshot.range_for(BlockId(99)), None);
    }
}
