use super::*;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Walk {
    /// Destination sits before the source: records shift towards the back.
    TowardFront,
    /// Destination sits after the source: records shift towards the front.
    TowardBack,
}

/// Everything the state lock guards: category chain, CPU records, coordinate
/// index and dirty set. They change together or not at all.
#[derive(Clone, Debug)]
pub struct InstanceState {
    categories: CategoryChain,
    store: InstanceStore,
    index: SpatialIndex,
}

impl InstanceState {
    pub fn new(block_ids: &[BlockId], total_slots: usize) -> Result<Self, InstanceBufferError> {
        Ok(Self {
            categories: CategoryChain::new(block_ids, total_slots)?,
            store: InstanceStore::new(total_slots),
            index: SpatialIndex::new(total_slots),
        })
    }

    pub fn categories(&self) -> &CategoryChain {
        &self.categories
    }

    pub fn store(&self) -> &InstanceStore {
        &self.store
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    pub fn total_slots(&self) -> usize {
        self.store.len()
    }

    pub fn unallocated_count(&self) -> usize {
        self.categories.unallocated_count()
    }

    pub fn allocated_count(&self) -> usize {
        self.categories.allocated_count()
    }

    pub fn lookup(&self, coordinate: &Coordinate) -> Option<usize> {
        self.index.lookup(coordinate)
    }

    pub fn read(&self, slot: usize) -> BlockInstance {
        self.store.read(slot)
    }

    pub fn write(&mut self, slot: usize, record: BlockInstance) {
        self.store.write(slot, record);
    }

    pub fn set_face_visibility(&mut self, slot: usize, axis: u8, direction: u8, visible: bool) {
        self.store.set_face_visibility(slot, axis, direction, visible);
    }

    pub fn category_for_slot(&self, slot: usize) -> &CategoryWindow {
        self.categories.window(self.categories.handle_for_slot(slot))
    }

    pub fn category_for_id(&self, id: Option<BlockId>) -> Option<&CategoryWindow> {
        self.categories
            .handle_for_id(id)
            .map(|handle| self.categories.window(handle))
    }

    /// Block id currently assigned to `coordinate`; `None` for empty blocks.
    pub fn block_at(&self, coordinate: &Coordinate) -> Option<BlockId> {
        let slot = self.index.lookup(coordinate)?;
        self.category_for_slot(slot).id()
    }

    pub fn allocate_from_unallocated(&mut self) -> Option<usize> {
        self.categories.allocate_from_unallocated()
    }

    pub fn has_changes(&self) -> bool {
        self.store.has_changes()
    }

    /// Gives every coordinate a slot at the back of "empty". Fails without
    /// touching anything when capacity is short.
    pub fn allocate_coordinates(
        &mut self,
        coordinates: &[Coordinate],
    ) -> Result<(), InstanceBufferError> {
        let available = self.categories.unallocated_count();
        if coordinates.len() > available {
            return Err(InstanceBufferError::CapacityExhausted {
                requested: coordinates.len(),
                available,
            });
        }
        for coordinate in coordinates {
            let slot = self
                .categories
                .allocate_from_unallocated()
                .expect("capacity was checked up front");
            self.index.insert(*coordinate, slot);
            self.store.write(slot, BlockInstance::at(coordinate));
        }
        Ok(())
    }

    /// Returns the coordinates' slots to "unallocated" and forgets them.
    pub fn deallocate_coordinates(&mut self, coordinates: &[Coordinate]) {
        let empty = self.categories.empty();
        for coordinate in coordinates {
            let slot = self
                .index
                .lookup(coordinate)
                .unwrap_or_else(|| panic!("cannot deallocate unknown coordinate {coordinate}"));
            let from = self.categories.handle_for_slot(slot);
            let slot = self.reclassify(slot, from, empty);

            // Only the back of "empty" can be released, so park the record there.
            self.index.remove(coordinate);
            let last = self.categories.window(empty).last_index();
            if slot != last {
                self.move_record(last, slot);
            }
            self.categories.release_to_unallocated();
        }
    }

    /// Moves `coordinate` into the category of `id` (`None` = empty).
    pub fn change_block(
        &mut self,
        coordinate: &Coordinate,
        id: Option<BlockId>,
    ) -> Result<usize, InstanceBufferError> {
        let to = self.category_handle(id)?;
        let slot = self
            .index
            .lookup(coordinate)
            .unwrap_or_else(|| panic!("cannot change unknown coordinate {coordinate}"));
        let from = self.categories.handle_for_slot(slot);
        Ok(self.reclassify(slot, from, to))
    }

    fn category_handle(&self, id: Option<BlockId>) -> Result<CategoryHandle, InstanceBufferError> {
        match id {
            None => Ok(self.categories.empty()),
            Some(id) => self
                .categories
                .handle_for_id(Some(id))
                .ok_or(InstanceBufferError::UnknownCategory(id)),
        }
    }

    /// Applies every change, then refreshes face visibility around each one.
    pub fn apply_block_changes(
        &mut self,
        changes: &[(Coordinate, Option<BlockId>)],
    ) -> Result<(), InstanceBufferError> {
        for (_, id) in changes {
            self.category_handle(*id)?;
        }
        for (coordinate, id) in changes {
            self.change_block(coordinate, *id)?;
        }
        for (coordinate, id) in changes {
            self.update_face_visibility(coordinate, id.is_none());
        }
        Ok(())
    }

    /// Culls faces shared between solid neighbours and exposes the ones next to
    /// empty or unloaded space.
    pub fn update_face_visibility(&mut self, coordinate: &Coordinate, is_empty: bool) {
        let slot = self
            .index
            .lookup(coordinate)
            .unwrap_or_else(|| panic!("cannot update faces of unknown coordinate {coordinate}"));
        for axis in 0..3u8 {
            for direction in 0..2u8 {
                let neighbor = coordinate.neighbor(axis as usize, direction);
                let neighbor_solid = match self.index.lookup(&neighbor) {
                    Some(neighbor_slot) => {
                        let solid = self.category_for_slot(neighbor_slot).id().is_some();
                        if solid {
                            self.store
                                .set_face_visibility(neighbor_slot, axis, 1 - direction, is_empty);
                        }
                        solid
                    }
                    // Neighbour chunk not loaded.
                    None => false,
                };
                self.store
                    .set_face_visibility(slot, axis, direction, is_empty || !neighbor_solid);
            }
        }
    }

    /// Moves the record at `slot` from category `from` to category `to` while
    /// keeping every category contiguous. A single hole travels across the
    /// windows in between, one record copy per window, so the cost is the
    /// ordinal distance and never the category size. Returns the record's new slot.
    pub fn reclassify(&mut self, slot: usize, from: CategoryHandle, to: CategoryHandle) -> usize {
        assert!(
            self.categories.window(from).contains(slot),
            "slot {slot} is not inside category {from:?}"
        );
        if from == to {
            return slot;
        }
        let unallocated = self.categories.unallocated();
        assert!(
            from != unallocated && to != unallocated,
            "unallocated slots cannot be reclassified"
        );

        let instance = self.store.read(slot);
        let coordinate = self.index.coordinate_at(slot);
        if let Some(coordinate) = coordinate.as_ref() {
            self.index.remove(coordinate);
        }

        let walk = if self.categories.window(to).ordinal() < self.categories.window(from).ordinal()
        {
            Walk::TowardFront
        } else {
            Walk::TowardBack
        };

        // Open the hole at the edge of `from` facing `to`.
        let edge = self.edge_index(from, walk);
        if slot != edge {
            self.move_record(edge, slot);
        }

        let mut current = from;
        loop {
            let neighbor = self.step(current, walk);
            if neighbor == to {
                break;
            }
            if !self.categories.window(neighbor).is_empty() {
                let src = self.edge_index(neighbor, walk);
                let dst = self.edge_index(current, walk);
                self.move_record(src, dst);
                self.grow_toward_hole(neighbor, walk);
            }
            current = neighbor;
        }

        self.grow_toward_hole(to, walk);
        let destination = self.categories.window(to);
        let (first, last) = (destination.first_index(), destination.last_index());
        if walk == Walk::TowardBack && first != last {
            // The hole is at the front; keep newcomers at the back.
            self.move_record(last, first);
        }
        self.store.write(last, instance);
        if let Some(coordinate) = coordinate {
            self.index.insert(coordinate, last);
        }
        debug_assert!(self.categories.is_contiguous());
        last
    }

    fn step(&self, handle: CategoryHandle, walk: Walk) -> CategoryHandle {
        let window = self.categories.window(handle);
        let neighbor = match walk {
            Walk::TowardFront => window.prev(),
            Walk::TowardBack => window.next(),
        };
        neighbor.expect("destination category must lie along the walk")
    }

    /// The slot a walk moves records through: first slot when walking towards
    /// the front, last slot otherwise. Zero-length windows resolve to the hole.
    fn edge_index(&self, handle: CategoryHandle, walk: Walk) -> usize {
        let window = self.categories.window(handle);
        match walk {
            Walk::TowardFront => window.first_index(),
            Walk::TowardBack => window.last_index(),
        }
    }

    fn grow_toward_hole(&mut self, handle: CategoryHandle, walk: Walk) {
        match walk {
            Walk::TowardFront => self.categories.expand_right(handle),
            Walk::TowardBack => self.categories.expand_left(handle),
        }
    }

    /// Copies the record at `src` into `dst` and carries its coordinate along.
    fn move_record(&mut self, src: usize, dst: usize) {
        self.store.copy(src, dst);
        if self.index.coordinate_at(src).is_some() {
            self.index.relocate(src, dst);
        }
    }

    pub(super) fn take_pending(&mut self) -> PendingUpload {
        PendingUpload {
            records: self.store.take_pending(),
            categories: self.categories.snapshot(),
        }
    }

    /// Chain covers the array and the index agrees with the chain: each allocated
    /// slot has exactly one coordinate and unallocated slots have none.
    pub fn is_consistent(&self) -> bool {
        if !self.categories.is_contiguous() {
            return false;
        }
        let allocated = self.categories.allocated_count();
        if self.index.len() != allocated {
            return false;
        }
        let reverse_ok = (0..self.total_slots()).all(|slot| {
            let owner = self.index.coordinate_at(slot);
            if slot < allocated {
                owner.map_or(false, |c| self.index.lookup(&c) == Some(slot))
            } else {
                owner.is_none()
            }
        });
        reverse_ok
            && self
                .index
                .iter()
                .all(|(coordinate, slot)| self.index.coordinate_at(*slot) == Some(*coordinate))
    }
}
