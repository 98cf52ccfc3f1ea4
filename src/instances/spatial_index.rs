use super::*;

/// Bidirectional map between allocated coordinates and their instance slots.
#[derive(Clone, Debug)]
pub struct SpatialIndex {
    slot_by_coordinate: BTreeMap<Coordinate, usize>,
    coordinate_by_slot: Vec<Option<Coordinate>>,
}

impl SpatialIndex {
    pub fn new(total_slots: usize) -> Self {
        Self {
            slot_by_coordinate: BTreeMap::new(),
            coordinate_by_slot: vec![None; total_slots],
        }
    }

    pub fn len(&self) -> usize {
        self.slot_by_coordinate.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slot_by_coordinate.is_empty()
    }

    pub fn lookup(&self, coordinate: &Coordinate) -> Option<usize> {
        self.slot_by_coordinate.get(coordinate).copied()
    }

    pub fn coordinate_at(&self, slot: usize) -> Option<Coordinate> {
        self.coordinate_by_slot[slot]
    }

    pub fn insert(&mut self, coordinate: Coordinate, slot: usize) {
        assert!(
            self.coordinate_by_slot[slot].is_none(),
            "slot {slot} already belongs to {}",
            self.coordinate_by_slot[slot].unwrap_or_default()
        );
        let previous = self.slot_by_coordinate.insert(coordinate, slot);
        assert!(previous.is_none(), "coordinate {coordinate} is already allocated");
        self.coordinate_by_slot[slot] = Some(coordinate);
    }

    pub fn remove(&mut self, coordinate: &Coordinate) -> Option<usize> {
        let slot = self.slot_by_coordinate.remove(coordinate)?;
        self.coordinate_by_slot[slot] = None;
        Some(slot)
    }

    /// Points `coordinate` at `new_slot`; its position in the ordered map is unchanged.
    pub fn move_key(&mut self, coordinate: &Coordinate, new_slot: usize) {
        let slot = self
            .slot_by_coordinate
            .get_mut(coordinate)
            .unwrap_or_else(|| panic!("coordinate {coordinate} is not allocated"));
        let old_slot = std::mem::replace(slot, new_slot);
        if self.coordinate_by_slot[old_slot] == Some(*coordinate) {
            self.coordinate_by_slot[old_slot] = None;
        }
        debug_assert!(self.coordinate_by_slot[new_slot].is_none());
        self.coordinate_by_slot[new_slot] = Some(*coordinate);
    }

    /// Moves whichever coordinate owns `src` over to `dst` and returns it.
    pub fn relocate(&mut self, src: usize, dst: usize) -> Coordinate {
        let coordinate = self.coordinate_by_slot[src]
            .unwrap_or_else(|| panic!("slot {src} has no coordinate to move"));
        self.move_key(&coordinate, dst);
        coordinate
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Coordinate, &usize)> {
        self.slot_by_coordinate.iter()
    }
}
