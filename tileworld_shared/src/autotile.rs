//! Wang-blob auto-tiling.
//!
//! Every tile's visual variant is an 8-bit mask of which neighbouring cells
//! are occupied. A diagonal neighbour only counts when both cardinals flanking
//! it are occupied too, so an open edge never shows a corner seam.
//!
//! Changes propagate exactly one ring: the changed cells are recomputed, then
//! every occupied neighbour of them is recomputed once. Several edits in the
//! same tick may leave second-ring diagonals stale.

use std::collections::BTreeSet;

use tracing::warn;

use crate::{
    components::TileVariant,
    ecs::EntityStore,
    tile::{TileCoord, TileIndex},
};

bitflags::bitflags! {
    /// Occupied neighbours of a cell. The bit values are the wang-blob mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Neighbors: u8 {
        const NORTH = 1 << 0;
        const NORTH_EAST = 1 << 1;
        const EAST = 1 << 2;
        const SOUTH_EAST = 1 << 3;
        const SOUTH = 1 << 4;
        const SOUTH_WEST = 1 << 5;
        const WEST = 1 << 6;
        const NORTH_WEST = 1 << 7;
    }
}

/// Probe order and lattice offset of each neighbour. North is `+z`, east `+x`.
const PROBES: [(Neighbors, i64, i64); 8] = [
    (Neighbors::NORTH, 0, 1),
    (Neighbors::NORTH_EAST, 1, 1),
    (Neighbors::EAST, 1, 0),
    (Neighbors::SOUTH_EAST, 1, -1),
    (Neighbors::SOUTH, 0, -1),
    (Neighbors::SOUTH_WEST, -1, -1),
    (Neighbors::WEST, -1, 0),
    (Neighbors::NORTH_WEST, -1, 1),
];

impl Neighbors {
    /// Raw occupancy around `coord`, diagonals included as found.
    pub fn sample(index: &TileIndex, coord: TileCoord) -> Self {
        PROBES
            .iter()
            .filter(|(_, dx, dz)| index.contains(coord.offset(*dx, *dz)))
            .fold(Neighbors::empty(), |acc, (flag, _, _)| acc | *flag)
    }

    /// Clears every diagonal whose two flanking cardinals are not both set.
    pub fn suppress_open_corners(self) -> Self {
        let mut out = self;
        let corners = [
            (Neighbors::NORTH_EAST, Neighbors::NORTH | Neighbors::EAST),
            (Neighbors::SOUTH_EAST, Neighbors::SOUTH | Neighbors::EAST),
            (Neighbors::SOUTH_WEST, Neighbors::SOUTH | Neighbors::WEST),
            (Neighbors::NORTH_WEST, Neighbors::NORTH | Neighbors::WEST),
        ];
        for (corner, flanks) in corners {
            if !self.contains(flanks) {
                out.remove(corner);
            }
        }
        out
    }

    /// Coordinates of the neighbours set in `self`.
    pub fn coords(self, around: TileCoord) -> impl Iterator<Item = TileCoord> {
        PROBES
            .into_iter()
            .filter(move |(flag, _, _)| self.contains(*flag))
            .map(move |(_, dx, dz)| around.offset(dx, dz))
    }
}

/// Wang-blob mask for the cell at `coord` given the current index.
pub fn mask_at(index: &TileIndex, coord: TileCoord) -> u8 {
    Neighbors::sample(index, coord).suppress_open_corners().bits()
}

/// Recomputes the masks of `coords` and, with `cascade`, of their occupied
/// neighbours.
///
/// The cells in `coords` get their [`TileVariant`] written when `creating` is
/// set or `cascade` is not (a removal pass has nothing to tag at the emptied
/// cell). Cascaded neighbours are always written. Returns the mask of the
/// last cell in `coords`.
pub fn recompute<S: EntityStore>(
    index: &TileIndex,
    store: &mut S,
    coords: &[TileCoord],
    cascade: bool,
    creating: bool,
) -> u8 {
    let mut ring = BTreeSet::new();
    let mut last = 0;

    for &coord in coords {
        let present = Neighbors::sample(index, coord);
        if cascade {
            ring.extend(present.coords(coord));
        }

        let mask = present.suppress_open_corners().bits();
        if creating || !cascade {
            write_variant(index, store, coord, mask);
        }
        last = mask;
    }

    for coord in ring {
        write_variant(index, store, coord, mask_at(index, coord));
    }

    last
}

fn write_variant<S: EntityStore>(index: &TileIndex, store: &mut S, coord: TileCoord, mask: u8) {
    let Some(entity) = index.get(coord) else {
        return;
    };
    if let Err(e) = store.set_component(entity, TileVariant { mask }) {
        warn!(%coord, entity = ?entity, error = %e, "Indexed tile has no live entity");
    }
}
