//! Per-tick bookkeeping for one game's tiles and movements.
//!
//! The index owns the snapshot for the duration of a tick. Every phase reads
//! and mutates through it, so the lookup tables and the pending-change log
//! can never drift apart. Movements live in an arena addressed by
//! [`MovementKey`]; a key stays valid for the whole tick even after its
//! movement is deleted, which is what makes resurrection possible.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::simulation::SimulationError;
use crate::simulation::diff::{MovementUpdate, NewMovement, TickDiff};
use crate::world::coords::Cube;
use crate::world::tile::{Movement, MovementId, Path, PlayerId, Tile, TileId};

/// Arena slot of a movement. Keys are handed out in creation order: loaded
/// movements by ascending id first, then the ones synthesized this tick.
pub type MovementKey = usize;

/// A movement as the engine sees it during a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedMovement {
    /// `None` for movements created during this tick.
    pub id: Option<MovementId>,
    pub source: TileId,
    pub target: TileId,
    /// The hex an army on this movement enters next.
    pub next: TileId,
    pub amount: u32,
}

impl IndexedMovement {
    pub fn path(&self) -> Path {
        (self.source, self.target)
    }
}

#[derive(Debug, Clone)]
pub struct StateIndex {
    tiles: BTreeMap<TileId, Tile>,
    tiles_by_coords: HashMap<Cube, TileId>,
    entries: Vec<IndexedMovement>,
    live: BTreeSet<MovementKey>,
    by_path: HashMap<Path, MovementKey>,
    by_source: HashMap<TileId, BTreeSet<MovementKey>>,
    by_next: BTreeMap<TileId, BTreeSet<MovementKey>>,
    /// Cached outgoing totals. A missing entry means "recompute".
    total_outgoing: HashMap<TileId, u64>,
    dirty_tiles: BTreeSet<TileId>,
    updated: BTreeSet<MovementKey>,
    /// Paths deleted this tick, with the arena slot they occupied.
    deleted: HashMap<Path, MovementKey>,
}

impl StateIndex {
    /// Load a game snapshot, rejecting anything the engine cannot have produced.
    pub fn new(tiles: Vec<Tile>, mut movements: Vec<Movement>) -> Result<Self, SimulationError> {
        let mut index = StateIndex {
            tiles: BTreeMap::new(),
            tiles_by_coords: HashMap::with_capacity(tiles.len()),
            entries: Vec::with_capacity(movements.len()),
            live: BTreeSet::new(),
            by_path: HashMap::with_capacity(movements.len()),
            by_source: HashMap::new(),
            by_next: BTreeMap::new(),
            total_outgoing: HashMap::new(),
            dirty_tiles: BTreeSet::new(),
            updated: BTreeSet::new(),
            deleted: HashMap::new(),
        };

        for tile in tiles {
            let Cube { x, y, z } = tile.coords;
            Cube::new(x, y, z)?;
            if index.tiles.contains_key(&tile.id) {
                return Err(SimulationError::DuplicateTile(tile.id));
            }
            if index.tiles_by_coords.insert(tile.coords, tile.id).is_some() {
                return Err(SimulationError::DuplicateCoordinates(tile.coords));
            }
            index.tiles.insert(tile.id, tile);
        }

        movements.sort_by_key(|m| m.id);
        for pair in movements.windows(2) {
            if pair[0].id == pair[1].id {
                return Err(SimulationError::DuplicateMovement(pair[0].id));
            }
        }
        for movement in movements {
            index.tile_ref(movement.source)?;
            index.tile_ref(movement.target)?;
            if movement.source == movement.target || movement.amount == 0 {
                return Err(SimulationError::DegenerateMovement(movement.id));
            }
            if index.by_path.contains_key(&movement.path()) {
                return Err(SimulationError::DuplicatePath {
                    from: movement.source,
                    to: movement.target,
                });
            }
            let next = index.next_hop(movement.source, movement.target)?;
            index.entries.push(IndexedMovement {
                id: Some(movement.id),
                source: movement.source,
                target: movement.target,
                next,
                amount: movement.amount,
            });
            index.link(index.entries.len() - 1);
        }

        Ok(index)
    }

    fn tile_ref(&self, id: TileId) -> Result<&Tile, SimulationError> {
        self.tiles.get(&id).ok_or(SimulationError::UnknownTile(id))
    }

    fn next_hop(&self, source: TileId, target: TileId) -> Result<TileId, SimulationError> {
        let from = self.tile_ref(source)?.coords;
        let to = self.tile_ref(target)?.coords;
        let next = from.next_on_path(to);
        self.tiles_by_coords
            .get(&next)
            .copied()
            .ok_or(SimulationError::NoTileAt(next))
    }

    fn entry(&self, key: MovementKey) -> Result<&IndexedMovement, SimulationError> {
        self.entries
            .get(key)
            .ok_or(SimulationError::StaleMovementKey(key))
    }

    fn require_live(&self, key: MovementKey) -> Result<&IndexedMovement, SimulationError> {
        let entry = self.entry(key)?;
        if !self.live.contains(&key) {
            return Err(SimulationError::MovementNotLive {
                from: entry.source,
                to: entry.target,
            });
        }
        Ok(entry)
    }

    fn link(&mut self, key: MovementKey) {
        let entry = &self.entries[key];
        let (source, next, path) = (entry.source, entry.next, entry.path());
        self.live.insert(key);
        self.by_path.insert(path, key);
        self.by_source.entry(source).or_default().insert(key);
        self.by_next.entry(next).or_default().insert(key);
        self.total_outgoing.remove(&source);
    }

    fn unlink(&mut self, key: MovementKey) {
        let entry = &self.entries[key];
        let (source, next, path) = (entry.source, entry.next, entry.path());
        self.live.remove(&key);
        self.by_path.remove(&path);
        if let Some(keys) = self.by_source.get_mut(&source) {
            keys.remove(&key);
            if keys.is_empty() {
                self.by_source.remove(&source);
            }
        }
        if let Some(keys) = self.by_next.get_mut(&next) {
            keys.remove(&key);
            if keys.is_empty() {
                self.by_next.remove(&next);
            }
        }
        self.total_outgoing.remove(&source);
    }

    // === Tiles ===

    pub fn tile(&self, id: TileId) -> Option<&Tile> {
        self.tiles.get(&id)
    }

    /// All tiles in ascending id order.
    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values()
    }

    pub fn set_tile_army(&mut self, id: TileId, army: u32) -> Result<(), SimulationError> {
        let tile = self
            .tiles
            .get_mut(&id)
            .ok_or(SimulationError::UnknownTile(id))?;
        tile.army = army;
        self.dirty_tiles.insert(id);
        Ok(())
    }

    /// Change a tile's owner, dropping every movement still launched from it.
    ///
    /// Returns `false` when the owner is unchanged, in which case nothing
    /// happens.
    pub fn update_tile_owner(
        &mut self,
        id: TileId,
        owner: Option<PlayerId>,
    ) -> Result<bool, SimulationError> {
        if self.tile_ref(id)?.owner == owner {
            return Ok(false);
        }
        for key in self.movements_from(id) {
            self.delete_movement(key)?;
        }
        if let Some(tile) = self.tiles.get_mut(&id) {
            tile.owner = owner;
        }
        self.dirty_tiles.insert(id);
        Ok(true)
    }

    // === Movements ===

    pub fn is_live(&self, key: MovementKey) -> bool {
        self.live.contains(&key)
    }

    /// A live movement by key.
    pub fn movement(&self, key: MovementKey) -> Option<&IndexedMovement> {
        if self.live.contains(&key) {
            self.entries.get(key)
        } else {
            None
        }
    }

    pub fn movement_on_path(&self, path: Path) -> Option<MovementKey> {
        self.by_path.get(&path).copied()
    }

    /// Live movements in creation order.
    pub fn live_movements(&self) -> impl Iterator<Item = (MovementKey, &IndexedMovement)> {
        self.live.iter().map(|&key| (key, &self.entries[key]))
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Keys of the live movements launched from `tile`, in creation order.
    pub fn movements_from(&self, tile: TileId) -> Vec<MovementKey> {
        self.by_source
            .get(&tile)
            .map(|keys| keys.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Every tile some live movement enters next, with those movements.
    /// Ascending tile id; a copy, so callers may mutate while walking it.
    pub fn next_hop_groups(&self) -> Vec<(TileId, Vec<MovementKey>)> {
        self.by_next
            .iter()
            .map(|(&tile, keys)| (tile, keys.iter().copied().collect()))
            .collect()
    }

    /// The owner of a movement's source tile, which is the movement's owner.
    pub fn movement_owner(&self, key: MovementKey) -> Result<Option<PlayerId>, SimulationError> {
        let source = self.entry(key)?.source;
        Ok(self.tile_ref(source)?.owner)
    }

    /// Sum of the amounts of all live movements launched from `tile`.
    pub fn tile_total_outgoing(&mut self, tile: TileId) -> u64 {
        if let Some(&total) = self.total_outgoing.get(&tile) {
            return total;
        }
        let total = self
            .by_source
            .get(&tile)
            .map(|keys| keys.iter().map(|&k| self.entries[k].amount as u64).sum())
            .unwrap_or(0);
        self.total_outgoing.insert(tile, total);
        total
    }

    /// The part of a movement its source can actually back this tick.
    ///
    /// When a tile has committed more than its army, each of its movements
    /// is scaled down in proportion to its amount, rounding down.
    pub fn effective_amount(&mut self, key: MovementKey) -> Result<u32, SimulationError> {
        let (source, amount) = {
            let entry = self.require_live(key)?;
            (entry.source, entry.amount)
        };
        let army = self.tile_ref(source)?.army as u64;
        let total = self.tile_total_outgoing(source);
        if total == 0 {
            return Ok(0);
        }
        let scaled = army * amount as u64 / total;
        Ok(scaled.min(amount as u64) as u32)
    }

    /// Create a movement on `path`, or revive the one deleted from it earlier
    /// this tick.
    pub fn create_movement(
        &mut self,
        path: Path,
        amount: u32,
    ) -> Result<MovementKey, SimulationError> {
        let (source, target) = path;
        if self.by_path.contains_key(&path) {
            return Err(SimulationError::DuplicatePath {
                from: source,
                to: target,
            });
        }
        if source == target || amount == 0 {
            return Err(SimulationError::EmptyMovement {
                from: source,
                to: target,
            });
        }

        if let Some(key) = self.deleted.remove(&path) {
            self.entries[key].amount = amount;
            if self.entries[key].id.is_some() {
                self.updated.insert(key);
            }
            self.link(key);
            return Ok(key);
        }

        let next = self.next_hop(source, target)?;
        self.entries.push(IndexedMovement {
            id: None,
            source,
            target,
            next,
            amount,
        });
        let key = self.entries.len() - 1;
        self.link(key);
        Ok(key)
    }

    /// Add `delta` to a movement's amount. A result of zero or less deletes
    /// the movement, reported as `None`.
    pub fn update_movement_amount(
        &mut self,
        key: MovementKey,
        delta: i64,
    ) -> Result<Option<MovementKey>, SimulationError> {
        let (source, has_id, current) = {
            let entry = self.require_live(key)?;
            (entry.source, entry.id.is_some(), entry.amount)
        };
        let amount = current as i64 + delta;
        if amount <= 0 {
            self.delete_movement(key)?;
            return Ok(None);
        }
        let amount = u32::try_from(amount).map_err(|_| SimulationError::AmountOverflow)?;

        self.entries[key].amount = amount;
        self.total_outgoing.remove(&source);
        if has_id {
            self.updated.insert(key);
        }
        Ok(Some(key))
    }

    pub fn delete_movement(&mut self, key: MovementKey) -> Result<(), SimulationError> {
        let entry = self.entry(key)?;
        let path = entry.path();
        if self.deleted.contains_key(&path) || !self.live.contains(&key) {
            return Err(SimulationError::PathAlreadyDeleted {
                from: path.0,
                to: path.1,
            });
        }
        self.unlink(key);
        self.updated.remove(&key);
        self.deleted.insert(path, key);
        Ok(())
    }

    /// Close the tick and hand back the pending-change log.
    pub fn into_diff(self) -> TickDiff {
        let tiles = self
            .dirty_tiles
            .iter()
            .filter_map(|id| self.tiles.get(id).cloned())
            .collect();

        let mut created = Vec::new();
        let mut updated = Vec::new();
        for &key in &self.live {
            let entry = &self.entries[key];
            match entry.id {
                None => created.push(NewMovement {
                    source: entry.source,
                    target: entry.target,
                    amount: entry.amount,
                }),
                Some(id) if self.updated.contains(&key) => updated.push(MovementUpdate {
                    id,
                    amount: entry.amount,
                }),
                Some(_) => {}
            }
        }

        let mut deleted: Vec<MovementId> = self
            .deleted
            .values()
            .filter_map(|&key| self.entries[key].id)
            .collect();
        deleted.sort_unstable();

        TickDiff {
            tiles,
            created,
            updated,
            deleted,
        }
    }
}
