use thiserror::Error;
use tracing::debug;

use crate::world::coords::Cube;
use crate::world::tile::{Movement, MovementId, PlayerId, TileId};
use crate::world::Game;

/// Why a player command was rejected. Nothing is changed when one is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("tile {0} does not belong to this game")]
    TileNotInGame(TileId),
    #[error("no tile at {0}")]
    NoTileAt(Cube),
    #[error("player {0} is not seated in this game")]
    UnknownPlayer(PlayerId),
    #[error("player {player} does not own tile {tile}")]
    NotOwner { player: PlayerId, tile: TileId },
    #[error("source and target are both tile {0}")]
    SameTile(TileId),
    #[error("amount must be positive")]
    NonPositiveAmount,
    #[error("a movement from tile {from} to tile {to} already exists")]
    PathTaken { from: TileId, to: TileId },
    #[error("movement {0} does not exist")]
    UnknownMovement(MovementId),
    #[error("player name '{0}' is already taken")]
    DuplicatePlayer(String),
    #[error("player name must not be empty")]
    EmptyPlayerName,
}

impl Game {
    fn check_player(&self, player: PlayerId) -> Result<(), OrderError> {
        self.player(player)
            .map(|_| ())
            .ok_or(OrderError::UnknownPlayer(player))
    }

    fn check_source_owner(&self, player: PlayerId, source: TileId) -> Result<(), OrderError> {
        let tile = self.tile(source).ok_or(OrderError::TileNotInGame(source))?;
        if tile.owner != Some(player) {
            return Err(OrderError::NotOwner {
                player,
                tile: source,
            });
        }
        Ok(())
    }

    /// Order `amount` army from `source` towards `target`.
    pub fn issue_movement(
        &mut self,
        player: PlayerId,
        source: TileId,
        target: TileId,
        amount: u32,
    ) -> Result<MovementId, OrderError> {
        self.check_player(player)?;
        if amount == 0 {
            return Err(OrderError::NonPositiveAmount);
        }
        self.check_source_owner(player, source)?;
        if self.tile(target).is_none() {
            return Err(OrderError::TileNotInGame(target));
        }
        if source == target {
            return Err(OrderError::SameTile(source));
        }
        if self.movement_on_path((source, target)).is_some() {
            return Err(OrderError::PathTaken {
                from: source,
                to: target,
            });
        }

        let id = self.allocate_movement_id();
        self.movements.push(Movement {
            id,
            source,
            target,
            amount,
        });
        debug!(player, source, target, amount, movement = id, "Movement ordered");
        Ok(id)
    }

    /// Same as [`Game::issue_movement`], addressing tiles by coordinate.
    pub fn issue_movement_between(
        &mut self,
        player: PlayerId,
        from: Cube,
        to: Cube,
        amount: u32,
    ) -> Result<MovementId, OrderError> {
        let source = self.tile_at(from).ok_or(OrderError::NoTileAt(from))?.id;
        let target = self.tile_at(to).ok_or(OrderError::NoTileAt(to))?.id;
        self.issue_movement(player, source, target, amount)
    }

    /// Replace the amount of one of the player's movements.
    pub fn update_movement(
        &mut self,
        player: PlayerId,
        id: MovementId,
        amount: u32,
    ) -> Result<(), OrderError> {
        self.check_player(player)?;
        if amount == 0 {
            return Err(OrderError::NonPositiveAmount);
        }
        let index = self
            .movements
            .iter()
            .position(|m| m.id == id)
            .ok_or(OrderError::UnknownMovement(id))?;
        self.check_source_owner(player, self.movements[index].source)?;
        self.movements[index].amount = amount;
        Ok(())
    }

    /// Withdraw one of the player's movements, returning it.
    pub fn cancel_movement(
        &mut self,
        player: PlayerId,
        id: MovementId,
    ) -> Result<Movement, OrderError> {
        self.check_player(player)?;
        let index = self
            .movements
            .iter()
            .position(|m| m.id == id)
            .ok_or(OrderError::UnknownMovement(id))?;
        self.check_source_owner(player, self.movements[index].source)?;
        Ok(self.movements.remove(index))
    }

    /// Movements currently launched from tiles the player owns.
    pub fn movements_of(&self, player: PlayerId) -> Vec<&Movement> {
        self.movements
            .iter()
            .filter(|m| self.tile(m.source).is_some_and(|t| t.owner == Some(player)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::generation::GameParams;
    use crate::world::board::generate_game;

    fn two_player_game() -> Game {
        generate_game(&GameParams {
            seed: 5,
            radius: 4,
            initial_tile_count: 3,
            initial_army: 10,
            players: vec!["red".to_string(), "blue".to_string()],
        })
        .unwrap()
    }

    fn owned_by(game: &Game, player: PlayerId) -> Vec<TileId> {
        game.tiles
            .iter()
            .filter(|t| t.owner == Some(player))
            .map(|t| t.id)
            .collect()
    }

    #[test]
    fn issue_movement_stores_order() {
        let mut game = two_player_game();
        let source = owned_by(&game, 1)[0];
        let target = owned_by(&game, 2)[0];
        let id = game.issue_movement(1, source, target, 7).unwrap();
        let movement = game.movement(id).unwrap();
        assert_eq!(movement.path(), (source, target));
        assert_eq!(movement.amount, 7);
        assert_eq!(game.movements_of(1).len(), 1);
        assert!(game.movements_of(2).is_empty());
    }

    #[test]
    fn issue_movement_rejects_invalid_orders() {
        let mut game = two_player_game();
        let mine = owned_by(&game, 1)[0];
        let theirs = owned_by(&game, 2)[0];

        assert_eq!(
            game.issue_movement(1, mine, theirs, 0),
            Err(OrderError::NonPositiveAmount)
        );
        assert_eq!(
            game.issue_movement(1, theirs, mine, 3),
            Err(OrderError::NotOwner {
                player: 1,
                tile: theirs
            })
        );
        assert_eq!(
            game.issue_movement(1, mine, mine, 3),
            Err(OrderError::SameTile(mine))
        );
        assert_eq!(
            game.issue_movement(1, mine, 9_999, 3),
            Err(OrderError::TileNotInGame(9_999))
        );
        assert_eq!(
            game.issue_movement(7, mine, theirs, 3),
            Err(OrderError::UnknownPlayer(7))
        );
        assert!(game.movements.is_empty());
    }

    #[test]
    fn duplicate_path_rejected() {
        let mut game = two_player_game();
        let mine = owned_by(&game, 1)[0];
        let theirs = owned_by(&game, 2)[0];
        game.issue_movement(1, mine, theirs, 3).unwrap();
        assert_eq!(
            game.issue_movement(1, mine, theirs, 4),
            Err(OrderError::PathTaken {
                from: mine,
                to: theirs
            })
        );
    }

    #[test]
    fn issue_by_coordinates() {
        let mut game = two_player_game();
        let from = game.tile(owned_by(&game, 1)[0]).unwrap().coords;
        let off_board = Cube::from_xy(10, -10);
        assert_eq!(
            game.issue_movement_between(1, from, off_board, 2),
            Err(OrderError::NoTileAt(off_board))
        );
        let to = game.tile(owned_by(&game, 2)[0]).unwrap().coords;
        assert!(game.issue_movement_between(1, from, to, 2).is_ok());
    }

    #[test]
    fn update_and_cancel_require_ownership() {
        let mut game = two_player_game();
        let mine = owned_by(&game, 1)[0];
        let theirs = owned_by(&game, 2)[0];
        let id = game.issue_movement(1, mine, theirs, 3).unwrap();

        assert!(matches!(
            game.update_movement(2, id, 9),
            Err(OrderError::NotOwner { .. })
        ));
        game.update_movement(1, id, 9).unwrap();
        assert_eq!(game.movement(id).unwrap().amount, 9);
        assert_eq!(
            game.update_movement(1, id, 0),
            Err(OrderError::NonPositiveAmount)
        );

        assert!(matches!(
            game.cancel_movement(2, id),
            Err(OrderError::NotOwner { .. })
        ));
        let cancelled = game.cancel_movement(1, id).unwrap();
        assert_eq!(cancelled.id, id);
        assert!(game.movements.is_empty());
        assert_eq!(
            game.cancel_movement(1, id),
            Err(OrderError::UnknownMovement(id))
        );
    }

    #[test]
    fn movement_ids_are_never_reused() {
        let mut game = two_player_game();
        let mine = owned_by(&game, 1);
        let theirs = owned_by(&game, 2)[0];
        let first = game.issue_movement(1, mine[0], theirs, 1).unwrap();
        game.cancel_movement(1, first).unwrap();
        let second = game.issue_movement(1, mine[0], theirs, 1).unwrap();
        assert!(second > first);
    }
}
