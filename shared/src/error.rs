//! Rule violations raised by the pure game logic.

use thiserror::Error;

use crate::BattleStatus;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("battle is {status}, no further actions accepted")]
    BattleNotActive { status: BattleStatus },

    #[error("rewards are only granted for won battles (battle is {status})")]
    BattleNotWon { status: BattleStatus },

    #[error("owned cat {owned_cat_id} does not belong to user {user_id}")]
    CatNotOwned { owned_cat_id: i64, user_id: i64 },

    #[error("unrecognized battle action '{0}'")]
    UnrecognizedAction(String),
}
