//! Network protocol definitions shared between client and server.
//!
//! Every frame on the wire is a big-endian `u32` length followed by that many
//! bytes of bincode-encoded [`ClientMessage`] or [`ServerMessage`].

use serde::{Deserialize, Serialize};

use crate::{BattleDetails, CatTemplate, Item, OwnedCatDetails, OwnedItemDetails, User, UserUpdate};

/// Protocol version for compatibility checking
pub const PROTOCOL_VERSION: u32 = 1;

/// Default server port
pub const DEFAULT_PORT: u16 = 7878;

/// Largest frame either side will accept
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

// =============================================================================
// Client -> Server
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// First message on every connection
    Hello {
        protocol_version: u32,
    },

    // === Accounts ===
    GetUser {
        user_id: i64,
    },
    FindUser {
        username: String,
    },
    RegisterUser {
        username: String,
    },
    UpdateUser {
        user_id: i64,
        update: UserUpdate,
    },

    // === Cats ===
    ListCats,
    ListUserCats {
        user_id: i64,
    },
    GetActiveCat {
        user_id: i64,
    },
    AdoptCat {
        user_id: i64,
        cat_id: i64,
    },
    ActivateCat {
        user_id: i64,
        owned_cat_id: i64,
    },

    // === Battles ===
    StartBattle {
        user_id: i64,
        player_cat_id: i64,
        opponent_cat_id: i64,
    },
    GetActiveBattle {
        user_id: i64,
    },
    /// `action` is one of "attack", "defend", "special", "item"
    BattleAction {
        battle_id: i64,
        action: String,
        item_id: Option<i64>,
    },

    // === Items ===
    ListItems,
    ListUserItems {
        user_id: i64,
    },
    GiveItem {
        user_id: i64,
        item_id: i64,
        quantity: i32,
    },

    /// Disconnect gracefully
    Disconnect,
}

// =============================================================================
// Server -> Client
// =============================================================================

/// Failure categories, one per distinct client reaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    InvalidRequest,
    Conflict,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    Welcome {
        protocol_version: u32,
    },
    User(User),
    Cats(Vec<CatTemplate>),
    OwnedCat(OwnedCatDetails),
    OwnedCats(Vec<OwnedCatDetails>),
    Battle(BattleDetails),
    Items(Vec<Item>),
    OwnedItems(Vec<OwnedItemDetails>),
    OwnedItem(OwnedItemDetails),
    Error {
        kind: ErrorKind,
        message: String,
    },
}

impl ServerMessage {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            kind,
            message: message.into(),
        }
    }
}

impl ClientMessage {
    pub fn serialize(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

impl ServerMessage {
    pub fn serialize(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_battle_action_message_survives_encoding() {
        let msg = ClientMessage::BattleAction {
            battle_id: 9,
            action: "special".into(),
            item_id: None,
        };
        let bytes = msg.serialize().unwrap();
        assert_eq!(ClientMessage::deserialize(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(ServerMessage::deserialize(&[0xff, 0xff, 0xff, 0xff, 0x01]).is_err());
    }
}
