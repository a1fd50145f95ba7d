//! Item definitions shared between client and server.

use serde::{Deserialize, Serialize};

/// Item definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub name: String,
    pub item_type: ItemType,
    /// Effect tag, e.g. "heal" or "attack"
    pub effect: String,
    pub value: i32,
    pub cost: i32,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewItem {
    pub name: String,
    pub item_type: ItemType,
    pub effect: String,
    pub value: i32,
    pub cost: i32,
    pub description: Option<String>,
}

impl NewItem {
    pub fn with_id(self, id: i64) -> Item {
        Item {
            id,
            name: self.name,
            item_type: self.item_type,
            effect: self.effect,
            value: self.value,
            cost: self.cost,
            description: self.description,
        }
    }
}

/// Item types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemType {
    Potion,
    Upgrade,
    Boost,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Potion => "potion",
            Self::Upgrade => "upgrade",
            Self::Boost => "boost",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "potion" => Some(Self::Potion),
            "upgrade" => Some(Self::Upgrade),
            "boost" => Some(Self::Boost),
            _ => None,
        }
    }
}

/// A user's stack of one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedItem {
    pub id: i64,
    pub user_id: i64,
    pub item_id: i64,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOwnedItem {
    pub user_id: i64,
    pub item_id: i64,
    pub quantity: i32,
}

impl NewOwnedItem {
    pub fn with_id(self, id: i64) -> OwnedItem {
        OwnedItem {
            id,
            user_id: self.user_id,
            item_id: self.item_id,
            quantity: self.quantity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnedItemDetails {
    pub owned: OwnedItem,
    pub item: Item,
}

/// Built-in item definitions
pub fn get_item_definitions() -> Vec<NewItem> {
    vec![
        NewItem {
            name: "Health Potion".into(),
            item_type: ItemType::Potion,
            effect: "heal".into(),
            value: 50,
            cost: 25,
            description: Some("Restores 50 HP to your cat".into()),
        },
        NewItem {
            name: "Attack Boost".into(),
            item_type: ItemType::Boost,
            effect: "attack".into(),
            value: 10,
            cost: 50,
            description: Some("Increases attack by 10 for the battle".into()),
        },
    ]
}
