//! Cat catalog entries, owned cats and level-scaled stats.

use serde::{Deserialize, Serialize};

use crate::GameError;

/// Stat growth per level above 1 (10%).
const LEVEL_GROWTH: f64 = 0.1;

/// Cat rarity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rarity {
    Common,
    Rare,
    Epic,
    Legendary,
}

impl Rarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Common => "common",
            Self::Rare => "rare",
            Self::Epic => "epic",
            Self::Legendary => "legendary",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "common" => Some(Self::Common),
            "rare" => Some(Self::Rare),
            "epic" => Some(Self::Epic),
            "legendary" => Some(Self::Legendary),
            _ => None,
        }
    }
}

/// Immutable catalog entry. Every owned cat and every AI opponent points at one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatTemplate {
    pub id: i64,
    pub name: String,
    pub rarity: Rarity,
    pub base_attack: i32,
    pub base_health: i32,
    pub base_defense: i32,
    pub base_speed: i32,
    pub image_url: String,
    pub description: Option<String>,
    pub special_ability: Option<String>,
}

/// Catalog entry before it has been assigned an id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCat {
    pub name: String,
    pub rarity: Rarity,
    pub base_attack: i32,
    pub base_health: i32,
    pub base_defense: i32,
    pub base_speed: i32,
    pub image_url: String,
    pub description: Option<String>,
    pub special_ability: Option<String>,
}

impl NewCat {
    pub fn with_id(self, id: i64) -> CatTemplate {
        CatTemplate {
            id,
            name: self.name,
            rarity: self.rarity,
            base_attack: self.base_attack,
            base_health: self.base_health,
            base_defense: self.base_defense,
            base_speed: self.base_speed,
            image_url: self.image_url,
            description: self.description,
            special_ability: self.special_ability,
        }
    }
}

/// A user's leveled instance of a catalog cat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedCat {
    pub id: i64,
    pub user_id: i64,
    pub cat_id: i64,
    pub level: i32,
    pub experience: i32,
    pub current_health: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOwnedCat {
    pub user_id: i64,
    pub cat_id: i64,
    pub level: i32,
    pub experience: i32,
    pub current_health: i32,
    pub is_active: bool,
}

impl NewOwnedCat {
    pub fn with_id(self, id: i64) -> OwnedCat {
        OwnedCat {
            id,
            user_id: self.user_id,
            cat_id: self.cat_id,
            level: self.level,
            experience: self.experience,
            current_health: self.current_health,
            is_active: self.is_active,
        }
    }
}

/// Effective combat stats of an owned cat. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedStats {
    pub max_health: i32,
    pub attack: i32,
    pub defense: i32,
    pub speed: i32,
}

/// Scale a template's base stats to `level`.
///
/// Each stat is `floor(base * (1 + (level - 1) * 0.1))`. Levels below 1 are
/// treated as 1 so the result never drops under the base stats.
pub fn derive_stats(cat: &CatTemplate, level: i32) -> DerivedStats {
    let multiplier = 1.0 + (level.max(1) - 1) as f64 * LEVEL_GROWTH;
    let scale = |base: i32| (base as f64 * multiplier).floor() as i32;

    DerivedStats {
        max_health: scale(cat.base_health),
        attack: scale(cat.base_attack),
        defense: scale(cat.base_defense),
        speed: scale(cat.base_speed),
    }
}

/// Owned cat joined with its template and derived stats
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnedCatDetails {
    pub owned: OwnedCat,
    pub cat: CatTemplate,
    pub stats: DerivedStats,
}

impl OwnedCatDetails {
    pub fn new(owned: OwnedCat, cat: CatTemplate) -> Self {
        let stats = derive_stats(&cat, owned.level);
        Self { owned, cat, stats }
    }

    pub fn name(&self) -> &str {
        &self.cat.name
    }
}

/// Make `target_id` the only active cat among `cats`.
///
/// Every cat in the set must belong to `user_id`; the target must be present.
pub fn activate(target_id: i64, user_id: i64, mut cats: Vec<OwnedCat>) -> Result<Vec<OwnedCat>, GameError> {
    if let Some(foreign) = cats.iter().find(|c| c.user_id != user_id) {
        return Err(GameError::CatNotOwned { owned_cat_id: foreign.id, user_id });
    }
    if !cats.iter().any(|c| c.id == target_id) {
        return Err(GameError::CatNotOwned { owned_cat_id: target_id, user_id });
    }

    for cat in &mut cats {
        cat.is_active = cat.id == target_id;
    }
    Ok(cats)
}

/// Built-in cat catalog
pub fn get_cat_definitions() -> Vec<NewCat> {
    fn cat(
        name: &str,
        rarity: Rarity,
        [attack, health, defense, speed]: [i32; 4],
        image: &str,
        description: &str,
        special: &str,
    ) -> NewCat {
        NewCat {
            name: name.into(),
            rarity,
            base_attack: attack,
            base_health: health,
            base_defense: defense,
            base_speed: speed,
            image_url: format!(
                "https://images.unsplash.com/{}?ixlib=rb-4.0.3&auto=format&fit=crop&w=400&h=400",
                image
            ),
            description: Some(description.into()),
            special_ability: Some(special.into()),
        }
    }

    vec![
        cat("Thunder King", Rarity::Legendary, [95, 180, 75, 80], "photo-1514888286974-6c03e2ca1dba",
            "A majestic cat with lightning powers", "Lightning Strike"),
        cat("Shadow Ninja", Rarity::Epic, [88, 145, 65, 95], "photo-1518791841217-8f162f1e1131",
            "A stealthy cat that strikes from the shadows", "Shadow Strike"),
        cat("Frost Guardian", Rarity::Rare, [70, 130, 85, 65], "photo-1574158622682-e40e69881006",
            "A defensive cat with ice powers", "Frost Shield"),
        cat("Street Fighter", Rarity::Common, [55, 100, 45, 70], "photo-1592194996308-7b43878e84a6",
            "A scrappy street cat with fighting spirit", "Street Combo"),
        cat("Forest Sage", Rarity::Epic, [78, 160, 70, 75], "photo-1513360371669-4adf3dd7dff8",
            "A wise cat with nature magic", "Nature's Blessing"),
        cat("Dark Warrior", Rarity::Epic, [85, 200, 60, 70], "photo-1571566882372-1598d88abd90",
            "A fierce dark cat warrior", "Dark Rage"),
    ]
}
