//! Game service: every client-facing operation.
//!
//! Each mutating operation runs its store reads, rule evaluation and store
//! writes while holding the acting user's lock.

mod locks;

pub use locks::UserLocks;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use catbattle_shared::{
    activate, derive_stats, grant_reward, resolve_turn, Battle, BattleAction, BattleDetails, BattleStatus,
    CatTemplate, ErrorKind, GameError, Item, NewBattle, NewOwnedCat, NewOwnedItem, NewUser, OwnedCat,
    OwnedCatDetails, OwnedItemDetails, RandomSource, User, UserUpdate,
};
use log::{debug, info};
use thiserror::Error;

use crate::persistence::{Store, StoreError};

const MAX_USERNAME_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Game(#[from] GameError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    /// Category reported to the client
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::InvalidRequest(_) | Self::Game(_) => ErrorKind::InvalidRequest,
            Self::Store(StoreError::NotFound { .. }) => ErrorKind::NotFound,
            Self::Store(StoreError::UsernameTaken(_)) => ErrorKind::Conflict,
            Self::Store(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Game operations over an injected store and random source
pub struct GameService {
    store: Arc<dyn Store>,
    rng: Mutex<Box<dyn RandomSource + Send>>,
    locks: UserLocks,
}

impl GameService {
    pub fn new(store: Arc<dyn Store>, rng: Box<dyn RandomSource + Send>) -> Self {
        Self {
            store,
            rng: Mutex::new(rng),
            locks: UserLocks::new(),
        }
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    async fn require_user(&self, user_id: i64) -> Result<User> {
        self.store.get_user(user_id).await?.ok_or(ServiceError::NotFound("user"))
    }

    async fn require_cat(&self, cat_id: i64) -> Result<CatTemplate> {
        self.store.get_cat(cat_id).await?.ok_or(ServiceError::NotFound("cat"))
    }

    async fn require_item(&self, item_id: i64) -> Result<Item> {
        self.store.get_item(item_id).await?.ok_or(ServiceError::NotFound("item"))
    }

    /// Join an owned cat with its template.
    async fn cat_details(&self, owned: OwnedCat) -> Result<OwnedCatDetails> {
        let cat = self.store.get_cat(owned.cat_id).await?.ok_or_else(|| {
            StoreError::Corrupted(format!("owned cat {} references missing cat {}", owned.id, owned.cat_id))
        })?;
        Ok(OwnedCatDetails::new(owned, cat))
    }

    async fn battle_details(&self, battle: Battle) -> Result<BattleDetails> {
        let owned = self.store.get_owned_cat(battle.player_cat_id).await?.ok_or_else(|| {
            StoreError::Corrupted(format!("battle {} references missing owned cat {}", battle.id, battle.player_cat_id))
        })?;
        let player_cat = self.cat_details(owned).await?;
        let opponent_cat = self.store.get_cat(battle.opponent_cat_id).await?.ok_or_else(|| {
            StoreError::Corrupted(format!("battle {} references missing cat {}", battle.id, battle.opponent_cat_id))
        })?;

        Ok(BattleDetails {
            battle,
            player_cat,
            opponent_cat,
        })
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut dyn RandomSource) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut **rng)
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    pub async fn get_user(&self, user_id: i64) -> Result<User> {
        self.require_user(user_id).await
    }

    pub async fn find_user(&self, username: &str) -> Result<User> {
        self.store
            .get_user_by_username(username)
            .await?
            .ok_or(ServiceError::NotFound("user"))
    }

    pub async fn register_user(&self, username: &str) -> Result<User> {
        if username.is_empty() || username.len() > MAX_USERNAME_LEN {
            return Err(ServiceError::InvalidRequest(format!(
                "username must be 1-{} characters",
                MAX_USERNAME_LEN
            )));
        }
        if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ServiceError::InvalidRequest(
                "username may only contain letters, digits and underscores".to_string(),
            ));
        }

        let user = self.store.create_user(NewUser::new(username)).await?;
        info!("Registered user {} ({})", user.username, user.id);
        Ok(user)
    }

    pub async fn update_user(&self, user_id: i64, update: UserUpdate) -> Result<User> {
        let _guard = self.locks.lock(user_id).await;

        let mut user = self.require_user(user_id).await?;
        update.apply(&mut user);
        self.store.update_user(&user).await?;
        Ok(user)
    }

    // =========================================================================
    // Cats
    // =========================================================================

    pub async fn list_cats(&self) -> Result<Vec<CatTemplate>> {
        Ok(self.store.list_cats().await?)
    }

    pub async fn list_user_cats(&self, user_id: i64) -> Result<Vec<OwnedCatDetails>> {
        let catalog: HashMap<i64, CatTemplate> =
            self.store.list_cats().await?.into_iter().map(|c| (c.id, c)).collect();

        self.store
            .list_owned_cats(user_id)
            .await?
            .into_iter()
            .map(|owned| -> Result<OwnedCatDetails> {
                let cat = catalog.get(&owned.cat_id).cloned().ok_or_else(|| {
                    StoreError::Corrupted(format!("owned cat {} references missing cat {}", owned.id, owned.cat_id))
                })?;
                Ok(OwnedCatDetails::new(owned, cat))
            })
            .collect()
    }

    pub async fn active_cat(&self, user_id: i64) -> Result<OwnedCatDetails> {
        let owned = self
            .store
            .active_owned_cat(user_id)
            .await?
            .ok_or(ServiceError::NotFound("active cat"))?;
        self.cat_details(owned).await
    }

    /// Give a user a level 1 copy of a catalog cat at full health.
    ///
    /// The first cat a user owns becomes their active cat.
    pub async fn adopt_cat(&self, user_id: i64, cat_id: i64) -> Result<OwnedCatDetails> {
        let _guard = self.locks.lock(user_id).await;

        self.require_user(user_id).await?;
        let cat = self.require_cat(cat_id).await?;
        let first = self.store.list_owned_cats(user_id).await?.is_empty();

        let owned = self
            .store
            .create_owned_cat(NewOwnedCat {
                user_id,
                cat_id,
                level: 1,
                experience: 0,
                current_health: derive_stats(&cat, 1).max_health,
                is_active: first,
            })
            .await?;
        info!("User {} adopted {} (owned cat {})", user_id, cat.name, owned.id);

        Ok(OwnedCatDetails::new(owned, cat))
    }

    /// Make one of the user's cats the only active one.
    pub async fn activate_cat(&self, user_id: i64, owned_cat_id: i64) -> Result<OwnedCatDetails> {
        let _guard = self.locks.lock(user_id).await;

        self.store
            .get_owned_cat(owned_cat_id)
            .await?
            .ok_or(ServiceError::NotFound("owned cat"))?;

        let cats = self.store.list_owned_cats(user_id).await?;
        let updated = activate(owned_cat_id, user_id, cats)?;
        self.store.update_owned_cats(&updated).await?;

        let target = updated
            .into_iter()
            .find(|c| c.id == owned_cat_id)
            .ok_or(ServiceError::NotFound("owned cat"))?;
        debug!("User {} activated owned cat {}", user_id, owned_cat_id);
        self.cat_details(target).await
    }

    // =========================================================================
    // Battles
    // =========================================================================

    /// Open a battle between one of the user's cats and a catalog opponent.
    pub async fn start_battle(&self, user_id: i64, player_cat_id: i64, opponent_cat_id: i64) -> Result<BattleDetails> {
        let _guard = self.locks.lock(user_id).await;

        self.require_user(user_id).await?;
        let owned = self
            .store
            .get_owned_cat(player_cat_id)
            .await?
            .ok_or(ServiceError::NotFound("owned cat"))?;
        if owned.user_id != user_id {
            return Err(GameError::CatNotOwned { owned_cat_id: player_cat_id, user_id }.into());
        }
        let opponent = self.require_cat(opponent_cat_id).await?;

        if self.store.active_battle(user_id).await?.is_some() {
            return Err(ServiceError::Conflict("battle already in progress".to_string()));
        }

        let player = self.cat_details(owned).await?;
        let battle = self
            .store
            .create_battle(NewBattle {
                user_id,
                player_cat_id,
                opponent_cat_id,
                player_health: player.stats.max_health,
                opponent_health: opponent.base_health,
            })
            .await?;
        info!(
            "Battle {} started: user {} with {} vs {}",
            battle.id,
            user_id,
            player.name(),
            opponent.name
        );

        Ok(BattleDetails {
            battle,
            player_cat: player,
            opponent_cat: opponent,
        })
    }

    pub async fn active_battle(&self, user_id: i64) -> Result<BattleDetails> {
        let battle = self
            .store
            .active_battle(user_id)
            .await?
            .ok_or(ServiceError::NotFound("active battle"))?;
        self.battle_details(battle).await
    }

    /// Resolve one player action, rewarding the user if it wins the battle.
    pub async fn battle_action(&self, battle_id: i64, action: &str, item_id: Option<i64>) -> Result<BattleDetails> {
        let action = BattleAction::parse(action, item_id)?;

        let owner = self
            .store
            .get_battle(battle_id)
            .await?
            .ok_or(ServiceError::NotFound("battle"))?
            .user_id;
        let _guard = self.locks.lock(owner).await;

        // Re-read under the lock, a concurrent action may have finished it
        let battle = self
            .store
            .get_battle(battle_id)
            .await?
            .ok_or(ServiceError::NotFound("battle"))?;
        let BattleDetails {
            battle,
            player_cat,
            opponent_cat,
        } = self.battle_details(battle).await?;
        let user = self.require_user(battle.user_id).await?;

        let (turn, reward) = self.with_rng(|rng| -> Result<_> {
            let turn = resolve_turn(&battle, &player_cat, &opponent_cat, action, rng)?;
            let reward = match turn.battle.status {
                BattleStatus::Won => Some(grant_reward(&turn.battle, &user, rng)?),
                _ => None,
            };
            Ok((turn, reward))
        })?;

        let mut next = turn.battle;
        if let Some(reward) = &reward {
            next.coins_reward = Some(reward.coins);
            next.experience_reward = Some(reward.experience);
        }
        self.store
            .record_battle_turn(&next, reward.as_ref().map(|r| &r.user))
            .await?;

        debug!("Battle {} turn {}: {}", next.id, battle.turn, turn.log_line);
        match (&next.status, &reward) {
            (BattleStatus::Won, Some(reward)) => info!(
                "Battle {} won by user {}: +{} coins, +{} xp",
                next.id, next.user_id, reward.coins, reward.experience
            ),
            (BattleStatus::Lost, _) => info!("Battle {} lost by user {}", next.id, next.user_id),
            _ => {}
        }

        Ok(BattleDetails {
            battle: next,
            player_cat,
            opponent_cat,
        })
    }

    // =========================================================================
    // Items
    // =========================================================================

    pub async fn list_items(&self) -> Result<Vec<Item>> {
        Ok(self.store.list_items().await?)
    }

    pub async fn list_user_items(&self, user_id: i64) -> Result<Vec<OwnedItemDetails>> {
        let catalog: HashMap<i64, Item> = self.store.list_items().await?.into_iter().map(|i| (i.id, i)).collect();

        self.store
            .list_owned_items(user_id)
            .await?
            .into_iter()
            .map(|owned| -> Result<OwnedItemDetails> {
                let item = catalog.get(&owned.item_id).cloned().ok_or_else(|| {
                    StoreError::Corrupted(format!("owned item {} references missing item {}", owned.id, owned.item_id))
                })?;
                Ok(OwnedItemDetails { owned, item })
            })
            .collect()
    }

    /// Add `quantity` of an item to the user's stack, creating it if needed.
    pub async fn give_item(&self, user_id: i64, item_id: i64, quantity: i32) -> Result<OwnedItemDetails> {
        if quantity <= 0 {
            return Err(ServiceError::InvalidRequest("quantity must be positive".to_string()));
        }
        let _guard = self.locks.lock(user_id).await;

        self.require_user(user_id).await?;
        let item = self.require_item(item_id).await?;

        let existing = self
            .store
            .list_owned_items(user_id)
            .await?
            .into_iter()
            .find(|owned| owned.item_id == item_id);

        let owned = match existing {
            Some(mut owned) => {
                owned.quantity = owned.quantity.saturating_add(quantity);
                self.store.update_owned_item(&owned).await?;
                owned
            }
            None => {
                self.store
                    .create_owned_item(NewOwnedItem {
                        user_id,
                        item_id,
                        quantity,
                    })
                    .await?
            }
        };

        Ok(OwnedItemDetails { owned, item })
    }
}
