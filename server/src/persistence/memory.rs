//! In-memory Store implementation for local runs and tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use catbattle_shared::{
    Battle, BattleStatus, CatTemplate, Item, NewBattle, NewCat, NewItem, NewOwnedCat, NewOwnedItem, NewUser,
    OwnedCat, OwnedItem, User,
};
use tokio::sync::RwLock;

use super::{Result, Store, StoreError};

/// One entity kind: records by id plus the next id to hand out.
struct Table<T> {
    rows: BTreeMap<i64, T>,
    next_id: i64,
}

impl<T: Clone> Table<T> {
    fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }

    fn insert_with(&mut self, build: impl FnOnce(i64) -> T) -> T {
        let id = self.next_id;
        self.next_id += 1;
        let row = build(id);
        self.rows.insert(id, row.clone());
        row
    }

    fn get(&self, id: i64) -> Option<T> {
        self.rows.get(&id).cloned()
    }

    fn replace(&mut self, kind: &'static str, id: i64, row: T) -> Result<()> {
        match self.rows.get_mut(&id) {
            Some(slot) => {
                *slot = row;
                Ok(())
            }
            None => Err(StoreError::NotFound { kind, id }),
        }
    }

    fn filter(&self, pred: impl Fn(&T) -> bool) -> Vec<T> {
        self.rows.values().filter(|row| pred(row)).cloned().collect()
    }
}

struct Tables {
    users: Table<User>,
    cats: Table<CatTemplate>,
    owned_cats: Table<OwnedCat>,
    battles: Table<Battle>,
    items: Table<Item>,
    owned_items: Table<OwnedItem>,
}

/// Store backed by maps behind a single lock.
///
/// Each method takes the lock once, so multi-record writes are atomic.
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables {
                users: Table::new(),
                cats: Table::new(),
                owned_cats: Table::new(),
                battles: Table::new(),
                items: Table::new(),
                owned_items: Table::new(),
            }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_user(&self, id: i64) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(id))
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.rows.values().find(|u| u.username == username).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        Ok(self.tables.read().await.users.filter(|_| true))
    }

    async fn create_user(&self, user: NewUser) -> Result<User> {
        let mut tables = self.tables.write().await;
        if tables.users.rows.values().any(|u| u.username == user.username) {
            return Err(StoreError::UsernameTaken(user.username));
        }
        Ok(tables.users.insert_with(|id| user.with_id(id)))
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        self.tables.write().await.users.replace("user", user.id, user.clone())
    }

    async fn list_cats(&self) -> Result<Vec<CatTemplate>> {
        Ok(self.tables.read().await.cats.filter(|_| true))
    }

    async fn get_cat(&self, id: i64) -> Result<Option<CatTemplate>> {
        Ok(self.tables.read().await.cats.get(id))
    }

    async fn create_cat(&self, cat: NewCat) -> Result<CatTemplate> {
        Ok(self.tables.write().await.cats.insert_with(|id| cat.with_id(id)))
    }

    async fn list_owned_cats(&self, user_id: i64) -> Result<Vec<OwnedCat>> {
        Ok(self.tables.read().await.owned_cats.filter(|c| c.user_id == user_id))
    }

    async fn get_owned_cat(&self, id: i64) -> Result<Option<OwnedCat>> {
        Ok(self.tables.read().await.owned_cats.get(id))
    }

    async fn active_owned_cat(&self, user_id: i64) -> Result<Option<OwnedCat>> {
        let tables = self.tables.read().await;
        Ok(tables
            .owned_cats
            .rows
            .values()
            .find(|c| c.user_id == user_id && c.is_active)
            .cloned())
    }

    async fn create_owned_cat(&self, cat: NewOwnedCat) -> Result<OwnedCat> {
        Ok(self.tables.write().await.owned_cats.insert_with(|id| cat.with_id(id)))
    }

    async fn update_owned_cats(&self, cats: &[OwnedCat]) -> Result<()> {
        let mut tables = self.tables.write().await;
        // Check everything first so a missing row leaves the table untouched
        if let Some(missing) = cats.iter().find(|c| !tables.owned_cats.rows.contains_key(&c.id)) {
            return Err(StoreError::NotFound { kind: "owned cat", id: missing.id });
        }
        for cat in cats {
            tables.owned_cats.replace("owned cat", cat.id, cat.clone())?;
        }
        Ok(())
    }

    async fn get_battle(&self, id: i64) -> Result<Option<Battle>> {
        Ok(self.tables.read().await.battles.get(id))
    }

    async fn active_battle(&self, user_id: i64) -> Result<Option<Battle>> {
        let tables = self.tables.read().await;
        Ok(tables
            .battles
            .rows
            .values()
            .find(|b| b.user_id == user_id && b.status == BattleStatus::Active)
            .cloned())
    }

    async fn create_battle(&self, battle: NewBattle) -> Result<Battle> {
        Ok(self.tables.write().await.battles.insert_with(|id| battle.with_id(id)))
    }

    async fn record_battle_turn(&self, battle: &Battle, user: Option<&User>) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.battles.rows.contains_key(&battle.id) {
            return Err(StoreError::NotFound { kind: "battle", id: battle.id });
        }
        if let Some(user) = user {
            tables.users.replace("user", user.id, user.clone())?;
        }
        tables.battles.replace("battle", battle.id, battle.clone())
    }

    async fn list_items(&self) -> Result<Vec<Item>> {
        Ok(self.tables.read().await.items.filter(|_| true))
    }

    async fn get_item(&self, id: i64) -> Result<Option<Item>> {
        Ok(self.tables.read().await.items.get(id))
    }

    async fn create_item(&self, item: NewItem) -> Result<Item> {
        Ok(self.tables.write().await.items.insert_with(|id| item.with_id(id)))
    }

    async fn list_owned_items(&self, user_id: i64) -> Result<Vec<OwnedItem>> {
        Ok(self.tables.read().await.owned_items.filter(|i| i.user_id == user_id))
    }

    async fn get_owned_item(&self, id: i64) -> Result<Option<OwnedItem>> {
        Ok(self.tables.read().await.owned_items.get(id))
    }

    async fn create_owned_item(&self, item: NewOwnedItem) -> Result<OwnedItem> {
        Ok(self.tables.write().await.owned_items.insert_with(|id| item.with_id(id)))
    }

    async fn update_owned_item(&self, item: &OwnedItem) -> Result<()> {
        self.tables.write().await.owned_items.replace("owned item", item.id, item.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned_cat(user_id: i64, is_active: bool) -> NewOwnedCat {
        NewOwnedCat {
            user_id,
            cat_id: 1,
            level: 1,
            experience: 0,
            current_health: 100,
            is_active,
        }
    }

    #[tokio::test]
    async fn test_ids_are_sequential_per_kind() {
        let store = MemoryStore::new();
        let a = store.create_user(NewUser::new("alice")).await.unwrap();
        let b = store.create_user(NewUser::new("bob")).await.unwrap();
        let cat = store.create_owned_cat(owned_cat(a.id, true)).await.unwrap();

        assert_eq!((a.id, b.id, cat.id), (1, 2, 1));
        assert_eq!(store.get_user_by_username("bob").await.unwrap(), Some(b));
        assert_eq!(store.get_user(99).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_duplicate_username_is_refused() {
        let store = MemoryStore::new();
        store.create_user(NewUser::new("alice")).await.unwrap();
        let err = store.create_user(NewUser::new("alice")).await.unwrap_err();
        assert!(matches!(err, StoreError::UsernameTaken(name) if name == "alice"));
    }

    #[tokio::test]
    async fn test_owned_cat_filters() {
        let store = MemoryStore::new();
        store.create_owned_cat(owned_cat(1, false)).await.unwrap();
        let active = store.create_owned_cat(owned_cat(1, true)).await.unwrap();
        store.create_owned_cat(owned_cat(2, true)).await.unwrap();

        assert_eq!(store.list_owned_cats(1).await.unwrap().len(), 2);
        assert_eq!(store.active_owned_cat(1).await.unwrap(), Some(active));
        assert_eq!(store.active_owned_cat(3).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_bulk_update_is_all_or_nothing() {
        let store = MemoryStore::new();
        let mut first = store.create_owned_cat(owned_cat(1, true)).await.unwrap();
        first.is_active = false;
        let ghost = OwnedCat { id: 42, ..first.clone() };

        let err = store.update_owned_cats(&[first.clone(), ghost]).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { id: 42, .. }));
        assert!(store.get_owned_cat(first.id).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn test_owned_item_lookup_and_update() {
        let store = MemoryStore::new();
        let mut stack = store
            .create_owned_item(NewOwnedItem { user_id: 1, item_id: 2, quantity: 3 })
            .await
            .unwrap();
        assert_eq!(store.get_owned_item(stack.id).await.unwrap(), Some(stack.clone()));
        assert_eq!(store.get_owned_item(stack.id + 1).await.unwrap(), None);

        stack.quantity = 5;
        store.update_owned_item(&stack).await.unwrap();
        assert_eq!(store.get_owned_item(stack.id).await.unwrap().map(|i| i.quantity), Some(5));

        let ghost = OwnedItem { id: 99, ..stack };
        assert!(matches!(
            store.update_owned_item(&ghost).await,
            Err(StoreError::NotFound { kind: "owned item", id: 99 })
        ));
    }

    #[tokio::test]
    async fn test_list_users_in_id_order() {
        let store = MemoryStore::new();
        assert!(store.list_users().await.unwrap().is_empty());
        store.create_user(NewUser::new("bob")).await.unwrap();
        store.create_user(NewUser::new("alice")).await.unwrap();

        let names: Vec<String> = store.list_users().await.unwrap().into_iter().map(|u| u.username).collect();
        assert_eq!(names, vec!["bob".to_string(), "alice".to_string()]);
    }

    #[tokio::test]
    async fn test_active_battle_lookup_ignores_finished() {
        let store = MemoryStore::new();
        let new_battle = NewBattle {
            user_id: 1,
            player_cat_id: 1,
            opponent_cat_id: 2,
            player_health: 100,
            opponent_health: 100,
        };
        let mut battle = store.create_battle(new_battle).await.unwrap();
        assert_eq!(store.active_battle(1).await.unwrap().map(|b| b.id), Some(battle.id));

        battle.status = BattleStatus::Lost;
        store.record_battle_turn(&battle, None).await.unwrap();
        assert_eq!(store.active_battle(1).await.unwrap(), None);
    }
}
