//! Catalog and demo account seeding for an empty store.

use catbattle_shared::{derive_stats, get_cat_definitions, get_item_definitions, NewOwnedCat, NewUser};
use log::info;

use super::{Result, Store, StoreError};

const DEMO_USERNAME: &str = "player1";

/// Starter cats of the demo account: (catalog index, level, experience, active)
const DEMO_CATS: [(usize, i32, i32, bool); 3] = [
    (0, 12, 1200, true),  // Thunder King
    (1, 10, 800, false),  // Shadow Ninja
    (2, 8, 600, false),   // Frost Guardian
];

/// Seed the built-in catalog if the store has no cats yet.
///
/// Returns whether anything was inserted.
pub async fn seed_catalog(store: &dyn Store, with_demo_user: bool) -> Result<bool> {
    if !store.list_cats().await?.is_empty() {
        info!("Catalog already present, skipping seed");
        return Ok(false);
    }

    let mut cats = Vec::new();
    for cat in get_cat_definitions() {
        cats.push(store.create_cat(cat).await?);
    }
    for item in get_item_definitions() {
        store.create_item(item).await?;
    }
    info!("Seeded {} cats and {} items", cats.len(), get_item_definitions().len());

    if !with_demo_user || store.get_user_by_username(DEMO_USERNAME).await?.is_some() {
        return Ok(true);
    }

    let user = store
        .create_user(NewUser {
            level: 12,
            coins: 2450,
            gems: 127,
            battles_won: 156,
            win_streak: 12,
            experience: 2400,
            ..NewUser::new(DEMO_USERNAME)
        })
        .await?;

    for (index, level, experience, is_active) in DEMO_CATS {
        let cat = cats
            .get(index)
            .ok_or_else(|| StoreError::Corrupted(format!("demo cat {} missing from catalog", index)))?;
        store
            .create_owned_cat(NewOwnedCat {
                user_id: user.id,
                cat_id: cat.id,
                level,
                experience,
                current_health: derive_stats(cat, level).max_health,
                is_active,
            })
            .await?;
    }
    info!("Created demo user '{}' with {} cats", DEMO_USERNAME, DEMO_CATS.len());

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;

    #[tokio::test]
    async fn test_seed_creates_catalog_and_demo_user() {
        let store = MemoryStore::new();
        assert!(seed_catalog(&store, true).await.unwrap());

        assert_eq!(store.list_cats().await.unwrap().len(), 6);
        assert_eq!(store.list_items().await.unwrap().len(), 2);

        let user = store.get_user_by_username("player1").await.unwrap().unwrap();
        assert_eq!(user.coins, 2450);
        let cats = store.list_owned_cats(user.id).await.unwrap();
        assert_eq!(cats.len(), 3);
        assert_eq!(cats.iter().filter(|c| c.is_active).count(), 1);
        // Thunder King at level 12
        assert_eq!(cats[0].current_health, 378);
    }

    #[tokio::test]
    async fn test_seed_is_skipped_when_catalog_exists() {
        let store = MemoryStore::new();
        seed_catalog(&store, false).await.unwrap();
        assert!(!seed_catalog(&store, true).await.unwrap());
        assert!(store.list_users().await.unwrap().is_empty());
        assert_eq!(store.list_cats().await.unwrap().len(), 6);
    }
}
