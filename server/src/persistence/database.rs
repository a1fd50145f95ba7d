//! PostgreSQL Store implementation.

use async_trait::async_trait;
use catbattle_shared::{
    Battle, BattleStatus, CatTemplate, Item, ItemType, NewBattle, NewCat, NewItem, NewOwnedCat, NewOwnedItem,
    NewUser, OwnedCat, OwnedItem, Rarity, User,
};
use sqlx::{postgres::PgPoolOptions, postgres::PgRow, PgPool, Postgres, Row, Transaction};

use super::{Result, Store, StoreError};

/// Tables are created on startup if missing
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id BIGSERIAL PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    level INTEGER NOT NULL DEFAULT 1,
    coins INTEGER NOT NULL DEFAULT 500,
    gems INTEGER NOT NULL DEFAULT 50,
    battles_won INTEGER NOT NULL DEFAULT 0,
    win_streak INTEGER NOT NULL DEFAULT 0,
    experience INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS cats (
    id BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL,
    rarity TEXT NOT NULL,
    base_attack INTEGER NOT NULL,
    base_health INTEGER NOT NULL,
    base_defense INTEGER NOT NULL,
    base_speed INTEGER NOT NULL,
    image_url TEXT NOT NULL,
    description TEXT,
    special_ability TEXT
);

CREATE TABLE IF NOT EXISTS user_cats (
    id BIGSERIAL PRIMARY KEY,
    user_id BIGINT NOT NULL REFERENCES users(id),
    cat_id BIGINT NOT NULL REFERENCES cats(id),
    level INTEGER NOT NULL DEFAULT 1,
    experience INTEGER NOT NULL DEFAULT 0,
    current_health INTEGER NOT NULL,
    is_active BOOLEAN NOT NULL DEFAULT FALSE
);

CREATE TABLE IF NOT EXISTS battles (
    id BIGSERIAL PRIMARY KEY,
    user_id BIGINT NOT NULL REFERENCES users(id),
    player_cat_id BIGINT NOT NULL REFERENCES user_cats(id),
    opponent_cat_id BIGINT NOT NULL REFERENCES cats(id),
    status TEXT NOT NULL,
    turn INTEGER NOT NULL DEFAULT 1,
    round INTEGER NOT NULL DEFAULT 1,
    player_health INTEGER NOT NULL,
    opponent_health INTEGER NOT NULL,
    battle_log JSONB NOT NULL DEFAULT '[]',
    coins_reward INTEGER,
    experience_reward INTEGER
);

CREATE TABLE IF NOT EXISTS items (
    id BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL,
    type TEXT NOT NULL,
    effect TEXT NOT NULL,
    value INTEGER NOT NULL,
    cost INTEGER NOT NULL,
    description TEXT
);

CREATE TABLE IF NOT EXISTS user_items (
    id BIGSERIAL PRIMARY KEY,
    user_id BIGINT NOT NULL REFERENCES users(id),
    item_id BIGINT NOT NULL REFERENCES items(id),
    quantity INTEGER NOT NULL DEFAULT 1
);
";

const USER_COLUMNS: &str = "id, username, level, coins, gems, battles_won, win_streak, experience";
const CAT_COLUMNS: &str =
    "id, name, rarity, base_attack, base_health, base_defense, base_speed, image_url, description, special_ability";
const OWNED_CAT_COLUMNS: &str = "id, user_id, cat_id, level, experience, current_health, is_active";
const BATTLE_COLUMNS: &str = "id, user_id, player_cat_id, opponent_cat_id, status, turn, round, \
                              player_health, opponent_health, battle_log, coins_reward, experience_reward";
const ITEM_COLUMNS: &str = "id, name, type, effect, value, cost, description";
const OWNED_ITEM_COLUMNS: &str = "id, user_id, item_id, quantity";

/// Database connection wrapper
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to the database
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        Ok(Self { pool })
    }

    /// Create missing tables
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    // =========================================================================
    // Row mapping
    // =========================================================================

    fn user_from_row(r: &PgRow) -> User {
        User {
            id: r.get("id"),
            username: r.get("username"),
            level: r.get("level"),
            coins: r.get("coins"),
            gems: r.get("gems"),
            battles_won: r.get("battles_won"),
            win_streak: r.get("win_streak"),
            experience: r.get("experience"),
        }
    }

    fn cat_from_row(r: &PgRow) -> Result<CatTemplate> {
        let rarity: String = r.get("rarity");
        let rarity = Rarity::parse(&rarity)
            .ok_or_else(|| StoreError::Corrupted(format!("unknown cat rarity '{}'", rarity)))?;

        Ok(CatTemplate {
            id: r.get("id"),
            name: r.get("name"),
            rarity,
            base_attack: r.get("base_attack"),
            base_health: r.get("base_health"),
            base_defense: r.get("base_defense"),
            base_speed: r.get("base_speed"),
            image_url: r.get("image_url"),
            description: r.get("description"),
            special_ability: r.get("special_ability"),
        })
    }

    fn owned_cat_from_row(r: &PgRow) -> OwnedCat {
        OwnedCat {
            id: r.get("id"),
            user_id: r.get("user_id"),
            cat_id: r.get("cat_id"),
            level: r.get("level"),
            experience: r.get("experience"),
            current_health: r.get("current_health"),
            is_active: r.get("is_active"),
        }
    }

    fn battle_from_row(r: &PgRow) -> Result<Battle> {
        let status: String = r.get("status");
        let status = BattleStatus::parse(&status)
            .ok_or_else(|| StoreError::Corrupted(format!("unknown battle status '{}'", status)))?;
        let log_json: serde_json::Value = r.get("battle_log");

        Ok(Battle {
            id: r.get("id"),
            user_id: r.get("user_id"),
            player_cat_id: r.get("player_cat_id"),
            opponent_cat_id: r.get("opponent_cat_id"),
            status,
            turn: r.get("turn"),
            round: r.get("round"),
            player_health: r.get("player_health"),
            opponent_health: r.get("opponent_health"),
            log: serde_json::from_value(log_json)?,
            coins_reward: r.get("coins_reward"),
            experience_reward: r.get("experience_reward"),
        })
    }

    fn item_from_row(r: &PgRow) -> Result<Item> {
        let item_type: String = r.get("type");
        let item_type = ItemType::parse(&item_type)
            .ok_or_else(|| StoreError::Corrupted(format!("unknown item type '{}'", item_type)))?;

        Ok(Item {
            id: r.get("id"),
            name: r.get("name"),
            item_type,
            effect: r.get("effect"),
            value: r.get("value"),
            cost: r.get("cost"),
            description: r.get("description"),
        })
    }

    fn owned_item_from_row(r: &PgRow) -> OwnedItem {
        OwnedItem {
            id: r.get("id"),
            user_id: r.get("user_id"),
            item_id: r.get("item_id"),
            quantity: r.get("quantity"),
        }
    }

    async fn write_user(tx: &mut Transaction<'_, Postgres>, user: &User) -> Result<()> {
        let result = sqlx::query(
            "UPDATE users SET username = $2, level = $3, coins = $4, gems = $5,
                              battles_won = $6, win_streak = $7, experience = $8
             WHERE id = $1",
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(user.level)
        .bind(user.coins)
        .bind(user.gems)
        .bind(user.battles_won)
        .bind(user.win_streak)
        .bind(user.experience)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { kind: "user", id: user.id });
        }
        Ok(())
    }
}

/// Postgres unique_violation
fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

#[async_trait]
impl Store for PgStore {
    // =========================================================================
    // Users
    // =========================================================================

    async fn get_user(&self, id: i64) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(Self::user_from_row))
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE username = $1", USER_COLUMNS))
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(Self::user_from_row))
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query(&format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(Self::user_from_row).collect())
    }

    async fn create_user(&self, user: NewUser) -> Result<User> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO users (username, level, coins, gems, battles_won, win_streak, experience)
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
        )
        .bind(&user.username)
        .bind(user.level)
        .bind(user.coins)
        .bind(user.gems)
        .bind(user.battles_won)
        .bind(user.win_streak)
        .bind(user.experience)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::UsernameTaken(user.username.clone())
            } else {
                StoreError::Database(e)
            }
        })?;

        Ok(user.with_id(id))
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::write_user(&mut tx, user).await?;
        tx.commit().await?;
        Ok(())
    }

    // =========================================================================
    // Cat catalog
    // =========================================================================

    async fn list_cats(&self) -> Result<Vec<CatTemplate>> {
        let rows = sqlx::query(&format!("SELECT {} FROM cats ORDER BY id", CAT_COLUMNS))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::cat_from_row).collect()
    }

    async fn get_cat(&self, id: i64) -> Result<Option<CatTemplate>> {
        let row = sqlx::query(&format!("SELECT {} FROM cats WHERE id = $1", CAT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::cat_from_row).transpose()
    }

    async fn create_cat(&self, cat: NewCat) -> Result<CatTemplate> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO cats (name, rarity, base_attack, base_health, base_defense, base_speed,
                               image_url, description, special_ability)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING id",
        )
        .bind(&cat.name)
        .bind(cat.rarity.as_str())
        .bind(cat.base_attack)
        .bind(cat.base_health)
        .bind(cat.base_defense)
        .bind(cat.base_speed)
        .bind(&cat.image_url)
        .bind(&cat.description)
        .bind(&cat.special_ability)
        .fetch_one(&self.pool)
        .await?;

        Ok(cat.with_id(id))
    }

    // =========================================================================
    // Owned cats
    // =========================================================================

    async fn list_owned_cats(&self, user_id: i64) -> Result<Vec<OwnedCat>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM user_cats WHERE user_id = $1 ORDER BY id",
            OWNED_CAT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::owned_cat_from_row).collect())
    }

    async fn get_owned_cat(&self, id: i64) -> Result<Option<OwnedCat>> {
        let row = sqlx::query(&format!("SELECT {} FROM user_cats WHERE id = $1", OWNED_CAT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(Self::owned_cat_from_row))
    }

    async fn active_owned_cat(&self, user_id: i64) -> Result<Option<OwnedCat>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM user_cats WHERE user_id = $1 AND is_active ORDER BY id LIMIT 1",
            OWNED_CAT_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(Self::owned_cat_from_row))
    }

    async fn create_owned_cat(&self, cat: NewOwnedCat) -> Result<OwnedCat> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO user_cats (user_id, cat_id, level, experience, current_health, is_active)
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
        )
        .bind(cat.user_id)
        .bind(cat.cat_id)
        .bind(cat.level)
        .bind(cat.experience)
        .bind(cat.current_health)
        .bind(cat.is_active)
        .fetch_one(&self.pool)
        .await?;

        Ok(cat.with_id(id))
    }

    async fn update_owned_cats(&self, cats: &[OwnedCat]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for cat in cats {
            let result = sqlx::query(
                "UPDATE user_cats SET user_id = $2, cat_id = $3, level = $4, experience = $5,
                                      current_health = $6, is_active = $7
                 WHERE id = $1",
            )
            .bind(cat.id)
            .bind(cat.user_id)
            .bind(cat.cat_id)
            .bind(cat.level)
            .bind(cat.experience)
            .bind(cat.current_health)
            .bind(cat.is_active)
            .execute(&mut *tx)
            .await?;

            // Dropping the transaction rolls back the rows already written
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound { kind: "owned cat", id: cat.id });
            }
        }

        tx.commit().await?;
        Ok(())
    }

    // =========================================================================
    // Battles
    // =========================================================================

    async fn get_battle(&self, id: i64) -> Result<Option<Battle>> {
        let row = sqlx::query(&format!("SELECT {} FROM battles WHERE id = $1", BATTLE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::battle_from_row).transpose()
    }

    async fn active_battle(&self, user_id: i64) -> Result<Option<Battle>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM battles WHERE user_id = $1 AND status = 'active' ORDER BY id LIMIT 1",
            BATTLE_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::battle_from_row).transpose()
    }

    async fn create_battle(&self, battle: NewBattle) -> Result<Battle> {
        let battle = battle.with_id(0);
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO battles (user_id, player_cat_id, opponent_cat_id, status, turn, round,
                                  player_health, opponent_health, battle_log)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING id",
        )
        .bind(battle.user_id)
        .bind(battle.player_cat_id)
        .bind(battle.opponent_cat_id)
        .bind(battle.status.as_str())
        .bind(battle.turn)
        .bind(battle.round)
        .bind(battle.player_health)
        .bind(battle.opponent_health)
        .bind(serde_json::to_value(&battle.log)?)
        .fetch_one(&self.pool)
        .await?;

        Ok(Battle { id, ..battle })
    }

    async fn record_battle_turn(&self, battle: &Battle, user: Option<&User>) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE battles SET status = $2, turn = $3, round = $4, player_health = $5,
                                opponent_health = $6, battle_log = $7, coins_reward = $8,
                                experience_reward = $9
             WHERE id = $1",
        )
        .bind(battle.id)
        .bind(battle.status.as_str())
        .bind(battle.turn)
        .bind(battle.round)
        .bind(battle.player_health)
        .bind(battle.opponent_health)
        .bind(serde_json::to_value(&battle.log)?)
        .bind(battle.coins_reward)
        .bind(battle.experience_reward)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { kind: "battle", id: battle.id });
        }

        if let Some(user) = user {
            Self::write_user(&mut tx, user).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    // =========================================================================
    // Items
    // =========================================================================

    async fn list_items(&self) -> Result<Vec<Item>> {
        let rows = sqlx::query(&format!("SELECT {} FROM items ORDER BY id", ITEM_COLUMNS))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::item_from_row).collect()
    }

    async fn get_item(&self, id: i64) -> Result<Option<Item>> {
        let row = sqlx::query(&format!("SELECT {} FROM items WHERE id = $1", ITEM_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::item_from_row).transpose()
    }

    async fn create_item(&self, item: NewItem) -> Result<Item> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO items (name, type, effect, value, cost, description)
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
        )
        .bind(&item.name)
        .bind(item.item_type.as_str())
        .bind(&item.effect)
        .bind(item.value)
        .bind(item.cost)
        .bind(&item.description)
        .fetch_one(&self.pool)
        .await?;

        Ok(item.with_id(id))
    }

    async fn list_owned_items(&self, user_id: i64) -> Result<Vec<OwnedItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM user_items WHERE user_id = $1 ORDER BY id",
            OWNED_ITEM_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::owned_item_from_row).collect())
    }

    async fn get_owned_item(&self, id: i64) -> Result<Option<OwnedItem>> {
        let row = sqlx::query(&format!("SELECT {} FROM user_items WHERE id = $1", OWNED_ITEM_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(Self::owned_item_from_row))
    }

    async fn create_owned_item(&self, item: NewOwnedItem) -> Result<OwnedItem> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO user_items (user_id, item_id, quantity) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(item.user_id)
        .bind(item.item_id)
        .bind(item.quantity)
        .fetch_one(&self.pool)
        .await?;

        Ok(item.with_id(id))
    }

    async fn update_owned_item(&self, item: &OwnedItem) -> Result<()> {
        let result = sqlx::query("UPDATE user_items SET user_id = $2, item_id = $3, quantity = $4 WHERE id = $1")
            .bind(item.id)
            .bind(item.user_id)
            .bind(item.item_id)
            .bind(item.quantity)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { kind: "owned item", id: item.id });
        }
        Ok(())
    }
}
