//! Player accounts and win rewards.

use serde::{Deserialize, Serialize};

use crate::{Battle, BattleStatus, GameError, RandomSource};

const COIN_REWARD_BASE: i32 = 50;
const COIN_REWARD_SPREAD: f64 = 100.0;
const EXPERIENCE_REWARD_BASE: i32 = 25;
const EXPERIENCE_REWARD_SPREAD: f64 = 50.0;

/// Player account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub level: i32,
    pub coins: i32,
    pub gems: i32,
    pub battles_won: i32,
    pub win_streak: i32,
    pub experience: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub level: i32,
    pub coins: i32,
    pub gems: i32,
    pub battles_won: i32,
    pub win_streak: i32,
    pub experience: i32,
}

impl NewUser {
    /// Fresh account with the starting purse
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            level: 1,
            coins: 500,
            gems: 50,
            battles_won: 0,
            win_streak: 0,
            experience: 0,
        }
    }

    pub fn with_id(self, id: i64) -> User {
        User {
            id,
            username: self.username,
            level: self.level,
            coins: self.coins,
            gems: self.gems,
            battles_won: self.battles_won,
            win_streak: self.win_streak,
            experience: self.experience,
        }
    }
}

/// Client-editable account fields. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUpdate {
    pub level: Option<i32>,
    pub coins: Option<i32>,
    pub gems: Option<i32>,
    pub experience: Option<i32>,
}

impl UserUpdate {
    pub fn apply(&self, user: &mut User) {
        if let Some(level) = self.level {
            user.level = level;
        }
        if let Some(coins) = self.coins {
            user.coins = coins;
        }
        if let Some(gems) = self.gems {
            user.gems = gems;
        }
        if let Some(experience) = self.experience {
            user.experience = experience;
        }
    }
}

/// Rewards rolled for a won battle and the account they were applied to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reward {
    pub coins: i32,
    pub experience: i32,
    pub user: User,
}

/// Roll coin and experience rewards for a won battle and credit them.
///
/// Coins land in `[50, 150)`, experience in `[25, 75)`. Wins and the win
/// streak each go up by one. Losses never reach here, so the streak is
/// not reset.
pub fn grant_reward(battle: &Battle, user: &User, rng: &mut dyn RandomSource) -> Result<Reward, GameError> {
    if battle.status != BattleStatus::Won {
        return Err(GameError::BattleNotWon { status: battle.status });
    }

    let coins = COIN_REWARD_BASE + (rng.next_f64() * COIN_REWARD_SPREAD).floor() as i32;
    let experience = EXPERIENCE_REWARD_BASE + (rng.next_f64() * EXPERIENCE_REWARD_SPREAD).floor() as i32;

    let mut user = user.clone();
    user.coins = user.coins.saturating_add(coins);
    user.experience = user.experience.saturating_add(experience);
    user.battles_won = user.battles_won.saturating_add(1);
    user.win_streak = user.win_streak.saturating_add(1);

    Ok(Reward { coins, experience, user })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NewBattle, ScriptedRolls};

    fn finished(status: BattleStatus) -> Battle {
        let mut battle = NewBattle {
            user_id: 1,
            player_cat_id: 1,
            opponent_cat_id: 2,
            player_health: 40,
            opponent_health: 0,
        }
        .with_id(3);
        battle.status = status;
        battle
    }

    #[test]
    fn test_reward_updates_user_totals() {
        let user = NewUser::new("player1").with_id(1);
        let mut rng = ScriptedRolls::new(vec![0.5, 0.5]);

        let reward = grant_reward(&finished(BattleStatus::Won), &user, &mut rng).unwrap();

        assert_eq!(reward.coins, 100);
        assert_eq!(reward.experience, 50);
        assert_eq!(reward.user.coins, 600);
        assert_eq!(reward.user.experience, 50);
        assert_eq!(reward.user.battles_won, 1);
        assert_eq!(reward.user.win_streak, 1);
        assert_eq!(reward.user.gems, user.gems);
    }

    #[test]
    fn test_reward_bounds() {
        let user = NewUser::new("player1").with_id(1);
        let battle = finished(BattleStatus::Won);

        for roll in [0.0, 0.25, 0.5, 0.75, 0.999_999] {
            let reward = grant_reward(&battle, &user, &mut ScriptedRolls::constant(roll)).unwrap();
            assert!((50..150).contains(&reward.coins));
            assert!((25..75).contains(&reward.experience));
        }
    }

    #[test]
    fn test_reward_saturates_at_max_totals() {
        let mut user = NewUser::new("player1").with_id(1);
        user.coins = i32::MAX;
        user.experience = i32::MAX - 10;
        user.battles_won = i32::MAX;
        user.win_streak = i32::MAX;

        let reward = grant_reward(&finished(BattleStatus::Won), &user, &mut ScriptedRolls::constant(0.5)).unwrap();

        assert_eq!(reward.coins, 100);
        assert_eq!(reward.user.coins, i32::MAX);
        assert_eq!(reward.user.experience, i32::MAX);
        assert_eq!(reward.user.battles_won, i32::MAX);
        assert_eq!(reward.user.win_streak, i32::MAX);
    }

    #[test]
    fn test_reward_requires_won_battle() {
        let user = NewUser::new("player1").with_id(1);
        let mut rng = ScriptedRolls::constant(0.5);

        for status in [BattleStatus::Active, BattleStatus::Lost] {
            let err = grant_reward(&finished(status), &user, &mut rng).unwrap_err();
            assert_eq!(err, GameError::BattleNotWon { status });
        }
    }

    #[test]
    fn test_partial_update_only_touches_given_fields() {
        let mut user = NewUser::new("player1").with_id(1);
        UserUpdate { coins: Some(42), ..Default::default() }.apply(&mut user);
        assert_eq!(user.coins, 42);
        assert_eq!(user.gems, 50);
        assert_eq!(user.level, 1);
    }
}
