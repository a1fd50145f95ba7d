//! Turn-based battle state and the turn resolver.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{CatTemplate, GameError, OwnedCatDetails, RandomSource};

/// Lowest fraction of base damage a hit can roll
const DAMAGE_VARIANCE_MIN: f64 = 0.8;
/// Width of the damage roll (80-120%)
const DAMAGE_VARIANCE_SPREAD: f64 = 0.4;
/// Share of defense subtracted from a normal hit
const ATTACK_DEFENSE_FACTOR: f64 = 0.5;
/// Share of defense subtracted from a special move
const SPECIAL_DEFENSE_FACTOR: f64 = 0.3;
const SPECIAL_ATTACK_FACTOR: f64 = 1.5;

/// Battle status. `Won` and `Lost` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BattleStatus {
    Active,
    Won,
    Lost,
}

impl BattleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Won => "won",
            Self::Lost => "lost",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "won" => Some(Self::Won),
            "lost" => Some(Self::Lost),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl fmt::Display for BattleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Player choice for one turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BattleAction {
    Attack,
    Defend,
    Special,
    /// Logged only, items have no battle effect yet
    Item { item_id: Option<i64> },
}

impl BattleAction {
    /// Parse the action name sent by a client.
    pub fn parse(name: &str, item_id: Option<i64>) -> Result<Self, GameError> {
        match name {
            "attack" => Ok(Self::Attack),
            "defend" => Ok(Self::Defend),
            "special" => Ok(Self::Special),
            "item" => Ok(Self::Item { item_id }),
            other => Err(GameError::UnrecognizedAction(other.to_string())),
        }
    }
}

/// Persisted battle record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Battle {
    pub id: i64,
    pub user_id: i64,
    pub player_cat_id: i64,
    pub opponent_cat_id: i64,
    pub status: BattleStatus,
    pub turn: i32,
    pub round: i32,
    pub player_health: i32,
    pub opponent_health: i32,
    /// One line per turn, oldest first
    pub log: Vec<String>,
    pub coins_reward: Option<i32>,
    pub experience_reward: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBattle {
    pub user_id: i64,
    pub player_cat_id: i64,
    pub opponent_cat_id: i64,
    pub player_health: i32,
    pub opponent_health: i32,
}

impl NewBattle {
    /// Fresh active battle at turn 1
    pub fn with_id(self, id: i64) -> Battle {
        Battle {
            id,
            user_id: self.user_id,
            player_cat_id: self.player_cat_id,
            opponent_cat_id: self.opponent_cat_id,
            status: BattleStatus::Active,
            turn: 1,
            round: 1,
            player_health: self.player_health,
            opponent_health: self.opponent_health,
            log: Vec::new(),
            coins_reward: None,
            experience_reward: None,
        }
    }
}

/// Battle joined with both combatants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleDetails {
    pub battle: Battle,
    pub player_cat: OwnedCatDetails,
    pub opponent_cat: CatTemplate,
}

/// Outcome of one resolved turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTurn {
    /// Damage dealt to the player's cat by the counterattack
    pub player_damage: i32,
    /// Damage dealt to the opponent by the player's action
    pub opponent_damage: i32,
    pub log_line: String,
    pub battle: Battle,
}

/// Roll `base` through the 80-120% damage variance.
fn roll_damage(base: i32, rng: &mut dyn RandomSource) -> i32 {
    let roll = DAMAGE_VARIANCE_MIN + rng.next_f64() * DAMAGE_VARIANCE_SPREAD;
    (base as f64 * roll).floor() as i32
}

fn mitigated(attack: i32, defense: i32, factor: f64) -> i32 {
    (attack - (defense as f64 * factor).floor() as i32).max(1)
}

/// Resolve one player action plus the opponent's scripted counterattack.
///
/// The battle must be active. The returned battle carries the new health
/// values, the appended log line, the next turn number and the new status;
/// a double knockout counts as a loss.
pub fn resolve_turn(
    battle: &Battle,
    player: &OwnedCatDetails,
    opponent: &CatTemplate,
    action: BattleAction,
    rng: &mut dyn RandomSource,
) -> Result<ResolvedTurn, GameError> {
    if battle.status.is_terminal() {
        return Err(GameError::BattleNotActive { status: battle.status });
    }

    let mut parts: Vec<String> = Vec::with_capacity(2);
    let mut opponent_damage = 0;
    let mut player_damage = 0;

    // Player phase
    match action {
        BattleAction::Attack => {
            let base = mitigated(player.stats.attack, opponent.base_defense, ATTACK_DEFENSE_FACTOR);
            opponent_damage = roll_damage(base, rng);
            parts.push(format!("{} attacks for {} damage!", player.name(), opponent_damage));
        }
        BattleAction::Defend => {
            parts.push(format!("{} takes a defensive stance!", player.name()));
        }
        BattleAction::Special => {
            let raw = (player.stats.attack as f64 * SPECIAL_ATTACK_FACTOR).floor() as i32;
            opponent_damage = mitigated(raw, opponent.base_defense, SPECIAL_DEFENSE_FACTOR);
            let ability = player.cat.special_ability.as_deref().unwrap_or("its special ability");
            parts.push(format!("{} uses {} for {} damage!", player.name(), ability, opponent_damage));
        }
        BattleAction::Item { item_id } => {
            if item_id.is_some() {
                parts.push(format!("{} uses an item!", player.name()));
            }
        }
    }

    // Opponent phase, skipped when the player's action already knocks it out
    if battle.opponent_health - opponent_damage > 0 {
        let base = mitigated(opponent.base_attack, player.stats.defense, ATTACK_DEFENSE_FACTOR);
        player_damage = roll_damage(base, rng);
        parts.push(format!("{} counterattacks for {} damage!", opponent.name, player_damage));
    }

    let player_health = (battle.player_health - player_damage).clamp(0, player.stats.max_health.max(0));
    let opponent_health = (battle.opponent_health - opponent_damage).clamp(0, opponent.base_health.max(0));

    let status = if player_health == 0 {
        BattleStatus::Lost
    } else if opponent_health == 0 {
        BattleStatus::Won
    } else {
        BattleStatus::Active
    };

    let log_line = parts.join(" | ");
    let mut next = battle.clone();
    next.player_health = player_health;
    next.opponent_health = opponent_health;
    next.status = status;
    next.turn += 1;
    next.log.push(log_line.clone());

    Ok(ResolvedTurn {
        player_damage,
        opponent_damage,
        log_line,
        battle: next,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NewCat, OwnedCat, Rarity, ScriptedRolls};

    fn cat(id: i64, name: &str, [attack, health, defense]: [i32; 3]) -> CatTemplate {
        NewCat {
            name: name.into(),
            rarity: Rarity::Common,
            base_attack: attack,
            base_health: health,
            base_defense: defense,
            base_speed: 10,
            image_url: String::new(),
            description: None,
            special_ability: Some("Pounce".into()),
        }
        .with_id(id)
    }

    fn player(stats: [i32; 3]) -> OwnedCatDetails {
        let owned = OwnedCat {
            id: 1,
            user_id: 1,
            cat_id: 1,
            level: 1,
            experience: 0,
            current_health: stats[1],
            is_active: true,
        };
        OwnedCatDetails::new(owned, cat(1, "Whiskers", stats))
    }

    fn battle(player_health: i32, opponent_health: i32) -> Battle {
        NewBattle {
            user_id: 1,
            player_cat_id: 1,
            opponent_cat_id: 2,
            player_health,
            opponent_health,
        }
        .with_id(1)
    }

    #[test]
    fn test_attack_damage_with_midpoint_roll() {
        let player = player([20, 100, 10]);
        let opponent = cat(2, "Brute", [10, 100, 10]);
        let mut rng = ScriptedRolls::constant(0.5);

        let turn = resolve_turn(&battle(100, 100), &player, &opponent, BattleAction::Attack, &mut rng).unwrap();

        // max(1, 20 - 5) = 15, rolled at 100%
        assert_eq!(turn.opponent_damage, 15);
        // max(1, 10 - 5) = 5
        assert_eq!(turn.player_damage, 5);
        assert_eq!(turn.battle.opponent_health, 85);
        assert_eq!(turn.battle.player_health, 95);
        assert_eq!(turn.battle.status, BattleStatus::Active);
        assert_eq!(turn.battle.turn, 2);
        assert_eq!(turn.log_line, "Whiskers attacks for 15 damage! | Brute counterattacks for 5 damage!");
        assert_eq!(turn.battle.log, vec![turn.log_line.clone()]);
    }

    #[test]
    fn test_damage_variance_bounds() {
        let player = player([40, 100, 0]);
        let opponent = cat(2, "Brute", [1, 1000, 0]);

        let low = resolve_turn(&battle(100, 1000), &player, &opponent, BattleAction::Attack, &mut ScriptedRolls::constant(0.0)).unwrap();
        assert_eq!(low.opponent_damage, 32);

        let high = resolve_turn(&battle(100, 1000), &player, &opponent, BattleAction::Attack, &mut ScriptedRolls::constant(0.999)).unwrap();
        assert_eq!(high.opponent_damage, 47);
    }

    #[test]
    fn test_lethal_player_phase_skips_counterattack() {
        let player = player([20, 100, 10]);
        let opponent = cat(2, "Brute", [50, 100, 10]);
        let mut rng = ScriptedRolls::constant(0.5);

        let turn = resolve_turn(&battle(100, 10), &player, &opponent, BattleAction::Attack, &mut rng).unwrap();

        assert_eq!(turn.opponent_damage, 15);
        assert_eq!(turn.player_damage, 0);
        assert_eq!(turn.battle.opponent_health, 0);
        assert_eq!(turn.battle.player_health, 100);
        assert_eq!(turn.battle.status, BattleStatus::Won);
        assert_eq!(turn.log_line, "Whiskers attacks for 15 damage!");
    }

    #[test]
    fn test_player_knockout_is_a_loss() {
        let player = player([1, 100, 0]);
        let opponent = cat(2, "Brute", [50, 100, 0]);
        let mut rng = ScriptedRolls::constant(0.5);

        let turn = resolve_turn(&battle(3, 100), &player, &opponent, BattleAction::Defend, &mut rng).unwrap();

        assert_eq!(turn.battle.player_health, 0);
        assert_eq!(turn.battle.status, BattleStatus::Lost);
    }

    #[test]
    fn test_double_knockout_resolves_as_loss() {
        // A lethal hit skips the counterattack, so both sides only end at zero
        // together when the player starts the turn at zero health.
        let player = player([20, 100, 10]);
        let opponent = cat(2, "Brute", [10, 100, 10]);
        let mut rng = ScriptedRolls::constant(0.5);

        let turn = resolve_turn(&battle(0, 10), &player, &opponent, BattleAction::Attack, &mut rng).unwrap();

        assert_eq!(turn.battle.player_health, 0);
        assert_eq!(turn.battle.opponent_health, 0);
        assert_eq!(turn.battle.status, BattleStatus::Lost);
    }

    #[test]
    fn test_defend_deals_no_damage() {
        let player = player([20, 100, 10]);
        let opponent = cat(2, "Brute", [10, 100, 10]);
        let mut rng = ScriptedRolls::constant(0.5);

        let turn = resolve_turn(&battle(100, 100), &player, &opponent, BattleAction::Defend, &mut rng).unwrap();

        assert_eq!(turn.opponent_damage, 0);
        assert_eq!(turn.battle.opponent_health, 100);
        assert_eq!(turn.player_damage, 5);
        assert!(turn.log_line.starts_with("Whiskers takes a defensive stance!"));
    }

    #[test]
    fn test_special_ignores_variance() {
        let player = player([20, 100, 10]);
        let opponent = cat(2, "Brute", [10, 100, 10]);

        for roll in [0.0, 0.5, 0.99] {
            let turn = resolve_turn(&battle(100, 100), &player, &opponent, BattleAction::Special, &mut ScriptedRolls::constant(roll)).unwrap();
            // floor(20 * 1.5) - floor(10 * 0.3) = 30 - 3
            assert_eq!(turn.opponent_damage, 27);
            assert!(turn.log_line.starts_with("Whiskers uses Pounce for 27 damage!"));
        }
    }

    #[test]
    fn test_item_only_logs() {
        let player = player([20, 100, 10]);
        let opponent = cat(2, "Brute", [10, 100, 10]);
        let mut rng = ScriptedRolls::constant(0.5);

        let turn = resolve_turn(&battle(100, 100), &player, &opponent, BattleAction::Item { item_id: Some(1) }, &mut rng).unwrap();
        assert_eq!(turn.opponent_damage, 0);
        assert_eq!(turn.log_line, "Whiskers uses an item! | Brute counterattacks for 5 damage!");

        let turn = resolve_turn(&battle(100, 100), &player, &opponent, BattleAction::Item { item_id: None }, &mut rng).unwrap();
        assert_eq!(turn.log_line, "Brute counterattacks for 5 damage!");
    }

    #[test]
    fn test_terminal_battle_rejects_actions() {
        let player = player([20, 100, 10]);
        let opponent = cat(2, "Brute", [10, 100, 10]);
        let mut rng = ScriptedRolls::constant(0.5);

        for status in [BattleStatus::Won, BattleStatus::Lost] {
            let mut finished = battle(50, 0);
            finished.status = status;
            let err = resolve_turn(&finished, &player, &opponent, BattleAction::Attack, &mut rng).unwrap_err();
            assert_eq!(err, GameError::BattleNotActive { status });
        }
    }

    #[test]
    fn test_health_stays_in_bounds() {
        let player = player([30, 60, 5]);
        let opponent = cat(2, "Brute", [40, 80, 5]);
        let mut rng = ScriptedRolls::new(vec![0.1, 0.9, 0.4, 0.7, 0.0, 0.99]);
        let mut current = battle(60, 80);

        while current.status == BattleStatus::Active {
            let turn = resolve_turn(&current, &player, &opponent, BattleAction::Attack, &mut rng).unwrap();
            assert!((0..=60).contains(&turn.battle.player_health));
            assert!((0..=80).contains(&turn.battle.opponent_health));
            assert_eq!(turn.battle.turn, current.turn + 1);
            assert_eq!(turn.battle.log.len(), current.log.len() + 1);
            current = turn.battle;
        }
    }

    #[test]
    fn test_parse_rejects_unknown_action() {
        assert_eq!(BattleAction::parse("attack", None), Ok(BattleAction::Attack));
        assert_eq!(BattleAction::parse("item", Some(4)), Ok(BattleAction::Item { item_id: Some(4) }));
        assert_eq!(
            BattleAction::parse("flee", None),
            Err(GameError::UnrecognizedAction("flee".into()))
        );
    }
}
