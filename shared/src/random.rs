//! Injected randomness for battle resolution and rewards.

/// Source of uniform random numbers in `[0, 1)`.
///
/// Passed into the rules explicitly so a fixed sequence reproduces a battle.
pub trait RandomSource {
    fn next_f64(&mut self) -> f64;
}

/// Replays a fixed list of rolls, cycling when it runs out.
#[derive(Debug, Clone)]
pub struct ScriptedRolls {
    rolls: Vec<f64>,
    cursor: usize,
}

impl ScriptedRolls {
    pub fn new(rolls: impl Into<Vec<f64>>) -> Self {
        let rolls = rolls.into();
        let rolls = if rolls.is_empty() { vec![0.0] } else { rolls };
        Self { rolls, cursor: 0 }
    }

    /// Always returns `roll`
    pub fn constant(roll: f64) -> Self {
        Self::new(vec![roll])
    }
}

impl RandomSource for ScriptedRolls {
    fn next_f64(&mut self) -> f64 {
        let roll = self.rolls[self.cursor % self.rolls.len()];
        self.cursor += 1;
        roll
    }
}
