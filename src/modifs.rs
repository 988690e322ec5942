use std::fmt;
use std::str::FromStr;
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};
use tracing::debug;

use crate::env::{RamAccess, ram};
use crate::error::{Error, Result};

// =============================================================================
// Modification Catalog
// =============================================================================

/// When a modifier runs relative to the delegated environment call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPoint {
    /// Before and after every step.
    Step,
    /// After every reset.
    Reset,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, EnumIter, AsRefStr, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum Modification {
    /// Pong: the enemy paddle stops moving after it returns the shot.
    LazyEnemy,
}

impl Modification {
    pub fn hook(self) -> HookPoint {
        match self {
            Modification::LazyEnemy => HookPoint::Step,
        }
    }

    pub fn build(self) -> Box<dyn RamModifier> {
        match self {
            Modification::LazyEnemy => Box::new(LazyEnemy::default()),
        }
    }
}

/// A RAM patch applied at a hook point. Implementations may carry state across
/// calls; that state belongs to one environment instance.
pub trait RamModifier: fmt::Debug {
    fn name(&self) -> &'static str;

    fn apply(&mut self, mem: &mut dyn RamAccess) -> Result<()>;
}

// =============================================================================
// lazy_enemy
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LazyEnemy {
    last_enemy_y: u8,
    last_ball_x: u8,
}

impl Default for LazyEnemy {
    fn default() -> Self {
        Self::with_trackers(ram::LAZY_ENEMY_Y, ram::LAZY_BALL_X)
    }
}

impl LazyEnemy {
    pub fn with_trackers(last_enemy_y: u8, last_ball_x: u8) -> Self {
        Self {
            last_enemy_y,
            last_ball_x,
        }
    }

    pub fn trackers(&self) -> (u8, u8) {
        (self.last_enemy_y, self.last_ball_x)
    }
}

impl RamModifier for LazyEnemy {
    fn name(&self) -> &'static str {
        Modification::LazyEnemy.into()
    }

    fn apply(&mut self, mem: &mut dyn RamAccess) -> Result<()> {
        let returned = mem.peek(ram::RETURN_INDICATOR)?;
        let enemy_y = mem.peek(ram::ENEMY_Y)?;
        let ball_x = mem.peek(ram::BALL_X)?;

        if (1..5).contains(&returned) {
            mem.set_ram(ram::ENEMY_Y, ram::LAZY_ENEMY_Y)?;
            mem.set_ram(ram::BALL_X, ram::LAZY_BALL_X)?;
        }
        // Ball travelling towards the player: hold the paddle where it was.
        if self.last_ball_x < ball_x {
            mem.set_ram(ram::ENEMY_Y, self.last_enemy_y)?;
        }

        // Trackers follow the values read before any write above.
        self.last_ball_x = ball_x;
        self.last_enemy_y = enemy_y;
        Ok(())
    }
}

// =============================================================================
// Registry
// =============================================================================

/// The step-time and reset-time modifier sequences, in registration order.
#[derive(Debug, Default)]
pub struct ModifSet {
    pub(crate) step: Vec<Box<dyn RamModifier>>,
    pub(crate) reset: Vec<Box<dyn RamModifier>>,
}

impl ModifSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the set from names, silently dropping the ones not in the catalog.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for name in names {
            let name = name.as_ref();
            match Modification::from_str(name) {
                Ok(modif) => set.register(modif),
                Err(_) => debug!(name, "ignoring unknown modification"),
            }
        }
        set
    }

    /// Like [`ModifSet::from_names`], but an unknown name is an error.
    pub fn try_from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for name in names {
            let name = name.as_ref();
            let modif = Modification::from_str(name).map_err(|_| Error::UnknownModification {
                name: name.to_string(),
            })?;
            set.register(modif);
        }
        Ok(set)
    }

    pub fn register(&mut self, modif: Modification) {
        self.push(modif.build(), modif.hook());
    }

    pub fn push(&mut self, modifier: Box<dyn RamModifier>, hook: HookPoint) {
        match hook {
            HookPoint::Step => self.step.push(modifier),
            HookPoint::Reset => self.reset.push(modifier),
        }
    }

    pub fn step_modifs(&self) -> impl Iterator<Item = &str> {
        self.step.iter().map(|m| m.name())
    }

    pub fn reset_modifs(&self) -> impl Iterator<Item = &str> {
        self.reset.iter().map(|m| m.name())
    }

    pub fn len(&self) -> usize {
        self.step.len() + self.reset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::RAM_SIZE;
    use strum::IntoEnumIterator;

    fn image(returned: u8, enemy_y: u8, ball_x: u8) -> [u8; RAM_SIZE] {
        let mut mem = [0u8; RAM_SIZE];
        mem[ram::RETURN_INDICATOR] = returned;
        mem[ram::ENEMY_Y] = enemy_y;
        mem[ram::BALL_X] = ball_x;
        mem
    }

    #[test]
    fn catalog_names_round_trip() {
        for modif in Modification::iter() {
            assert_eq!(Modification::from_str(modif.as_ref()).unwrap(), modif);
        }
        assert_eq!(Modification::LazyEnemy.to_string(), "lazy_enemy");
    }

    #[test]
    fn known_names_kept_in_order_unknown_dropped() {
        let set = ModifSet::from_names(["lazy_enemy", "flying_ball", "lazy_enemy", ""]);
        assert_eq!(set.step_modifs().collect::<Vec<_>>(), ["lazy_enemy", "lazy_enemy"]);
        assert_eq!(set.reset_modifs().count(), 0);
        assert_eq!(set.len(), 2);

        let empty = ModifSet::from_names(["nope", "LazyEnemy"]);
        assert!(empty.is_empty());
    }

    #[test]
    fn strict_registry_rejects_unknown() {
        let err = ModifSet::try_from_names(["lazy_enemy", "flying_ball"]).unwrap_err();
        assert!(matches!(err, Error::UnknownModification { ref name } if name == "flying_ball"));
        assert_eq!(ModifSet::try_from_names(["lazy_enemy"]).unwrap().len(), 1);
    }

    #[test]
    fn return_indicator_forces_sentinels() {
        for returned in 1..5 {
            let mut mem = image(returned, 60, 100);
            let mut modif = LazyEnemy::default();
            modif.apply(&mut mem).unwrap();
            assert_eq!(mem[ram::ENEMY_Y], ram::LAZY_ENEMY_Y);
            assert_eq!(mem[ram::BALL_X], ram::LAZY_BALL_X);
        }
        for returned in [0, 5, 200] {
            let mut mem = image(returned, 60, 100);
            LazyEnemy::default().apply(&mut mem).unwrap();
            assert_eq!(mem[ram::ENEMY_Y], 60);
            assert_eq!(mem[ram::BALL_X], 100);
        }
    }

    #[test]
    fn enemy_frozen_while_ball_moves_away() {
        let mut modif = LazyEnemy::with_trackers(90, 100);
        let mut mem = image(0, 140, 104);
        modif.apply(&mut mem).unwrap();
        assert_eq!(mem[ram::ENEMY_Y], 90);
        assert_eq!(modif.trackers(), (140, 104));
    }

    #[test]
    fn enemy_free_while_ball_approaches() {
        let mut modif = LazyEnemy::with_trackers(90, 110);
        let mut mem = image(0, 140, 104);
        modif.apply(&mut mem).unwrap();
        assert_eq!(mem[ram::ENEMY_Y], 140);
        assert_eq!(modif.trackers(), (140, 104));
    }

    #[test]
    fn repeated_apply_reaches_fixed_point() {
        let mut modif = LazyEnemy::with_trackers(90, 100);
        let mut mem = image(0, 140, 100);
        modif.apply(&mut mem).unwrap();
        let first = mem;
        modif.apply(&mut mem).unwrap();
        assert_eq!(mem, first);

        let mut modif = LazyEnemy::with_trackers(90, 100);
        let mut mem = image(0, 140, 120);
        modif.apply(&mut mem).unwrap();
        let first = mem;
        modif.apply(&mut mem).unwrap();
        assert_eq!(mem, first);
    }

    #[test]
    fn short_ram_is_an_error() {
        struct Tiny([u8; 8]);
        impl RamAccess for Tiny {
            fn ram(&self) -> &[u8] {
                &self.0
            }
            fn set_ram(&mut self, index: usize, value: u8) -> Result<()> {
                self.0[index] = value;
                Ok(())
            }
        }
        let mut tiny = Tiny([0; 8]);
        assert!(matches!(
            LazyEnemy::default().apply(&mut tiny),
            Err(Error::RamOutOfRange { index: 11, size: 8 })
        ));
    }
}
