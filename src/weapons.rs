//! Weapon classification
//!
//! Maps engine weapon codes to a coarse damage category and to the
//! human-readable names used by enforcer configurations. The category table
//! comes from the host's weapon defines; the names come from a
//! [`WeaponNameSource`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised while building or querying the weapon tables
#[derive(Debug, Error)]
pub enum WeaponError {
    /// The kill carried no weapon code at all
    #[error("Weapon code was empty")]
    EmptyCode,

    /// The names table could not be read
    #[error("Weapon names unavailable: {0}")]
    Unavailable(String),

    /// The names table was not valid JSON
    #[error("Failed to parse weapon names: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type WeaponResult<T> = Result<T, WeaponError>;

/// Damage category of a weapon code
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub enum DamageCategory {
    #[default]
    None,
    Suicide,
    Nonlethal,
    Melee,
    Impact,
    Explosive,
    ProjectileExplosive,
    Handgun,
    SMG,
    AssaultRifle,
    Carbine,
    LMG,
    Shotgun,
    DMR,
    SniperRifle,
    VehicleAir,
    VehicleHeavy,
    VehicleLight,
    VehiclePersonal,
    VehicleStationary,
    VehicleTransport,
    VehicleWater,
}

impl DamageCategory {
    #[must_use]
    pub fn is_vehicle(self) -> bool {
        matches!(
            self,
            Self::VehicleAir
                | Self::VehicleHeavy
                | Self::VehicleLight
                | Self::VehiclePersonal
                | Self::VehicleStationary
                | Self::VehicleTransport
                | Self::VehicleWater
        )
    }

    /// Categories that can be selected for enforcement at all
    #[must_use]
    pub fn is_lethal(self) -> bool {
        !matches!(self, Self::None | Self::Nonlethal | Self::Suicide)
    }

    #[must_use]
    pub fn is_infantry(self) -> bool {
        self.is_lethal() && !self.is_vehicle()
    }
}

impl fmt::Display for DamageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Debug already yields the bare variant name
        write!(f, "{self:?}")
    }
}

/// Codes the engine defines classify wrongly
fn category_override(code: &str) -> Option<DamageCategory> {
    match code {
        // Phantom Bow
        "dlSHTR" => Some(DamageCategory::SniperRifle),
        "U_SR338" => Some(DamageCategory::DMR),
        "U_BallisticShield" => Some(DamageCategory::Melee),
        _ if code.eq_ignore_ascii_case("roadkill") => Some(DamageCategory::Impact),
        _ => None,
    }
}

/// One entry of the host's weapon defines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeaponDefine {
    pub code: String,
    pub damage: DamageCategory,
}

/// Human-readable names of one weapon code
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeaponNames {
    pub readable_short: String,
    pub readable_long: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Weapon {
    pub code: String,
    pub damage: DamageCategory,
    pub short_name: Option<String>,
    pub long_name: Option<String>,
}

/// Which categories a configuration choice list covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeaponScope {
    All,
    Infantry,
}

/// Source of the weapon names table, fetched once at enable time
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WeaponNameSource: Send + Sync {
    async fn fetch(&self) -> WeaponResult<HashMap<String, WeaponNames>>;
}

/// Reads the names table from a local JSON file
#[derive(Debug, Clone)]
pub struct FileWeaponNames {
    path: PathBuf,
}

impl FileWeaponNames {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl WeaponNameSource for FileWeaponNames {
    async fn fetch(&self) -> WeaponResult<HashMap<String, WeaponNames>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| WeaponError::Unavailable(format!("{}: {e}", self.path.display())))?;
        let names: HashMap<String, WeaponNames> = serde_json::from_str(&content)?;
        debug!("Read {} weapon names from {}", names.len(), self.path.display());
        Ok(names)
    }
}

/// Lookup table from weapon code to category and names
#[derive(Debug, Clone, Default)]
pub struct WeaponDictionary {
    weapons: HashMap<String, Weapon>,
}

impl WeaponDictionary {
    /// Merge the engine defines with the names table
    #[must_use]
    pub fn populate(defines: &[WeaponDefine], names: HashMap<String, WeaponNames>) -> Self {
        let mut weapons: HashMap<String, Weapon> = HashMap::new();

        for define in defines {
            let damage = category_override(&define.code).unwrap_or(define.damage);
            weapons.insert(
                define.code.clone(),
                Weapon {
                    code: define.code.clone(),
                    damage,
                    short_name: None,
                    long_name: None,
                },
            );
        }

        for (code, entry) in names {
            let weapon = weapons.entry(code.clone()).or_insert_with(|| Weapon {
                damage: category_override(&code).unwrap_or_default(),
                code: code.clone(),
                short_name: None,
                long_name: None,
            });
            weapon.short_name = Some(entry.readable_short).filter(|name| !name.is_empty());
            weapon.long_name = Some(entry.readable_long).filter(|name| !name.is_empty());
        }

        Self { weapons }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.weapons.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.weapons.is_empty()
    }

    #[must_use]
    pub fn get(&self, code: &str) -> Option<&Weapon> {
        self.weapons.get(code)
    }

    /// Category of a weapon code; unknown codes classify as `None`
    ///
    /// # Errors
    ///
    /// Returns `WeaponError::EmptyCode` for a blank code.
    pub fn classify(&self, code: &str) -> WeaponResult<DamageCategory> {
        if code.trim().is_empty() {
            return Err(WeaponError::EmptyCode);
        }
        if let Some(category) = category_override(code) {
            return Ok(category);
        }
        match self.weapons.get(code) {
            Some(weapon) => Ok(weapon.damage),
            None => {
                warn!("No weapon defined for code {code}, is the defines table up to date?");
                Ok(DamageCategory::None)
            }
        }
    }

    #[must_use]
    pub fn short_name(&self, code: &str) -> Option<&str> {
        self.weapons.get(code)?.short_name.as_deref()
    }

    #[must_use]
    pub fn long_name(&self, code: &str) -> Option<&str> {
        self.weapons.get(code)?.long_name.as_deref()
    }

    /// Name shown to players and matched by enforcers, falling back to the code
    #[must_use]
    pub fn display_name<'a>(&'a self, code: &'a str) -> &'a str {
        self.short_name(code).unwrap_or(code)
    }

    #[must_use]
    pub fn code_by_short_name(&self, short_name: &str) -> Option<&str> {
        self.weapons
            .values()
            .find(|weapon| weapon.short_name.as_deref() == Some(short_name))
            .map(|weapon| weapon.code.as_str())
    }

    #[must_use]
    pub fn codes_of_category(&self, category: DamageCategory) -> Vec<&str> {
        if category == DamageCategory::None {
            return Vec::new();
        }
        let mut codes: Vec<&str> = self
            .weapons
            .values()
            .filter(|weapon| weapon.damage == category)
            .map(|weapon| weapon.code.as_str())
            .collect();
        codes.sort_unstable();
        codes
    }

    /// Distinct `Category\ShortName` entries for configuration choice lists
    #[must_use]
    pub fn weapon_choices(&self, scope: WeaponScope) -> Vec<String> {
        let mut entries: Vec<(DamageCategory, &str)> = self
            .weapons
            .values()
            .filter(|weapon| match scope {
                WeaponScope::All => weapon.damage.is_lethal(),
                WeaponScope::Infantry => weapon.damage.is_infantry(),
            })
            .filter_map(|weapon| Some((weapon.damage, weapon.short_name.as_deref()?)))
            .collect();
        entries.sort_unstable();
        entries.dedup();
        entries
            .into_iter()
            .map(|(damage, name)| format!("{damage}\\{name}"))
            .collect()
    }
}
