//! Key profile management.
//!
//! A key profile maps emulated-device keys to the inputs of one device
//! family. Built-in profiles are fixed templates; custom profiles are copies
//! the user can rename and delete. Each known input device remembers its
//! player assignment and the profile it uses.

use crate::error::ProfileError;
use crate::keys::{key, DeviceMap, KeyCode};
use crate::store::StoreHandle;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

const PROFILE_PREFIX: &str = "profile/";
const DEVICE_PREFIX: &str = "device/";

/// Emulated key bound to a device input code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBinding {
    pub key: KeyCode,
    pub input: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyProfile {
    pub name: String,
    pub map: DeviceMap,
    pub bindings: Vec<KeyBinding>,
}

impl KeyProfile {
    fn store_key(&self) -> String {
        profile_key(self.map, &self.name)
    }

    pub fn input_for(&self, code: KeyCode) -> Option<u16> {
        self.bindings.iter().find(|b| b.key == code).map(|b| b.input)
    }
}

fn profile_key(map: DeviceMap, name: &str) -> String {
    format!("{}{}/{}", PROFILE_PREFIX, map.key(), name)
}

/// Profile as listed to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileSummary {
    pub name: String,
    pub map: DeviceMap,
    pub builtin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId {
    pub name: String,
    /// Distinguishes several devices with the same name
    pub enum_id: u8,
}

impl DeviceId {
    pub fn new(name: impl Into<String>, enum_id: u8) -> Self {
        Self {
            name: name.into(),
            enum_id,
        }
    }

    fn store_key(&self) -> String {
        format!("{}{}#{}", DEVICE_PREFIX, self.name, self.enum_id)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{}", self.name, self.enum_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerAssignment {
    Player(u8),
    /// The device carries keys for every player
    Multi,
}

/// Saved settings of one input device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSettings {
    pub id: DeviceId,
    pub map: DeviceMap,
    pub player: PlayerAssignment,
    /// `None` uses the map's default profile
    pub profile: Option<String>,
}

fn bindings(pairs: &[(KeyCode, u16)]) -> Vec<KeyBinding> {
    pairs
        .iter()
        .map(|&(key, input)| KeyBinding { key, input })
        .collect()
}

/// Built-in profiles, default first for each map.
pub fn builtin_profiles() -> Vec<KeyProfile> {
    use key::*;
    let profile = |name: &str, map: DeviceMap, pairs: &[(KeyCode, u16)]| KeyProfile {
        name: name.to_string(),
        map,
        bindings: bindings(pairs),
    };

    vec![
        profile(
            "Default Keyboard",
            DeviceMap::Keyboard,
            &[
                (UP, 103),
                (RIGHT, 106),
                (DOWN, 108),
                (LEFT, 105),
                (SELECT, 54),
                (START, 28),
                (A, 45),
                (B, 44),
                (X, 31),
                (Y, 30),
                (L, 16),
                (R, 17),
                (OPEN_SYSTEM_ACTIONS, 1),
                (FAST_FORWARD, 15),
            ],
        ),
        profile(
            "Keyboard WASD",
            DeviceMap::Keyboard,
            &[
                (UP, 17),
                (RIGHT, 32),
                (DOWN, 31),
                (LEFT, 30),
                (SELECT, 42),
                (START, 28),
                (A, 37),
                (B, 36),
                (X, 23),
                (Y, 22),
                (L, 16),
                (R, 18),
                (OPEN_SYSTEM_ACTIONS, 1),
            ],
        ),
        profile(
            "Default Gamepad",
            DeviceMap::Gamepad,
            &[
                (UP, 544),
                (DOWN, 545),
                (LEFT, 546),
                (RIGHT, 547),
                (A, 305),
                (B, 304),
                (X, 307),
                (Y, 308),
                (L, 310),
                (R, 311),
                (SELECT, 314),
                (START, 315),
                (OPEN_SYSTEM_ACTIONS, 316),
            ],
        ),
        profile(
            "Default Wiimote",
            DeviceMap::Wiimote,
            &[
                (UP, 3),
                (DOWN, 2),
                (LEFT, 0),
                (RIGHT, 1),
                (A, 8),
                (B, 9),
                (SELECT, 12),
                (START, 4),
                (OPEN_SYSTEM_ACTIONS, 7),
            ],
        ),
        profile(
            "Default Wii Classic",
            DeviceMap::WiiClassic,
            &[
                (UP, 0),
                (RIGHT, 15),
                (DOWN, 14),
                (LEFT, 1),
                (A, 4),
                (B, 6),
                (X, 3),
                (Y, 5),
                (L, 13),
                (R, 9),
                (SELECT, 12),
                (START, 10),
                (OPEN_SYSTEM_ACTIONS, 11),
            ],
        ),
        profile(
            "Default iCade",
            DeviceMap::Icade,
            &[
                (UP, 119),
                (RIGHT, 100),
                (DOWN, 120),
                (LEFT, 97),
                (A, 107),
                (B, 108),
                (X, 111),
                (Y, 105),
                (L, 104),
                (R, 106),
                (SELECT, 121),
                (START, 117),
            ],
        ),
        profile(
            "Default PS3 Pad",
            DeviceMap::Ps3Pad,
            &[
                (UP, 4),
                (RIGHT, 5),
                (DOWN, 6),
                (LEFT, 7),
                (A, 13),
                (B, 14),
                (X, 12),
                (Y, 15),
                (L, 10),
                (R, 11),
                (SELECT, 0),
                (START, 3),
                (OPEN_SYSTEM_ACTIONS, 16),
            ],
        ),
    ]
}

fn validate_name(name: &str) -> Result<&str, ProfileError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ProfileError::InvalidName("name is empty".to_string()));
    }
    Ok(trimmed)
}

/// Key profiles and saved device settings.
#[derive(Debug)]
pub struct ProfileManager {
    store: StoreHandle,
    builtin: Vec<KeyProfile>,
    custom: Vec<KeyProfile>,
    devices: Vec<DeviceSettings>,
    max_players: u8,
}

impl ProfileManager {
    /// Load custom profiles and device settings from `store`. Unreadable
    /// entries are skipped.
    pub fn load(store: StoreHandle, max_players: u8) -> Self {
        let custom = load_all::<KeyProfile>(&store, PROFILE_PREFIX);
        let devices = load_all::<DeviceSettings>(&store, DEVICE_PREFIX);
        info!(
            "Loaded {} custom profiles and {} saved devices",
            custom.len(),
            devices.len()
        );
        Self {
            store,
            builtin: builtin_profiles(),
            custom,
            devices,
            max_players: max_players.max(1),
        }
    }

    pub fn is_builtin(&self, map: DeviceMap, name: &str) -> bool {
        self.builtin.iter().any(|p| p.map == map && p.name == name)
    }

    pub fn find(&self, map: DeviceMap, name: &str) -> Option<&KeyProfile> {
        self.custom
            .iter()
            .chain(self.builtin.iter())
            .find(|p| p.map == map && p.name == name)
    }

    fn find_custom_mut(&mut self, map: DeviceMap, name: &str) -> Option<&mut KeyProfile> {
        self.custom
            .iter_mut()
            .find(|p| p.map == map && p.name == name)
    }

    fn name_taken(&self, map: DeviceMap, name: &str) -> bool {
        self.find(map, name).is_some()
    }

    /// Default built-in profile of a map.
    pub fn default_profile(&self, map: DeviceMap) -> Option<&KeyProfile> {
        self.builtin.iter().find(|p| p.map == map)
    }

    /// Profiles usable by a map: custom first, then built-ins.
    pub fn profiles_for_map(&self, map: DeviceMap) -> Vec<ProfileSummary> {
        let custom = self.custom.iter().map(|p| (p, false));
        let builtin = self.builtin.iter().map(|p| (p, true));
        custom
            .chain(builtin)
            .filter(|(p, _)| p.map == map)
            .map(|(p, builtin)| ProfileSummary {
                name: p.name.clone(),
                map: p.map,
                builtin,
            })
            .collect()
    }

    /// Copy profile `from` into a new custom profile named `new_name`.
    pub fn create_profile(
        &mut self,
        map: DeviceMap,
        from: &str,
        new_name: &str,
    ) -> Result<&KeyProfile, ProfileError> {
        let new_name = validate_name(new_name)?;
        if self.name_taken(map, new_name) {
            return Err(ProfileError::NameCollision(new_name.to_string()));
        }
        let source = self
            .find(map, from)
            .ok_or_else(|| ProfileError::NotFound(from.to_string()))?;

        let profile = KeyProfile {
            name: new_name.to_string(),
            map,
            bindings: source.bindings.clone(),
        };
        info!("Creating profile '{}' from '{}'", new_name, from);
        let key = profile.store_key();
        self.custom.push(profile);

        let index = self.custom.len() - 1;
        self.store.save(&key, &self.custom[index])?;
        Ok(&self.custom[index])
    }

    /// Rename a custom profile. Devices using it follow the new name.
    pub fn rename_profile(
        &mut self,
        map: DeviceMap,
        name: &str,
        new_name: &str,
    ) -> Result<(), ProfileError> {
        if self.is_builtin(map, name) {
            return Err(ProfileError::ReadOnlyProfile(name.to_string()));
        }
        if self.find_custom_mut(map, name).is_none() {
            return Err(ProfileError::NotFound(name.to_string()));
        }
        let new_name = validate_name(new_name)?.to_string();
        if new_name == name {
            return Ok(());
        }
        if self.name_taken(map, &new_name) {
            return Err(ProfileError::NameCollision(new_name));
        }

        let profile = self
            .find_custom_mut(map, name)
            .ok_or_else(|| ProfileError::NotFound(name.to_string()))?;
        profile.name = new_name.clone();
        let profile = profile.clone();
        info!("Renamed profile '{}' to '{}'", name, new_name);

        let mut result = self
            .store
            .remove(&profile_key(map, name))
            .and_then(|_| self.store.save(&profile.store_key(), &profile));

        for device in self
            .devices
            .iter_mut()
            .filter(|d| d.map == map && d.profile.as_deref() == Some(name))
        {
            device.profile = Some(new_name.clone());
            if result.is_ok() {
                result = self.store.save(&device.id.store_key(), &*device);
            }
        }
        result.map_err(ProfileError::from)
    }

    /// Delete a custom profile. Devices using it revert to the default
    /// profile of their map.
    pub fn delete_profile(&mut self, map: DeviceMap, name: &str) -> Result<(), ProfileError> {
        if self.is_builtin(map, name) {
            return Err(ProfileError::ReadOnlyProfile(name.to_string()));
        }
        let before = self.custom.len();
        self.custom.retain(|p| !(p.map == map && p.name == name));
        if self.custom.len() == before {
            return Err(ProfileError::NotFound(name.to_string()));
        }
        info!("Deleted profile '{}'", name);

        let mut result = self.store.remove(&profile_key(map, name)).map(|_| ());
        for device in self
            .devices
            .iter_mut()
            .filter(|d| d.map == map && d.profile.as_deref() == Some(name))
        {
            device.profile = None;
            if result.is_ok() {
                result = self.store.save(&device.id.store_key(), &*device);
            }
        }
        result.map_err(ProfileError::from)
    }

    pub fn devices(&self) -> &[DeviceSettings] {
        &self.devices
    }

    pub fn device_settings(&self, id: &DeviceId) -> Option<&DeviceSettings> {
        self.devices.iter().find(|d| &d.id == id)
    }

    fn device_index(&self, id: &DeviceId) -> Result<usize, ProfileError> {
        self.devices
            .iter()
            .position(|d| &d.id == id)
            .ok_or_else(|| ProfileError::DeviceNotFound(id.to_string()))
    }

    /// Track a connected device, creating default settings the first time
    /// it is seen. Defaults are not written until something changes.
    pub fn register_device(&mut self, id: DeviceId, map: DeviceMap) -> &DeviceSettings {
        let index = match self.devices.iter().position(|d| d.id == id) {
            Some(index) => index,
            None => {
                let player = id.enum_id.min(self.max_players - 1);
                info!("New input device {} using player {}", id, player + 1);
                self.devices.push(DeviceSettings {
                    id,
                    map,
                    player: PlayerAssignment::Player(player),
                    profile: None,
                });
                self.devices.len() - 1
            }
        };
        &self.devices[index]
    }

    /// Forget a device's saved settings. Profiles are left alone.
    pub fn delete_device_settings(&mut self, id: &DeviceId) -> Result<(), ProfileError> {
        let index = self.device_index(id)?;
        self.devices.remove(index);
        info!("Deleted saved settings of {}", id);
        self.store.remove(&id.store_key())?;
        Ok(())
    }

    /// Profile the device currently uses.
    pub fn profile_for_device(&self, id: &DeviceId) -> Result<&KeyProfile, ProfileError> {
        let device = &self.devices[self.device_index(id)?];
        if let Some(profile) = device
            .profile
            .as_deref()
            .and_then(|name| self.find(device.map, name))
        {
            return Ok(profile);
        }
        self.default_profile(device.map)
            .ok_or_else(|| ProfileError::NotFound(format!("default {} profile", device.map)))
    }

    /// Input code bound to `code` in the profile `id` currently uses.
    pub fn device_input_for(
        &self,
        id: &DeviceId,
        code: KeyCode,
    ) -> Result<Option<u16>, ProfileError> {
        Ok(self.profile_for_device(id)?.input_for(code))
    }

    pub fn set_device_profile(&mut self, id: &DeviceId, name: &str) -> Result<(), ProfileError> {
        let index = self.device_index(id)?;
        let map = self.devices[index].map;
        if self.find(map, name).is_none() {
            return Err(ProfileError::NotFound(name.to_string()));
        }

        let is_default = self.default_profile(map).map(|p| p.name.as_str()) == Some(name);
        let device = &mut self.devices[index];
        device.profile = if is_default {
            None
        } else {
            Some(name.to_string())
        };
        info!("Device {} now uses profile '{}'", id, name);
        self.store.save(&id.store_key(), &self.devices[index])?;
        Ok(())
    }

    pub fn set_device_player(
        &mut self,
        id: &DeviceId,
        player: PlayerAssignment,
    ) -> Result<(), ProfileError> {
        if let PlayerAssignment::Player(p) = player {
            if p >= self.max_players {
                return Err(ProfileError::InvalidPlayer(p));
            }
        }
        let index = self.device_index(id)?;
        self.devices[index].player = player;
        self.store.save(&id.store_key(), &self.devices[index])?;
        Ok(())
    }

    /// Copy the device's current profile into `new_name` and switch the
    /// device to it.
    pub fn create_profile_for_device(
        &mut self,
        id: &DeviceId,
        new_name: &str,
    ) -> Result<(), ProfileError> {
        let current = self.profile_for_device(id)?;
        let (map, from) = (current.map, current.name.clone());
        let name = self.create_profile(map, &from, new_name)?.name.clone();
        self.set_device_profile(id, &name)
    }
}

fn load_all<T: serde::de::DeserializeOwned>(store: &StoreHandle, prefix: &str) -> Vec<T> {
    let keys = match store.keys_with_prefix(prefix) {
        Ok(keys) => keys,
        Err(e) => {
            warn!("Failed to list '{}' entries: {}", prefix, e);
            return Vec::new();
        }
    };
    keys.iter()
        .filter_map(|key| match store.load::<T>(key) {
            Ok(value) => value,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .collect()
}
