//! Key codes, key categories and input device descriptions.
//!
//! Emulated-device keys are numbered per player; app keys act on the
//! front-end itself (menus, save states, fast-forward) and live in their
//! own range.

use crate::geometry::Anchor;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type KeyCode = u16;

/// Distance between the key ranges of consecutive players.
pub const PLAYER_KEY_STRIDE: KeyCode = 64;

/// First code of the app key range.
pub const APP_KEY_BASE: KeyCode = 1000;

pub mod key {
    use super::{KeyCode, APP_KEY_BASE};

    pub const UP: KeyCode = 1;
    pub const RIGHT: KeyCode = 2;
    pub const DOWN: KeyCode = 3;
    pub const LEFT: KeyCode = 4;
    pub const SELECT: KeyCode = 5;
    pub const START: KeyCode = 6;
    pub const A: KeyCode = 7;
    pub const B: KeyCode = 8;
    pub const X: KeyCode = 9;
    pub const Y: KeyCode = 10;
    pub const L: KeyCode = 11;
    pub const R: KeyCode = 12;

    pub const OPEN_SYSTEM_ACTIONS: KeyCode = APP_KEY_BASE;
    pub const SAVE_STATE: KeyCode = APP_KEY_BASE + 1;
    pub const LOAD_STATE: KeyCode = APP_KEY_BASE + 2;
    pub const FAST_FORWARD: KeyCode = APP_KEY_BASE + 3;
    pub const REWIND: KeyCode = APP_KEY_BASE + 4;
    pub const SCREENSHOT: KeyCode = APP_KEY_BASE + 5;
    pub const TOGGLE_KEYBOARD: KeyCode = APP_KEY_BASE + 6;
    pub const EXIT: KeyCode = APP_KEY_BASE + 7;
}

const GAMEPAD_KEYS: [KeyCode; 12] = [
    key::UP,
    key::RIGHT,
    key::DOWN,
    key::LEFT,
    key::SELECT,
    key::START,
    key::A,
    key::B,
    key::X,
    key::Y,
    key::L,
    key::R,
];

const APP_KEYS: [KeyCode; 8] = [
    key::OPEN_SYSTEM_ACTIONS,
    key::SAVE_STATE,
    key::LOAD_STATE,
    key::FAST_FORWARD,
    key::REWIND,
    key::SCREENSHOT,
    key::TOGGLE_KEYBOARD,
    key::EXIT,
];

pub fn is_app_key(code: KeyCode) -> bool {
    code >= APP_KEY_BASE
}

/// Code of `base` for a 0-based `player`.
pub fn player_key(base: KeyCode, player: u8) -> KeyCode {
    base + PLAYER_KEY_STRIDE * KeyCode::from(player)
}

/// Human-readable key name, with a player suffix for players past the first.
pub fn key_name(code: KeyCode) -> String {
    if is_app_key(code) {
        let name = match code {
            key::OPEN_SYSTEM_ACTIONS => "Open System Actions",
            key::SAVE_STATE => "Save State",
            key::LOAD_STATE => "Load State",
            key::FAST_FORWARD => "Fast-forward",
            key::REWIND => "Rewind",
            key::SCREENSHOT => "Screenshot",
            key::TOGGLE_KEYBOARD => "Toggle Keyboard",
            key::EXIT => "Exit",
            _ => "Unknown",
        };
        return name.to_string();
    }

    let player = code.saturating_sub(1) / PLAYER_KEY_STRIDE;
    let base = code - player * PLAYER_KEY_STRIDE;
    let name = match base {
        key::UP => "Up",
        key::RIGHT => "Right",
        key::DOWN => "Down",
        key::LEFT => "Left",
        key::SELECT => "Select",
        key::START => "Start",
        key::A => "A",
        key::B => "B",
        key::X => "X",
        key::Y => "Y",
        key::L => "L",
        key::R => "R",
        _ => "Unknown",
    };
    if player == 0 {
        name.to_string()
    } else {
        format!("{} (P{})", name, player + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct KeyFlags {
    pub turbo: bool,
    pub toggle: bool,
    pub app_code: bool,
}

/// A key plus the per-button behaviour flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyInfo {
    pub code: KeyCode,
    #[serde(default)]
    pub flags: KeyFlags,
}

impl KeyInfo {
    pub fn new(code: KeyCode) -> Self {
        Self {
            code,
            flags: KeyFlags {
                app_code: is_app_key(code),
                ..KeyFlags::default()
            },
        }
    }

    pub fn is_app_key(&self) -> bool {
        self.flags.app_code
    }
}

impl From<KeyCode> for KeyInfo {
    fn from(code: KeyCode) -> Self {
        KeyInfo::new(code)
    }
}

/// A named list of keys offered together when assigning buttons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyCategory {
    pub name: String,
    pub keys: Vec<KeyCode>,
    /// Non-zero for the extra-player copies of the gamepad keys
    pub multiplayer_index: u8,
}

impl KeyCategory {
    pub fn contains(&self, code: KeyCode) -> bool {
        self.keys.contains(&code)
    }
}

pub fn app_key_category() -> KeyCategory {
    KeyCategory {
        name: "Set Emulator Key".to_string(),
        keys: APP_KEYS.to_vec(),
        multiplayer_index: 0,
    }
}

/// Emulated-device key categories for up to `max_players` players.
pub fn key_categories(max_players: u8) -> Vec<KeyCategory> {
    (0..max_players.max(1))
        .map(|player| KeyCategory {
            name: if player == 0 {
                "Set Gamepad Keys".to_string()
            } else {
                format!("Set Gamepad Keys #{}", player + 1)
            },
            keys: GAMEPAD_KEYS.iter().map(|k| player_key(*k, player)).collect(),
            multiplayer_index: player,
        })
        .collect()
}

/// Input device family; selects which profiles and key lists apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceMap {
    Keyboard,
    Gamepad,
    Wiimote,
    WiiClassic,
    Icade,
    Ps3Pad,
}

impl DeviceMap {
    pub const ALL: [DeviceMap; 6] = [
        DeviceMap::Keyboard,
        DeviceMap::Gamepad,
        DeviceMap::Wiimote,
        DeviceMap::WiiClassic,
        DeviceMap::Icade,
        DeviceMap::Ps3Pad,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            DeviceMap::Keyboard => "keyboard",
            DeviceMap::Gamepad => "gamepad",
            DeviceMap::Wiimote => "wiimote",
            DeviceMap::WiiClassic => "wii_classic",
            DeviceMap::Icade => "icade",
            DeviceMap::Ps3Pad => "ps3_pad",
        }
    }
}

impl fmt::Display for DeviceMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Kind of on-screen element an input component is drawn as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputComponent {
    Ui,
    DPad,
    Button,
    Trigger,
}

/// One component of an input device: a d-pad or a set of buttons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputComponentDesc {
    pub name: String,
    pub keys: Vec<KeyCode>,
    pub component: InputComponent,
    pub layout_origin: Anchor,
    pub row_size: u8,
    pub staggered: bool,
}

impl InputComponentDesc {
    fn new(
        name: &str,
        keys: &[KeyCode],
        component: InputComponent,
        layout_origin: Anchor,
        row_size: u8,
    ) -> Self {
        Self {
            name: name.to_string(),
            keys: keys.to_vec(),
            component,
            layout_origin,
            row_size,
            staggered: false,
        }
    }

    fn staggered(mut self) -> Self {
        self.staggered = true;
        self
    }
}

/// Components of the emulated input device, in default layout order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputDeviceDesc {
    pub components: Vec<InputComponentDesc>,
}

impl InputDeviceDesc {
    /// Standard console gamepad: d-pad, four face buttons, select/start and
    /// two shoulder triggers.
    pub fn gamepad() -> Self {
        use InputComponent::*;
        Self {
            components: vec![
                InputComponentDesc::new(
                    "D-Pad",
                    &[key::UP, key::RIGHT, key::DOWN, key::LEFT],
                    DPad,
                    Anchor::BottomLeft,
                    1,
                ),
                InputComponentDesc::new(
                    "Face Buttons",
                    &[key::Y, key::X, key::B, key::A],
                    Button,
                    Anchor::BottomRight,
                    2,
                )
                .staggered(),
                InputComponentDesc::new(
                    "Center Buttons",
                    &[key::SELECT, key::START],
                    Button,
                    Anchor::Bottom,
                    2,
                ),
                InputComponentDesc::new("L", &[key::L], Trigger, Anchor::TopLeft, 1),
                InputComponentDesc::new("R", &[key::R], Trigger, Anchor::TopRight, 1),
            ],
        }
    }

    pub fn find(&self, name: &str) -> Option<&InputComponentDesc> {
        self.components.iter().find(|c| c.name == name)
    }
}

/// Front-end buttons drawn over the game.
pub fn ui_components() -> Vec<InputComponentDesc> {
    vec![
        InputComponentDesc::new(
            "Right UI",
            &[key::OPEN_SYSTEM_ACTIONS, key::FAST_FORWARD],
            InputComponent::Ui,
            Anchor::TopRight,
            2,
        ),
        InputComponentDesc::new(
            "Left UI",
            &[key::SAVE_STATE, key::LOAD_STATE],
            InputComponent::Ui,
            Anchor::TopLeft,
            2,
        ),
        InputComponentDesc::new(
            "Rewind UI",
            &[key::REWIND],
            InputComponent::Ui,
            Anchor::Top,
            1,
        ),
    ]
}
