//! Virtual controller elements: d-pads, button groups and UI button groups.

use crate::error::VControllerError;
use crate::geometry::{Anchor, Point, Rect};
use crate::keys::{InputComponent, InputComponentDesc, KeyCode, KeyInfo};
use serde::{Deserialize, Serialize};

pub type ElementId = u32;

pub const ROW_SIZE_RANGE: (u8, u8) = (1, 5);
pub const SPACING_MM_RANGE: (u8, u8) = (0, 8);
pub const PADDING_PERCENT_RANGE: (u8, u8) = (0, 30);
/// D-pad deadzone in hundredths of a millimetre.
pub const DEADZONE_RANGE: (u16, u16) = (100, 300);
pub const DIAGONAL_SENSITIVITY_RANGE: (f64, f64) = (0.01, 1.0);

pub const DEFAULT_DEADZONE: u16 = 135;
pub const DEFAULT_DIAGONAL_SENSITIVITY: f64 = 0.667;

fn check_range(name: &'static str, value: f64, min: f64, max: f64) -> Result<(), VControllerError> {
    if value.is_nan() || value < min || value > max {
        return Err(VControllerError::InvalidParameter {
            name,
            value,
            min,
            max,
        });
    }
    Ok(())
}

/// Visibility of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementState {
    /// Not drawn and not touchable
    Off,
    #[default]
    Shown,
    /// Touchable but not drawn
    Hidden,
}

impl ElementState {
    pub fn is_active(&self) -> bool {
        !matches!(self, ElementState::Off)
    }
}

fn enabled_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VControllerButton {
    pub key: KeyInfo,
    #[serde(skip, default = "enabled_default")]
    pub enabled: bool,
    /// Drawn rectangle
    #[serde(skip)]
    pub bounds: Rect,
    /// Touch rectangle, `bounds` plus padding
    #[serde(skip)]
    pub extended_bounds: Rect,
}

impl VControllerButton {
    pub fn new(key: KeyInfo) -> Self {
        Self {
            key,
            enabled: true,
            bounds: Rect::default(),
            extended_bounds: Rect::default(),
        }
    }

    /// Set turbo/toggle. App keys don't take either flag.
    pub fn set_flags(&mut self, turbo: bool, toggle: bool) -> Result<(), VControllerError> {
        if self.key.is_app_key() && (turbo || toggle) {
            return Err(VControllerError::KeyNotAssignable(self.key.code));
        }
        self.key.flags.turbo = turbo;
        self.key.flags.toggle = toggle;
        Ok(())
    }
}

/// Vertical/horizontal offset applied to successive buttons of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stagger {
    NegThreeQuarterV,
    NegHalfV,
    #[default]
    None,
    HalfV,
    ThreeQuarterV,
    FullHV,
}

impl Stagger {
    pub const ALL: [Stagger; 6] = [
        Stagger::NegThreeQuarterV,
        Stagger::NegHalfV,
        Stagger::None,
        Stagger::HalfV,
        Stagger::ThreeQuarterV,
        Stagger::FullHV,
    ];

    pub fn from_index(index: u8) -> Option<Stagger> {
        Self::ALL.get(usize::from(index)).copied()
    }

    pub fn index(&self) -> u8 {
        Self::ALL.iter().position(|s| s == self).unwrap_or(2) as u8
    }

    pub fn label(&self) -> &'static str {
        match self {
            Stagger::NegThreeQuarterV => "-0.75x V",
            Stagger::NegHalfV => "-0.5x V",
            Stagger::None => "0",
            Stagger::HalfV => "0.5x V",
            Stagger::ThreeQuarterV => "0.75x V",
            Stagger::FullHV => "1x H&V",
        }
    }

    /// Multiple of the button size each successive button moves down, for
    /// the vertical-only presets.
    pub fn vertical_factor(&self) -> Option<f64> {
        match self {
            Stagger::NegThreeQuarterV => Some(-0.75),
            Stagger::NegHalfV => Some(-0.5),
            Stagger::None => Some(0.0),
            Stagger::HalfV => Some(0.5),
            Stagger::ThreeQuarterV => Some(0.75),
            Stagger::FullHV => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonGroupLayout {
    pub row_size: u8,
    pub spacing_mm: u8,
    pub stagger: Stagger,
    /// Touch padding left and right, percent of button width
    pub x_padding: u8,
    /// Touch padding top and bottom, percent of button height
    pub y_padding: u8,
    pub show_bounds: bool,
}

impl Default for ButtonGroupLayout {
    fn default() -> Self {
        Self {
            row_size: 2,
            spacing_mm: 2,
            stagger: Stagger::None,
            x_padding: 0,
            y_padding: 0,
            show_bounds: false,
        }
    }
}

impl ButtonGroupLayout {
    pub fn validate(&self) -> Result<(), VControllerError> {
        check_range(
            "row_size",
            f64::from(self.row_size),
            f64::from(ROW_SIZE_RANGE.0),
            f64::from(ROW_SIZE_RANGE.1),
        )?;
        check_range(
            "spacing_mm",
            f64::from(self.spacing_mm),
            f64::from(SPACING_MM_RANGE.0),
            f64::from(SPACING_MM_RANGE.1),
        )?;
        for (name, value) in [("x_padding", self.x_padding), ("y_padding", self.y_padding)] {
            check_range(
                name,
                f64::from(value),
                f64::from(PADDING_PERCENT_RANGE.0),
                f64::from(PADDING_PERCENT_RANGE.1),
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonGroup {
    pub name: String,
    pub buttons: Vec<VControllerButton>,
    pub layout: ButtonGroupLayout,
}

/// Group of front-end buttons. Only the row size is configurable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiButtonGroup {
    pub name: String,
    pub buttons: Vec<VControllerButton>,
    pub row_size: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DPadConfig {
    /// Up, right, down, left
    pub keys: [KeyInfo; 4],
    pub deadzone: u16,
    pub diagonal_sensitivity: f64,
    pub show_bounds: bool,
}

impl DPadConfig {
    pub fn new(keys: [KeyCode; 4]) -> Self {
        Self {
            keys: keys.map(KeyInfo::new),
            deadzone: DEFAULT_DEADZONE,
            diagonal_sensitivity: DEFAULT_DIAGONAL_SENSITIVITY,
            show_bounds: false,
        }
    }

    pub fn set_deadzone(&mut self, deadzone: u16) -> Result<(), VControllerError> {
        check_range(
            "deadzone",
            f64::from(deadzone),
            f64::from(DEADZONE_RANGE.0),
            f64::from(DEADZONE_RANGE.1),
        )?;
        self.deadzone = deadzone;
        Ok(())
    }

    pub fn set_diagonal_sensitivity(&mut self, s: f64) -> Result<(), VControllerError> {
        check_range(
            "diagonal_sensitivity",
            s,
            DIAGONAL_SENSITIVITY_RANGE.0,
            DIAGONAL_SENSITIVITY_RANGE.1,
        )?;
        self.diagonal_sensitivity = s;
        Ok(())
    }

    /// Set sensitivity from the user-facing percentage (0-99), where the
    /// stored value is `(100 - p) / 100`.
    pub fn set_diagonal_percent(&mut self, percent: u8) -> Result<(), VControllerError> {
        check_range("diagonal_percent", f64::from(percent), 0.0, 99.0)?;
        self.set_diagonal_sensitivity(f64::from(100 - percent) / 100.0)
    }

    pub fn diagonal_percent(&self) -> f64 {
        100.0 - self.diagonal_sensitivity * 100.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ElementPayload {
    DPad(DPadConfig),
    ButtonGroup(ButtonGroup),
    UiButtonGroup(UiButtonGroup),
}

impl ElementPayload {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ElementPayload::DPad(_) => "dpad",
            ElementPayload::ButtonGroup(_) => "button_group",
            ElementPayload::UiButtonGroup(_) => "ui_button_group",
        }
    }
}

/// Where an element sits, relative to one of the window anchors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutPosition {
    pub anchor: Anchor,
    /// Offset of the element center from the anchor point, in pixels
    pub offset: Point,
}

impl LayoutPosition {
    pub fn at(anchor: Anchor) -> Self {
        Self {
            anchor,
            offset: Point::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VControllerElement {
    pub id: ElementId,
    pub state: ElementState,
    pub position: LayoutPosition,
    pub payload: ElementPayload,
    #[serde(skip)]
    pub bounds: Rect,
}

impl VControllerElement {
    pub fn new(id: ElementId, position: LayoutPosition, payload: ElementPayload) -> Self {
        Self {
            id,
            state: ElementState::Shown,
            position,
            payload,
            bounds: Rect::default(),
        }
    }

    /// Build the default element for an input component.
    pub fn from_component(id: ElementId, desc: &InputComponentDesc) -> Self {
        let buttons = || -> Vec<VControllerButton> {
            desc.keys
                .iter()
                .map(|k| VControllerButton::new(KeyInfo::new(*k)))
                .collect()
        };
        let payload = match desc.component {
            InputComponent::DPad => {
                let mut keys = [0; 4];
                for (slot, key) in keys.iter_mut().zip(&desc.keys) {
                    *slot = *key;
                }
                ElementPayload::DPad(DPadConfig::new(keys))
            }
            InputComponent::Button | InputComponent::Trigger => {
                ElementPayload::ButtonGroup(ButtonGroup {
                    name: desc.name.clone(),
                    buttons: buttons(),
                    layout: ButtonGroupLayout {
                        row_size: desc.row_size,
                        stagger: if desc.staggered {
                            Stagger::HalfV
                        } else {
                            Stagger::None
                        },
                        ..ButtonGroupLayout::default()
                    },
                })
            }
            InputComponent::Ui => ElementPayload::UiButtonGroup(UiButtonGroup {
                name: desc.name.clone(),
                buttons: buttons(),
                row_size: desc.row_size,
            }),
        };
        Self::new(id, LayoutPosition::at(desc.layout_origin), payload)
    }

    pub fn kind_name(&self) -> &'static str {
        self.payload.kind_name()
    }

    pub fn name(&self) -> &str {
        match &self.payload {
            ElementPayload::DPad(_) => "D-Pad",
            ElementPayload::ButtonGroup(g) => &g.name,
            ElementPayload::UiButtonGroup(g) => &g.name,
        }
    }

    pub fn is_ui(&self) -> bool {
        matches!(self.payload, ElementPayload::UiButtonGroup(_))
    }

    pub fn buttons(&self) -> &[VControllerButton] {
        match &self.payload {
            ElementPayload::DPad(_) => &[],
            ElementPayload::ButtonGroup(g) => &g.buttons,
            ElementPayload::UiButtonGroup(g) => &g.buttons,
        }
    }

    pub fn buttons_mut(&mut self) -> Option<&mut Vec<VControllerButton>> {
        match &mut self.payload {
            ElementPayload::DPad(_) => None,
            ElementPayload::ButtonGroup(g) => Some(&mut g.buttons),
            ElementPayload::UiButtonGroup(g) => Some(&mut g.buttons),
        }
    }

    /// Row size; a d-pad counts as one row of one.
    pub fn row_size(&self) -> u8 {
        match &self.payload {
            ElementPayload::DPad(_) => 1,
            ElementPayload::ButtonGroup(g) => g.layout.row_size,
            ElementPayload::UiButtonGroup(g) => g.row_size,
        }
    }

    pub fn set_row_size(&mut self, row_size: u8) -> Result<(), VControllerError> {
        check_range(
            "row_size",
            f64::from(row_size),
            f64::from(ROW_SIZE_RANGE.0),
            f64::from(ROW_SIZE_RANGE.1),
        )?;
        match &mut self.payload {
            ElementPayload::DPad(_) => {
                return Err(VControllerError::WrongElementKind {
                    element: self.id,
                    expected: "button_group",
                    actual: "dpad",
                })
            }
            ElementPayload::ButtonGroup(g) => g.layout.row_size = row_size,
            ElementPayload::UiButtonGroup(g) => g.row_size = row_size,
        }
        Ok(())
    }

    /// Whether the element has nothing to lay out.
    pub fn is_empty(&self) -> bool {
        match &self.payload {
            ElementPayload::DPad(_) => false,
            ElementPayload::ButtonGroup(g) => g.buttons.is_empty(),
            ElementPayload::UiButtonGroup(g) => g.buttons.is_empty(),
        }
    }

    /// Every key code the element emits.
    pub fn key_codes(&self) -> Vec<KeyCode> {
        match &self.payload {
            ElementPayload::DPad(d) => d.keys.iter().map(|k| k.code).collect(),
            ElementPayload::ButtonGroup(g) => g.buttons.iter().map(|b| b.key.code).collect(),
            ElementPayload::UiButtonGroup(g) => g.buttons.iter().map(|b| b.key.code).collect(),
        }
    }
}
