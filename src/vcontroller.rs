//! Virtual on-screen controller.
//!
//! Owns the elements of the emulated input device and the front-end UI
//! buttons, lays them out inside the window, persists them per input player
//! and answers hit-test queries. Every mutation re-places the elements and
//! writes the affected scope back to the store.

use crate::dpad::{directions_at, dpad_size, DPadDirections};
use crate::element::{
    ButtonGroupLayout, ElementId, ElementPayload, ElementState, LayoutPosition, VControllerButton,
    VControllerElement, DEADZONE_RANGE,
};
use crate::error::VControllerError;
use crate::geometry::{Anchor, Density, Point, Rect};
use crate::keys::{
    app_key_category, key_categories, key_name, ui_components, InputComponentDesc,
    InputDeviceDesc, KeyCategory, KeyCode, KeyInfo,
};
use crate::layout::{layout_group, GroupMetrics};
use crate::store::StoreHandle;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Button size limits in hundredths of a millimetre.
pub const BUTTON_SIZE_RANGE: (u16, u16) = (300, 3000);

const SETTINGS_KEY: &str = "vcontroller/settings";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Off,
    On,
    /// Shown only while no physical controller is in use
    #[default]
    Auto,
}

/// Settings that apply to the whole controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VControllerSettings {
    /// Button size in hundredths of a millimetre
    pub button_size: u16,
    pub alpha: u8,
    pub visibility: Visibility,
    pub input_player: u8,
    pub vibrate: bool,
    pub show_on_touch: bool,
    pub highlight_pushed: bool,
    pub allow_buttons_past_content_bounds: bool,
}

impl Default for VControllerSettings {
    fn default() -> Self {
        Self {
            button_size: 850,
            alpha: 128,
            visibility: Visibility::Auto,
            input_player: 0,
            vibrate: false,
            show_on_touch: true,
            highlight_pushed: true,
            allow_buttons_past_content_bounds: false,
        }
    }
}

impl VControllerSettings {
    pub fn validate(&self, max_players: u8) -> Result<(), VControllerError> {
        let (min, max) = BUTTON_SIZE_RANGE;
        if !(min..=max).contains(&self.button_size) {
            return Err(VControllerError::InvalidParameter {
                name: "button_size",
                value: f64::from(self.button_size),
                min: f64::from(min),
                max: f64::from(max),
            });
        }
        if self.input_player >= max_players.max(1) {
            return Err(VControllerError::InvalidParameter {
                name: "input_player",
                value: f64::from(self.input_player),
                min: 0.0,
                max: f64::from(max_players.max(1) - 1),
            });
        }
        Ok(())
    }

    pub fn button_size_mm(&self) -> f64 {
        f64::from(self.button_size) / 100.0
    }
}

/// Which set of elements an operation applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementScope {
    EmulatedDevice,
    Ui,
}

impl ElementScope {
    fn store_kind(self) -> &'static str {
        match self {
            ElementScope::EmulatedDevice => "device",
            ElementScope::Ui => "ui",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoveButtonOutcome {
    Removed,
    /// The button is the group's last one; nothing was changed and the
    /// caller must confirm removing the whole element
    ConfirmGroupRemoval,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ButtonView {
    pub code: KeyCode,
    pub name: String,
    pub turbo: bool,
    pub toggle: bool,
    pub enabled: bool,
    pub bounds: Rect,
}

/// Placed element as reported to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementView {
    pub id: ElementId,
    pub name: String,
    pub state: ElementState,
    pub position: LayoutPosition,
    pub bounds: Rect,
    pub config: ElementPayload,
    pub buttons: Vec<ButtonView>,
}

impl From<&VControllerElement> for ElementView {
    fn from(elem: &VControllerElement) -> Self {
        Self {
            id: elem.id,
            name: elem.name().to_string(),
            state: elem.state,
            position: elem.position,
            bounds: elem.bounds,
            config: elem.payload.clone(),
            buttons: elem
                .buttons()
                .iter()
                .map(|b| ButtonView {
                    code: b.key.code,
                    name: key_name(b.key.code),
                    turbo: b.key.flags.turbo,
                    toggle: b.key.flags.toggle,
                    enabled: b.enabled,
                    bounds: b.bounds,
                })
                .collect(),
        }
    }
}

pub struct VController {
    store: StoreHandle,
    density: Box<dyn Density + Send + Sync>,
    device: InputDeviceDesc,
    max_players: u8,
    settings: VControllerSettings,
    device_elements: Vec<VControllerElement>,
    ui_elements: Vec<VControllerElement>,
    disabled_keys: HashSet<KeyCode>,
    window: Rect,
    content: Rect,
    next_id: ElementId,
}

impl VController {
    /// Load the controller from `store`, using `default_settings` and the
    /// device's default layout where nothing was saved.
    pub fn new(
        store: StoreHandle,
        density: Box<dyn Density + Send + Sync>,
        device: InputDeviceDesc,
        max_players: u8,
        default_settings: VControllerSettings,
    ) -> Self {
        let max_players = max_players.max(1);
        let settings = match store.load::<VControllerSettings>(SETTINGS_KEY) {
            Ok(Some(saved)) if saved.validate(max_players).is_ok() => saved,
            Ok(Some(_)) => {
                warn!("Saved controller settings are out of range, using defaults");
                default_settings
            }
            Ok(None) => default_settings,
            Err(e) => {
                warn!("Failed to load controller settings: {}", e);
                default_settings
            }
        };

        let mut vc = Self {
            store,
            density,
            device,
            max_players,
            settings,
            device_elements: Vec::new(),
            ui_elements: Vec::new(),
            disabled_keys: HashSet::new(),
            window: Rect::default(),
            content: Rect::default(),
            next_id: 1,
        };
        vc.device_elements = vc.load_scope(ElementScope::EmulatedDevice);
        vc.ui_elements = vc.load_scope(ElementScope::Ui);
        info!(
            "Controller loaded for player {} ({} device elements, {} UI elements)",
            vc.settings.input_player + 1,
            vc.device_elements.len(),
            vc.ui_elements.len()
        );
        vc
    }

    fn alloc_id(&mut self) -> ElementId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn layout_key(&self, scope: ElementScope) -> String {
        let player = match scope {
            ElementScope::EmulatedDevice => self.settings.input_player,
            ElementScope::Ui => 0,
        };
        format!("vcontroller/{}/{}", scope.store_kind(), player)
    }

    fn components(&self, scope: ElementScope) -> Vec<InputComponentDesc> {
        match scope {
            ElementScope::EmulatedDevice => self.device.components.clone(),
            ElementScope::Ui => ui_components(),
        }
    }

    fn default_elements(&mut self, scope: ElementScope) -> Vec<VControllerElement> {
        let mut elements = Vec::new();
        for desc in self.components(scope) {
            let id = self.alloc_id();
            elements.push(VControllerElement::from_component(id, &desc));
        }
        apply_enabled(&self.disabled_keys, &mut elements);
        elements
    }

    fn load_scope(&mut self, scope: ElementScope) -> Vec<VControllerElement> {
        let key = self.layout_key(scope);
        let mut elements = match self.store.load::<Vec<VControllerElement>>(&key) {
            Ok(Some(elements)) if elements.iter().all(is_valid_element) => elements,
            Ok(Some(_)) => {
                warn!("Saved layout '{}' has out-of-range values, using defaults", key);
                return self.default_elements(scope);
            }
            Ok(None) => return self.default_elements(scope),
            Err(e) => {
                warn!("Failed to load layout '{}': {}", key, e);
                return self.default_elements(scope);
            }
        };

        for elem in elements.iter_mut() {
            elem.id = self.alloc_id();
        }
        apply_enabled(&self.disabled_keys, &mut elements);
        debug!("Loaded {} elements from '{}'", elements.len(), key);
        elements
    }

    fn persist(&self, scope: ElementScope) -> Result<(), VControllerError> {
        let key = self.layout_key(scope);
        let elements = match scope {
            ElementScope::EmulatedDevice => &self.device_elements,
            ElementScope::Ui => &self.ui_elements,
        };
        self.store.save(&key, elements)?;
        Ok(())
    }

    fn scope_elements_mut(&mut self, scope: ElementScope) -> &mut Vec<VControllerElement> {
        match scope {
            ElementScope::EmulatedDevice => &mut self.device_elements,
            ElementScope::Ui => &mut self.ui_elements,
        }
    }

    fn scope_of(&self, id: ElementId) -> Result<ElementScope, VControllerError> {
        if self.device_elements.iter().any(|e| e.id == id) {
            Ok(ElementScope::EmulatedDevice)
        } else if self.ui_elements.iter().any(|e| e.id == id) {
            Ok(ElementScope::Ui)
        } else {
            Err(VControllerError::ElementNotFound(id))
        }
    }

    /// Apply `f` to element `id`, then re-place and persist its scope.
    fn edit<F>(&mut self, id: ElementId, f: F) -> Result<(), VControllerError>
    where
        F: FnOnce(&mut VControllerElement) -> Result<(), VControllerError>,
    {
        let scope = self.scope_of(id)?;
        let elem = self
            .scope_elements_mut(scope)
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(VControllerError::ElementNotFound(id))?;
        f(elem)?;
        self.place();
        self.persist(scope)
    }

    pub fn settings(&self) -> &VControllerSettings {
        &self.settings
    }

    pub fn max_players(&self) -> u8 {
        self.max_players
    }

    /// Replace the global settings. A new input player loads that player's
    /// layout.
    pub fn set_settings(&mut self, settings: VControllerSettings) -> Result<(), VControllerError> {
        settings.validate(self.max_players)?;
        let player_changed = settings.input_player != self.settings.input_player;
        self.settings = settings;
        if player_changed {
            self.device_elements = self.load_scope(ElementScope::EmulatedDevice);
        }
        self.place();
        self.store.save(SETTINGS_KEY, &self.settings)?;
        Ok(())
    }

    /// Switch the input player. Returns whether it changed.
    pub fn set_input_player(&mut self, player: u8) -> Result<bool, VControllerError> {
        if player == self.settings.input_player {
            return Ok(false);
        }
        let settings = VControllerSettings {
            input_player: player,
            ..self.settings.clone()
        };
        self.set_settings(settings)?;
        info!("Controller now sends input for player {}", player + 1);
        Ok(true)
    }

    /// Set the window and the content area inside it, then re-place.
    /// Nothing changes if either rectangle is malformed.
    pub fn set_window(
        &mut self,
        window: Rect,
        content: Option<Rect>,
    ) -> Result<(), VControllerError> {
        check_rect("window", &window)?;
        if let Some(content) = &content {
            check_rect("content", content)?;
        }
        self.window = window;
        self.content = content.unwrap_or(window);
        self.place();
        Ok(())
    }

    pub fn window(&self) -> Rect {
        self.window
    }

    pub fn elements(&self) -> impl Iterator<Item = &VControllerElement> {
        self.device_elements.iter().chain(self.ui_elements.iter())
    }

    pub fn element(&self, id: ElementId) -> Option<&VControllerElement> {
        self.elements().find(|e| e.id == id)
    }

    pub fn views(&self) -> Vec<ElementView> {
        self.elements().map(ElementView::from).collect()
    }

    fn button_px(&self) -> i32 {
        self.density.mm_to_px(self.settings.button_size_mm())
    }

    fn placement_area(&self) -> Rect {
        if self.settings.allow_buttons_past_content_bounds || self.content.is_empty() {
            self.window
        } else {
            self.content
                .intersection_opt(&self.window)
                .unwrap_or(self.window)
        }
    }

    /// Resolve every element's anchor position into absolute bounds.
    pub fn place(&mut self) {
        let area = self.placement_area();
        let button_px = self.button_px();
        let density = self.density.as_ref();
        for elem in self
            .device_elements
            .iter_mut()
            .chain(self.ui_elements.iter_mut())
        {
            place_element(elem, &area, density, button_px);
        }
    }

    /// Add a new element built from the named input component.
    pub fn add_element(&mut self, component: &str) -> Result<ElementId, VControllerError> {
        let (scope, desc) = [ElementScope::EmulatedDevice, ElementScope::Ui]
            .into_iter()
            .find_map(|scope| {
                self.components(scope)
                    .into_iter()
                    .find(|c| c.name == component)
                    .map(|desc| (scope, desc))
            })
            .ok_or_else(|| VControllerError::UnknownComponent(component.to_string()))?;

        let id = self.alloc_id();
        let mut elem = VControllerElement::from_component(id, &desc);
        apply_enabled(&self.disabled_keys, std::slice::from_mut(&mut elem));
        self.scope_elements_mut(scope).push(elem);
        info!("Added element {} ({})", id, component);

        self.place();
        self.persist(scope)?;
        Ok(id)
    }

    /// Remove an element and all of its buttons.
    pub fn remove_element(&mut self, id: ElementId) -> Result<(), VControllerError> {
        let scope = self.scope_of(id)?;
        self.scope_elements_mut(scope).retain(|e| e.id != id);
        info!("Removed element {}", id);
        self.place();
        self.persist(scope)
    }

    pub fn add_button(&mut self, id: ElementId, code: KeyCode) -> Result<usize, VControllerError> {
        self.check_assignable(id, code)?;
        let enabled = self.key_is_enabled(code);
        let mut index = 0;
        self.edit(id, |elem| {
            let elem_id = elem.id;
            let kind = elem.kind_name();
            let buttons = elem
                .buttons_mut()
                .ok_or(VControllerError::WrongElementKind {
                    element: elem_id,
                    expected: "button_group",
                    actual: kind,
                })?;
            let mut button = VControllerButton::new(KeyInfo::new(code));
            button.enabled = enabled;
            buttons.push(button);
            index = buttons.len() - 1;
            Ok(())
        })?;
        Ok(index)
    }

    /// Remove one button. Removing the last button of a group is refused
    /// with [`RemoveButtonOutcome::ConfirmGroupRemoval`]; the caller removes
    /// the element with [`VController::remove_element`] once confirmed.
    pub fn remove_button(
        &mut self,
        id: ElementId,
        index: usize,
    ) -> Result<RemoveButtonOutcome, VControllerError> {
        let elem = self.element(id).ok_or(VControllerError::ElementNotFound(id))?;
        let count = elem.buttons().len();
        if index >= count {
            return Err(VControllerError::ButtonNotFound { element: id, index });
        }
        if count == 1 {
            return Ok(RemoveButtonOutcome::ConfirmGroupRemoval);
        }

        self.edit(id, |elem| {
            if let Some(buttons) = elem.buttons_mut() {
                buttons.remove(index);
            }
            Ok(())
        })?;
        Ok(RemoveButtonOutcome::Removed)
    }

    /// Rebind a button, or a d-pad direction (0 up, 1 right, 2 down, 3 left).
    /// Turbo and toggle are cleared.
    pub fn set_button_key(
        &mut self,
        id: ElementId,
        index: usize,
        code: KeyCode,
    ) -> Result<(), VControllerError> {
        self.check_assignable(id, code)?;
        let enabled = self.key_is_enabled(code);
        self.edit(id, |elem| {
            let not_found = VControllerError::ButtonNotFound { element: elem.id, index };
            match &mut elem.payload {
                ElementPayload::DPad(dpad) => {
                    let slot = dpad.keys.get_mut(index).ok_or(not_found)?;
                    *slot = KeyInfo::new(code);
                }
                ElementPayload::ButtonGroup(g) => {
                    let button = g.buttons.get_mut(index).ok_or(not_found)?;
                    button.key = KeyInfo::new(code);
                    button.enabled = enabled;
                }
                ElementPayload::UiButtonGroup(g) => {
                    let button = g.buttons.get_mut(index).ok_or(not_found)?;
                    button.key = KeyInfo::new(code);
                    button.enabled = enabled;
                }
            }
            Ok(())
        })
    }

    pub fn set_button_flags(
        &mut self,
        id: ElementId,
        index: usize,
        turbo: bool,
        toggle: bool,
    ) -> Result<(), VControllerError> {
        self.edit(id, |elem| {
            let elem_id = elem.id;
            let button = elem
                .buttons_mut()
                .and_then(|b| b.get_mut(index))
                .ok_or(VControllerError::ButtonNotFound {
                    element: elem_id,
                    index,
                })?;
            button.set_flags(turbo, toggle)
        })
    }

    pub fn set_element_state(
        &mut self,
        id: ElementId,
        state: ElementState,
    ) -> Result<(), VControllerError> {
        self.edit(id, |elem| {
            elem.state = state;
            Ok(())
        })
    }

    pub fn set_row_size(&mut self, id: ElementId, row_size: u8) -> Result<(), VControllerError> {
        self.edit(id, |elem| elem.set_row_size(row_size))
    }

    /// Replace the layout parameters of an emulated-device button group.
    pub fn set_group_layout(
        &mut self,
        id: ElementId,
        layout: ButtonGroupLayout,
    ) -> Result<(), VControllerError> {
        layout.validate()?;
        self.edit(id, |elem| match &mut elem.payload {
            ElementPayload::ButtonGroup(g) => {
                g.layout = layout;
                Ok(())
            }
            other => Err(VControllerError::WrongElementKind {
                element: elem.id,
                expected: "button_group",
                actual: other.kind_name(),
            }),
        })
    }

    pub fn set_dpad_deadzone(&mut self, id: ElementId, deadzone: u16) -> Result<(), VControllerError> {
        self.edit_dpad(id, |dpad| dpad.set_deadzone(deadzone))
    }

    /// Set diagonal sensitivity from its user-facing percentage.
    pub fn set_dpad_diagonal_percent(
        &mut self,
        id: ElementId,
        percent: u8,
    ) -> Result<(), VControllerError> {
        self.edit_dpad(id, |dpad| dpad.set_diagonal_percent(percent))
    }

    fn edit_dpad<F>(&mut self, id: ElementId, f: F) -> Result<(), VControllerError>
    where
        F: FnOnce(&mut crate::element::DPadConfig) -> Result<(), VControllerError>,
    {
        self.edit(id, |elem| match &mut elem.payload {
            ElementPayload::DPad(dpad) => f(dpad),
            other => Err(VControllerError::WrongElementKind {
                element: elem.id,
                expected: "dpad",
                actual: other.kind_name(),
            }),
        })
    }

    pub fn set_show_bounds(&mut self, id: ElementId, show: bool) -> Result<(), VControllerError> {
        self.edit(id, |elem| match &mut elem.payload {
            ElementPayload::DPad(dpad) => {
                dpad.show_bounds = show;
                Ok(())
            }
            ElementPayload::ButtonGroup(g) => {
                g.layout.show_bounds = show;
                Ok(())
            }
            ElementPayload::UiButtonGroup(_) => Err(VControllerError::WrongElementKind {
                element: elem.id,
                expected: "button_group",
                actual: "ui_button_group",
            }),
        })
    }

    /// Move an element so its center sits at `center`, re-anchoring it to
    /// the nearest window anchor. Centers outside the placement area are
    /// pulled onto its edge.
    pub fn move_element(&mut self, id: ElementId, center: Point) -> Result<(), VControllerError> {
        let area = self.placement_area();
        let center = area.clamp_point(center);
        let anchor = Anchor::nearest(&area, center);
        let offset = center.minus(anchor.point_in(&area));
        self.edit(id, |elem| {
            elem.position = LayoutPosition { anchor, offset };
            Ok(())
        })
    }

    /// Put the scope's elements back at their default anchors.
    pub fn reset_positions(&mut self, scope: ElementScope) -> Result<(), VControllerError> {
        let components = self.components(scope);
        for elem in self.scope_elements_mut(scope).iter_mut() {
            let anchor = components
                .iter()
                .find(|c| c.name == elem.name())
                .map(|c| c.layout_origin)
                .unwrap_or(Anchor::Center);
            elem.position = LayoutPosition::at(anchor);
        }
        info!("Reset {:?} element positions", scope);
        self.place();
        self.persist(scope)
    }

    /// Rebuild the scope's elements from the input device description,
    /// discarding added and removed groups.
    pub fn reset_groups(&mut self, scope: ElementScope) -> Result<(), VControllerError> {
        let elements = self.default_elements(scope);
        *self.scope_elements_mut(scope) = elements;
        info!("Reset {:?} element groups", scope);
        self.place();
        self.persist(scope)
    }

    pub fn key_is_enabled(&self, code: KeyCode) -> bool {
        !self.disabled_keys.contains(&code)
    }

    /// Mark a key usable or not (e.g. rewind without a rewind buffer).
    pub fn set_key_enabled(&mut self, code: KeyCode, enabled: bool) {
        let changed = if enabled {
            self.disabled_keys.remove(&code)
        } else {
            self.disabled_keys.insert(code)
        };
        if changed {
            debug!("Key {} {}", key_name(code), if enabled { "enabled" } else { "disabled" });
            apply_enabled(&self.disabled_keys, &mut self.device_elements);
            apply_enabled(&self.disabled_keys, &mut self.ui_elements);
        }
    }

    fn categories_for(&self, is_ui: bool) -> Vec<KeyCategory> {
        if is_ui {
            vec![app_key_category()]
        } else {
            key_categories(self.max_players)
                .into_iter()
                .filter(|c| c.multiplayer_index == 0)
                .collect()
        }
    }

    /// Key categories that may be bound to element `id`.
    pub fn assignable_categories(&self, id: ElementId) -> Result<Vec<KeyCategory>, VControllerError> {
        let elem = self.element(id).ok_or(VControllerError::ElementNotFound(id))?;
        Ok(self.categories_for(elem.is_ui()))
    }

    fn check_assignable(&self, id: ElementId, code: KeyCode) -> Result<(), VControllerError> {
        if self
            .assignable_categories(id)?
            .iter()
            .any(|c| c.contains(code))
        {
            Ok(())
        } else {
            Err(VControllerError::KeyNotAssignable(code))
        }
    }

    /// Topmost active element whose bounds or touch area contain `p`.
    pub fn element_at(&self, p: Point) -> Option<ElementId> {
        self.elements()
            .filter(|e| e.state.is_active())
            .filter(|e| {
                e.bounds.contains(p) || e.buttons().iter().any(|b| b.extended_bounds.contains(p))
            })
            .last()
            .map(|e| e.id)
    }

    /// Enabled button whose touch area contains `p`.
    pub fn button_at(&self, p: Point) -> Option<(ElementId, usize)> {
        self.elements()
            .filter(|e| e.state.is_active())
            .flat_map(|e| e.buttons().iter().enumerate().map(move |(i, b)| (e.id, i, b)))
            .filter(|(_, _, b)| b.enabled && b.extended_bounds.contains(p))
            .last()
            .map(|(id, i, _)| (id, i))
    }

    pub fn dpad_directions_at(
        &self,
        id: ElementId,
        p: Point,
    ) -> Result<DPadDirections, VControllerError> {
        let elem = self.element(id).ok_or(VControllerError::ElementNotFound(id))?;
        match &elem.payload {
            ElementPayload::DPad(dpad) if elem.state.is_active() => {
                Ok(directions_at(dpad, &elem.bounds, self.density.as_ref(), p))
            }
            ElementPayload::DPad(_) => Ok(DPadDirections::default()),
            other => Err(VControllerError::WrongElementKind {
                element: id,
                expected: "dpad",
                actual: other.kind_name(),
            }),
        }
    }
}

impl std::fmt::Debug for VController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VController")
            .field("settings", &self.settings)
            .field("device_elements", &self.device_elements.len())
            .field("ui_elements", &self.ui_elements.len())
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

fn apply_enabled(disabled: &HashSet<KeyCode>, elements: &mut [VControllerElement]) {
    for elem in elements.iter_mut() {
        if let Some(buttons) = elem.buttons_mut() {
            for button in buttons.iter_mut() {
                button.enabled = !disabled.contains(&button.key.code);
            }
        }
    }
}

fn check_rect(name: &'static str, rect: &Rect) -> Result<(), VControllerError> {
    if rect.is_well_formed() {
        Ok(())
    } else {
        Err(VControllerError::InvalidRect {
            name,
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
        })
    }
}

fn is_valid_element(elem: &VControllerElement) -> bool {
    match &elem.payload {
        ElementPayload::DPad(d) => {
            (DEADZONE_RANGE.0..=DEADZONE_RANGE.1).contains(&d.deadzone)
                && d.diagonal_sensitivity > 0.0
                && d.diagonal_sensitivity <= 1.0
        }
        ElementPayload::ButtonGroup(g) => g.layout.validate().is_ok(),
        ElementPayload::UiButtonGroup(g) => (1..=5).contains(&g.row_size),
    }
}

fn place_element(elem: &mut VControllerElement, area: &Rect, density: &dyn Density, button_px: i32) {
    if !elem.state.is_active() || elem.is_empty() || area.is_empty() {
        elem.bounds = Rect::default();
        if let Some(buttons) = elem.buttons_mut() {
            for button in buttons.iter_mut() {
                button.bounds = Rect::default();
                button.extended_bounds = Rect::default();
            }
        }
        return;
    }

    let group = match &elem.payload {
        ElementPayload::DPad(_) => None,
        ElementPayload::ButtonGroup(g) => Some(layout_group(&GroupMetrics::for_button_group(
            &g.layout,
            g.buttons.len(),
            button_px,
            density.mm_to_px(f64::from(g.layout.spacing_mm)),
        ))),
        ElementPayload::UiButtonGroup(g) => Some(layout_group(&GroupMetrics::for_ui_group(
            g.row_size,
            g.buttons.len(),
            button_px,
        ))),
    };
    let size = group
        .as_ref()
        .map(|l| l.size)
        .unwrap_or_else(|| dpad_size(button_px));

    let offset = elem.position.offset;
    let center = elem.position.anchor.point_in(area).offset(offset.x, offset.y);
    let rect = Rect::from_center(center, size).clamp_inside(area);
    elem.bounds = rect;

    if let (Some(layout), Some(buttons)) = (group, elem.buttons_mut()) {
        for (button, rects) in buttons.iter_mut().zip(layout.buttons) {
            button.bounds = rects.bounds.translate(rect.x, rect.y);
            button.extended_bounds = rects.extended_bounds.translate(rect.x, rect.y);
        }
    }
}
