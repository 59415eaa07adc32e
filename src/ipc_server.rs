//! IPC server for the controller editor and the front-end shell.
//!
//! Newline-delimited JSON over a Unix domain socket. Every command gets one
//! JSON object back; failures are `{"success": false, "error": ...}`.

use crate::config::ConfigManager;
use crate::element::{ButtonGroupLayout, ElementId, ElementState};
use crate::error::IpcError;
use crate::frame_detect::check_refresh_rate;
use crate::frame_pump::{
    run_detection, ChannelFrameHost, DetectionProgress, DetectionRequest, FrameParams,
};
use crate::geometry::{Dpi, Point, Rect};
use crate::keys::{DeviceMap, InputDeviceDesc, KeyCode};
use crate::output_timing::{parse_custom_rate, FrameTimeOption, OutputTimingManager, VideoSystem};
use crate::profiles::{DeviceId, PlayerAssignment, ProfileManager};
use crate::store::StoreHandle;
use crate::vcontroller::{ElementScope, RemoveButtonOutcome, VController, VControllerSettings};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};

#[cfg(unix)]
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

/// Commands that can be received via IPC.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "command")]
pub enum IpcCommand {
    GetStatus,

    // Frame-rate detection and output timing
    StartDetection {
        system: VideoSystem,
        /// Zero takes the rate from the first pushed frame
        #[serde(default)]
        screen_rate_hz: f64,
    },
    CancelDetection,
    PushFrame {
        timestamp_ns: u64,
        refresh_hz: f64,
    },
    GetFrameTime {
        system: VideoSystem,
    },
    /// `rate` is "auto", "original" or a custom rate such as "59.94"
    SetFrameTime {
        system: VideoSystem,
        rate: String,
    },
    SetFrameInterval {
        interval: u8,
    },

    // Virtual controller
    GetLayout,
    SetWindow {
        window: Rect,
        #[serde(default)]
        content: Option<Rect>,
    },
    SetVControllerSettings {
        settings: VControllerSettings,
    },
    AddElement {
        component: String,
    },
    RemoveElement {
        id: ElementId,
    },
    AddButton {
        id: ElementId,
        key: KeyCode,
    },
    RemoveButton {
        id: ElementId,
        index: usize,
    },
    SetButtonKey {
        id: ElementId,
        index: usize,
        key: KeyCode,
    },
    SetButtonFlags {
        id: ElementId,
        index: usize,
        turbo: bool,
        toggle: bool,
    },
    SetElementState {
        id: ElementId,
        state: ElementState,
    },
    SetRowSize {
        id: ElementId,
        row_size: u8,
    },
    SetGroupLayout {
        id: ElementId,
        layout: ButtonGroupLayout,
    },
    SetDPad {
        id: ElementId,
        #[serde(default)]
        deadzone: Option<u16>,
        #[serde(default)]
        diagonal_percent: Option<u8>,
    },
    SetShowBounds {
        id: ElementId,
        show: bool,
    },
    MoveElement {
        id: ElementId,
        x: i32,
        y: i32,
    },
    ResetPositions {
        scope: ElementScope,
    },
    ResetGroups {
        scope: ElementScope,
    },
    SetKeyEnabled {
        key: KeyCode,
        enabled: bool,
    },
    AssignableKeys {
        id: ElementId,
    },
    HitTest {
        x: i32,
        y: i32,
    },

    // Key profiles and devices
    ListProfiles {
        map: DeviceMap,
    },
    CreateProfile {
        map: DeviceMap,
        from: String,
        name: String,
    },
    RenameProfile {
        map: DeviceMap,
        name: String,
        new_name: String,
    },
    DeleteProfile {
        map: DeviceMap,
        name: String,
    },
    ListDevices,
    RegisterDevice {
        device: DeviceId,
        map: DeviceMap,
    },
    SetDeviceProfile {
        device: DeviceId,
        profile: String,
    },
    SetDevicePlayer {
        device: DeviceId,
        player: PlayerAssignment,
    },
    CreateDeviceProfile {
        device: DeviceId,
        name: String,
    },
    DeleteDeviceSettings {
        device: DeviceId,
    },
    /// Input code the device's current profile binds to `key`
    DeviceKeyInput {
        device: DeviceId,
        key: KeyCode,
    },
}

/// How the last detection session ended.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DetectionReport {
    pub system: VideoSystem,
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FrameTimeStatus {
    pub system: VideoSystem,
    pub label: String,
}

/// Status response sent to clients.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StatusResponse {
    pub detecting: bool,
    pub detection: DetectionProgress,
    pub last_detection: Option<DetectionReport>,
    pub frame_times: Vec<FrameTimeStatus>,
    pub frame_interval: String,
    pub input_player: u8,
    pub max_players: u8,
    pub element_count: usize,
}

/// Parse the `rate` argument of `SetFrameTime`.
pub fn parse_frame_time_option(rate: &str) -> Result<FrameTimeOption, IpcError> {
    match rate.trim().to_lowercase().as_str() {
        "auto" => Ok(FrameTimeOption::Auto),
        "original" => Ok(FrameTimeOption::Original),
        other => parse_custom_rate(other)
            .map(FrameTimeOption::Custom)
            .map_err(|e| IpcError::InvalidCommand(e.to_string())),
    }
}

fn ok(message: impl Into<String>) -> Value {
    json!({ "success": true, "message": message.into() })
}

fn fail(error: impl Display) -> Value {
    json!({ "success": false, "error": error.to_string() })
}

fn to_json<T: Serialize + ?Sized>(key: &str, value: &T) -> Value {
    match serde_json::to_value(value) {
        Ok(v) => json!({ "success": true, key: v }),
        Err(e) => fail(format!("Failed to serialize {}: {}", key, e)),
    }
}

/// Shared daemon state accessible by the IPC server.
pub struct DaemonState {
    pub config_manager: Arc<ConfigManager>,
    pub vcontroller: RwLock<VController>,
    pub profiles: RwLock<ProfileManager>,
    pub timing: RwLock<OutputTimingManager>,
    /// Frames pushed by the front-end are fed through this host
    pub frame_host: Arc<ChannelFrameHost>,
    detecting: AtomicBool,
    cancel_tx: watch::Sender<bool>,
    progress_tx: watch::Sender<DetectionProgress>,
    last_detection: RwLock<Option<DetectionReport>>,
}

impl DaemonState {
    pub fn new(
        config_manager: Arc<ConfigManager>,
        store: StoreHandle,
        frame_host: Arc<ChannelFrameHost>,
    ) -> Self {
        let config = config_manager.get();
        let vcontroller = VController::new(
            store.clone(),
            Box::new(Dpi(config.dpi)),
            InputDeviceDesc::gamepad(),
            config.max_players,
            config.vcontroller.clone(),
        );
        let profiles = ProfileManager::load(store.clone(), config.max_players);
        let timing = OutputTimingManager::load(store);
        let (cancel_tx, _) = watch::channel(false);
        let (progress_tx, _) = watch::channel(DetectionProgress::default());

        Self {
            config_manager,
            vcontroller: RwLock::new(vcontroller),
            profiles: RwLock::new(profiles),
            timing: RwLock::new(timing),
            frame_host,
            detecting: AtomicBool::new(false),
            cancel_tx,
            progress_tx,
            last_detection: RwLock::new(None),
        }
    }

    pub fn is_detecting(&self) -> bool {
        self.detecting.load(Ordering::SeqCst)
    }

    pub async fn get_status(&self) -> StatusResponse {
        let detection = self.progress_tx.borrow().clone();
        let last_detection = self.last_detection.read().await.clone();
        let timing = self.timing.read().await;
        let vc = self.vcontroller.read().await;

        StatusResponse {
            detecting: self.is_detecting(),
            detection,
            last_detection,
            frame_times: VideoSystem::ALL
                .iter()
                .map(|&system| FrameTimeStatus {
                    system,
                    label: timing.label(system),
                })
                .collect(),
            frame_interval: self.config_manager.get().frame_interval_label().to_string(),
            input_player: vc.settings().input_player,
            max_players: vc.max_players(),
            element_count: vc.elements().count(),
        }
    }

    /// Start a detection session in the background. Fails if one is
    /// already running or `screen_rate_hz` is neither zero nor a usable
    /// refresh rate.
    pub fn start_detection(
        self: &Arc<Self>,
        system: VideoSystem,
        screen_rate_hz: f64,
    ) -> Result<(), IpcError> {
        if screen_rate_hz != 0.0 {
            check_refresh_rate(screen_rate_hz).map_err(|e| {
                IpcError::InvalidCommand(format!("screen_rate_hz {}: {}", screen_rate_hz, e))
            })?;
        }

        if self
            .detecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(IpcError::InvalidCommand(
                "A detection session is already running".to_string(),
            ));
        }

        self.cancel_tx.send_replace(false);
        self.progress_tx.send_replace(DetectionProgress::default());
        let cancel_rx = self.cancel_tx.subscribe();
        let request = DetectionRequest {
            screen_rate_hz,
            intended_rate_hz: system.native_rate_hz(),
        };

        let state = Arc::clone(self);
        tokio::spawn(async move {
            let _session = SessionFlag(&state.detecting);
            let result = run_detection(
                state.frame_host.as_ref(),
                request,
                cancel_rx,
                Some(&state.progress_tx),
            )
            .await;

            let applied = state.timing.write().await.apply_detected(system, result);
            let report = match applied {
                Ok(Some(_)) => {
                    let label = state.timing.read().await.label(system);
                    tracing::info!("Detected {} frame rate: {}", system, label);
                    DetectionReport {
                        system,
                        success: true,
                        message: label,
                    }
                }
                Ok(None) => DetectionReport {
                    system,
                    success: false,
                    message: "Cancelled".to_string(),
                },
                Err(e) => {
                    tracing::warn!("Frame rate detection for {} failed: {}", system, e);
                    DetectionReport {
                        system,
                        success: false,
                        message: e.to_string(),
                    }
                }
            };

            *state.last_detection.write().await = Some(report);
        });

        Ok(())
    }

    pub fn cancel_detection(&self) -> bool {
        if !self.is_detecting() {
            return false;
        }
        self.cancel_tx.send_replace(true);
        true
    }
}

/// Clears the detecting flag when a session task ends, including by panic.
struct SessionFlag<'a>(&'a AtomicBool);

impl Drop for SessionFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Unix Domain Socket server for IPC.
#[cfg(unix)]
pub struct IpcServer {
    socket_path: PathBuf,
    listener: UnixListener,
}

#[cfg(unix)]
impl IpcServer {
    /// Bind at `path`, replacing a stale socket file left by a previous run.
    pub async fn new(path: &Path) -> Result<Self, IpcError> {
        let socket_path = path.to_path_buf();

        Self::cleanup_socket(&socket_path)?;
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&socket_path).map_err(|e| IpcError::SocketBindFailed {
            path: socket_path.display().to_string(),
            source: e,
        })?;

        Ok(Self {
            socket_path,
            listener,
        })
    }

    fn cleanup_socket(path: &Path) -> Result<(), IpcError> {
        if path.exists() {
            std::fs::remove_file(path).map_err(|e| IpcError::SocketBindFailed {
                path: path.display().to_string(),
                source: e,
            })?;
        }
        Ok(())
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Accept connections forever, one task per client.
    pub async fn run(&self, state: Arc<DaemonState>) -> Result<(), IpcError> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    let state = Arc::clone(&state);
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_connection(stream, state).await {
                            tracing::warn!("Error handling IPC connection: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Error accepting IPC connection: {}", e);
                }
            }
        }
    }

    async fn handle_connection(
        stream: UnixStream,
        state: Arc<DaemonState>,
    ) -> Result<(), IpcError> {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        while reader.read_line(&mut line).await? > 0 {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                line.clear();
                continue;
            }

            let response = match serde_json::from_str::<IpcCommand>(trimmed) {
                Ok(command) => handle_command(command, &state).await,
                Err(e) => fail(IpcError::InvalidCommand(e.to_string())),
            };

            let response_str = serde_json::to_string(&response)?;
            writer.write_all(response_str.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;

            line.clear();
        }

        Ok(())
    }
}

#[cfg(unix)]
impl Drop for IpcServer {
    fn drop(&mut self) {
        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}

/// Handle a single IPC command and return the response.
pub async fn handle_command(command: IpcCommand, state: &Arc<DaemonState>) -> Value {
    match command {
        IpcCommand::GetStatus => to_json("status", &state.get_status().await),

        IpcCommand::StartDetection {
            system,
            screen_rate_hz,
        } => match state.start_detection(system, screen_rate_hz) {
            Ok(()) => ok(format!("Detecting {} frame rate", system)),
            Err(e) => fail(e),
        },

        IpcCommand::CancelDetection => {
            if state.cancel_detection() {
                ok("Detection cancelled")
            } else {
                fail("No detection session is running")
            }
        }

        IpcCommand::PushFrame {
            timestamp_ns,
            refresh_hz,
        } => {
            let accepted = state.frame_host.push_frame(FrameParams {
                timestamp: Duration::from_nanos(timestamp_ns),
                refresh_hint: refresh_hz,
            });
            json!({ "success": true, "accepted": accepted })
        }

        IpcCommand::GetFrameTime { system } => {
            let timing = state.timing.read().await;
            let interval_ns = timing
                .effective_interval(system)
                .map(|d| d.as_nanos() as u64);
            json!({
                "success": true,
                "system": system,
                "label": timing.label(system),
                "interval_ns": interval_ns,
            })
        }

        IpcCommand::SetFrameTime { system, rate } => {
            let option = match parse_frame_time_option(&rate) {
                Ok(option) => option,
                Err(e) => return fail(e),
            };
            let mut timing = state.timing.write().await;
            match timing.set_option(system, option) {
                Ok(changed) => json!({
                    "success": true,
                    "changed": changed,
                    "label": timing.label(system),
                }),
                Err(e) => fail(e),
            }
        }

        IpcCommand::SetFrameInterval { interval } => {
            let mut config = state.config_manager.get();
            config.frame_interval = interval;
            match state.config_manager.update(config) {
                Ok(()) => {
                    let label = state.config_manager.get().frame_interval_label();
                    tracing::info!("Frame interval set to {}", label);
                    ok(format!("Frame interval set to {}", label))
                }
                Err(e) => fail(e),
            }
        }

        IpcCommand::GetLayout => {
            let vc = state.vcontroller.read().await;
            json!({
                "success": true,
                "window": vc.window(),
                "settings": vc.settings(),
                "elements": vc.views(),
            })
        }

        IpcCommand::SetWindow { window, content } => {
            let result = state.vcontroller.write().await.set_window(window, content);
            respond(result, "Window updated")
        }

        IpcCommand::SetVControllerSettings { settings } => {
            let result = state.vcontroller.write().await.set_settings(settings);
            respond(result, "Settings updated")
        }

        IpcCommand::AddElement { component } => {
            match state.vcontroller.write().await.add_element(&component) {
                Ok(id) => json!({ "success": true, "id": id }),
                Err(e) => fail(e),
            }
        }

        IpcCommand::RemoveElement { id } => {
            let result = state.vcontroller.write().await.remove_element(id);
            respond(result, "Element removed")
        }

        IpcCommand::AddButton { id, key } => {
            match state.vcontroller.write().await.add_button(id, key) {
                Ok(index) => json!({ "success": true, "index": index }),
                Err(e) => fail(e),
            }
        }

        IpcCommand::RemoveButton { id, index } => {
            match state.vcontroller.write().await.remove_button(id, index) {
                Ok(RemoveButtonOutcome::Removed) => ok("Button removed"),
                Ok(RemoveButtonOutcome::ConfirmGroupRemoval) => json!({
                    "success": false,
                    "confirm": "remove_element",
                    "error": "Removing the last button removes the whole group",
                }),
                Err(e) => fail(e),
            }
        }

        IpcCommand::SetButtonKey { id, index, key } => {
            let result = state.vcontroller.write().await.set_button_key(id, index, key);
            respond(result, "Button key updated")
        }

        IpcCommand::SetButtonFlags {
            id,
            index,
            turbo,
            toggle,
        } => {
            let result = state
                .vcontroller
                .write()
                .await
                .set_button_flags(id, index, turbo, toggle);
            respond(result, "Button flags updated")
        }

        IpcCommand::SetElementState { id, state: elem_state } => {
            let result = state.vcontroller.write().await.set_element_state(id, elem_state);
            respond(result, "Element state updated")
        }

        IpcCommand::SetRowSize { id, row_size } => {
            let result = state.vcontroller.write().await.set_row_size(id, row_size);
            respond(result, "Row size updated")
        }

        IpcCommand::SetGroupLayout { id, layout } => {
            let result = state.vcontroller.write().await.set_group_layout(id, layout);
            respond(result, "Group layout updated")
        }

        IpcCommand::SetDPad {
            id,
            deadzone,
            diagonal_percent,
        } => {
            let mut vc = state.vcontroller.write().await;
            let result = deadzone
                .map_or(Ok(()), |d| vc.set_dpad_deadzone(id, d))
                .and_then(|_| {
                    diagonal_percent.map_or(Ok(()), |p| vc.set_dpad_diagonal_percent(id, p))
                });
            respond(result, "D-pad updated")
        }

        IpcCommand::SetShowBounds { id, show } => {
            let result = state.vcontroller.write().await.set_show_bounds(id, show);
            respond(result, "Bounds visibility updated")
        }

        IpcCommand::MoveElement { id, x, y } => {
            let result = state
                .vcontroller
                .write()
                .await
                .move_element(id, Point::new(x, y));
            respond(result, "Element moved")
        }

        IpcCommand::ResetPositions { scope } => {
            let result = state.vcontroller.write().await.reset_positions(scope);
            respond(result, "Positions reset")
        }

        IpcCommand::ResetGroups { scope } => {
            let result = state.vcontroller.write().await.reset_groups(scope);
            respond(result, "Groups reset")
        }

        IpcCommand::SetKeyEnabled { key, enabled } => {
            state.vcontroller.write().await.set_key_enabled(key, enabled);
            ok("Key availability updated")
        }

        IpcCommand::AssignableKeys { id } => {
            match state.vcontroller.read().await.assignable_categories(id) {
                Ok(categories) => to_json("categories", &categories),
                Err(e) => fail(e),
            }
        }

        IpcCommand::HitTest { x, y } => {
            let vc = state.vcontroller.read().await;
            let p = Point::new(x, y);
            let element = vc.element_at(p);
            let button = vc.button_at(p);
            let directions = element.and_then(|id| vc.dpad_directions_at(id, p).ok());
            json!({
                "success": true,
                "element": element,
                "button": button.map(|(id, index)| json!({ "id": id, "index": index })),
                "dpad": directions,
            })
        }

        IpcCommand::ListProfiles { map } => {
            to_json("profiles", &state.profiles.read().await.profiles_for_map(map))
        }

        IpcCommand::CreateProfile { map, from, name } => {
            let mut profiles = state.profiles.write().await;
            match profiles.create_profile(map, &from, &name) {
                Ok(profile) => to_json("profile", profile),
                Err(e) => fail(e),
            }
        }

        IpcCommand::RenameProfile {
            map,
            name,
            new_name,
        } => {
            let result = state
                .profiles
                .write()
                .await
                .rename_profile(map, &name, &new_name);
            respond(result, "Profile renamed")
        }

        IpcCommand::DeleteProfile { map, name } => {
            let result = state.profiles.write().await.delete_profile(map, &name);
            respond(result, "Profile deleted")
        }

        IpcCommand::ListDevices => to_json("devices", state.profiles.read().await.devices()),

        IpcCommand::RegisterDevice { device, map } => {
            let mut profiles = state.profiles.write().await;
            to_json("device", profiles.register_device(device, map))
        }

        IpcCommand::DeviceKeyInput { device, key } => {
            let profiles = state.profiles.read().await;
            match profiles.device_input_for(&device, key) {
                Ok(input) => json!({ "success": true, "key": key, "input": input }),
                Err(e) => fail(e),
            }
        }

        IpcCommand::SetDeviceProfile { device, profile } => {
            let result = state
                .profiles
                .write()
                .await
                .set_device_profile(&device, &profile);
            respond(result, "Device profile updated")
        }

        IpcCommand::SetDevicePlayer { device, player } => {
            let result = state
                .profiles
                .write()
                .await
                .set_device_player(&device, player);
            respond(result, "Device player updated")
        }

        IpcCommand::CreateDeviceProfile { device, name } => {
            let result = state
                .profiles
                .write()
                .await
                .create_profile_for_device(&device, &name);
            respond(result, "Profile created")
        }

        IpcCommand::DeleteDeviceSettings { device } => {
            let result = state
                .profiles
                .write()
                .await
                .delete_device_settings(&device);
            respond(result, "Device settings deleted")
        }
    }
}

fn respond<E: Display>(result: Result<(), E>, message: &str) -> Value {
    match result {
        Ok(()) => ok(message),
        Err(e) => {
            tracing::warn!("IPC command failed: {}", e);
            fail(e)
        }
    }
}
