//! Request envelopes and method names understood by Tapo devices.
//!
//! Every request is a JSON envelope carrying the method, its parameters, a
//! client timestamp and a terminal identifier:
//!
//! ```json
//! {"method":"get_device_info","params":{},"requestTimeMilis":1700000000000,"terminalUUID":"00-00-00-00-00-00"}
//! ```
//!
//! Hub child devices are addressed by wrapping the inner request in a
//! [`CONTROL_CHILD`] request; see [`ControlChildParams`].

use serde::{Deserialize, Serialize};

/// Get device information (model, state, firmware, ...).
pub const GET_DEVICE_INFO: &str = "get_device_info";

/// Update device settings such as the on/off state.
pub const SET_DEVICE_INFO: &str = "set_device_info";

/// List the child devices paired with a hub.
pub const GET_CHILD_DEVICE_LIST: &str = "get_child_device_list";

/// Forward a request to a hub child device.
pub const CONTROL_CHILD: &str = "control_child";

/// Start the hub's alarm.
pub const PLAY_ALARM: &str = "play_alarm";

/// Stop the hub's alarm.
pub const STOP_ALARM: &str = "stop_alarm";

/// Terminal identifier sent when none is configured.
pub const DEFAULT_TERMINAL_UUID: &str = "00-00-00-00-00-00";

/// Outer envelope of every request.
#[derive(Debug, Serialize)]
pub struct RequestEnvelope<'a, P: ?Sized> {
    /// Method name.
    pub method: &'a str,
    /// Method parameters.
    pub params: &'a P,
    /// Client wall-clock time in milliseconds since the Unix epoch.
    #[serde(rename = "requestTimeMilis")]
    pub request_time_millis: i64,
    /// Identifier of the calling terminal.
    #[serde(rename = "terminalUUID")]
    pub terminal_uuid: &'a str,
}

/// Parameters of a [`CONTROL_CHILD`] request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlChildParams<P> {
    /// Child device ID, as listed by [`GET_CHILD_DEVICE_LIST`].
    pub device_id: String,
    /// The request to forward to the child.
    #[serde(rename = "requestData")]
    pub request_data: ChildRequest<P>,
}

impl<P> ControlChildParams<P> {
    /// Wraps `method` and `params` for the child `device_id`.
    pub fn new(device_id: impl Into<String>, method: impl Into<String>, params: P) -> Self {
        Self {
            device_id: device_id.into(),
            request_data: ChildRequest {
                method: method.into(),
                params,
            },
        }
    }
}

/// Inner request forwarded to a child device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildRequest<P> {
    /// Method name.
    pub method: String,
    /// Method parameters.
    pub params: P,
}

/// Parameters for switching a plug or switch on or off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceOnParams {
    /// Desired on/off state.
    pub device_on: bool,
}

/// Parameters of a [`PLAY_ALARM`] request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayAlarmParams {
    /// Alarm duration in seconds.
    #[serde(rename = "alarm_duration")]
    pub duration: u32,
    /// Alarm volume.
    #[serde(rename = "alarm_volume")]
    pub volume: AlarmVolume,
    /// Ringtone name.
    #[serde(rename = "alarm_type")]
    pub alarm_type: String,
}

/// Alarm volume levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmVolume {
    /// Low volume.
    Low,
    /// Medium volume (`"normal"` on the wire).
    #[serde(rename = "normal")]
    Medium,
    /// High volume.
    High,
}
