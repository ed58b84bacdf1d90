use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tapo_core::{DEFAULT_PORT, request};

pub fn parse_duration(arg: &str) -> Result<Duration, std::num::ParseIntError> {
    let seconds = arg.parse()?;
    Ok(Duration::from_secs(seconds))
}

/// TP-Link Tapo KLAP protocol client
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// TP-Link cloud account username (email).
    /// Can also be set via TAPO_USERNAME environment variable.
    #[arg(short, long, global = true, env = "TAPO_USERNAME")]
    pub username: Option<String>,

    /// Read password from stdin.
    /// Useful for scripting:
    /// echo "password" | tapo -u me@example.com --password-stdin 192.168.1.100 info
    #[arg(long, global = true)]
    pub password_stdin: bool,

    /// Account password, taken from the environment only.
    #[arg(long, env = "TAPO_PASSWORD", hide = true, hide_env_values = true)]
    pub password: Option<String>,

    /// Target hostname or IP address
    pub target: String,

    /// Target port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Timeout in seconds for each network operation
    #[arg(long, value_parser = parse_duration, default_value = "10")]
    pub timeout: Duration,

    /// Hub child device ID. The command is forwarded to this child.
    /// Use the 'children' command to list the IDs paired with a hub.
    #[arg(long)]
    pub child: Option<String>,

    #[command(subcommand)]
    pub command: DeviceCommand,
}

/// Commands available for a device
#[derive(Subcommand)]
pub enum DeviceCommand {
    /// Get device info
    Info,
    /// Turn the device on
    On,
    /// Turn the device off
    Off,
    /// List child devices paired with a hub
    Children,
    /// Send a raw request
    Raw {
        /// Method name, e.g. get_device_info
        method: String,
        /// Method parameters as a JSON object
        params: Option<String>,
    },
}

impl DeviceCommand {
    /// Returns the method name and parameters to send.
    pub fn to_request(&self) -> Result<(&str, Value), String> {
        let request = match self {
            DeviceCommand::Info => (request::GET_DEVICE_INFO, json!({})),
            DeviceCommand::On => (request::SET_DEVICE_INFO, json!({"device_on": true})),
            DeviceCommand::Off => (request::SET_DEVICE_INFO, json!({"device_on": false})),
            DeviceCommand::Children => (request::GET_CHILD_DEVICE_LIST, json!({})),
            DeviceCommand::Raw { method, params } => {
                let params = match params {
                    Some(params) => serde_json::from_str(params)
                        .map_err(|e| format!("Invalid params JSON: {}", e))?,
                    None => json!({}),
                };
                (method.as_str(), params)
            }
        };
        Ok(request)
    }
}
