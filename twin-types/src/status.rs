//! Device status and connection state.

use std::fmt;
use std::str::FromStr;

use crate::TwinError;

/// Whether the device is authorized to connect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DeviceStatus {
    /// No status set. Never written to the wire.
    #[default]
    Unspecified,
    /// Device may connect.
    Enabled,
    /// Device is suspended.
    Disabled,
}

impl DeviceStatus {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Unspecified => "unspecified",
            DeviceStatus::Enabled => "enabled",
            DeviceStatus::Disabled => "disabled",
        }
    }

    /// Whether a status is set.
    pub fn is_specified(&self) -> bool {
        !matches!(self, DeviceStatus::Unspecified)
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceStatus {
    type Err = TwinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unspecified" => Ok(DeviceStatus::Unspecified),
            "enabled" => Ok(DeviceStatus::Enabled),
            "disabled" => Ok(DeviceStatus::Disabled),
            other => Err(TwinError::MalformedDocument(format!(
                "unknown status {other:?}"
            ))),
        }
    }
}

/// Last known connection state of the device, as reported by the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Not reported.
    #[default]
    Unspecified,
    /// Device is connected.
    Connected,
    /// Device is disconnected.
    Disconnected,
}

impl ConnectionState {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Unspecified => "unspecified",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
        }
    }

    /// Whether a state is set.
    pub fn is_specified(&self) -> bool {
        !matches!(self, ConnectionState::Unspecified)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionState {
    type Err = TwinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unspecified" => Ok(ConnectionState::Unspecified),
            "connected" => Ok(ConnectionState::Connected),
            "disconnected" => Ok(ConnectionState::Disconnected),
            other => Err(TwinError::MalformedDocument(format!(
                "unknown connection state {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_parse_back() {
        for status in [
            DeviceStatus::Unspecified,
            DeviceStatus::Enabled,
            DeviceStatus::Disabled,
        ] {
            assert_eq!(status.to_string().parse::<DeviceStatus>(), Ok(status));
        }
        for state in [
            ConnectionState::Unspecified,
            ConnectionState::Connected,
            ConnectionState::Disconnected,
        ] {
            assert_eq!(state.as_str().parse::<ConnectionState>(), Ok(state));
        }
        assert_eq!(DeviceStatus::Disabled.to_string(), "disabled");
    }

    #[test]
    fn unknown_status_is_malformed() {
        assert!(matches!(
            "Enabled".parse::<DeviceStatus>(),
            Err(TwinError::MalformedDocument(_))
        ));
        assert!(matches!(
            "online".parse::<ConnectionState>(),
            Err(TwinError::MalformedDocument(_))
        ));
    }

    #[test]
    fn defaults_are_unspecified() {
        assert!(!DeviceStatus::default().is_specified());
        assert!(!ConnectionState::default().is_specified());
        assert!(ConnectionState::Connected.is_specified());
        assert_eq!(ConnectionState::Disconnected.to_string(), "disconnected");
    }
}
