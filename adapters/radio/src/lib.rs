#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Text wire format understood by the robots' radio receivers.
//!
//! A command is a single line `id,lateral,forward,angular,duration_ms`.
//! Every motion channel is an integer in `-255..=255` and the id `-1`
//! addresses every robot at once.

use std::{fmt, num::ParseIntError, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};
use ssl_strategy_core::{RobotId, Speeds};
use thiserror::Error;

/// Largest magnitude a motion channel may carry.
pub const CHANNEL_LIMIT: i32 = 255;

/// Recipient id that addresses every robot.
pub const BROADCAST_ID: i64 = -1;

/// Robots addressed by a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recipient {
    /// A single robot.
    Robot(RobotId),
    /// Every robot listening on the channel.
    Broadcast,
}

impl Recipient {
    fn wire_id(self) -> i64 {
        match self {
            Self::Robot(robot) => i64::from(robot.get()),
            Self::Broadcast => BROADCAST_ID,
        }
    }
}

/// Physical speeds that map onto a full-scale channel value.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WireScale {
    /// Translational speed, in millimetres per second, sent as 255.
    pub linear_full_scale: f32,
    /// Rotational speed, in radians per second, sent as 255.
    pub angular_full_scale: f32,
}

impl Default for WireScale {
    fn default() -> Self {
        Self {
            linear_full_scale: 1_500.0,
            angular_full_scale: 4.0,
        }
    }
}

/// One motion command as carried over the radio.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WireCommand {
    recipient: Recipient,
    lateral: i32,
    forward: i32,
    angular: i32,
    duration_ms: u32,
}

impl WireCommand {
    /// Builds a command, clamping each channel into range.
    #[must_use]
    pub fn new(
        recipient: Recipient,
        forward: i32,
        lateral: i32,
        angular: i32,
        duration: Duration,
    ) -> Self {
        Self {
            recipient,
            lateral: clamp_channel(lateral),
            forward: clamp_channel(forward),
            angular: clamp_channel(angular),
            duration_ms: u32::try_from(duration.as_millis()).unwrap_or(u32::MAX),
        }
    }

    /// Converts derived speeds into channel values.
    ///
    /// Fractions are truncated toward zero before clamping.
    #[must_use]
    pub fn from_speeds(
        recipient: Recipient,
        speeds: Speeds,
        scale: &WireScale,
        duration: Duration,
    ) -> Self {
        let channel = |value: f32, full_scale: f32| {
            if full_scale <= 0.0 {
                return 0;
            }
            (value / full_scale * CHANNEL_LIMIT as f32) as i32
        };
        Self::new(
            recipient,
            channel(speeds.forward, scale.linear_full_scale),
            channel(speeds.lateral, scale.linear_full_scale),
            channel(speeds.angular, scale.angular_full_scale),
            duration,
        )
    }

    /// Converts channel values back into physical speeds.
    #[must_use]
    pub fn to_speeds(&self, scale: &WireScale) -> Speeds {
        let speed = |value: i32, full_scale: f32| value as f32 / CHANNEL_LIMIT as f32 * full_scale;
        Speeds::new(
            speed(self.forward, scale.linear_full_scale),
            speed(self.lateral, scale.linear_full_scale),
            speed(self.angular, scale.angular_full_scale),
        )
    }

    /// Robots the command addresses.
    #[must_use]
    pub const fn recipient(&self) -> Recipient {
        self.recipient
    }

    /// Forward channel value.
    #[must_use]
    pub const fn forward(&self) -> i32 {
        self.forward
    }

    /// Lateral channel value.
    #[must_use]
    pub const fn lateral(&self) -> i32 {
        self.lateral
    }

    /// Angular channel value.
    #[must_use]
    pub const fn angular(&self) -> i32 {
        self.angular
    }

    /// How long the robot should apply the command.
    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::from_millis(u64::from(self.duration_ms))
    }

    /// Renders the command as a wire line without a terminator.
    #[must_use]
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for WireCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{}",
            self.recipient.wire_id(),
            self.lateral,
            self.forward,
            self.angular,
            self.duration_ms
        )
    }
}

/// Reasons a wire line cannot be decoded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    /// The line did not have exactly five comma-separated fields.
    #[error("expected 5 fields, found {found}")]
    FieldCount {
        /// Number of fields present.
        found: usize,
    },
    /// A field was not an integer.
    #[error("field `{field}` is not an integer")]
    InvalidNumber {
        /// Name of the offending field.
        field: &'static str,
        /// Underlying parse failure.
        #[source]
        source: ParseIntError,
    },
    /// A motion channel exceeded the allowed magnitude.
    #[error("field `{field}` value {value} exceeds ±255")]
    OutOfRange {
        /// Name of the offending field.
        field: &'static str,
        /// Value found on the wire.
        value: i64,
    },
    /// The recipient id was negative but not the broadcast id.
    #[error("invalid recipient id {0}")]
    InvalidRecipient(i64),
}

impl FromStr for WireCommand {
    type Err = WireError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = line.trim().split(',').map(str::trim).collect();
        let [id, lateral, forward, angular, duration] = fields.as_slice() else {
            return Err(WireError::FieldCount {
                found: fields.len(),
            });
        };

        let id = parse_field("id", id)?;
        let recipient = match id {
            BROADCAST_ID => Recipient::Broadcast,
            _ => u32::try_from(id)
                .map(|id| Recipient::Robot(RobotId::new(id)))
                .map_err(|_| WireError::InvalidRecipient(id))?,
        };

        let duration = parse_field("duration_ms", duration)?;
        let duration_ms = u32::try_from(duration).map_err(|_| WireError::OutOfRange {
            field: "duration_ms",
            value: duration,
        })?;

        Ok(Self {
            recipient,
            lateral: parse_channel("lateral", lateral)?,
            forward: parse_channel("forward", forward)?,
            angular: parse_channel("angular", angular)?,
            duration_ms,
        })
    }
}

/// Parses a wire line.
pub fn decode(line: &str) -> Result<WireCommand, WireError> {
    line.parse()
}

fn parse_field(field: &'static str, text: &str) -> Result<i64, WireError> {
    text.parse()
        .map_err(|source| WireError::InvalidNumber { field, source })
}

fn parse_channel(field: &'static str, text: &str) -> Result<i32, WireError> {
    let value = parse_field(field, text)?;
    if value.abs() > i64::from(CHANNEL_LIMIT) {
        return Err(WireError::OutOfRange { field, value });
    }
    i32::try_from(value).map_err(|_| WireError::OutOfRange { field, value })
}

fn clamp_channel(value: i32) -> i32 {
    value.clamp(-CHANNEL_LIMIT, CHANNEL_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_command_uses_lateral_forward_order() {
        let command =
            WireCommand::new(Recipient::Broadcast, 30, -20, 5, Duration::from_millis(500));

        assert_eq!(command.encode(), "-1,-20,30,5,500");
    }

    #[test]
    fn channels_are_clamped() {
        let command = WireCommand::new(
            Recipient::Robot(RobotId::new(3)),
            1_000,
            -300,
            255,
            Duration::from_secs(1),
        );

        assert_eq!(command.encode(), "3,-255,255,255,1000");
    }

    #[test]
    fn speeds_scale_to_channels_and_saturate() {
        let scale = WireScale::default();
        let command = WireCommand::from_speeds(
            Recipient::Robot(RobotId::new(0)),
            Speeds::new(750.0, -3_000.0, 2.0),
            &scale,
            Duration::from_millis(100),
        );

        assert_eq!(command.forward(), 127);
        assert_eq!(command.lateral(), -255);
        assert_eq!(command.angular(), 127);

        let speeds = command.to_speeds(&scale);
        assert!((speeds.lateral + 1_500.0).abs() < 1e-3);
    }

    #[test]
    fn decode_reads_encoded_line() {
        let command = decode("7,10,-20,0,250").expect("valid line");

        assert_eq!(command.recipient(), Recipient::Robot(RobotId::new(7)));
        assert_eq!(command.lateral(), 10);
        assert_eq!(command.forward(), -20);
        assert_eq!(command.duration(), Duration::from_millis(250));
        assert_eq!(
            decode(" -1, 0, 0, 0, 0\n").map(|command| command.recipient()),
            Ok(Recipient::Broadcast)
        );
    }

    #[test]
    fn decode_rejects_malformed_lines() {
        assert_eq!(decode("1,2,3"), Err(WireError::FieldCount { found: 3 }));
        assert!(matches!(
            decode("1,2,x,4,5"),
            Err(WireError::InvalidNumber { field: "forward", .. })
        ));
        assert_eq!(
            decode("1,256,0,0,5"),
            Err(WireError::OutOfRange {
                field: "lateral",
                value: 256
            })
        );
        assert_eq!(decode("-2,0,0,0,5"), Err(WireError::InvalidRecipient(-2)));
    }
}
