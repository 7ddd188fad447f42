//! Request dispatch.
//!
//! Turns a route, method and optional JSON body into a motor driver call
//! and renders the JSON envelope:
//!
//! ```json
//! {"status": "success", "action": "moving forward"}
//! {"status": "error", "message": "Speed must be between 0 and 100"}
//! ```
//!
//! Kept free of any HTTP types so it can be driven directly in tests.

use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard},
};

use serde::Serialize;
use serde_json::Value;

use crate::utils::controllers::{Car, CarCommand, CarError, SpeedError, SpeedTarget};

pub const OK: u16 = 200;
pub const BAD_REQUEST: u16 = 400;
pub const METHOD_NOT_ALLOWED: u16 = 405;
pub const PAYLOAD_TOO_LARGE: u16 = 413;
pub const INTERNAL_SERVER_ERROR: u16 = 500;
pub const SERVICE_UNAVAILABLE: u16 = 503;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Every endpoint served by the car.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Index,
    Api,
    Forward,
    Backward,
    RotateClockwise,
    RotateAnticlockwise,
    Stop,
    SpeedSet,
    SpeedGet,
    SpeedLeft,
    SpeedRight,
}

impl Route {
    pub const ALL: [Route; 11] = [
        Route::Index,
        Route::Api,
        Route::Forward,
        Route::Backward,
        Route::RotateClockwise,
        Route::RotateAnticlockwise,
        Route::Stop,
        Route::SpeedSet,
        Route::SpeedGet,
        Route::SpeedLeft,
        Route::SpeedRight,
    ];

    pub fn path(self) -> &'static str {
        match self {
            Route::Index => "/",
            Route::Api => "/api",
            Route::Forward => "/forward",
            Route::Backward => "/backward",
            Route::RotateClockwise => "/rotate/clockwise",
            Route::RotateAnticlockwise => "/rotate/anticlockwise",
            Route::Stop => "/stop",
            Route::SpeedSet => "/speed/set",
            Route::SpeedGet => "/speed/get",
            Route::SpeedLeft => "/speed/left",
            Route::SpeedRight => "/speed/right",
        }
    }

    #[cfg(test)]
    fn from_path(path: &str) -> Option<Route> {
        Route::ALL.into_iter().find(|route| route.path() == path)
    }

    /// Text listed under `endpoints` in the API info payload.
    fn summary(self) -> Option<&'static str> {
        match self {
            Route::Index | Route::Api => None,
            Route::Forward => Some("Move forward (optional JSON: {\"speed\": 0-100})"),
            Route::Backward => Some("Move backward (optional JSON: {\"speed\": 0-100})"),
            Route::RotateClockwise => Some("Rotate clockwise at center"),
            Route::RotateAnticlockwise => Some("Rotate anticlockwise at center"),
            Route::Stop => Some("Stop all motors"),
            Route::SpeedSet => Some("Set speed (POST with JSON: {\"speed\": 0-100})"),
            Route::SpeedGet => Some("Get current speed"),
            Route::SpeedLeft => Some("Set left motor speed (POST with JSON: {\"speed\": 0-100})"),
            Route::SpeedRight => {
                Some("Set right motor speed (POST with JSON: {\"speed\": 0-100})")
            }
        }
    }

    pub fn allows(
        self,
        method: Method,
    ) -> bool {
        !(self == Route::SpeedGet && method == Method::Post)
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum Envelope<'a> {
    Success { action: &'a str },
    Error { message: &'a str },
}

#[derive(Debug, Serialize)]
struct ApiInfo {
    message: &'static str,
    current_speed: u8,
    endpoints: BTreeMap<&'static str, &'static str>,
}

impl ApiInfo {
    fn new(current_speed: u8) -> Self {
        ApiInfo {
            message: "Raspberry Pi Car Control API with L298N Motor Driver",
            current_speed,
            endpoints: Route::ALL
                .into_iter()
                .filter_map(|route| Some((route.path(), route.summary()?)))
                .collect(),
        }
    }
}

/// Status code plus encoded JSON body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub body: String,
}

impl Reply {
    fn json<T: Serialize>(
        status: u16,
        value: &T,
    ) -> Reply {
        match serde_json::to_string(value) {
            Ok(body) => Reply { status, body },
            Err(error) => {
                tracing::error!(%error, "failed to encode response");
                Reply {
                    status: INTERNAL_SERVER_ERROR,
                    body: r#"{"status":"error","message":"failed to encode response"}"#.into(),
                }
            }
        }
    }

    pub fn success(action: &str) -> Reply {
        Reply::json(OK, &Envelope::Success { action })
    }

    pub fn error(
        status: u16,
        message: &str,
    ) -> Reply {
        Reply::json(status, &Envelope::Error { message })
    }

    #[cfg(test)]
    pub(crate) fn to_value(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }
}

impl From<&CarError> for Reply {
    fn from(error: &CarError) -> Self {
        Reply::error(status_for(error), &error.to_string())
    }
}

pub fn status_for(error: &CarError) -> u16 {
    match error {
        CarError::InvalidSpeed(_) | CarError::InvalidDirection(_) => BAD_REQUEST,
        CarError::HardwareUnavailable(_) => SERVICE_UNAVAILABLE,
        CarError::Hardware { .. } => INTERNAL_SERVER_ERROR,
    }
}

/// Pull `speed` out of an optional JSON body.
///
/// An empty body or a missing/null field is `Ok(None)`. Integers and
/// integer strings are accepted; the range is checked by the driver.
pub fn parse_speed(body: &[u8]) -> Result<Option<i64>, SpeedError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let value: Value = serde_json::from_slice(body).map_err(|_| SpeedError::MalformedBody)?;
    let Value::Object(fields) = value else {
        return Err(SpeedError::MalformedBody);
    };
    match fields.get("speed") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match (n.as_i64(), n.as_u64()) {
            (Some(speed), _) => Ok(Some(speed)),
            (None, Some(_)) => Err(SpeedError::OutOfRange(i64::MAX)),
            (None, None) => Err(SpeedError::NotAnInteger),
        },
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| SpeedError::NotAnInteger),
        Some(_) => Err(SpeedError::NotAnInteger),
    }
}

/// Build the motion command for `route`; `None` for read-only routes.
fn command_for(
    route: Route,
    body: &[u8],
) -> Result<Option<CarCommand>, SpeedError> {
    let required = || -> Result<i64, SpeedError> { parse_speed(body)?.ok_or(SpeedError::Missing) };
    let command = match route {
        Route::Index | Route::Api | Route::SpeedGet => return Ok(None),
        Route::Forward => CarCommand::Forward {
            speed: parse_speed(body)?,
        },
        Route::Backward => CarCommand::Backward {
            speed: parse_speed(body)?,
        },
        Route::RotateClockwise => CarCommand::RotateClockwise,
        Route::RotateAnticlockwise => CarCommand::RotateAnticlockwise,
        Route::Stop => CarCommand::Stop,
        Route::SpeedSet => CarCommand::SetSpeed {
            target: SpeedTarget::Both,
            speed: required()?,
        },
        Route::SpeedLeft => CarCommand::SetSpeed {
            target: SpeedTarget::Left,
            speed: required()?,
        },
        Route::SpeedRight => CarCommand::SetSpeed {
            target: SpeedTarget::Right,
            speed: required()?,
        },
    };
    Ok(Some(command))
}

fn lock(car: &Mutex<Car>) -> MutexGuard<'_, Car> {
    car.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("car lock poisoned, continuing with last state");
        poisoned.into_inner()
    })
}

/// Handle one request against the shared car.
pub fn dispatch(
    car: &Mutex<Car>,
    method: Method,
    route: Route,
    body: &[u8],
) -> Reply {
    tracing::info!(?method, path = route.path(), "request");
    if !route.allows(method) {
        tracing::warn!(?method, path = route.path(), "method not allowed");
        return Reply::error(METHOD_NOT_ALLOWED, "Method not allowed");
    }

    let command = match command_for(route, body) {
        Ok(Some(command)) => command,
        Ok(None) => {
            let car = lock(car);
            return match route {
                Route::SpeedGet => Reply::json(OK, &car.get_speed()),
                _ => Reply::json(OK, &ApiInfo::new(car.state().default_speed.get())),
            };
        }
        Err(error) => {
            tracing::warn!(%error, path = route.path(), "rejected speed");
            return Reply::from(&CarError::InvalidSpeed(error));
        }
    };

    match lock(car).execute_command(command) {
        Ok(()) => Reply::success(&command.to_string()),
        Err(error) => {
            tracing::error!(%error, ?command, "command failed");
            Reply::from(&error)
        }
    }
}
