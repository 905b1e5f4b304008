use crate::utils::error::{Result, SlotError};
use std::net::SocketAddr;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_socket_addr(field_name: &str, addr: &str) -> Result<SocketAddr> {
    if addr.trim().is_empty() {
        return Err(SlotError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: addr.to_string(),
            reason: "Address cannot be empty".to_string(),
        });
    }

    addr.parse::<SocketAddr>()
        .map_err(|e| SlotError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: addr.to_string(),
            reason: format!("Invalid socket address: {}", e),
        })
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(SlotError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(SlotError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_required_field<'a, T>(field_name: &str, value: &'a Option<T>) -> Result<&'a T> {
    value.as_ref().ok_or_else(|| SlotError::MissingConfigError {
        field: field_name.to_string(),
    })
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SlotError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(SlotError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

pub fn validate_log_level(field_name: &str, level: &str) -> Result<()> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&level) {
        return Err(SlotError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: level.to_string(),
            reason: format!("Unknown log level. Valid levels: {}", valid_levels.join(", ")),
        });
    }
    Ok(())
}
