use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::error::LookupError;

/// Geographical location of an IP address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub country: String,
    pub city: String,
}

impl Location {
    pub fn new(country: impl Into<String>, city: impl Into<String>) -> Self {
        Self {
            country: country.into(),
            city: city.into(),
        }
    }

    /// Both fields must hold something other than whitespace.
    pub fn validate(&self) -> Result<(), LookupError> {
        if self.country.trim().is_empty() {
            return Err(LookupError::InvalidLocation("country cannot be empty".to_string()));
        }
        if self.city.trim().is_empty() {
            return Err(LookupError::InvalidLocation("city cannot be empty".to_string()));
        }
        Ok(())
    }
}

/// Address checks for the lookup path
pub struct IpValidator;

impl IpValidator {
    /// Parse an IPv4 or IPv6 address. The parsed form is canonical, so
    /// `2001:DB8::1` and `2001:db8:0:0:0:0:0:1` become the same key.
    pub fn validate_ip(ip: &str) -> Result<IpAddr, LookupError> {
        if ip.is_empty() {
            return Err(LookupError::InvalidIp("address cannot be empty".to_string()));
        }

        ip.parse::<IpAddr>()
            .map_err(|_| LookupError::InvalidIp(format!("unrecognised format '{}'", ip)))
    }
}
