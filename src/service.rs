use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;

use crate::error::LookupError;
use crate::models::{IpValidator, Location};
use crate::repository::IpRepository;

/// Validates lookup input and resolves addresses against a repository.
#[derive(Clone)]
pub struct IpService {
    repository: Arc<dyn IpRepository>,
}

impl IpService {
    pub fn new(repository: Arc<dyn IpRepository>) -> Self {
        Self { repository }
    }

    /// Resolve `ip` to a location. Fails with `InvalidIp` before touching the
    /// repository when the address does not parse.
    pub fn find_location(&self, ip: &str) -> Result<Location, LookupError> {
        let addr = IpValidator::validate_ip(ip)?;
        debug!(
            ip,
            normalized = %addr,
            family = address_family(&addr),
            "Looking up location"
        );
        let location = self.repository.find_location(addr)?;
        location.validate()?;
        Ok(location)
    }

    pub fn health_check(&self) -> Result<(), LookupError> {
        self.repository.health_check()
    }

    pub fn close(&self) {
        self.repository.close();
    }
}

fn address_family(addr: &IpAddr) -> &'static str {
    match addr {
        IpAddr::V4(_) => "ipv4",
        IpAddr::V6(_) => "ipv6",
    }
}
