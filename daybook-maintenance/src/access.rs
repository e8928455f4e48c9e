//! Access gate for the maintenance endpoints.
//!
//! Both batch engines mutate key trust across the whole store, so they are
//! restricted to admin callers in non-production environments. The gate
//! runs before any row access.

use crate::error::{MaintenanceError, MaintenanceResult};
use serde::{Deserialize, Serialize};

/// Runtime environment the process was deployed into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Testing,
    Staging,
    Production,
}

impl Environment {
    /// Maintenance operations are only permitted here.
    pub fn allows_maintenance(&self) -> bool {
        matches!(self, Environment::Development | Environment::Testing)
    }
}

/// Role of the caller invoking a maintenance operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessRole {
    Admin,
    Member,
}

/// Who is calling, and where the process is running.
#[derive(Clone, Copy, Debug)]
pub struct MaintenanceContext {
    pub environment: Environment,
    pub role: AccessRole,
}

impl MaintenanceContext {
    pub fn new(environment: Environment, role: AccessRole) -> Self {
        Self { environment, role }
    }

    /// Rejects anything other than an admin in development or testing.
    pub fn authorize(&self) -> MaintenanceResult<()> {
        if self.role != AccessRole::Admin || !self.environment.allows_maintenance() {
            return Err(MaintenanceError::Unauthorized);
        }
        Ok(())
    }
}
