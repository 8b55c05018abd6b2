//! Staged refresh
//!
//! Drives every module through the two-phase lifecycle. Phase 1 defines all
//! modules; phase 2 activates them in registration order. A module that an
//! earlier lookup already bare-activated only gets its refresh-completed pass.
//! One module failing never stops the others, but every module that resolved
//! a name from a failed module fails with it.

use tracing::{debug, error, info};

use crate::module::manager::ComponentManager;
use crate::module::traits::ComponentError;
use crate::utils::log_error;

/// Outcome of a refresh pass
#[derive(Debug, Clone, Default)]
pub struct RefreshReport {
    /// Modules that completed refresh
    pub refreshed: Vec<String>,
    /// Modules left failed, with the reason
    pub failed: Vec<(String, String)>,
}

impl RefreshReport {
    /// True when no module failed
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Refresh orchestrator
pub struct StagedRefresh<'a> {
    manager: &'a ComponentManager,
}

impl<'a> StagedRefresh<'a> {
    pub fn new(manager: &'a ComponentManager) -> Self {
        Self { manager }
    }

    /// Run both phases over every registered module
    pub fn run(&self) -> Result<RefreshReport, ComponentError> {
        if self.manager.has_been_closed() {
            return Err(ComponentError::Closed);
        }

        let resolver = self.manager.resolver();
        let records = self.manager.modules();
        let mut report = RefreshReport::default();
        info!("Refreshing {} modules", records.len());

        let core = self.manager.core_context();
        if let Err(e) = core.instantiate(resolver) {
            error!("Platform services failed to refresh: {}", e);
            report.failed.push((core.name().to_string(), e.to_string()));
        }

        for record in &records {
            log_error(
                || record.context().define(),
                &format!("Failed to define module {}", record.name()),
            );
        }

        for record in &records {
            let context = record.context();
            if context.state().is_failed() {
                report
                    .failed
                    .push((record.name().to_string(), context.state().to_string()));
                continue;
            }

            let result = if context.is_active() {
                debug!("Module {} already active, completing refresh", record.name());
                context.complete_refresh(resolver)
            } else {
                context.instantiate(resolver)
            };

            match result {
                Ok(()) => report.refreshed.push(record.name().to_string()),
                Err(e) => {
                    error!("Failed to refresh module {}: {}", record.name(), e);
                    report.failed.push((record.name().to_string(), e.to_string()));
                }
            }
        }

        for (module, reason) in self.manager.fail_consumers() {
            report.refreshed.retain(|m| m != &module);
            report.failed.push((module, reason));
        }

        info!(
            "Refresh complete: {} refreshed, {} failed",
            report.refreshed.len(),
            report.failed.len()
        );
        Ok(report)
    }
}
