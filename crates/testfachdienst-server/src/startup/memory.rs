//! Container-aware memory budget
//!
//! The process budgets a percentage of the memory limit it runs under. The
//! limit comes from cgroup v2 (`memory.max`), then cgroup v1
//! (`memory.limit_in_bytes`), then the total memory of the host.
//!
//! The budget is enforced by a capped global allocator: an allocation past
//! the budget fails and the process aborts.

use std::path::Path;

use cap::Cap;
use sysinfo::System;

/// Global allocator type whose limit is set from the budget at startup
pub type BudgetAllocator = Cap<std::alloc::System>;

const CGROUP_V2_MAX: &str = "/sys/fs/cgroup/memory.max";
const CGROUP_V1_LIMIT: &str = "/sys/fs/cgroup/memory/memory.limit_in_bytes";

/// cgroup v1 reports "unlimited" as a huge page-aligned number
const CGROUP_V1_UNLIMITED_THRESHOLD: u64 = 1 << 60;

/// Where the memory limit was read from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryLimitSource {
    CgroupV2,
    CgroupV1,
    Host,
}

/// Memory limit and the share of it the process may use
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MemoryBudget {
    pub limit_bytes: u64,
    pub max_ram_percentage: f64,
    pub source: MemoryLimitSource,
}

impl MemoryBudget {
    pub fn new(limit_bytes: u64, max_ram_percentage: f64, source: MemoryLimitSource) -> Self {
        Self {
            limit_bytes,
            max_ram_percentage,
            source,
        }
    }

    /// Detect the effective limit of the running process
    pub fn detect(max_ram_percentage: f64) -> Self {
        if let Some(limit) = read_limit(Path::new(CGROUP_V2_MAX)) {
            return Self::new(limit, max_ram_percentage, MemoryLimitSource::CgroupV2);
        }
        if let Some(limit) = read_limit(Path::new(CGROUP_V1_LIMIT)) {
            return Self::new(limit, max_ram_percentage, MemoryLimitSource::CgroupV1);
        }

        let mut system = System::new();
        system.refresh_memory();
        Self::new(
            system.total_memory(),
            max_ram_percentage,
            MemoryLimitSource::Host,
        )
    }

    /// Bytes the process may use
    pub fn budget_bytes(&self) -> u64 {
        (self.limit_bytes as f64 * self.max_ram_percentage / 100.0) as u64
    }

    /// Cap `allocator` at the budget; fails if more is already allocated
    pub fn enforce(&self, allocator: &BudgetAllocator) -> anyhow::Result<()> {
        let budget = usize::try_from(self.budget_bytes()).unwrap_or(usize::MAX);
        allocator.set_limit(budget).map_err(|_| {
            anyhow::anyhow!(
                "Memory budget of {} bytes is below the {} bytes already allocated",
                budget,
                allocator.allocated()
            )
        })?;
        tracing::debug!(limit = budget, "Allocator capped at memory budget");
        Ok(())
    }

    pub fn log_summary(&self) {
        tracing::info!(
            source = ?self.source,
            limit_mib = self.limit_bytes / (1024 * 1024),
            budget_mib = self.budget_bytes() / (1024 * 1024),
            "Memory budget is {}% of the effective limit",
            self.max_ram_percentage
        );
    }
}

fn read_limit(path: &Path) -> Option<u64> {
    parse_limit(&std::fs::read_to_string(path).ok()?)
}

/// Parse a cgroup limit file; "max" and absurdly high values mean unlimited
fn parse_limit(content: &str) -> Option<u64> {
    let value = content.trim();
    if value.is_empty() || value == "max" {
        return None;
    }
    value
        .parse::<u64>()
        .ok()
        .filter(|v| *v > 0 && *v < CGROUP_V1_UNLIMITED_THRESHOLD)
}
