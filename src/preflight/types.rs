//! Preflight check types and report.

/// Result of a single preflight check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    /// The build will fail.
    Fail,
    /// The build may still work.
    Warn,
}

impl CheckResult {
    pub fn pass(name: &str) -> Self {
        Self::new(name, CheckStatus::Pass, None)
    }

    pub fn pass_with(name: &str, details: &str) -> Self {
        Self::new(name, CheckStatus::Pass, Some(details))
    }

    pub fn fail(name: &str, details: &str) -> Self {
        Self::new(name, CheckStatus::Fail, Some(details))
    }

    pub fn warn(name: &str, details: &str) -> Self {
        Self::new(name, CheckStatus::Warn, Some(details))
    }

    fn new(name: &str, status: CheckStatus, details: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            status,
            details: details.map(String::from),
        }
    }
}

/// Results of all preflight checks.
#[derive(Debug, Default)]
pub struct PreflightReport {
    pub checks: Vec<CheckResult>,
}

impl PreflightReport {
    fn count(&self, status: CheckStatus) -> usize {
        self.checks.iter().filter(|c| c.status == status).count()
    }

    pub fn fail_count(&self) -> usize {
        self.count(CheckStatus::Fail)
    }

    pub fn warn_count(&self) -> usize {
        self.count(CheckStatus::Warn)
    }

    /// Returns true if no check failed. Warnings do not count.
    pub fn all_passed(&self) -> bool {
        self.fail_count() == 0
    }

    /// Print the report to stdout.
    pub fn print(&self) {
        println!("=== Preflight Check Results ===\n");

        for check in &self.checks {
            let (icon, label) = match check.status {
                CheckStatus::Pass => ("✓", "PASS"),
                CheckStatus::Fail => ("✗", "FAIL"),
                CheckStatus::Warn => ("⚠", "WARN"),
            };
            match &check.details {
                Some(details) => println!("  {} [{}] {}: {}", icon, label, check.name, details),
                None => println!("  {} [{}] {}", icon, label, check.name),
            }
        }

        println!();
        println!(
            "Summary: {}/{} passed",
            self.count(CheckStatus::Pass),
            self.checks.len()
        );
        if self.fail_count() > 0 {
            println!("         {} FAILED - build will not succeed", self.fail_count());
        }
        if self.warn_count() > 0 {
            println!("         {} warnings", self.warn_count());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warnings_do_not_fail_report() {
        let report = PreflightReport {
            checks: vec![
                CheckResult::pass("make"),
                CheckResult::warn("/usr/share/pacman", "not found"),
            ],
        };
        assert!(report.all_passed());
        assert_eq!(report.warn_count(), 1);

        let failed = PreflightReport {
            checks: vec![CheckResult::fail("bsdtar", "Not found")],
        };
        assert!(!failed.all_passed());
        assert_eq!(failed.fail_count(), 1);
    }
}
