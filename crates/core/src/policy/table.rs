//! Static backoff policy table
//!
//! Immutable mapping from failure error code to its backoff policy. Unknown
//! codes are a normal, expected case and simply resolve to no policy.

use redrive_domain::constants::{ERROR_FREQCAP, ERROR_QUOTA, ERROR_TEMPLATE_INACTIVE};
use redrive_domain::RetryPolicy;

/// Immutable policy table
#[derive(Debug, Clone)]
pub struct PolicyTable {
    policies: Vec<RetryPolicy>,
}

impl PolicyTable {
    /// Table with the built-in policies
    pub fn builtin() -> Self {
        Self {
            policies: vec![
                RetryPolicy {
                    error_code: ERROR_FREQCAP.to_string(),
                    description: "Recipient frequency cap hit; back off exponentially".to_string(),
                    intervals: vec![12, 24, 48],
                    requires_precondition: false,
                },
                RetryPolicy {
                    error_code: ERROR_QUOTA.to_string(),
                    description: "Daily send quota exceeded; retry once per day".to_string(),
                    intervals: vec![24, 24, 24],
                    requires_precondition: false,
                },
                RetryPolicy {
                    error_code: ERROR_TEMPLATE_INACTIVE.to_string(),
                    description: "Message template deactivated; retry once it is active again"
                        .to_string(),
                    intervals: vec![24],
                    requires_precondition: true,
                },
            ],
        }
    }

    /// Build a table from explicit policies (tests and custom deployments)
    pub fn with_policies(policies: Vec<RetryPolicy>) -> Self {
        Self { policies }
    }

    /// Look up the policy for a failure code
    pub fn lookup(&self, error_code: &str) -> Option<&RetryPolicy> {
        self.policies.iter().find(|policy| policy.error_code == error_code)
    }

    /// Number of registered policies
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_has_three_policies() {
        let table = PolicyTable::builtin();
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn freqcap_backs_off_exponentially() {
        let table = PolicyTable::builtin();
        let policy = table.lookup(ERROR_FREQCAP).unwrap();

        assert_eq!(policy.intervals, vec![12, 24, 48]);
        assert!(!policy.requires_precondition);
        assert_eq!(policy.max_attempts(), 3);
    }

    #[test]
    fn quota_retries_daily() {
        let table = PolicyTable::builtin();
        let policy = table.lookup(ERROR_QUOTA).unwrap();

        assert_eq!(policy.intervals, vec![24, 24, 24]);
        assert!(!policy.requires_precondition);
    }

    #[test]
    fn template_inactive_requires_precondition() {
        let table = PolicyTable::builtin();
        let policy = table.lookup(ERROR_TEMPLATE_INACTIVE).unwrap();

        assert_eq!(policy.intervals, vec![24]);
        assert!(policy.requires_precondition);
    }

    #[test]
    fn unknown_code_resolves_to_none() {
        let table = PolicyTable::builtin();
        assert!(table.lookup("bounce").is_none());
        assert!(table.lookup("").is_none());
    }
}
