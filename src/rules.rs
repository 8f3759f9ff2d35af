// 🏷️ Sync Rules - the drift table as data
// Maps an observed status triple to the lifecycle state it should be in

use crate::player::{
    EmailVerification::{NotVerified, Verified},
    LifecycleState, PlayerAccount,
    ServiceStatus::{Active, Preactive, Suspended},
    StatusTriple,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// RULE DEFINITION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleAction {
    /// Move the whole triple to a named lifecycle state
    Assign(LifecycleState),

    /// Recognized and already consistent
    Keep,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRule {
    /// Scenario number, stable across releases (operators quote it)
    pub id: u8,

    /// Triple this rule fires on
    pub observed: StatusTriple,

    pub action: RuleAction,
}

impl SyncRule {
    const fn new(id: u8, observed: StatusTriple, action: RuleAction) -> Self {
        SyncRule {
            id,
            observed,
            action,
        }
    }

    pub fn matches(&self, triple: &StatusTriple) -> bool {
        self.observed == *triple
    }
}

/// Policy for `(NOT_VERIFIED, SUSPENDED, SUSPENDED)`.
///
/// Two generations of the sync job disagree here: one promotes the account to
/// Suspended (marking the email verified), the other leaves it alone. There is
/// no default; every run has to name one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnverifiedSuspendedPolicy {
    Promote,
    Leave,
}

impl UnverifiedSuspendedPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnverifiedSuspendedPolicy::Promote => "promote",
            UnverifiedSuspendedPolicy::Leave => "leave",
        }
    }
}

impl fmt::Display for UnverifiedSuspendedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnverifiedSuspendedPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "promote" => Ok(UnverifiedSuspendedPolicy::Promote),
            "leave" => Ok(UnverifiedSuspendedPolicy::Leave),
            other => Err(format!("unknown policy '{}', expected promote or leave", other)),
        }
    }
}

// ============================================================================
// CORRECTION OUTCOME
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrectionOutcome {
    Unchanged,
    Corrected(PlayerAccount),
}

impl CorrectionOutcome {
    pub fn is_corrected(&self) -> bool {
        matches!(self, CorrectionOutcome::Corrected(_))
    }

    /// The record as it should be stored: the correction, or the original.
    pub fn resolve<'a>(&'a self, original: &'a PlayerAccount) -> &'a PlayerAccount {
        match self {
            CorrectionOutcome::Corrected(fixed) => fixed,
            CorrectionOutcome::Unchanged => original,
        }
    }
}

// ============================================================================
// RULE TABLE
// ============================================================================

const BASE_RULES: [SyncRule; 10] = [
    SyncRule::new(1, StatusTriple::new(Verified, Preactive, Preactive), RuleAction::Assign(LifecycleState::Suspended)),
    SyncRule::new(2, StatusTriple::new(Verified, Preactive, Active), RuleAction::Assign(LifecycleState::Activated)),
    SyncRule::new(3, StatusTriple::new(NotVerified, Suspended, Preactive), RuleAction::Assign(LifecycleState::Preactivated)),
    SyncRule::new(4, StatusTriple::new(Verified, Active, Preactive), RuleAction::Assign(LifecycleState::Activated)),
    SyncRule::new(5, StatusTriple::new(Verified, Suspended, Preactive), RuleAction::Assign(LifecycleState::Suspended)),
    SyncRule::new(6, StatusTriple::new(Verified, Preactive, Suspended), RuleAction::Assign(LifecycleState::Suspended)),
    SyncRule::new(7, StatusTriple::new(Verified, Active, Suspended), RuleAction::Assign(LifecycleState::Suspended)),
    SyncRule::new(8, StatusTriple::new(Verified, Suspended, Active), RuleAction::Assign(LifecycleState::Suspended)),
    SyncRule::new(9, StatusTriple::new(NotVerified, Active, Active), RuleAction::Assign(LifecycleState::Preactivated)),
    SyncRule::new(10, StatusTriple::new(Verified, Suspended, Suspended), RuleAction::Keep),
];

pub const UNVERIFIED_SUSPENDED_RULE: u8 = 11;

/// Ordered, first-match-wins drift table.
///
/// Pure and immutable once built, so one table can be shared across threads.
#[derive(Debug, Clone)]
pub struct SyncRuleTable {
    rules: Vec<SyncRule>,
    policy: UnverifiedSuspendedPolicy,
}

impl SyncRuleTable {
    pub fn new(policy: UnverifiedSuspendedPolicy) -> Self {
        let mut rules = BASE_RULES.to_vec();

        let action = match policy {
            UnverifiedSuspendedPolicy::Promote => RuleAction::Assign(LifecycleState::Suspended),
            UnverifiedSuspendedPolicy::Leave => RuleAction::Keep,
        };
        rules.push(SyncRule::new(
            UNVERIFIED_SUSPENDED_RULE,
            StatusTriple::new(NotVerified, Suspended, Suspended),
            action,
        ));

        SyncRuleTable { rules, policy }
    }

    pub fn policy(&self) -> UnverifiedSuspendedPolicy {
        self.policy
    }

    pub fn rules(&self) -> &[SyncRule] {
        &self.rules
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// First rule whose guard matches, if any
    pub fn matching_rule(&self, triple: &StatusTriple) -> Option<&SyncRule> {
        self.rules.iter().find(|rule| rule.matches(triple))
    }

    /// Corrected triple for an observed one (the input itself when nothing changes)
    pub fn target(&self, triple: &StatusTriple) -> StatusTriple {
        match self.matching_rule(triple).map(|rule| rule.action) {
            Some(RuleAction::Assign(state)) => state.triple(),
            Some(RuleAction::Keep) | None => *triple,
        }
    }

    /// Apply the table to one record
    pub fn correct(&self, player: &PlayerAccount) -> CorrectionOutcome {
        let rule = match self.matching_rule(&player.status()) {
            Some(rule) => rule,
            None => return CorrectionOutcome::Unchanged,
        };

        match rule.action {
            RuleAction::Assign(state) => {
                let fixed = player.with_lifecycle(state);
                if fixed == *player {
                    CorrectionOutcome::Unchanged
                } else {
                    CorrectionOutcome::Corrected(fixed)
                }
            }
            RuleAction::Keep => CorrectionOutcome::Unchanged,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::{EmailVerification, ServiceStatus};

    fn player(triple: StatusTriple) -> PlayerAccount {
        PlayerAccount::new("ID-42", "player@example.com", 4242, triple)
    }

    fn expected_targets() -> Vec<(u8, StatusTriple, Option<LifecycleState>)> {
        vec![
            (1, StatusTriple::new(Verified, Preactive, Preactive), Some(LifecycleState::Suspended)),
            (2, StatusTriple::new(Verified, Preactive, Active), Some(LifecycleState::Activated)),
            (3, StatusTriple::new(NotVerified, Suspended, Preactive), Some(LifecycleState::Preactivated)),
            (4, StatusTriple::new(Verified, Active, Preactive), Some(LifecycleState::Activated)),
            (5, StatusTriple::new(Verified, Suspended, Preactive), Some(LifecycleState::Suspended)),
            (6, StatusTriple::new(Verified, Preactive, Suspended), Some(LifecycleState::Suspended)),
            (7, StatusTriple::new(Verified, Active, Suspended), Some(LifecycleState::Suspended)),
            (8, StatusTriple::new(Verified, Suspended, Active), Some(LifecycleState::Suspended)),
            (9, StatusTriple::new(NotVerified, Active, Active), Some(LifecycleState::Preactivated)),
            (10, StatusTriple::new(Verified, Suspended, Suspended), None),
        ]
    }

    #[test]
    fn test_each_rule_yields_its_target() {
        for policy in [UnverifiedSuspendedPolicy::Promote, UnverifiedSuspendedPolicy::Leave] {
            let table = SyncRuleTable::new(policy);

            for (id, observed, target) in expected_targets() {
                let rule = table.matching_rule(&observed).unwrap();
                assert_eq!(rule.id, id, "first match for {observed}");

                let original = player(observed);
                match (table.correct(&original), target) {
                    (CorrectionOutcome::Corrected(fixed), Some(state)) => {
                        assert_eq!(fixed.status(), state.triple(), "rule {id}");
                    }
                    (CorrectionOutcome::Unchanged, None) => {}
                    (outcome, target) => panic!("rule {id}: got {outcome:?}, wanted {target:?}"),
                }
            }
        }
    }

    #[test]
    fn test_unlisted_triples_unchanged() {
        let table = SyncRuleTable::new(UnverifiedSuspendedPolicy::Promote);

        for triple in StatusTriple::all() {
            if table.matching_rule(&triple).is_some() {
                continue;
            }
            let original = player(triple);
            assert_eq!(table.correct(&original), CorrectionOutcome::Unchanged);
            assert_eq!(table.target(&triple), triple);
        }

        // 18 combinations, 11 recognized
        let unrecognized = StatusTriple::all()
            .iter()
            .filter(|t| table.matching_rule(t).is_none())
            .count();
        assert_eq!(unrecognized, 7);
    }

    #[test]
    fn test_corrections_are_idempotent() {
        for policy in [UnverifiedSuspendedPolicy::Promote, UnverifiedSuspendedPolicy::Leave] {
            let table = SyncRuleTable::new(policy);

            for triple in StatusTriple::all() {
                let original = player(triple);
                if let CorrectionOutcome::Corrected(fixed) = table.correct(&original) {
                    assert_eq!(
                        table.correct(&fixed),
                        CorrectionOutcome::Unchanged,
                        "{triple} corrected twice"
                    );
                }
            }
        }
    }

    #[test]
    fn test_correction_preserves_identity_fields() {
        let table = SyncRuleTable::new(UnverifiedSuspendedPolicy::Promote);

        for triple in StatusTriple::all() {
            let original = player(triple);
            let outcome = table.correct(&original);
            let fixed = outcome.resolve(&original);

            assert_eq!(fixed.contract_id(), original.contract_id());
            assert_eq!(fixed.identity(), original.identity());
            assert_eq!(fixed.account_email(), original.account_email());
        }
    }

    #[test]
    fn test_scenarios() {
        let table = SyncRuleTable::new(UnverifiedSuspendedPolicy::Leave);

        // A
        let a = player(StatusTriple::new(Verified, Preactive, Preactive));
        assert_eq!(
            table.correct(&a),
            CorrectionOutcome::Corrected(player(StatusTriple::new(Verified, Suspended, Suspended)))
        );

        // B
        let b = player(StatusTriple::new(Verified, Preactive, Active));
        assert_eq!(
            table.correct(&b),
            CorrectionOutcome::Corrected(player(StatusTriple::new(Verified, Active, Active)))
        );

        // C
        let c = player(StatusTriple::new(NotVerified, Suspended, Preactive));
        assert_eq!(
            table.correct(&c),
            CorrectionOutcome::Corrected(player(StatusTriple::new(NotVerified, Preactive, Preactive)))
        );

        // D
        let d = player(StatusTriple::new(Verified, Suspended, Suspended));
        assert_eq!(table.correct(&d), CorrectionOutcome::Unchanged);
    }

    #[test]
    fn test_unverified_suspended_promote() {
        let table = SyncRuleTable::new(UnverifiedSuspendedPolicy::Promote);
        let observed = StatusTriple::new(NotVerified, Suspended, Suspended);

        assert_eq!(table.matching_rule(&observed).unwrap().id, UNVERIFIED_SUSPENDED_RULE);

        let original = player(observed);
        match table.correct(&original) {
            CorrectionOutcome::Corrected(fixed) => {
                assert_eq!(fixed.email_verified(), EmailVerification::Verified);
                assert_eq!(fixed.portal_service(), ServiceStatus::Suspended);
                assert_eq!(fixed.second_chance_service(), ServiceStatus::Suspended);
            }
            other => panic!("expected correction, got {other:?}"),
        }
    }

    #[test]
    fn test_unverified_suspended_leave() {
        let table = SyncRuleTable::new(UnverifiedSuspendedPolicy::Leave);
        let observed = StatusTriple::new(NotVerified, Suspended, Suspended);

        // still recognized, just not acted on
        assert_eq!(table.matching_rule(&observed).unwrap().id, UNVERIFIED_SUSPENDED_RULE);
        assert_eq!(table.correct(&player(observed)), CorrectionOutcome::Unchanged);
        assert_eq!(table.policy(), UnverifiedSuspendedPolicy::Leave);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("promote".parse::<UnverifiedSuspendedPolicy>(), Ok(UnverifiedSuspendedPolicy::Promote));
        assert_eq!(" Leave ".parse::<UnverifiedSuspendedPolicy>(), Ok(UnverifiedSuspendedPolicy::Leave));
        assert!("suspend".parse::<UnverifiedSuspendedPolicy>().is_err());

        let json = serde_json::to_string(&UnverifiedSuspendedPolicy::Promote).unwrap();
        assert_eq!(json, "\"promote\"");
    }

    #[test]
    fn test_rule_table_shape() {
        let table = SyncRuleTable::new(UnverifiedSuspendedPolicy::Leave);
        assert_eq!(table.rule_count(), 11);

        let ids: Vec<u8> = table.rules().iter().map(|r| r.id).collect();
        assert_eq!(ids, (1..=11).collect::<Vec<u8>>());

        // guards are disjoint, so order only matters for readability
        for (i, a) in table.rules().iter().enumerate() {
            for b in &table.rules()[i + 1..] {
                assert_ne!(a.observed, b.observed);
            }
        }
    }

    #[test]
    fn test_table_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SyncRuleTable>();
    }
}
