// 🎮 Player Account - one extracted row, held by value
//
// Identity: contract identity + contract id (never touched by a correction)
// State:    the (email verified, portal service, second-chance service) triple
//
// A correction never mutates a record. It builds a new value so the caller can
// compare original and corrected before deciding to apply anything.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Token count of one extract row. The export's SERVICE_TYPE_IDS and
/// SERVICE_STATUS_IDS columns each expand into two tokens.
pub const EXTRACT_TOKENS: usize = 8;

/// Literal token that marks the column-heading row of an extract.
pub const HEADER_TOKEN: &str = "CONTRACT_IDENTITY";

const IDENTITY_TOKEN: usize = 0;
const EMAIL_TOKEN: usize = 1;
const CONTRACT_ID_TOKEN: usize = 2;
const EMAIL_VERIFIED_TOKEN: usize = 3;
const PORTAL_STATUS_TOKEN: usize = 6;
const SECOND_CHANCE_STATUS_TOKEN: usize = 7;

// ============================================================================
// STATUS ENUMS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmailVerification {
    NotVerified,
    Verified,
}

impl EmailVerification {
    pub fn code(&self) -> u8 {
        match self {
            EmailVerification::NotVerified => 0,
            EmailVerification::Verified => 1,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(EmailVerification::NotVerified),
            1 => Some(EmailVerification::Verified),
            _ => None,
        }
    }
}

/// Lifecycle of one auxiliary service subscription (portal or second-chance).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceStatus {
    Preactive,
    Active,
    Suspended,
}

impl ServiceStatus {
    pub fn code(&self) -> u8 {
        match self {
            ServiceStatus::Preactive => 1,
            ServiceStatus::Active => 2,
            ServiceStatus::Suspended => 3,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            1 => Some(ServiceStatus::Preactive),
            2 => Some(ServiceStatus::Active),
            3 => Some(ServiceStatus::Suspended),
            _ => None,
        }
    }
}

// ============================================================================
// STATUS TRIPLE + NAMED LIFECYCLE STATES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusTriple {
    pub email_verified: EmailVerification,
    pub portal: ServiceStatus,
    pub second_chance: ServiceStatus,
}

impl StatusTriple {
    pub const fn new(
        email_verified: EmailVerification,
        portal: ServiceStatus,
        second_chance: ServiceStatus,
    ) -> Self {
        StatusTriple {
            email_verified,
            portal,
            second_chance,
        }
    }

    /// All 2x3x3 observable combinations, in code order.
    pub fn all() -> Vec<StatusTriple> {
        let verifications = [EmailVerification::NotVerified, EmailVerification::Verified];
        let statuses = [
            ServiceStatus::Preactive,
            ServiceStatus::Active,
            ServiceStatus::Suspended,
        ];

        let mut triples = Vec::with_capacity(18);
        for email_verified in verifications {
            for portal in statuses {
                for second_chance in statuses {
                    triples.push(StatusTriple::new(email_verified, portal, second_chance));
                }
            }
        }
        triples
    }
}

impl fmt::Display for StatusTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {})",
            self.email_verified.code(),
            self.portal.code(),
            self.second_chance.code()
        )
    }
}

/// The only states a correction may assign. Each fixes the whole triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    Preactivated,
    Activated,
    Suspended,
}

impl LifecycleState {
    pub fn triple(&self) -> StatusTriple {
        use EmailVerification::*;
        use ServiceStatus::*;

        match self {
            LifecycleState::Preactivated => StatusTriple::new(NotVerified, Preactive, Preactive),
            LifecycleState::Activated => StatusTriple::new(Verified, Active, Active),
            LifecycleState::Suspended => StatusTriple::new(Verified, Suspended, Suspended),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Preactivated => "Preactivated",
            LifecycleState::Activated => "Activated",
            LifecycleState::Suspended => "Suspended",
        }
    }
}

// ============================================================================
// PLAYER ACCOUNT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerAccount {
    identity: String,
    account_email: String,
    contract_id: u64,
    status: StatusTriple,
}

impl PlayerAccount {
    pub fn new(
        identity: impl Into<String>,
        account_email: impl Into<String>,
        contract_id: u64,
        status: StatusTriple,
    ) -> Self {
        PlayerAccount {
            identity: identity.into(),
            account_email: account_email.into(),
            contract_id,
            status,
        }
    }

    /// Build from the tokens of one extract row.
    ///
    /// `line` is the 1-based line number, used only for error reporting.
    pub fn from_tokens<S: AsRef<str>>(tokens: &[S], line: usize) -> SyncResult<Self> {
        if tokens.len() < EXTRACT_TOKENS {
            return Err(SyncError::malformed(
                line,
                format!("expected {} tokens, found {}", EXTRACT_TOKENS, tokens.len()),
            ));
        }

        let token = |i: usize| clean_token(tokens[i].as_ref());

        let contract_id = parse_number(tokens[CONTRACT_ID_TOKEN].as_ref())
            .ok_or_else(|| SyncError::malformed(line, format!("contract id '{}'", token(CONTRACT_ID_TOKEN))))?;

        let email_verified = parse_number(tokens[EMAIL_VERIFIED_TOKEN].as_ref())
            .and_then(EmailVerification::from_code)
            .ok_or_else(|| {
                SyncError::malformed(line, format!("email verified '{}'", token(EMAIL_VERIFIED_TOKEN)))
            })?;

        let portal = parse_number(tokens[PORTAL_STATUS_TOKEN].as_ref())
            .and_then(ServiceStatus::from_code)
            .ok_or_else(|| {
                SyncError::malformed(line, format!("portal status '{}'", token(PORTAL_STATUS_TOKEN)))
            })?;

        let second_chance = parse_number(tokens[SECOND_CHANCE_STATUS_TOKEN].as_ref())
            .and_then(ServiceStatus::from_code)
            .ok_or_else(|| {
                SyncError::malformed(
                    line,
                    format!("second-chance status '{}'", token(SECOND_CHANCE_STATUS_TOKEN)),
                )
            })?;

        Ok(PlayerAccount {
            identity: token(IDENTITY_TOKEN),
            account_email: token(EMAIL_TOKEN),
            contract_id,
            status: StatusTriple::new(email_verified, portal, second_chance),
        })
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn account_email(&self) -> &str {
        &self.account_email
    }

    /// Same field as `account_email`; the export calls it the username.
    pub fn username(&self) -> &str {
        &self.account_email
    }

    pub fn contract_id(&self) -> u64 {
        self.contract_id
    }

    pub fn email_verified(&self) -> EmailVerification {
        self.status.email_verified
    }

    pub fn portal_service(&self) -> ServiceStatus {
        self.status.portal
    }

    pub fn second_chance_service(&self) -> ServiceStatus {
        self.status.second_chance
    }

    pub fn status(&self) -> StatusTriple {
        self.status
    }

    // ------------------------------------------------------------------------
    // Copy-with-change
    // ------------------------------------------------------------------------

    pub fn with_identity(&self, identity: impl Into<String>) -> Self {
        PlayerAccount {
            identity: identity.into(),
            ..self.clone()
        }
    }

    pub fn with_account_email(&self, account_email: impl Into<String>) -> Self {
        PlayerAccount {
            account_email: account_email.into(),
            ..self.clone()
        }
    }

    pub fn with_contract_id(&self, contract_id: u64) -> Self {
        PlayerAccount {
            contract_id,
            ..self.clone()
        }
    }

    pub fn with_email_verified(&self, email_verified: EmailVerification) -> Self {
        let mut next = self.clone();
        next.status.email_verified = email_verified;
        next
    }

    pub fn with_portal_service(&self, portal: ServiceStatus) -> Self {
        let mut next = self.clone();
        next.status.portal = portal;
        next
    }

    pub fn with_second_chance_service(&self, second_chance: ServiceStatus) -> Self {
        let mut next = self.clone();
        next.status.second_chance = second_chance;
        next
    }

    // ------------------------------------------------------------------------
    // Named transitions (whole triple at once)
    // ------------------------------------------------------------------------

    pub fn with_lifecycle(&self, state: LifecycleState) -> Self {
        PlayerAccount {
            status: state.triple(),
            ..self.clone()
        }
    }

    pub fn preactivated(&self) -> Self {
        self.with_lifecycle(LifecycleState::Preactivated)
    }

    pub fn activated(&self) -> Self {
        self.with_lifecycle(LifecycleState::Activated)
    }

    pub fn suspended(&self) -> Self {
        self.with_lifecycle(LifecycleState::Suspended)
    }
}

impl fmt::Display for PlayerAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}, {}, {}, {}, {}",
            self.identity,
            self.contract_id,
            self.status.email_verified.code(),
            self.status.portal.code(),
            self.status.second_chance.code(),
            self.account_email
        )
    }
}

// ============================================================================
// NORMALIZATION
// ============================================================================

fn clean_token(raw: &str) -> String {
    raw.trim().replace('"', "")
}

/// Parse an exported numeric field.
///
/// DEL exports render numbers as `+00000001234.` and hand-edited extracts may
/// carry thousands separators (`+1,234`), so sign, separators and quotes are
/// stripped before parsing.
pub fn parse_number(raw: &str) -> Option<u64> {
    let digits: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '+' | ',' | '.' | '"' | ' '))
        .collect();

    if digits.is_empty() {
        return None;
    }

    digits.parse::<u64>().ok()
}

// ============================================================================
// TESTS
// ============================================================================
