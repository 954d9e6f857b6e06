//! Promise domain model and lifecycle table.
//!
//! # Responsibility
//! - Define the promise record and its closed status set.
//! - Map every `(status, action)` pair to its target status, acting party
//!   and balance settlement.
//!
//! # Invariants
//! - `promiser_id != promisee_id`.
//! - `resolved_at` is set iff the status is terminal.
//! - Terminal statuses (`kept`, `broken`, `declined`) have no outgoing
//!   transitions.
//! - Staking is symmetric: both parties hold `stake` in escrow once accepted.

use crate::model::account::AccountId;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable promise identifier.
pub type PromiseId = Uuid;

/// Largest stake accepted. Keeps `2 * stake` and the kept payout within the
/// signed 64-bit range used by persistence.
pub const MAX_STAKE: u64 = (i64::MAX as u64) / 4;

/// Lifecycle state of a promise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromiseStatus {
    /// Created by the promiser, awaiting the promisee's answer.
    Pending,
    /// Accepted by the promisee; both stakes are in escrow.
    Accepted,
    /// Judged kept by the promisee.
    Kept,
    /// Judged broken by the promisee.
    Broken,
    /// Declined by the promisee or withdrawn by the promiser.
    Declined,
}

impl PromiseStatus {
    pub fn is_terminal(self) -> bool {
        match self {
            Self::Pending | Self::Accepted => false,
            Self::Kept | Self::Broken | Self::Declined => true,
        }
    }

    /// Number of stakes held in escrow while a promise is in this status.
    pub fn escrowed_stakes(self) -> u64 {
        match self {
            Self::Pending => 1,
            Self::Accepted => 2,
            Self::Kept | Self::Broken | Self::Declined => 0,
        }
    }

    /// Stable storage string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Kept => "kept",
            Self::Broken => "broken",
            Self::Declined => "declined",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "kept" => Some(Self::Kept),
            "broken" => Some(Self::Broken),
            "declined" => Some(Self::Declined),
            _ => None,
        }
    }
}

impl Display for PromiseStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of a promise is entitled to trigger an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    Promiser,
    Promisee,
}

/// Every operation that moves a promise through its lifecycle.
///
/// `resolve(kept)` is split into `Keep` and `Break` so each row of the
/// transition table is one variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromiseAction {
    Create,
    Accept,
    Decline,
    Cancel,
    Keep,
    Break,
}

impl PromiseAction {
    /// Maps a resolve verdict onto its action.
    pub fn resolve(kept: bool) -> Self {
        if kept {
            Self::Keep
        } else {
            Self::Break
        }
    }

    /// The only party allowed to perform this action.
    pub fn actor(self) -> Party {
        match self {
            Self::Create | Self::Cancel => Party::Promiser,
            Self::Accept | Self::Decline | Self::Keep | Self::Break => Party::Promisee,
        }
    }

    /// Balance movements applied when this action succeeds.
    pub fn settlement(self, stake: u64) -> Settlement {
        match self {
            Self::Create => Settlement {
                promiser: Movement::Debit(stake),
                promisee: Movement::None,
            },
            Self::Accept => Settlement {
                promiser: Movement::None,
                promisee: Movement::Debit(stake),
            },
            Self::Decline | Self::Cancel => Settlement {
                promiser: Movement::Credit(stake),
                promisee: Movement::None,
            },
            Self::Keep => {
                let payout = stake + kept_bonus(stake);
                Settlement {
                    promiser: Movement::Credit(payout),
                    promisee: Movement::Credit(payout),
                }
            }
            Self::Break => Settlement {
                promiser: Movement::None,
                promisee: Movement::Credit(stake * 2),
            },
        }
    }

    /// Stable storage string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Accept => "accept",
            Self::Decline => "decline",
            Self::Cancel => "cancel",
            Self::Keep => "keep",
            Self::Break => "break",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "create" => Some(Self::Create),
            "accept" => Some(Self::Accept),
            "decline" => Some(Self::Decline),
            "cancel" => Some(Self::Cancel),
            "keep" => Some(Self::Keep),
            "break" => Some(Self::Break),
            _ => None,
        }
    }
}

impl Display for PromiseAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target status for `action` applied in state `from`.
///
/// `from == None` means the promise does not exist yet. Returns `None` for
/// every combination outside the lifecycle table.
pub fn transition(from: Option<PromiseStatus>, action: PromiseAction) -> Option<PromiseStatus> {
    use PromiseAction::{Accept, Break, Cancel, Create, Decline, Keep};
    use PromiseStatus::{Accepted, Broken, Declined, Kept, Pending};

    match (from, action) {
        (None, Create) => Some(Pending),
        (None, Accept | Decline | Cancel | Keep | Break) => None,
        (Some(Pending), Accept) => Some(Accepted),
        (Some(Pending), Decline | Cancel) => Some(Declined),
        (Some(Pending), Create | Keep | Break) => None,
        (Some(Accepted), Keep) => Some(Kept),
        (Some(Accepted), Break) => Some(Broken),
        (Some(Accepted), Create | Accept | Decline | Cancel) => None,
        (Some(Kept | Broken | Declined), _) => None,
    }
}

/// Bonus minted to each party when a promise is kept: `floor(stake / 2)`.
pub fn kept_bonus(stake: u64) -> u64 {
    stake / 2
}

/// Balance change for one party.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Movement {
    None,
    Debit(u64),
    Credit(u64),
}

/// Balance changes for both parties of one transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub promiser: Movement,
    pub promisee: Movement,
}

/// A commitment between two accounts backed by a vow stake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promise {
    pub id: PromiseId,
    pub promiser_id: AccountId,
    pub promisee_id: AccountId,
    /// Trimmed, non-empty free text.
    pub description: String,
    /// Amount each party risks.
    pub stake: u64,
    pub status: PromiseStatus,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds. Set once, on reaching a terminal status.
    pub resolved_at: Option<i64>,
}

/// Validation errors for promise invariants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromiseValidationError {
    SameParty(AccountId),
    EmptyDescription,
    ZeroStake,
    StakeTooLarge(u64),
    ResolvedAtMismatch { status: PromiseStatus },
    ResolvedBeforeCreated { created_at: i64, resolved_at: i64 },
}

impl Display for PromiseValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SameParty(id) => write!(f, "promiser and promisee must differ, both are {id}"),
            Self::EmptyDescription => write!(f, "description must not be empty"),
            Self::ZeroStake => write!(f, "stake must be at least 1 vow"),
            Self::StakeTooLarge(stake) => {
                write!(f, "stake {stake} exceeds maximum of {MAX_STAKE}")
            }
            Self::ResolvedAtMismatch { status } => write!(
                f,
                "resolved_at must be set exactly when status is terminal (status={status})"
            ),
            Self::ResolvedBeforeCreated {
                created_at,
                resolved_at,
            } => write!(
                f,
                "resolved_at ({resolved_at}) must be >= created_at ({created_at})"
            ),
        }
    }
}

impl Error for PromiseValidationError {}

impl Promise {
    /// Creates a new `pending` promise with a generated ID.
    ///
    /// The description is stored trimmed. No validation happens here; call
    /// `validate()` before persisting.
    pub fn new(
        promiser_id: AccountId,
        promisee_id: AccountId,
        description: &str,
        stake: u64,
        created_at: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            promiser_id,
            promisee_id,
            description: description.trim().to_string(),
            stake,
            status: PromiseStatus::Pending,
            created_at,
            resolved_at: None,
        }
    }

    /// Validates the record invariants.
    pub fn validate(&self) -> Result<(), PromiseValidationError> {
        if self.promiser_id == self.promisee_id {
            return Err(PromiseValidationError::SameParty(self.promiser_id));
        }
        if self.description.trim().is_empty() {
            return Err(PromiseValidationError::EmptyDescription);
        }
        if self.stake == 0 {
            return Err(PromiseValidationError::ZeroStake);
        }
        if self.stake > MAX_STAKE {
            return Err(PromiseValidationError::StakeTooLarge(self.stake));
        }
        match (self.status.is_terminal(), self.resolved_at) {
            (true, Some(resolved_at)) if resolved_at < self.created_at => {
                Err(PromiseValidationError::ResolvedBeforeCreated {
                    created_at: self.created_at,
                    resolved_at,
                })
            }
            (true, Some(_)) | (false, None) => Ok(()),
            (true, None) | (false, Some(_)) => Err(PromiseValidationError::ResolvedAtMismatch {
                status: self.status,
            }),
        }
    }

    /// Account ID of the given party.
    pub fn party(&self, party: Party) -> AccountId {
        match party {
            Party::Promiser => self.promiser_id,
            Party::Promisee => self.promisee_id,
        }
    }

    /// Whether `account_id` is the promiser or the promisee.
    pub fn involves(&self, account_id: AccountId) -> bool {
        self.promiser_id == account_id || self.promisee_id == account_id
    }

    /// Vows currently held in escrow by this promise.
    pub fn escrowed(&self) -> u64 {
        self.stake * self.status.escrowed_stakes()
    }

    /// Moves to `status`, stamping `resolved_at` when it is terminal.
    ///
    /// Callers must have checked the move with `transition` first.
    pub fn advance(&mut self, status: PromiseStatus, at: i64) {
        self.status = status;
        if status.is_terminal() {
            self.resolved_at = Some(at.max(self.created_at));
        }
    }
}

/// Audit record of one successful lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromiseEvent {
    pub promise_id: PromiseId,
    /// Position in the promise's history, starting at 1.
    pub sequence: u32,
    pub action: PromiseAction,
    pub actor_id: AccountId,
    /// `None` for the creating event.
    pub from_status: Option<PromiseStatus>,
    pub to_status: PromiseStatus,
    /// Unix epoch milliseconds.
    pub at: i64,
}

#[cfg(test)]
mod tests {
    use super::{
        kept_bonus, transition, Movement, Party, Promise, PromiseAction, PromiseStatus,
        PromiseValidationError, MAX_STAKE,
    };
    use uuid::Uuid;

    const ALL_STATUSES: [PromiseStatus; 5] = [
        PromiseStatus::Pending,
        PromiseStatus::Accepted,
        PromiseStatus::Kept,
        PromiseStatus::Broken,
        PromiseStatus::Declined,
    ];
    const ALL_ACTIONS: [PromiseAction; 6] = [
        PromiseAction::Create,
        PromiseAction::Accept,
        PromiseAction::Decline,
        PromiseAction::Cancel,
        PromiseAction::Keep,
        PromiseAction::Break,
    ];

    fn sample() -> Promise {
        Promise::new(Uuid::new_v4(), Uuid::new_v4(), "  wash car ", 20, 1_000)
    }

    #[test]
    fn transition_table_allows_exactly_the_lifecycle_rows() {
        let mut allowed = Vec::new();
        for action in ALL_ACTIONS {
            if let Some(to) = transition(None, action) {
                allowed.push((None, action, to));
            }
            for from in ALL_STATUSES {
                if let Some(to) = transition(Some(from), action) {
                    allowed.push((Some(from), action, to));
                }
            }
        }

        assert_eq!(allowed.len(), 6);
        assert!(allowed.contains(&(None, PromiseAction::Create, PromiseStatus::Pending)));
        assert!(allowed.contains(&(
            Some(PromiseStatus::Pending),
            PromiseAction::Accept,
            PromiseStatus::Accepted
        )));
        assert!(allowed.contains(&(
            Some(PromiseStatus::Pending),
            PromiseAction::Decline,
            PromiseStatus::Declined
        )));
        assert!(allowed.contains(&(
            Some(PromiseStatus::Pending),
            PromiseAction::Cancel,
            PromiseStatus::Declined
        )));
        assert!(allowed.contains(&(
            Some(PromiseStatus::Accepted),
            PromiseAction::Keep,
            PromiseStatus::Kept
        )));
        assert!(allowed.contains(&(
            Some(PromiseStatus::Accepted),
            PromiseAction::Break,
            PromiseStatus::Broken
        )));
    }

    #[test]
    fn terminal_statuses_have_no_outgoing_transitions() {
        for from in ALL_STATUSES.into_iter().filter(|s| s.is_terminal()) {
            for action in ALL_ACTIONS {
                assert_eq!(transition(Some(from), action), None, "{from} -> {action}");
            }
        }
    }

    #[test]
    fn actors_match_lifecycle_roles() {
        assert_eq!(PromiseAction::Create.actor(), Party::Promiser);
        assert_eq!(PromiseAction::Cancel.actor(), Party::Promiser);
        assert_eq!(PromiseAction::Accept.actor(), Party::Promisee);
        assert_eq!(PromiseAction::Decline.actor(), Party::Promisee);
        assert_eq!(PromiseAction::resolve(true).actor(), Party::Promisee);
        assert_eq!(PromiseAction::resolve(false).actor(), Party::Promisee);
    }

    #[test]
    fn kept_settlement_pays_stake_plus_floored_half_to_both() {
        let settlement = PromiseAction::Keep.settlement(21);
        assert_eq!(kept_bonus(21), 10);
        assert_eq!(settlement.promiser, Movement::Credit(31));
        assert_eq!(settlement.promisee, Movement::Credit(31));
    }

    #[test]
    fn broken_settlement_pays_both_stakes_to_promisee() {
        let settlement = PromiseAction::Break.settlement(20);
        assert_eq!(settlement.promiser, Movement::None);
        assert_eq!(settlement.promisee, Movement::Credit(40));
    }

    #[test]
    fn new_promise_trims_description_and_starts_pending() {
        let promise = sample();
        assert_eq!(promise.description, "wash car");
        assert_eq!(promise.status, PromiseStatus::Pending);
        assert_eq!(promise.resolved_at, None);
        assert_eq!(promise.escrowed(), 20);
        promise.validate().unwrap();
    }

    #[test]
    fn validate_rejects_bad_records() {
        let party = Uuid::new_v4();
        let same = Promise::new(party, party, "x", 1, 0);
        assert_eq!(
            same.validate(),
            Err(PromiseValidationError::SameParty(party))
        );

        let mut blank = sample();
        blank.description = "   ".to_string();
        assert_eq!(blank.validate(), Err(PromiseValidationError::EmptyDescription));

        let mut zero = sample();
        zero.stake = 0;
        assert_eq!(zero.validate(), Err(PromiseValidationError::ZeroStake));

        let mut huge = sample();
        huge.stake = MAX_STAKE + 1;
        assert!(matches!(
            huge.validate(),
            Err(PromiseValidationError::StakeTooLarge(_))
        ));

        let mut unresolved_terminal = sample();
        unresolved_terminal.status = PromiseStatus::Kept;
        assert!(matches!(
            unresolved_terminal.validate(),
            Err(PromiseValidationError::ResolvedAtMismatch { .. })
        ));
    }

    #[test]
    fn advance_stamps_resolved_at_only_for_terminal_status() {
        let mut promise = sample();
        promise.advance(PromiseStatus::Accepted, 2_000);
        assert_eq!(promise.resolved_at, None);
        assert_eq!(promise.escrowed(), 40);

        promise.advance(PromiseStatus::Kept, 3_000);
        assert_eq!(promise.resolved_at, Some(3_000));
        assert_eq!(promise.escrowed(), 0);
        promise.validate().unwrap();
    }

    #[test]
    fn status_and_action_strings_roundtrip() {
        for status in ALL_STATUSES {
            assert_eq!(PromiseStatus::parse(status.as_str()), Some(status));
        }
        for action in ALL_ACTIONS {
            assert_eq!(PromiseAction::parse(action.as_str()), Some(action));
        }
        assert_eq!(PromiseStatus::parse("cancelled"), None);
    }
}
