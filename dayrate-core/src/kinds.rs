use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when a persisted enum label cannot be parsed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParseKindError {
    kind: &'static str,
    value: String,
}

impl fmt::Display for ParseKindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for ParseKindError {}

macro_rules! labelled_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $label:literal {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseKindError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(ParseKindError {
                        kind: $label,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

labelled_enum!(
    /// Category of a balance-affecting ledger entry.
    TransactionKind, "transaction kind" {
        TransferOut => "transfer_out",
        TransferIn => "transfer_in",
        Deposit => "deposit",
        Withdrawal => "withdrawal",
        DailyInterest => "daily_interest",
        TermDeposit => "term_deposit",
        Adjustment => "adjustment",
    }
);

labelled_enum!(
    /// Settlement status of a ledger entry. Only the status may change after insert.
    TransactionStatus, "transaction status" {
        Completed => "completed",
        Pending => "pending",
        Failed => "failed",
    }
);

labelled_enum!(
    /// Who triggered an accrual run.
    AccrualInitiator, "accrual initiator" {
        Scheduled => "scheduled",
        Manual => "manual",
    }
);

labelled_enum!(
    /// Lifecycle of a term-deposit contract.
    ContractStatus, "contract status" {
        Active => "active",
        Matured => "matured",
        Cancelled => "cancelled",
    }
);

impl TransactionKind {
    /// Whether entries of this kind are expected to carry a negative amount.
    pub fn is_debit(self) -> bool {
        matches!(
            self,
            TransactionKind::TransferOut | TransactionKind::Withdrawal | TransactionKind::TermDeposit
        )
    }
}
