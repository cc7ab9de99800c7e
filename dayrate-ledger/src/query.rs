use chrono::{DateTime, Utc};
use dayrate_core::{AccountId, TransactionKind, UserId};

/// Filter describing which ledger entries to load from storage.
#[derive(Clone, Debug, Default)]
pub struct LedgerQuery {
    pub account: Option<AccountId>,
    pub user: Option<UserId>,
    pub kind: Option<TransactionKind>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub ascending: bool,
}

impl LedgerQuery {
    pub fn for_account(account: AccountId) -> Self {
        Self::default().with_account(account)
    }

    pub fn with_account(mut self, account: AccountId) -> Self {
        self.account = Some(account);
        self
    }

    pub fn with_user(mut self, user: UserId) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_kind(mut self, kind: TransactionKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_time_range(
        mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Self {
        self.start_time = start;
        self.end_time = end;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn ascending(mut self) -> Self {
        self.ascending = true;
        self
    }

    pub(crate) fn matches(&self, entry: &crate::LedgerEntry) -> bool {
        self.account.as_ref().map_or(true, |id| &entry.account_id == id)
            && self.user.as_ref().map_or(true, |id| &entry.user_id == id)
            && self.kind.map_or(true, |kind| entry.kind == kind)
            && self.start_time.map_or(true, |ts| entry.created_at >= ts)
            && self.end_time.map_or(true, |ts| entry.created_at <= ts)
    }
}
