use cubemerch_accounts::AccountId;

/// Authenticated account context for a request.
///
/// This is immutable and must be present for all protected routes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AccountContext {
    account_id: AccountId,
    admin: bool,
}

impl AccountContext {
    pub fn new(account_id: AccountId, admin: bool) -> Self {
        Self { account_id, admin }
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    pub fn is_admin(&self) -> bool {
        self.admin
    }
}
