//! Per-run context handed to every tool invocation.

/// Who a tool call runs on behalf of.
///
/// Built once per action run; tools never see another run's context.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub user_id: String,
    pub thread_id: String,
    /// Public key of the user's primary wallet.
    pub wallet_public_key: String,
    /// Set when the run was started by a scheduled action.
    pub action_id: Option<String>,
}

impl ToolContext {
    pub fn for_action(
        action_id: impl Into<String>,
        user_id: impl Into<String>,
        thread_id: impl Into<String>,
        wallet_public_key: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            thread_id: thread_id.into(),
            wallet_public_key: wallet_public_key.into(),
            action_id: Some(action_id.into()),
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.action_id.is_some()
    }
}
