//! Token usage accounting
//!
//! Providers report usage under different names and with different
//! semantics while streaming: some resend absolute running totals, others
//! send per-event deltas. Adapters normalize the names into a
//! [`UsageFragment`]; how fragments fold into the running [`TokenUsage`] is
//! declared per provider through [`UsageAccumulation`], never inferred.

use serde::{Deserialize, Serialize};

/// Normalized token usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,

    pub completion_tokens: u64,

    pub total_tokens: u64,

    /// Set when the stream ended before an explicit usage record arrived
    #[serde(default, skip_serializing_if = "is_false")]
    pub partial: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Usage counts found in one upstream event, already renamed to the
/// generic fields. Absent counts are left untouched when folded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageFragment {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

/// How streamed usage fragments combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageAccumulation {
    /// Each fragment carries absolute running counts
    Replace,
    /// Each fragment carries an increment
    Add,
}

impl TokenUsage {
    /// Create a complete usage record; total is prompt + completion
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            partial: false,
        }
    }

    /// Fold a fragment into the running totals
    pub fn apply(&mut self, fragment: &UsageFragment, mode: UsageAccumulation) {
        match mode {
            UsageAccumulation::Replace => {
                if let Some(prompt) = fragment.prompt_tokens {
                    self.prompt_tokens = prompt;
                }
                if let Some(completion) = fragment.completion_tokens {
                    self.completion_tokens = completion;
                }
                self.total_tokens = fragment
                    .total_tokens
                    .unwrap_or(self.prompt_tokens + self.completion_tokens);
            }
            UsageAccumulation::Add => {
                let prompt = fragment.prompt_tokens.unwrap_or(0);
                let completion = fragment.completion_tokens.unwrap_or(0);
                self.prompt_tokens += prompt;
                self.completion_tokens += completion;
                self.total_tokens += fragment.total_tokens.unwrap_or(prompt + completion);
            }
        }
    }

    /// Same counts, flagged as partial
    pub fn into_partial(mut self) -> Self {
        self.partial = true;
        self
    }
}

impl UsageFragment {
    pub fn is_empty(&self) -> bool {
        self.prompt_tokens.is_none()
            && self.completion_tokens.is_none()
            && self.total_tokens.is_none()
    }
}

impl From<UsageFragment> for TokenUsage {
    fn from(fragment: UsageFragment) -> Self {
        let mut usage = TokenUsage::default();
        usage.apply(&fragment, UsageAccumulation::Replace);
        usage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(prompt: u64, completion: u64, total: Option<u64>) -> UsageFragment {
        UsageFragment {
            prompt_tokens: Some(prompt),
            completion_tokens: Some(completion),
            total_tokens: total,
        }
    }

    #[test]
    fn test_replace_keeps_latest_absolute_counts() {
        let mut usage = TokenUsage::default();
        usage.apply(&fragment(120, 4, Some(124)), UsageAccumulation::Replace);
        usage.apply(&fragment(120, 37, None), UsageAccumulation::Replace);

        assert_eq!(usage, TokenUsage::new(120, 37));
    }

    #[test]
    fn test_add_sums_deltas() {
        let mut usage = TokenUsage::default();
        usage.apply(&fragment(120, 4, None), UsageAccumulation::Add);
        usage.apply(&fragment(0, 33, None), UsageAccumulation::Add);

        assert_eq!(usage, TokenUsage::new(120, 37));
    }

    #[test]
    fn test_replace_with_only_completion_keeps_prompt() {
        let mut usage = TokenUsage::new(50, 1);
        usage.apply(
            &UsageFragment {
                completion_tokens: Some(9),
                ..Default::default()
            },
            UsageAccumulation::Replace,
        );

        assert_eq!(usage.prompt_tokens, 50);
        assert_eq!(usage.total_tokens, 59);
    }

    #[test]
    fn test_partial_flag_serialization() {
        let complete = serde_json::to_value(TokenUsage::new(1, 2)).unwrap();
        assert!(complete.get("partial").is_none());

        let partial = serde_json::to_value(TokenUsage::new(1, 2).into_partial()).unwrap();
        assert_eq!(partial["partial"], serde_json::json!(true));
    }
}
