use serde::{Deserialize, Serialize};

/// Token usage for a single backend call or accumulated over an agent's life.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens:  u32,
    pub output_tokens: u32,
    pub total_tokens:  u32,
}

impl TokenUsage {
    pub fn new(input: u32, output: u32) -> Self {
        Self {
            input_tokens:  input,
            output_tokens: output,
            total_tokens:  input.saturating_add(output),
        }
    }

    /// Accumulate usage from another call
    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens  = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.total_tokens  = self.total_tokens.saturating_add(other.total_tokens);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_accumulates_every_counter() {
        let mut total = TokenUsage::default();
        total.add(TokenUsage::new(10, 20));
        total.add(TokenUsage::new(5, 15));
        assert_eq!(total, TokenUsage { input_tokens: 15, output_tokens: 35, total_tokens: 50 });
    }

    #[test]
    fn saturates_instead_of_overflowing() {
        let mut total = TokenUsage::new(u32::MAX, 0);
        total.add(TokenUsage::new(1, 1));
        assert_eq!(total.input_tokens, u32::MAX);
        assert_eq!(total.total_tokens, u32::MAX);
    }
}
