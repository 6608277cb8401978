//! Token usage accounting, summed across every backend call of an agentic
//! loop.

use std::iter::Sum;
use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
        self.total_tokens += rhs.total_tokens;
    }
}

impl Sum for Usage {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Usage::default(), |mut acc, next| {
            acc += next;
            acc
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_assign_sums_all_fields() {
        let mut total = Usage::new(10, 5);
        total += Usage::new(3, 7);
        assert_eq!(total, Usage::new(13, 12));
    }

    #[test]
    fn sum_over_turns_matches_componentwise_total() {
        let turns = vec![Usage::new(10, 2), Usage::new(5, 1), Usage::new(8, 4)];
        let total: Usage = turns.into_iter().sum();
        assert_eq!(total, Usage::new(23, 7));
    }
}
