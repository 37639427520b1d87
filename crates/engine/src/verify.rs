//! Order-independent comparison of expected and actual outputs

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// Outcome of a comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    Failed,
}

/// Difference between two multisets
///
/// `missing` holds records expected more often than they were produced,
/// `unexpected` the reverse; each entry carries the surplus count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MultisetComparison<O> {
    pub expected_len: usize,
    pub actual_len: usize,
    pub missing: Vec<(O, usize)>,
    pub unexpected: Vec<(O, usize)>,
    pub verdict: Verdict,
}

impl<O> MultisetComparison<O>
where
    O: Clone + Eq + Hash + Ord,
{
    pub fn compare<E, A>(expected: E, actual: A) -> Self
    where
        E: IntoIterator<Item = O>,
        A: IntoIterator<Item = O>,
    {
        let mut balance: HashMap<O, i64> = HashMap::new();
        let mut expected_len = 0;
        let mut actual_len = 0;

        for record in expected {
            expected_len += 1;
            *balance.entry(record).or_insert(0) += 1;
        }
        for record in actual {
            actual_len += 1;
            *balance.entry(record).or_insert(0) -= 1;
        }

        let mut missing = Vec::new();
        let mut unexpected = Vec::new();
        for (record, diff) in balance {
            if diff > 0 {
                missing.push((record, diff as usize));
            } else if diff < 0 {
                unexpected.push((record, diff.unsigned_abs() as usize));
            }
        }
        missing.sort();
        unexpected.sort();

        let verdict = if missing.is_empty() && unexpected.is_empty() {
            Verdict::Passed
        } else {
            Verdict::Failed
        };

        Self {
            expected_len,
            actual_len,
            missing,
            unexpected,
            verdict,
        }
    }

    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Passed
    }
}

impl<O: fmt::Debug> fmt::Display for MultisetComparison<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}: expected {} records, got {}",
            self.verdict, self.expected_len, self.actual_len
        )?;
        if !self.missing.is_empty() {
            write!(f, "; missing {:?}", self.missing)?;
        }
        if !self.unexpected.is_empty() {
            write!(f, "; unexpected {:?}", self.unexpected)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_does_not_matter() {
        let result = MultisetComparison::compare(vec![1, 2, 2, 3], vec![2, 3, 1, 2]);
        assert!(result.passed());
        assert_eq!(result.expected_len, 4);
    }

    #[test]
    fn test_multiplicity_matters() {
        let result = MultisetComparison::compare(vec![1, 2, 2], vec![1, 2, 3, 3]);
        assert_eq!(result.verdict, Verdict::Failed);
        assert_eq!(result.missing, vec![(2, 1)]);
        assert_eq!(result.unexpected, vec![(3, 2)]);
        assert!(result.to_string().contains("missing [(2, 1)]"));
    }

    #[test]
    fn test_empty_multisets_match() {
        let result = MultisetComparison::<u8>::compare(vec![], vec![]);
        assert!(result.passed());
    }
}
