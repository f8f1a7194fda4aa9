//! Column salting for downstream load balancing

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::stream::MatrixElement;

/// Tags emitted elements with a salt drawn uniformly from
/// `[0, row_divisions)`, or leaves them unsalted when disabled.
/// Never changes column index or value.
#[derive(Debug)]
pub struct ColumnSalter {
    row_divisions: Option<u32>,
    rng: StdRng,
}

impl ColumnSalter {
    pub fn disabled() -> Self {
        Self {
            row_divisions: None,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn enabled(row_divisions: u32) -> Self {
        Self {
            row_divisions: Some(row_divisions.max(1)),
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic salter for reproducible runs
    pub fn seeded(row_divisions: Option<u32>, seed: u64) -> Self {
        Self {
            row_divisions: row_divisions.map(|d| d.max(1)),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.row_divisions.is_some()
    }

    pub fn apply(&mut self, mut element: MatrixElement) -> MatrixElement {
        element.salt = match self.row_divisions {
            Some(divisions) => Some(self.rng.gen_range(0..divisions)),
            None => None,
        };
        element
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigUint;

    #[test]
    fn test_salt_in_range() {
        let mut salter = ColumnSalter::seeded(Some(4), 7);
        for i in 0..500 {
            let element = salter.apply(MatrixElement::new(i, BigUint::from(9u32)));
            assert!(element.salt.unwrap() < 4);
            assert_eq!(element.column_index, i);
            assert_eq!(element.encrypted_value, BigUint::from(9u32));
        }
    }

    #[test]
    fn test_disabled_clears_salt() {
        let mut salter = ColumnSalter::disabled();
        let element = salter.apply(MatrixElement::new(0, BigUint::from(1u32)).with_salt(3));
        assert_eq!(element.salt, None);
        assert!(!salter.is_enabled());
    }
}
