//! Encryption primitive seam

use num_bigint::BigUint;

use super::errors::{EncryptError, EncryptResult};
use crate::query::QueryContext;
use crate::stream::MatrixElement;

/// Turns one row's partitions into encrypted matrix contributions.
///
/// Element `i` of the output must carry column `column_offset + i`.
pub trait RowEncryptor: Send + Sync {
    fn compute_row(
        &self,
        partitions: &[BigUint],
        context: &QueryContext,
        row_index: u32,
        column_offset: u64,
    ) -> EncryptResult<Vec<MatrixElement>>;
}

/// `queryElement[row] ^ partition mod N²` per partition
#[derive(Debug, Clone, Copy, Default)]
pub struct ModPowEncryptor;

impl RowEncryptor for ModPowEncryptor {
    fn compute_row(
        &self,
        partitions: &[BigUint],
        context: &QueryContext,
        row_index: u32,
        column_offset: u64,
    ) -> EncryptResult<Vec<MatrixElement>> {
        let element = context
            .query_element(row_index)
            .ok_or(EncryptError::RowOutOfRange {
                row: row_index,
                rows: context.row_count(),
            })?;
        let modulus = context.n_squared();

        Ok(partitions
            .iter()
            .enumerate()
            .map(|(i, part)| {
                MatrixElement::new(column_offset + i as u64, element.modpow(part, modulus))
            })
            .collect())
    }
}
