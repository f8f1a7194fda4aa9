//! Query context and its once-initialised shared cell
//!
//! The context is built once per process from startup configuration and is
//! never mutated afterwards. Every accumulator instance receives the same
//! `Arc<QueryContext>`.

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use num_bigint::BigUint;

use super::errors::{QueryError, QueryResult};
use super::info::QueryInfo;
use crate::config::QueryConfig;
use crate::observability::{log_event_with_fields, Event};

/// Read-only state consumed by the encryption primitive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryContext {
    info: QueryInfo,
    query_elements: Vec<BigUint>,
    n_squared: BigUint,
}

impl QueryContext {
    /// Build the context, validating every numeric field
    pub fn build(config: &QueryConfig) -> QueryResult<Self> {
        config
            .validate()
            .map_err(|e| QueryError::InvalidParameters(e.to_string()))?;

        let n = BigUint::from_str(config.modulus.trim())
            .map_err(|e| QueryError::InvalidModulus(e.to_string()))?;
        if n <= BigUint::from(1u32) {
            return Err(QueryError::InvalidModulus("modulus must be > 1".into()));
        }
        let n_squared = &n * &n;

        let mut query_elements = Vec::with_capacity(config.query_elements.len());
        for (row, raw) in config.query_elements.iter().enumerate() {
            let element = BigUint::from_str(raw.trim()).map_err(|e| QueryError::InvalidElement {
                row,
                reason: e.to_string(),
            })?;
            if element == BigUint::default() || element >= n_squared {
                return Err(QueryError::InvalidElement {
                    row,
                    reason: "element must be in (0, N^2)".into(),
                });
            }
            query_elements.push(element);
        }

        Ok(Self {
            info: QueryInfo::from_config(config),
            query_elements,
            n_squared,
        })
    }

    pub fn info(&self) -> &QueryInfo {
        &self.info
    }

    /// Query element for a row, `None` outside the table
    pub fn query_element(&self, row_index: u32) -> Option<&BigUint> {
        self.query_elements.get(row_index as usize)
    }

    /// Ciphertext modulus
    pub fn n_squared(&self) -> &BigUint {
        &self.n_squared
    }

    pub fn row_count(&self) -> usize {
        self.query_elements.len()
    }
}

/// Process-wide, mutex-guarded lazy slot for the query context.
///
/// The first caller of [`SharedQueryContext::get_or_init`] builds the
/// context; every later caller gets the same `Arc`. A failed build leaves
/// the slot empty.
#[derive(Debug, Default)]
pub struct SharedQueryContext {
    slot: Mutex<Option<Arc<QueryContext>>>,
}

impl SharedQueryContext {
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    pub fn get_or_init(&self, config: &QueryConfig) -> QueryResult<Arc<QueryContext>> {
        // The context is immutable, so a poisoned guard still holds a
        // consistent value.
        let mut slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(ctx) = slot.as_ref() {
            return Ok(Arc::clone(ctx));
        }

        let ctx = Arc::new(QueryContext::build(config)?);
        log_event_with_fields(
            Event::QueryContextBuilt,
            &[
                ("rows", &ctx.row_count().to_string()),
                ("hash_bit_size", &config.hash_bit_size.to_string()),
            ],
        );
        *slot = Some(Arc::clone(&ctx));
        Ok(ctx)
    }

    /// Already-built context, if any
    pub fn get(&self) -> Option<Arc<QueryContext>> {
        self.slot
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .map(Arc::clone)
    }
}
