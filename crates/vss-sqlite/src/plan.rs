//! Query plan selection
//!
//! Routing is purely syntactic: a usable `vss_search(col, ..)` or
//! `vss_range_search(col, ..)` constraint on a vector column always wins over
//! the full scan, whatever the table size.

use std::os::raw::c_int;
use vss_core::{Result, VssError};

use crate::columns::FIRST_VECTOR_COLUMN;

/// Constraint operator `xFindFunction` returns for `vss_search`
pub const SEARCH_FUNCTION_OP: u8 = 150;
/// Constraint operator `xFindFunction` returns for `vss_range_search`
pub const RANGE_SEARCH_FUNCTION_OP: u8 = 151;

const INDEXED_COST: f64 = 300.0;
const INDEXED_ROWS: i64 = 10;
const FULLSCAN_COST: f64 = 3_000_000.0;
const FULLSCAN_ROWS: i64 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStrategy {
    /// k-nearest-neighbour search on vector column `n`
    Search(usize),
    /// Radius search on vector column `n`
    RangeSearch(usize),
    /// Every row id in the data table
    Fullscan,
}

impl ScanStrategy {
    pub fn idx_num(&self) -> c_int {
        match self {
            ScanStrategy::Search(n) | ScanStrategy::RangeSearch(n) => *n as c_int,
            ScanStrategy::Fullscan => -1,
        }
    }

    pub fn idx_str(&self) -> &'static str {
        match self {
            ScanStrategy::Search(_) => "search",
            ScanStrategy::RangeSearch(_) => "range_search",
            ScanStrategy::Fullscan => "fullscan",
        }
    }

    pub fn estimated_cost(&self) -> f64 {
        match self {
            ScanStrategy::Fullscan => FULLSCAN_COST,
            _ => INDEXED_COST,
        }
    }

    pub fn estimated_rows(&self) -> i64 {
        match self {
            ScanStrategy::Fullscan => FULLSCAN_ROWS,
            _ => INDEXED_ROWS,
        }
    }

    /// Recover the strategy `xBestIndex` encoded.
    pub fn decode(idx_num: c_int, idx_str: Option<&str>, columns: usize) -> Result<Self> {
        let column = || {
            usize::try_from(idx_num)
                .ok()
                .filter(|n| *n < columns)
                .ok_or_else(|| VssError::InvalidState(format!("plan names unknown column {idx_num}")))
        };
        match idx_str {
            Some("search") => Ok(ScanStrategy::Search(column()?)),
            Some("range_search") => Ok(ScanStrategy::RangeSearch(column()?)),
            Some("fullscan") => Ok(ScanStrategy::Fullscan),
            other => Err(VssError::InvalidState(format!(
                "unhandled idxStr {}",
                other.unwrap_or("(null)")
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Search,
    RangeSearch,
    Limit,
    Other,
}

/// What the selector needs to know about one `aConstraint` entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstraintShape {
    pub column: c_int,
    pub kind: ConstraintKind,
    pub usable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    pub strategy: ScanStrategy,
    /// Constraint passed to xFilter as argv 1
    pub query_constraint: Option<usize>,
    /// LIMIT constraint passed to xFilter as argv 2 (search only)
    pub limit_constraint: Option<usize>,
}

pub fn select(constraints: &[ConstraintShape], vector_columns: usize) -> Plan {
    let vector_column = |column: c_int| {
        usize::try_from(column - FIRST_VECTOR_COLUMN)
            .ok()
            .filter(|n| *n < vector_columns)
    };

    for (i, constraint) in constraints.iter().enumerate() {
        if !constraint.usable {
            continue;
        }
        let Some(column) = vector_column(constraint.column) else {
            continue;
        };
        match constraint.kind {
            ConstraintKind::Search => {
                let limit_constraint = constraints
                    .iter()
                    .position(|c| c.usable && c.kind == ConstraintKind::Limit);
                return Plan {
                    strategy: ScanStrategy::Search(column),
                    query_constraint: Some(i),
                    limit_constraint,
                };
            }
            ConstraintKind::RangeSearch => {
                return Plan {
                    strategy: ScanStrategy::RangeSearch(column),
                    query_constraint: Some(i),
                    limit_constraint: None,
                };
            }
            _ => {}
        }
    }

    Plan {
        strategy: ScanStrategy::Fullscan,
        query_constraint: None,
        limit_constraint: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(column: c_int, kind: ConstraintKind) -> ConstraintShape {
        ConstraintShape {
            column,
            kind,
            usable: true,
        }
    }

    #[test]
    fn test_search_with_limit() {
        let plan = select(
            &[
                shape(-1, ConstraintKind::Other),
                shape(3, ConstraintKind::Search),
                shape(0, ConstraintKind::Limit),
            ],
            2,
        );
        assert_eq!(plan.strategy, ScanStrategy::Search(1));
        assert_eq!(plan.query_constraint, Some(1));
        assert_eq!(plan.limit_constraint, Some(2));
        assert_eq!(plan.strategy.idx_num(), 1);
        assert_eq!(plan.strategy.idx_str(), "search");
        assert_eq!(plan.strategy.estimated_cost(), 300.0);
    }

    #[test]
    fn test_range_search_ignores_limit() {
        let plan = select(
            &[
                shape(2, ConstraintKind::RangeSearch),
                shape(0, ConstraintKind::Limit),
            ],
            1,
        );
        assert_eq!(plan.strategy, ScanStrategy::RangeSearch(0));
        assert_eq!(plan.limit_constraint, None);
    }

    #[test]
    fn test_falls_back_to_fullscan() {
        let unusable = ConstraintShape {
            usable: false,
            ..shape(2, ConstraintKind::Search)
        };
        for constraints in [
            vec![],
            vec![unusable],
            vec![shape(0, ConstraintKind::Search)],
            vec![shape(4, ConstraintKind::Search)],
        ] {
            let plan = select(&constraints, 2);
            assert_eq!(plan.strategy, ScanStrategy::Fullscan);
            assert_eq!(plan.strategy.idx_num(), -1);
            assert_eq!(plan.strategy.estimated_rows(), 100_000);
        }
    }

    #[test]
    fn test_decode_roundtrip_and_errors() {
        for strategy in [
            ScanStrategy::Search(1),
            ScanStrategy::RangeSearch(0),
            ScanStrategy::Fullscan,
        ] {
            let decoded =
                ScanStrategy::decode(strategy.idx_num(), Some(strategy.idx_str()), 2).unwrap();
            assert_eq!(decoded, strategy);
        }
        assert!(ScanStrategy::decode(5, Some("search"), 2).is_err());
        assert!(ScanStrategy::decode(0, Some("bogus"), 2).is_err());
        assert!(ScanStrategy::decode(0, None, 2).is_err());
    }
}
