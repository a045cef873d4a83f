//! Sort token whitelist.
//!
//! Every token maps to a fixed ORDER BY over the projection stage (`f`).
//! Ties always fall back to the document name so paging is stable.

use sea_query::{Expr, Order, SelectStatement};

use crate::error::{CatalogError, CatalogResult};

/// Token used when the client sends none.
pub const DEFAULT_SORT: &str = "newest";

/// One ORDER BY term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub expr: &'static str,
    pub descending: bool,
}

const fn asc(expr: &'static str) -> SortKey {
    SortKey {
        expr,
        descending: false,
    }
}

const fn desc(expr: &'static str) -> SortKey {
    SortKey {
        expr,
        descending: true,
    }
}

/// A resolved sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOrder {
    pub token: &'static str,
    pub keys: &'static [SortKey],
}

const QUALITY_EXPR: &str = "ROUND((LEAST(f.rating * 8, 40) \
     + LEAST(log(f.rating_count::float8 + 1) * 10, 30) \
     + LEAST(log(f.installation_count::float8 + 1) * 10, 30))::numeric, 1)";

const TRENDING_EXPR: &str = "(f.installation_count * 0.5 + f.rating_count * 2 + f.rating * 10 \
     + CASE \
         WHEN f.published_at >= NOW() - INTERVAL '7 days' THEN 30 \
         WHEN f.published_at >= NOW() - INTERVAL '30 days' THEN 15 \
         WHEN f.published_at >= NOW() - INTERVAL '90 days' THEN 5 \
         ELSE 0 \
       END)";

const NAME_ASC: SortKey = asc("f.name");

static SORTS: &[SortOrder] = &[
    SortOrder {
        token: "newest",
        keys: &[desc("f.published_at"), NAME_ASC],
    },
    SortOrder {
        token: "oldest",
        keys: &[asc("f.published_at"), NAME_ASC],
    },
    SortOrder {
        token: "name_asc",
        keys: &[NAME_ASC],
    },
    SortOrder {
        token: "name_desc",
        keys: &[desc("f.name")],
    },
    SortOrder {
        token: "updated_desc",
        keys: &[desc("f.updated_at"), NAME_ASC],
    },
    SortOrder {
        token: "rating_desc",
        keys: &[desc("f.rating"), desc("f.rating_count"), NAME_ASC],
    },
    SortOrder {
        token: "rating_asc",
        keys: &[asc("f.rating"), asc("f.rating_count"), NAME_ASC],
    },
    SortOrder {
        token: "installs_desc",
        keys: &[desc("f.installation_count"), NAME_ASC],
    },
    SortOrder {
        token: "reviews_desc",
        keys: &[desc("f.rating_count"), desc("f.rating"), NAME_ASC],
    },
    SortOrder {
        token: "quality_desc",
        keys: &[desc(QUALITY_EXPR), NAME_ASC],
    },
    SortOrder {
        token: "trending",
        keys: &[desc(TRENDING_EXPR), NAME_ASC],
    },
];

/// All accepted tokens, in table order.
pub fn valid_tokens() -> Vec<&'static str> {
    SORTS.iter().map(|s| s.token).collect()
}

/// Resolve a client token. Blank means [`DEFAULT_SORT`].
pub fn resolve(token: &str) -> CatalogResult<SortOrder> {
    let token = token.trim();
    let wanted = if token.is_empty() { DEFAULT_SORT } else { token };

    SORTS
        .iter()
        .find(|s| s.token == wanted)
        .copied()
        .ok_or_else(|| CatalogError::InvalidSort {
            token: token.to_string(),
            valid: valid_tokens(),
        })
}

impl SortOrder {
    /// Whether this is the default order the cached collection is kept in.
    pub fn is_default(&self) -> bool {
        self.token == DEFAULT_SORT
    }

    /// Append the ORDER BY terms to `query`.
    pub fn apply(&self, query: &mut SelectStatement) {
        for key in self.keys {
            let order = if key.descending {
                Order::Desc
            } else {
                Order::Asc
            };
            query.order_by_expr(Expr::cust(key.expr), order);
        }
    }
}
