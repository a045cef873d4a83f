//! Two-stage query plan builder.
//!
//! The filtering stage joins latest documents with their engagement
//! aggregate and applies the inner predicates. The projection stage reads the
//! filtered rows, applies the outer predicates, the sort and pagination, and
//! carries `COUNT(*) OVER()` so each row knows the total match count.
//!
//! Both stages are rendered separately by SeaQuery, each numbering its own
//! placeholders from `$1`. The projection's placeholders are shifted past the
//! filtering stage's before the two are joined as
//! `WITH filtered AS (<filtering>) <projection>`.

use sea_query::{
    Alias, Expr, JoinType, PostgresQueryBuilder, Query, QueryStatementWriter, SelectStatement,
    Value, Values,
};

use super::filter::ServerFilter;
use super::predicate::{CompiledPredicates, Stage, compile};
use super::sort::{self, SortOrder};
use crate::error::CatalogResult;

/// SQL text plus its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundQuery {
    pub sql: String,
    pub values: Vec<Value>,
}

/// The statements needed to answer one listing request.
#[derive(Debug, Clone)]
pub struct ListingPlan {
    /// Page of rows with a window total.
    pub page: BoundQuery,
    /// Total match count, for pages that come back empty.
    pub count: BoundQuery,
    pub sort: SortOrder,
    pub limit: u64,
    pub offset: u64,
}

/// Largest `LIMIT`/`OFFSET` PostgreSQL accepts as a `BIGINT` parameter.
const MAX_PAGING: u64 = i64::MAX as u64;

/// What the projection stage returns.
enum Projection<'a> {
    Rows {
        sort: &'a SortOrder,
        limit: Option<u64>,
        offset: u64,
    },
    Count,
}

/// Build the page and count statements for a listing request.
///
/// The sort token is resolved first; an unknown token fails before anything
/// is built. `limit` is expected to be clamped by the caller. An offset past
/// the `BIGINT` range is bound as the largest one, which still matches no row.
pub fn build_listing(
    filter: &ServerFilter,
    sort_token: &str,
    limit: u64,
    offset: u64,
) -> CatalogResult<ListingPlan> {
    let sort = sort::resolve(sort_token)?;
    let compiled = compile(filter);
    let limit = limit.min(MAX_PAGING);
    let offset = offset.min(MAX_PAGING);

    let page = compose(
        filtering_stage(&compiled, None),
        projection_stage(
            &compiled,
            Projection::Rows {
                sort: &sort,
                limit: Some(limit),
                offset,
            },
        ),
    );
    let count = compose(
        filtering_stage(&compiled, None),
        projection_stage(&compiled, Projection::Count),
    );

    tracing::debug!(
        sort = sort.token,
        inner = compiled.inner.len(),
        outer = compiled.outer.len(),
        params = page.values.len(),
        "built listing plan"
    );

    Ok(ListingPlan {
        page,
        count,
        sort,
        limit,
        offset,
    })
}

/// Every latest document in the default order, without pagination.
pub fn build_collection() -> CatalogResult<BoundQuery> {
    let sort = sort::resolve(sort::DEFAULT_SORT)?;
    let compiled = CompiledPredicates::default();
    Ok(compose(
        filtering_stage(&compiled, None),
        projection_stage(
            &compiled,
            Projection::Rows {
                sort: &sort,
                limit: None,
                offset: 0,
            },
        ),
    ))
}

/// The latest document with exactly this name.
pub fn build_lookup(name: &str) -> BoundQuery {
    let compiled = CompiledPredicates::default();
    let sort = SortOrder {
        token: "lookup",
        keys: &[],
    };
    compose(
        filtering_stage(&compiled, Some(name)),
        projection_stage(
            &compiled,
            Projection::Rows {
                sort: &sort,
                limit: Some(1),
                offset: 0,
            },
        ),
    )
}

fn filtering_stage(compiled: &CompiledPredicates, name: Option<&str>) -> SelectStatement {
    let mut query = Query::select();
    query
        .expr(Expr::cust("d.name"))
        .expr(Expr::cust("d.value"))
        .expr(Expr::cust("d.published_at"))
        .expr(Expr::cust("d.updated_at"))
        .expr_as(
            Expr::cust("COALESCE(ea.rating, 0)::float8"),
            Alias::new("rating"),
        )
        .expr_as(
            Expr::cust("COALESCE(ea.rating_count, 0)::bigint"),
            Alias::new("rating_count"),
        )
        .expr_as(
            Expr::cust("COALESCE(ea.installation_count, 0)::bigint"),
            Alias::new("installation_count"),
        )
        .from_as(Alias::new("documents"), Alias::new("d"))
        .join_as(
            JoinType::LeftJoin,
            Alias::new("engagement_aggregate"),
            Alias::new("ea"),
            Expr::cust("ea.document_id = d.name"),
        )
        .and_where(Expr::cust("d.is_latest"));

    if let Some(name) = name {
        query.and_where(Expr::cust_with_values("d.name = $1", [name.to_string()]));
    }

    for predicate in &compiled.inner {
        query.and_where(predicate.to_expr(Stage::Inner));
    }

    query
}

fn projection_stage(compiled: &CompiledPredicates, projection: Projection<'_>) -> SelectStatement {
    let mut query = Query::select();

    match &projection {
        Projection::Rows { .. } => {
            query
                .expr(Expr::cust("f.name"))
                .expr_as(Expr::cust("f.value::text"), Alias::new("value"))
                .expr(Expr::cust("f.published_at"))
                .expr(Expr::cust("f.updated_at"))
                .expr(Expr::cust("f.rating"))
                .expr(Expr::cust("f.rating_count"))
                .expr(Expr::cust("f.installation_count"))
                .expr_as(Expr::cust("COUNT(*) OVER()"), Alias::new("total_count"));
        }
        Projection::Count => {
            query.expr_as(Expr::cust("COUNT(*)"), Alias::new("total"));
        }
    }

    query.from_as(Alias::new("filtered"), Alias::new("f"));

    for predicate in &compiled.outer {
        query.and_where(predicate.to_expr(Stage::Outer));
    }

    if let Projection::Rows {
        sort,
        limit,
        offset,
    } = projection
    {
        sort.apply(&mut query);
        if let Some(limit) = limit {
            query.limit(limit);
        }
        if offset > 0 {
            query.offset(offset);
        }
    }

    query
}

/// Render both stages and splice them into one statement.
fn compose(filtering: SelectStatement, projection: SelectStatement) -> BoundQuery {
    let (inner_sql, Values(mut values)) = filtering.build(PostgresQueryBuilder);
    let (outer_sql, Values(outer_values)) = projection.build(PostgresQueryBuilder);

    let outer_sql = shift_placeholders(&outer_sql, values.len());
    values.extend(outer_values);

    BoundQuery {
        sql: format!("WITH filtered AS ({inner_sql}) {outer_sql}"),
        values,
    }
}

/// Renumber every `$n` placeholder in `sql` to `$(n + by)`.
///
/// Whole digit runs are parsed as one index, so `$1` and `$10` never get
/// confused. Text inside single-quoted literals and double-quoted
/// identifiers is copied untouched.
pub fn shift_placeholders(sql: &str, by: usize) -> String {
    if by == 0 {
        return sql.to_string();
    }

    let mut out = String::with_capacity(sql.len() + 8);
    let mut chars = sql.chars().peekable();
    let mut quote: Option<char> = None;
    let mut prev: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            prev = Some(c);
            continue;
        }

        match c {
            '\'' | '"' => {
                quote = Some(c);
                out.push(c);
            }
            '$' if !prev.is_some_and(|p| p.is_alphanumeric() || p == '_') => {
                let mut digits = String::new();
                while let Some(&d) = chars.peek() {
                    if !d.is_ascii_digit() {
                        break;
                    }
                    digits.push(d);
                    chars.next();
                }
                match digits.parse::<usize>() {
                    Ok(n) => {
                        out.push('$');
                        out.push_str(&(n + by).to_string());
                    }
                    Err(_) => {
                        out.push('$');
                        out.push_str(&digits);
                    }
                }
                prev = digits.chars().last().or(Some('$'));
                continue;
            }
            _ => out.push(c),
        }
        prev = Some(c);
    }

    out
}
