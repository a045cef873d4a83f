//! Predicate compiler.
//!
//! Turns a [`ServerFilter`] into tagged predicates and renders each one as a
//! SeaQuery expression. The SQL text of every variant comes from a closed,
//! server-defined vocabulary; client input only ever reaches the statement
//! as a bound value.
//!
//! Predicates are split by the stage they run in:
//! - **inner** predicates run in the filtering stage, where the document
//!   (`d`) and its engagement aggregate (`ea`) are joined.
//! - **outer** predicates run in the projection stage over the filtered rows
//!   (`f`). They scan nested JSON arrays and are deferred until the cheaper
//!   inner predicates have narrowed the candidates.

use sea_query::{ArrayType, Cond, Expr, SimpleExpr, Value};

use super::filter::{REMOTE_REGISTRY_TYPE, REMOTE_TRANSPORTS, ServerFilter};

/// Which query stage a predicate belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Filtering stage over `documents d LEFT JOIN engagement_aggregate ea`.
    Inner,
    /// Projection stage over the `filtered f` rows.
    Outer,
}

impl Stage {
    /// The JSONB document column visible in this stage.
    fn document(self) -> &'static str {
        match self {
            Stage::Inner => "d.value",
            Stage::Outer => "f.value",
        }
    }
}

/// Scalar text fields inside the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    Category,
}

impl TextField {
    fn key(self) -> &'static str {
        match self {
            TextField::Category => "category",
        }
    }
}

/// String-array fields inside the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayField {
    Tags,
}

impl ArrayField {
    fn key(self) -> &'static str {
        match self {
            ArrayField::Tags => "tags",
        }
    }
}

/// Engagement aggregate columns usable as thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateColumn {
    Rating,
    InstallationCount,
}

impl AggregateColumn {
    fn column(self) -> &'static str {
        match self {
            AggregateColumn::Rating => "ea.rating",
            AggregateColumn::InstallationCount => "ea.installation_count",
        }
    }
}

/// Numeric threshold value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Threshold {
    Float(f64),
    Integer(i64),
}

impl From<Threshold> for Value {
    fn from(threshold: Threshold) -> Self {
        match threshold {
            Threshold::Float(v) => Value::Double(Some(v)),
            Threshold::Integer(v) => Value::BigInt(Some(v)),
        }
    }
}

/// Attributes of a package descriptor in the `packages` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageAttribute {
    /// `packages[].registryType`
    RegistryType,
    /// `packages[].transport.type`
    TransportType,
}

impl PackageAttribute {
    fn accessor(self) -> &'static str {
        match self {
            PackageAttribute::RegistryType => "pkg->>'registryType'",
            PackageAttribute::TransportType => "pkg->'transport'->>'type'",
        }
    }
}

/// A single safe filter condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Name or description contains the (already escaped) `ILIKE` pattern.
    Substring { pattern: String },
    /// Document text field equals the value.
    Equals { field: TextField, value: String },
    /// Document string array shares at least one element with `values`.
    ArrayOverlap {
        field: ArrayField,
        values: Vec<String>,
    },
    /// Aggregate column, missing rows counted as zero, is at least `threshold`.
    AtLeast {
        column: AggregateColumn,
        threshold: Threshold,
    },
    /// Some package has the attribute set to one of `values`.
    PackageExists {
        attribute: PackageAttribute,
        values: Vec<String>,
    },
    /// Some remote uses one of `transports`.
    RemoteExists { transports: Vec<String> },
    /// At least one of the nested predicates holds.
    AnyOf(Vec<Predicate>),
}

impl Predicate {
    /// The stage this predicate must run in.
    pub fn stage(&self) -> Stage {
        match self {
            Predicate::Substring { .. }
            | Predicate::Equals { .. }
            | Predicate::ArrayOverlap { .. }
            | Predicate::AtLeast { .. } => Stage::Inner,
            Predicate::PackageExists { .. } | Predicate::RemoteExists { .. } => Stage::Outer,
            Predicate::AnyOf(parts) => {
                if parts.iter().all(|p| p.stage() == Stage::Inner) {
                    Stage::Inner
                } else {
                    Stage::Outer
                }
            }
        }
    }

    /// Render as a parameterized expression for `stage`.
    pub fn to_expr(&self, stage: Stage) -> SimpleExpr {
        let doc = stage.document();
        match self {
            Predicate::Substring { pattern } => Expr::cust_with_values(
                format!("(d.name ILIKE $1 OR {doc}->>'description' ILIKE $1)"),
                [pattern.clone()],
            ),
            Predicate::Equals { field, value } => Expr::cust_with_values(
                format!("{doc}->>'{}' = $1", field.key()),
                [value.clone()],
            ),
            Predicate::ArrayOverlap { field, values } => Expr::cust_with_values(
                format!("{} ?| $1", json_array(doc, field.key())),
                [text_array(values)],
            ),
            Predicate::AtLeast { column, threshold } => Expr::cust_with_values(
                format!("COALESCE({}, 0) >= $1", column.column()),
                [Value::from(*threshold)],
            ),
            Predicate::PackageExists { attribute, values } => Expr::cust_with_values(
                format!(
                    "EXISTS (SELECT 1 FROM jsonb_array_elements({}) AS pkg WHERE {} = ANY($1))",
                    json_array(doc, "packages"),
                    attribute.accessor()
                ),
                [text_array(values)],
            ),
            Predicate::RemoteExists { transports } => Expr::cust_with_values(
                format!(
                    "EXISTS (SELECT 1 FROM jsonb_array_elements({}) AS rem WHERE rem->>'type' = ANY($1))",
                    json_array(doc, "remotes")
                ),
                [text_array(transports)],
            ),
            Predicate::AnyOf(parts) => {
                let mut cond = Cond::any();
                for part in parts {
                    cond = cond.add(part.to_expr(stage));
                }
                cond.into()
            }
        }
    }
}

/// `doc->'key'` when it is a JSON array, otherwise an empty array.
fn json_array(doc: &str, key: &str) -> String {
    format!(
        "(CASE WHEN jsonb_typeof({doc}->'{key}') = 'array' THEN {doc}->'{key}' ELSE '[]'::jsonb END)"
    )
}

/// A `TEXT[]` parameter.
fn text_array(values: &[String]) -> Value {
    Value::Array(
        ArrayType::String,
        Some(Box::new(values.iter().cloned().map(Value::from).collect())),
    )
}

/// Escape SQL LIKE wildcard characters (`%`, `_`, `\`) in a value.
pub fn escape_like_wildcards(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Compiled predicates, ordered as they will appear in the statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledPredicates {
    pub inner: Vec<Predicate>,
    pub outer: Vec<Predicate>,
}

impl CompiledPredicates {
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty() && self.outer.is_empty()
    }

    fn push(&mut self, predicate: Predicate) {
        match predicate.stage() {
            Stage::Inner => self.inner.push(predicate),
            Stage::Outer => self.outer.push(predicate),
        }
    }
}

/// Compile a filter into inner and outer predicates.
///
/// Absent or blank filter fields add nothing.
pub fn compile(filter: &ServerFilter) -> CompiledPredicates {
    let mut compiled = CompiledPredicates::default();

    if let Some(term) = filter.search_term() {
        compiled.push(Predicate::Substring {
            pattern: format!("%{}%", escape_like_wildcards(term)),
        });
    }

    if let Some(category) = filter.category_value() {
        compiled.push(Predicate::Equals {
            field: TextField::Category,
            value: category.to_string(),
        });
    }

    let tags = filter.tag_values();
    if !tags.is_empty() {
        compiled.push(Predicate::ArrayOverlap {
            field: ArrayField::Tags,
            values: tags,
        });
    }

    if let Some(rating) = filter.min_rating {
        compiled.push(Predicate::AtLeast {
            column: AggregateColumn::Rating,
            threshold: Threshold::Float(rating),
        });
    }

    if let Some(installs) = filter.min_installs {
        compiled.push(Predicate::AtLeast {
            column: AggregateColumn::InstallationCount,
            threshold: Threshold::Integer(installs),
        });
    }

    if let Some(predicate) = registry_type_predicate(&filter.registry_type_values()) {
        compiled.push(predicate);
    }

    let transports = filter.transport_type_values();
    if !transports.is_empty() {
        compiled.push(Predicate::PackageExists {
            attribute: PackageAttribute::TransportType,
            values: transports,
        });
    }

    compiled
}

/// Split registry types into explicit package types and the remote pseudo
/// type; both together are OR-ed.
fn registry_type_predicate(types: &[String]) -> Option<Predicate> {
    let wants_remote = types.iter().any(|t| t == REMOTE_REGISTRY_TYPE);
    let explicit: Vec<String> = types
        .iter()
        .filter(|t| t.as_str() != REMOTE_REGISTRY_TYPE)
        .cloned()
        .collect();

    let package = (!explicit.is_empty()).then(|| Predicate::PackageExists {
        attribute: PackageAttribute::RegistryType,
        values: explicit,
    });
    let remote = wants_remote.then(|| Predicate::RemoteExists {
        transports: REMOTE_TRANSPORTS.iter().map(|t| t.to_string()).collect(),
    });

    match (package, remote) {
        (Some(package), Some(remote)) => Some(Predicate::AnyOf(vec![package, remote])),
        (package, remote) => package.or(remote),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use sea_query::{Alias, PostgresQueryBuilder, Query, QueryStatementWriter};

    fn render(predicate: &Predicate) -> (String, Vec<Value>) {
        let stage = predicate.stage();
        let mut query = Query::select();
        query
            .expr(Expr::cust("1"))
            .from(Alias::new("t"))
            .and_where(predicate.to_expr(stage));
        let (sql, values) = query.build(PostgresQueryBuilder);
        (sql, values.0)
    }

    #[test]
    fn empty_filter_compiles_to_nothing() {
        assert!(compile(&ServerFilter::default()).is_empty());
    }

    #[test]
    fn inner_and_outer_split() {
        let filter = ServerFilter {
            search: Some("git".to_string()),
            category: Some("devtools".to_string()),
            tags: vec!["vcs".to_string()],
            min_rating: Some(4.0),
            min_installs: Some(10),
            registry_types: vec!["npm".to_string()],
            transport_types: vec!["stdio".to_string()],
        };
        let compiled = compile(&filter);
        assert_eq!(compiled.inner.len(), 5);
        assert_eq!(compiled.outer.len(), 2);
        assert!(compiled.inner.iter().all(|p| p.stage() == Stage::Inner));
        assert!(compiled.outer.iter().all(|p| p.stage() == Stage::Outer));
    }

    #[test]
    fn search_is_escaped_and_bound() {
        let filter = ServerFilter {
            search: Some("100%_done".to_string()),
            ..Default::default()
        };
        let compiled = compile(&filter);
        let (sql, values) = render(&compiled.inner[0]);

        assert!(sql.contains("ILIKE $1"), "{sql}");
        assert!(sql.contains("ILIKE $2"), "{sql}");
        assert!(!sql.contains("done"), "value leaked into SQL: {sql}");
        assert_eq!(values.len(), 2);
        assert_eq!(values[0], Value::from("%100\\%\\_done%".to_string()));
    }

    #[test]
    fn thresholds_coalesce_missing_aggregates() {
        let filter = ServerFilter {
            min_rating: Some(4.0),
            ..Default::default()
        };
        let (sql, values) = render(&compile(&filter).inner[0]);
        assert!(sql.contains("COALESCE(ea.rating, 0) >= $1"), "{sql}");
        assert_eq!(values, vec![Value::Double(Some(4.0))]);
    }

    #[test]
    fn tags_bound_as_array() {
        let filter = ServerFilter {
            tags: vec!["db".to_string(), "sql".to_string()],
            ..Default::default()
        };
        let (sql, values) = render(&compile(&filter).inner[0]);
        assert!(sql.contains("?| $1"), "{sql}");
        assert_eq!(values.len(), 1);
        assert!(matches!(values[0], Value::Array(ArrayType::String, Some(ref items)) if items.len() == 2));
    }

    #[test]
    fn registry_types_split_remote_pseudo_type() {
        let only_remote = registry_type_predicate(&["remote".to_string()]).unwrap();
        assert!(matches!(only_remote, Predicate::RemoteExists { .. }));

        let only_npm = registry_type_predicate(&["npm".to_string()]).unwrap();
        assert!(matches!(
            only_npm,
            Predicate::PackageExists {
                attribute: PackageAttribute::RegistryType,
                ..
            }
        ));

        let both = registry_type_predicate(&["npm".to_string(), "remote".to_string()]).unwrap();
        let (sql, values) = render(&both);
        assert!(sql.contains(" OR "), "{sql}");
        assert!(sql.contains("registryType"), "{sql}");
        assert!(sql.contains("rem->>'type'"), "{sql}");
        assert_eq!(values.len(), 2);

        assert!(registry_type_predicate(&[]).is_none());
    }

    #[test]
    fn outer_predicates_read_filtered_rows() {
        let filter = ServerFilter {
            transport_types: vec!["stdio".to_string()],
            ..Default::default()
        };
        let (sql, _) = render(&compile(&filter).outer[0]);
        assert!(sql.contains("f.value->'packages'"), "{sql}");
        assert!(sql.contains("pkg->'transport'->>'type' = ANY($1)"), "{sql}");
    }

    #[test]
    fn metacharacters_only_appear_as_values() {
        let payload = "'; DROP TABLE documents--";
        let filter = ServerFilter {
            search: Some(payload.to_string()),
            category: Some(payload.to_string()),
            tags: vec![payload.to_string()],
            registry_types: vec![payload.to_string()],
            transport_types: vec![payload.to_string()],
            ..Default::default()
        };
        let compiled = compile(&filter);
        for predicate in compiled.inner.iter().chain(compiled.outer.iter()) {
            let (sql, _) = render(predicate);
            assert!(!sql.contains("DROP TABLE"), "payload leaked: {sql}");
        }
    }

    #[test]
    fn escape_like_wildcards_function() {
        assert_eq!(escape_like_wildcards("hello"), "hello");
        assert_eq!(escape_like_wildcards("100%"), "100\\%");
        assert_eq!(escape_like_wildcards("a_b"), "a\\_b");
        assert_eq!(escape_like_wildcards("a\\b"), "a\\\\b");
    }
}
