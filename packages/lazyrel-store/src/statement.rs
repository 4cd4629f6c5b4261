//! Statements accepted by a [`Connection`](crate::Connection).
//!
//! Every executed statement is one round-trip. Statements render as SQL
//! text for logging.

use std::fmt;

use crate::value::Value;

/// Row filter for `Select`.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Every row
    All,
    /// `column = value`
    Eq { column: String, value: Value },
    /// `column in (values)`
    In { column: String, values: Vec<Value> },
    /// `exists (select 1 from table where table.column = <outer>.id and filter)`
    Exists {
        table: String,
        column: String,
        filter: Box<Filter>,
    },
    /// `column in (select table.id from table where filter)`
    InSelect {
        column: String,
        table: String,
        filter: Box<Filter>,
    },
    /// Conjunction
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn is_in(column: impl Into<String>, values: Vec<Value>) -> Self {
        Filter::In {
            column: column.into(),
            values,
        }
    }

    pub fn exists(table: impl Into<String>, column: impl Into<String>, filter: Filter) -> Self {
        Filter::Exists {
            table: table.into(),
            column: column.into(),
            filter: Box::new(filter),
        }
    }

    pub fn in_select(column: impl Into<String>, table: impl Into<String>, filter: Filter) -> Self {
        Filter::InSelect {
            column: column.into(),
            table: table.into(),
            filter: Box::new(filter),
        }
    }

    /// Adds a conjunct, flattening nested `And`s and dropping `All`.
    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Filter::All, other) => other,
            (this, Filter::All) => this,
            (Filter::And(mut parts), Filter::And(more)) => {
                parts.extend(more);
                Filter::And(parts)
            }
            (Filter::And(mut parts), other) => {
                parts.push(other);
                Filter::And(parts)
            }
            (this, other) => Filter::And(vec![this, other]),
        }
    }

    fn write_sql(&self, out: &mut String, outer: &str) {
        match self {
            Filter::All => out.push_str("true"),
            Filter::Eq { column, value } => {
                out.push_str(&format!("{}.{} = {}", outer, column, value.to_sql_literal()));
            }
            Filter::In { column, values } => {
                let list: Vec<String> = values.iter().map(Value::to_sql_literal).collect();
                out.push_str(&format!("{}.{} in ({})", outer, column, list.join(", ")));
            }
            Filter::Exists { table, column, filter } => {
                out.push_str(&format!(
                    "exists (select 1 from {} where {}.{} = {}.id",
                    table, table, column, outer
                ));
                if **filter != Filter::All {
                    out.push_str(" and ");
                    filter.write_sql(out, table);
                }
                out.push(')');
            }
            Filter::InSelect { column, table, filter } => {
                out.push_str(&format!(
                    "{}.{} in (select {}.id from {}",
                    outer, column, table, table
                ));
                if **filter != Filter::All {
                    out.push_str(" where ");
                    filter.write_sql(out, table);
                }
                out.push(')');
            }
            Filter::And(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        out.push_str(" and ");
                    }
                    part.write_sql(out, outer);
                }
            }
        }
    }
}

/// A single store round-trip.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Inserts a row; the key is generated by the table sequence.
    Insert {
        table: String,
        columns: Vec<String>,
        values: Vec<Value>,
    },
    /// Updates the row with the given key.
    Update {
        table: String,
        id: i64,
        assignments: Vec<(String, Value)>,
    },
    /// Reads rows. An empty column list selects every column.
    Select {
        table: String,
        columns: Vec<String>,
        filter: Filter,
        limit: Option<usize>,
    },
}

impl Statement {
    pub fn select(table: impl Into<String>, filter: Filter) -> Self {
        Statement::Select {
            table: table.into(),
            columns: Vec::new(),
            filter,
            limit: None,
        }
    }

    /// `Select` of the named columns, in that order.
    pub fn select_columns(table: impl Into<String>, columns: Vec<String>, filter: Filter) -> Self {
        Statement::Select {
            table: table.into(),
            columns,
            filter,
            limit: None,
        }
    }

    /// Target table.
    pub fn table(&self) -> &str {
        match self {
            Statement::Insert { table, .. }
            | Statement::Update { table, .. }
            | Statement::Select { table, .. } => table,
        }
    }

    /// Renders the statement as SQL, one clause per line when `pretty`.
    pub fn to_sql(&self, pretty: bool) -> String {
        let sep = if pretty { "\n    " } else { " " };
        match self {
            Statement::Insert { table, columns, values } => {
                let values: Vec<String> = values.iter().map(Value::to_sql_literal).collect();
                format!(
                    "insert into {}{}({}){}values ({})",
                    table,
                    sep,
                    columns.join(", "),
                    sep,
                    values.join(", ")
                )
            }
            Statement::Update { table, id, assignments } => {
                let sets: Vec<String> = assignments
                    .iter()
                    .map(|(column, value)| format!("{} = {}", column, value.to_sql_literal()))
                    .collect();
                format!("update {}{}set {}{}where id = {}", table, sep, sets.join(", "), sep, id)
            }
            Statement::Select {
                table,
                columns,
                filter,
                limit,
            } => {
                let projection = if columns.is_empty() {
                    format!("{}.*", table)
                } else {
                    columns
                        .iter()
                        .map(|c| format!("{}.{}", table, c))
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                let mut sql = format!("select {}{}from {}", projection, sep, table);
                if *filter != Filter::All {
                    sql.push_str(sep);
                    sql.push_str("where ");
                    filter.write_sql(&mut sql, table);
                }
                if let Some(limit) = limit {
                    sql.push_str(&format!("{}limit {}", sep, limit));
                }
                sql
            }
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql(false))
    }
}
