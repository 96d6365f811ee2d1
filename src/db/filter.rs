//! Filter construction for list queries
//!
//! Builds a `WHERE` clause with positional binds. Column names are `&'static
//! str` so only compile-time identifiers reach the SQL text; all values go
//! through binds.

use sqlx::sqlite::SqliteArguments;
use sqlx::query::QueryAs;
use sqlx::Sqlite;

pub const DEFAULT_LIMIT: u32 = 50;
pub const MAX_LIMIT: u32 = 200;

/// Query filter builder
#[derive(Debug, Clone, Default)]
pub struct Filter {
    conditions: Vec<String>,
    binds: Vec<String>,
    limit: Option<u32>,
    offset: Option<u32>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `column = ?`
    pub fn equals(mut self, column: &'static str, value: impl Into<String>) -> Self {
        self.conditions.push(format!("{} = ?", column));
        self.binds.push(value.into());
        self
    }

    /// `column = ?` when a value is present
    pub fn equals_opt<V: Into<String>>(self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.equals(column, v),
            None => self,
        }
    }

    /// Case-insensitive substring match across several columns, OR-ed together
    pub fn search(mut self, columns: &[&'static str], term: Option<&str>) -> Self {
        let Some(term) = term.map(str::trim).filter(|t| !t.is_empty()) else {
            return self;
        };
        if columns.is_empty() {
            return self;
        }

        let pattern = format!("%{}%", escape_like(&term.to_lowercase()));
        let clause = columns
            .iter()
            .map(|c| format!("LOWER({}) LIKE ? ESCAPE '\\'", c))
            .collect::<Vec<_>>()
            .join(" OR ");

        self.conditions.push(format!("({})", clause));
        for _ in columns {
            self.binds.push(pattern.clone());
        }
        self
    }

    /// `column IS NULL` / `column IS NOT NULL`
    pub fn is_null(mut self, column: &'static str, is_null: bool) -> Self {
        let op = if is_null { "IS NULL" } else { "IS NOT NULL" };
        self.conditions.push(format!("{} {}", column, op));
        self
    }

    pub fn paginate(mut self, limit: Option<u32>, offset: Option<u32>) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    fn build_where(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditions.join(" AND "))
        }
    }

    /// Assemble `{select}{where} ORDER BY {order_by} LIMIT ? OFFSET ?`
    pub fn build(&self, select: &str, order_by: &str) -> String {
        format!(
            "{}{} ORDER BY {} LIMIT ? OFFSET ?",
            select.trim_end(),
            self.build_where(),
            order_by
        )
    }

    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn effective_offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }

    /// Apply the filter values, then limit and offset, to a query built from
    /// [`Filter::build`]
    pub fn bind_to<'q, O>(
        self,
        mut query: QueryAs<'q, Sqlite, O, SqliteArguments<'q>>,
    ) -> QueryAs<'q, Sqlite, O, SqliteArguments<'q>> {
        let limit = i64::from(self.effective_limit());
        let offset = i64::from(self.effective_offset());

        for value in self.binds {
            query = query.bind(value);
        }
        query.bind(limit).bind(offset)
    }
}

fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
