//! Query templates and parameter binding.
//!
//! A [`Template`] is scanned once; every [`ParameterizedQuery`] built from it
//! shares the rendered SQL, so a batch of parameter sets never re-parses.

mod binder;
mod scanner;

use std::sync::Arc;

use crate::error::PgMiddlewareError;
use crate::types::RowValues;

pub use binder::{BindOptions, Binder, BoundParam, BoundStatement};
pub use scanner::{MAX_PARAMETERS, PlaceholderStyle};

#[derive(Debug)]
struct TemplateInner {
    source: String,
    rendered: Arc<str>,
    style: Option<PlaceholderStyle>,
    slots: usize,
    code_end: usize,
}

/// A parsed SQL template with positional parameter slots.
///
/// ```rust
/// use pg_middleware::prelude::*;
///
/// let t = Template::parse("select * from hosts where addr = ? and id > ?")?;
/// assert_eq!(t.placeholder_count(), 2);
/// assert_eq!(t.sql(), "select * from hosts where addr = $1 and id > $2");
/// # Ok::<(), PgMiddlewareError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Template {
    inner: Arc<TemplateInner>,
}

impl Template {
    /// Scan `sql` for `?` or `$N` placeholders.
    ///
    /// # Errors
    /// Returns `PgMiddlewareError::ParameterError` when the template mixes
    /// placeholder styles, skips a `$N` number or needs more than
    /// [`MAX_PARAMETERS`] parameters.
    pub fn parse(sql: &str) -> Result<Self, PgMiddlewareError> {
        let scanned = scanner::scan(sql)?;
        Ok(Self {
            inner: Arc::new(TemplateInner {
                source: sql.to_string(),
                rendered: Arc::from(scanned.rendered),
                style: scanned.style,
                slots: scanned.slots,
                code_end: scanned.code_end,
            }),
        })
    }

    /// The SQL as written by the caller.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.inner.source
    }

    /// The SQL with `$N` markers, as sent to the server.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.inner.rendered
    }

    pub(crate) fn shared_sql(&self) -> Arc<str> {
        Arc::clone(&self.inner.rendered)
    }

    /// Rendered SQL split after its last code token; the tail holds only
    /// whitespace, `;` and comments.
    pub(crate) fn split_code(&self) -> (&str, &str) {
        self.inner.rendered.split_at(self.inner.code_end)
    }

    #[must_use]
    pub fn placeholder_count(&self) -> usize {
        self.inner.slots
    }

    #[must_use]
    pub fn style(&self) -> Option<PlaceholderStyle> {
        self.inner.style
    }

    /// Whether two templates render to the same statement.
    #[must_use]
    pub fn same_shape(&self, other: &Template) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) || self.inner.rendered == other.inner.rendered
    }
}

/// A template bound to its ordered parameters. Immutable once built.
///
/// ```rust
/// use pg_middleware::prelude::*;
///
/// let q = ParameterizedQuery::new(
///     "INSERT INTO t(a,b) VALUES ($1,$2)",
///     vec![RowValues::Int(42), TypedValue::inet("192.168.1.1")?.into()],
/// )?;
/// assert_eq!(q.params().len(), 2);
///
/// let err = ParameterizedQuery::new("select $1", vec![]).unwrap_err();
/// assert!(matches!(err, PgMiddlewareError::ParameterCountMismatch { expected: 1, actual: 0 }));
/// # Ok::<(), PgMiddlewareError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ParameterizedQuery {
    template: Template,
    params: Vec<RowValues>,
    generated_keys: Option<Vec<String>>,
}

impl ParameterizedQuery {
    /// Parse `sql` and bind `params` to it.
    ///
    /// # Errors
    /// Returns `ParameterError` for a malformed template and
    /// `ParameterCountMismatch` when the parameter count differs from the
    /// number of placeholders.
    pub fn new(sql: &str, params: Vec<RowValues>) -> Result<Self, PgMiddlewareError> {
        Self::from_template(&Template::parse(sql)?, params)
    }

    /// Bind `params` to an already parsed template.
    ///
    /// # Errors
    /// Returns `ParameterCountMismatch` when the parameter count differs from
    /// the number of placeholders.
    pub fn from_template(
        template: &Template,
        params: Vec<RowValues>,
    ) -> Result<Self, PgMiddlewareError> {
        let expected = template.placeholder_count();
        if params.len() != expected {
            return Err(PgMiddlewareError::ParameterCountMismatch {
                expected,
                actual: params.len(),
            });
        }
        Ok(Self {
            template: template.clone(),
            params,
            generated_keys: None,
        })
    }

    /// Ask the server to return `columns` of each affected row.
    ///
    /// # Errors
    /// Returns `ParameterError` if a column name is empty or not a plain identifier.
    pub fn with_generated_keys<S: AsRef<str>>(
        mut self,
        columns: &[S],
    ) -> Result<Self, PgMiddlewareError> {
        let mut keys = Vec::with_capacity(columns.len());
        for col in columns {
            let col = col.as_ref().trim();
            let valid = !col.is_empty()
                && !col.starts_with(|c: char| c.is_ascii_digit())
                && col.chars().all(|c| c.is_alphanumeric() || c == '_');
            if !valid {
                return Err(PgMiddlewareError::ParameterError(format!(
                    "invalid generated key column '{col}'"
                )));
            }
            keys.push(col.to_string());
        }
        if keys.is_empty() {
            return Err(PgMiddlewareError::ParameterError(
                "no generated key columns given".to_string(),
            ));
        }
        self.generated_keys = Some(keys);
        Ok(self)
    }

    #[must_use]
    pub fn template(&self) -> &Template {
        &self.template
    }

    #[must_use]
    pub fn params(&self) -> &[RowValues] {
        &self.params
    }

    #[must_use]
    pub fn generated_keys(&self) -> Option<&[String]> {
        self.generated_keys.as_deref()
    }
}
