//! Queries for derived views.

use std::any::Any;
use std::sync::Arc;

/// Parameters attached to a [`Query`].
///
/// The subscription cache keys live subscriptions by query equality, so
/// parameters must be comparable behind a trait object. Any
/// `PartialEq + Send + Sync + 'static` type qualifies via the blanket impl.
pub trait QueryParams: Any + Send + Sync {
    /// Upcast to `&dyn Any` for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Type-checked equality against another set of parameters.
    fn eq_params(&self, other: &dyn QueryParams) -> bool;
}

impl<T: PartialEq + Send + Sync + 'static> QueryParams for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_params(&self, other: &dyn QueryParams) -> bool {
        other.as_any().downcast_ref::<T>().is_some_and(|o| o == self)
    }
}

/// A named request for a derived view over application state.
///
/// Two queries are equal when their ids match and their parameters compare
/// equal; that equality is the subscription cache key.
///
/// # Example
///
/// ```
/// use reflow_core::Query;
///
/// let a = Query::with_params("todo", 7_u64);
/// let b = Query::with_params("todo", 7_u64);
/// let c = Query::with_params("todo", 8_u64);
/// assert_eq!(a, b);
/// assert_ne!(a, c);
/// assert_eq!(a.params::<u64>(), Some(&7));
/// ```
#[derive(Clone)]
pub struct Query {
    id: String,
    params: Option<Arc<dyn QueryParams>>,
}

impl Query {
    /// Create a query with no parameters.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            params: None,
        }
    }

    /// Create a query carrying parameters.
    #[must_use]
    pub fn with_params<P: QueryParams>(id: impl Into<String>, params: P) -> Self {
        Self {
            id: id.into(),
            params: Some(Arc::new(params)),
        }
    }

    /// The query id, used to look up the registered subscription handler.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The parameters, downcast to `P`.
    #[must_use]
    pub fn params<P: 'static>(&self) -> Option<&P> {
        self.params.as_ref()?.as_any().downcast_ref()
    }
}

impl PartialEq for Query {
    fn eq(&self, other: &Self) -> bool {
        if self.id != other.id {
            return false;
        }
        match (&self.params, &other.params) {
            (None, None) => true,
            (Some(a), Some(b)) => a.eq_params(b.as_ref()),
            _ => false,
        }
    }
}

impl From<&str> for Query {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for Query {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.params.is_some() {
            write!(f, "Query({:?}, <params>)", self.id)
        } else {
            write!(f, "Query({:?})", self.id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queries_with_equal_ids_and_no_params_are_equal() {
        assert_eq!(Query::new("count"), Query::new("count"));
        assert_ne!(Query::new("count"), Query::new("total"));
    }

    #[test]
    fn params_participate_in_equality() {
        assert_eq!(
            Query::with_params("key", "count"),
            Query::with_params("key", "count")
        );
        assert_ne!(
            Query::with_params("key", "count"),
            Query::with_params("key", "total")
        );
    }

    #[test]
    fn params_of_different_types_never_compare_equal() {
        assert_ne!(
            Query::with_params("key", 1_u32),
            Query::with_params("key", 1_i64)
        );
    }

    #[test]
    fn a_parameterless_query_differs_from_a_parameterized_one() {
        assert_ne!(Query::new("key"), Query::with_params("key", 1_u32));
    }

    #[test]
    fn params_downcast_back_to_their_type() {
        let query = Query::with_params("key", (1_u8, 2_u8));
        assert_eq!(query.params::<(u8, u8)>(), Some(&(1, 2)));
        assert_eq!(query.params::<u8>(), None);
    }
}
