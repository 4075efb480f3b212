use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Identifies one cached query: resource, optional record id and filters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub resource: &'static str,
    pub id: Option<String>,
    pub params: Vec<(String, String)>,
}

impl QueryKey {
    pub fn list(resource: &'static str) -> Self {
        Self {
            resource,
            id: None,
            params: Vec::new(),
        }
    }

    pub fn detail(resource: &'static str, id: impl Into<String>) -> Self {
        Self {
            resource,
            id: Some(id.into()),
            params: Vec::new(),
        }
    }

    pub fn with_params(mut self, params: Vec<(String, String)>) -> Self {
        self.params = params;
        self
    }

    /// A key without id matches every list entry of its resource, whatever
    /// the filters. A key with id matches that record only.
    pub fn covers(&self, other: &QueryKey) -> bool {
        if self.resource != other.resource {
            return false;
        }
        match &self.id {
            None => other.id.is_none(),
            Some(id) => other.id.as_ref() == Some(id),
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource)?;
        if let Some(id) = &self.id {
            write!(f, "/{id}")?;
        }
        for (i, (k, v)) in self.params.iter().enumerate() {
            write!(f, "{}{k}={v}", if i == 0 { '?' } else { '&' })?;
        }
        Ok(())
    }
}

/// What a mutation drops from the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidate {
    /// Matching keys per [`QueryKey::covers`].
    Key(QueryKey),
    /// Every entry of the resource, lists and details.
    Resource(&'static str),
}

struct Entry {
    value: Arc<dyn Any + Send + Sync>,
    fetched_at: Instant,
}

/// Overwrite-only store of query results.
#[derive(Default)]
pub struct QueryCache {
    entries: HashMap<QueryKey, Entry>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put<T: Any + Send + Sync>(&mut self, key: QueryKey, value: T) {
        self.entries.insert(
            key,
            Entry {
                value: Arc::new(value),
                fetched_at: Instant::now(),
            },
        );
    }

    /// Returns the value and its age.
    pub fn get<T: Any + Send + Sync + Clone>(&self, key: &QueryKey) -> Option<(T, Duration)> {
        let entry = self.entries.get(key)?;
        let value = entry.value.downcast_ref::<T>()?.clone();
        Some((value, entry.fetched_at.elapsed()))
    }

    pub fn get_fresh<T: Any + Send + Sync + Clone>(&self, key: &QueryKey, max_age: Duration) -> Option<T> {
        self.get(key)
            .and_then(|(v, age)| (age < max_age).then_some(v))
    }

    pub fn invalidate(&mut self, what: &Invalidate) -> usize {
        let before = self.entries.len();
        match what {
            Invalidate::Key(key) => self.entries.retain(|k, _| !key.covers(k)),
            Invalidate::Resource(resource) => self.entries.retain(|k, _| k.resource != *resource),
        }
        before - self.entries.len()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_key_covers_filtered_lists_only() {
        let mut cache = QueryCache::new();
        cache.put(QueryKey::list("batches"), vec![1u32]);
        cache.put(
            QueryKey::list("batches").with_params(vec![("account_id".into(), "a".into())]),
            vec![2u32],
        );
        cache.put(QueryKey::detail("batches", "b1"), 3u32);
        cache.put(QueryKey::list("accounts"), vec![4u32]);

        let removed = cache.invalidate(&Invalidate::Key(QueryKey::list("batches")));
        assert_eq!(removed, 2);
        assert!(cache.get::<u32>(&QueryKey::detail("batches", "b1")).is_some());
        assert_eq!(cache.len(), 2);

        cache.invalidate(&Invalidate::Resource("batches"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn wrong_type_or_stale_is_a_miss() {
        let mut cache = QueryCache::new();
        let key = QueryKey::detail("accounts", "a1");
        cache.put(key.clone(), String::from("acme"));
        assert!(cache.get::<u32>(&key).is_none());
        assert_eq!(cache.get_fresh::<String>(&key, Duration::from_secs(60)).as_deref(), Some("acme"));
        assert!(cache.get_fresh::<String>(&key, Duration::ZERO).is_none());
    }

    #[test]
    fn key_display() {
        let key = QueryKey::list("jobs").with_params(vec![
            ("batch_id".into(), "b1".into()),
            ("status".into(), "failed".into()),
        ]);
        assert_eq!(key.to_string(), "jobs?batch_id=b1&status=failed");
        assert_eq!(QueryKey::detail("accounts", "x").to_string(), "accounts/x");
    }
}
