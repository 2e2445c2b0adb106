//! Bound cache handle
//!
//! A [`CacheRef`] pairs an engine with one key so collaborators can pass
//! around a single object instead of repeating the key on every call.

use crate::bundle::Value;
use crate::cache::engine::Cache;
use crate::error::Result;

/// A lightweight reference bound to one `(engine, key)` pair
///
/// Constructed through [`Cache::create_ref`] or
/// [`Cache::create_ref_deferred`]; in the deferred form `set` and `push`
/// enqueue updates which become visible only after the engine's
/// [`apply_deferred`](Cache::apply_deferred) runs.
pub struct CacheRef<'a> {
    cache: &'a Cache,
    name: String,
    deferred: bool,
}

impl<'a> CacheRef<'a> {
    pub(crate) fn new(cache: &'a Cache, key: &str, deferred: bool) -> Self {
        Self {
            cache,
            name: key.to_string(),
            deferred,
        }
    }

    /// The bound key
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether writes route through the deferred queue
    pub fn is_deferred(&self) -> bool {
        self.deferred
    }

    /// Write a value under the bound key
    pub fn set(&self, value: impl Into<Value>) -> Result<()> {
        if self.deferred {
            self.cache.set_deferred(&self.name, value);
            Ok(())
        } else {
            self.cache.set(&self.name, value)
        }
    }

    /// Append an item to the list under the bound key
    pub fn push(&self, item: impl Into<Value>) -> Result<()> {
        if self.deferred {
            self.cache.lpush_deferred(&self.name, item);
            Ok(())
        } else {
            self.cache.lpush(&self.name, item)
        }
    }

    /// Remove and return the oldest element of the bound list
    ///
    /// Handles consume lists front-first, queue style.
    pub fn pop(&self) -> Result<Option<Value>> {
        self.cache.pop_at(&self.name, 0)
    }

    /// Read the value under the bound key
    pub fn get(&self) -> Result<Option<Value>> {
        self.cache.get(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_through_ref() {
        let cache = Cache::new();
        let handle = cache.create_ref("ref_key");
        assert_eq!(handle.name(), "ref_key");

        handle.set("ref_value").unwrap();
        assert_eq!(cache.get("ref_key").unwrap(), Some(Value::from("ref_value")));
    }

    #[test]
    fn test_push_and_pop_through_ref() {
        let cache = Cache::new();
        let handle = cache.create_ref("ref_list");

        handle.push("first").unwrap();
        handle.push("second").unwrap();

        // Front-first consumption
        assert_eq!(handle.pop().unwrap(), Some(Value::from("first")));
        assert_eq!(handle.pop().unwrap(), Some(Value::from("second")));
        assert_eq!(handle.pop().unwrap(), None);
    }

    #[test]
    fn test_deferred_ref_waits_for_drain() {
        let cache = Cache::new();
        let handle = cache.create_ref_deferred("async_ref");
        assert!(handle.is_deferred());

        handle.set("async_value").unwrap();
        assert_eq!(cache.get("async_ref").unwrap(), None);

        cache.apply_deferred().unwrap();
        assert_eq!(
            cache.get("async_ref").unwrap(),
            Some(Value::from("async_value"))
        );
    }

    #[test]
    fn test_deferred_ref_push() {
        let cache = Cache::new();
        let handle = cache.create_ref_deferred("async_push_ref");

        handle.push("async_item").unwrap();
        cache.apply_deferred().unwrap();

        let list = cache.get("async_push_ref").unwrap().unwrap();
        assert_eq!(list, Value::List(vec![Value::from("async_item")]));
    }
}
