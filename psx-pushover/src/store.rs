//! In-memory key-value state for the PSX bridge.
//!
//! The store keeps the latest value of every tracked key and a list of
//! handlers per key. Every `set` runs the handlers for that key in the
//! order they were subscribed, on the caller's task.

use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};

use anyhow::Result;
use tracing::{error, warn};

/// Callback invoked with the store, the key and the new value.
pub type Handler = Box<dyn Fn(&Store, &str, &str) -> Result<()> + Send + Sync>;

/// Outcome of one `set`: how many handlers ran and how many of them failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dispatch {
    pub invoked: usize,
    pub failed: usize,
}

/// Latest value per key plus the handlers subscribed to each key.
///
/// The store is owned by a single task for its whole life, so there is no
/// locking: `set` takes `&mut self` and handlers only get shared access.
#[derive(Default)]
pub struct Store {
    variables: HashMap<String, String>,
    callbacks: HashMap<String, Vec<Handler>>,
}

impl Store {
    /// Creates an empty store with no subscriptions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, then runs every handler subscribed to `key`.
    ///
    /// Handlers run even when the value did not change. A handler that
    /// returns an error or panics is logged and skipped; the remaining
    /// handlers still run.
    pub fn set(&mut self, key: &str, value: &str) -> Dispatch {
        self.variables.insert(key.to_string(), value.to_string());

        let store: &Store = self;
        let mut dispatch = Dispatch::default();
        let Some(handlers) = store.callbacks.get(key) else {
            return dispatch;
        };

        for (index, handler) in handlers.iter().enumerate() {
            dispatch.invoked += 1;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(store, key, value)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    dispatch.failed += 1;
                    error!(key, handler = index, error = ?err, "handler failed");
                }
                Err(payload) => {
                    dispatch.failed += 1;
                    error!(
                        key,
                        handler = index,
                        panic = panic_message(payload.as_ref()),
                        "handler panicked"
                    );
                }
            }
        }

        dispatch
    }

    /// Returns the value stored under `key`, or `""` if it was never set.
    pub fn get(&self, key: &str) -> &str {
        match self.variables.get(key) {
            Some(value) => value.as_str(),
            None => {
                warn!(key, "get of unknown key, returning empty string");
                ""
            }
        }
    }

    /// Appends `handler` to the list for `key`.
    ///
    /// Subscribing the same handler twice makes it run twice per update.
    pub fn subscribe<F>(&mut self, key: &str, handler: F)
    where
        F: Fn(&Store, &str, &str) -> Result<()> + Send + Sync + 'static,
    {
        self.callbacks
            .entry(key.to_string())
            .or_default()
            .push(Box::new(handler));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.variables.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Returns a sorted copy of every key and value.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.variables
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use anyhow::bail;

    use super::*;

    type Calls = Arc<Mutex<Vec<(usize, String, String)>>>;

    fn recorder(
        calls: &Calls,
        tag: usize,
    ) -> impl Fn(&Store, &str, &str) -> Result<()> + Send + Sync + 'static {
        let calls = Arc::clone(calls);
        move |_: &Store, key: &str, value: &str| {
            calls
                .lock()
                .unwrap()
                .push((tag, key.to_string(), value.to_string()));
            Ok(())
        }
    }

    #[test]
    fn get_returns_last_value_set() {
        let mut store = Store::new();
        store.set("id", "1");
        store.set("version", "10.1");
        store.set("id", "2");
        store.set("id", "");

        assert_eq!(store.get("id"), "");
        assert_eq!(store.get("version"), "10.1");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn get_of_unknown_key_is_empty() {
        let store = Store::new();
        assert_eq!(store.get("missing"), "");
        assert!(!store.contains("missing"));
        assert!(store.is_empty());
    }

    #[test]
    fn handlers_run_once_in_subscription_order() {
        let calls = Calls::default();
        let mut store = Store::new();
        for tag in 0..3 {
            store.subscribe("Qs119", recorder(&calls, tag));
        }
        store.subscribe("id", recorder(&calls, 99));

        let dispatch = store.set("Qs119", "HELLO");

        assert_eq!(dispatch, Dispatch { invoked: 3, failed: 0 });
        let calls = calls.lock().unwrap();
        let expected: Vec<_> = (0..3)
            .map(|tag| (tag, "Qs119".to_string(), "HELLO".to_string()))
            .collect();
        assert_eq!(*calls, expected);
    }

    #[test]
    fn setting_the_same_value_fires_again() {
        let calls = Calls::default();
        let mut store = Store::new();
        store.subscribe("version", recorder(&calls, 0));

        store.set("version", "10.1");
        store.set("version", "10.1");

        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn duplicate_subscription_runs_twice() {
        let calls = Calls::default();
        let mut store = Store::new();
        let handler = Arc::new(recorder(&calls, 7));
        for _ in 0..2 {
            let handler = Arc::clone(&handler);
            store.subscribe("id", move |store: &Store, key: &str, value: &str| {
                (*handler)(store, key, value)
            });
        }

        let dispatch = store.set("id", "3");

        assert_eq!(dispatch.invoked, 2);
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn failing_handler_does_not_stop_the_rest() {
        let calls = Calls::default();
        let mut store = Store::new();
        store.subscribe("Qs119", |_: &Store, _: &str, _: &str| bail!("printer jammed"));
        store.subscribe("Qs119", |_: &Store, _: &str, _: &str| -> Result<()> {
            panic!("printer on fire")
        });
        store.subscribe("Qs119", recorder(&calls, 2));

        let dispatch = store.set("Qs119", "LINE");

        assert_eq!(dispatch, Dispatch { invoked: 3, failed: 2 });
        assert_eq!(calls.lock().unwrap().len(), 1);
        assert_eq!(store.get("Qs119"), "LINE");
    }

    #[test]
    fn handlers_can_read_other_keys() {
        let seen = Arc::new(Mutex::new(String::new()));
        let mut store = Store::new();
        let sink = Arc::clone(&seen);
        store.subscribe("version", move |store: &Store, _: &str, value: &str| {
            *sink.lock().unwrap() = format!("{value} #{}", store.get("id"));
            Ok(())
        });

        store.set("id", "4");
        store.set("version", "10.180");

        assert_eq!(*seen.lock().unwrap(), "10.180 #4");
    }

    #[test]
    fn snapshot_is_sorted() {
        let mut store = Store::new();
        store.set("version", "1");
        store.set("id", "2");

        let keys: Vec<_> = store.snapshot().into_keys().collect();
        assert_eq!(keys, vec!["id".to_string(), "version".to_string()]);
    }
}
