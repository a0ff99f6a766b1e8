//! Callbacks wired to the tracked PSX keys.

use anyhow::{Context, Result};
use tracing::info;

use crate::notifier::NotifierHandle;
use crate::protocol::{KEY_CLIENT_ID, KEY_PRINTOUT, KEY_VERSION};
use crate::store::Store;

const PRINTOUT_RULE: &str = "-----------------------";

/// PSX encodes printer line breaks as `^`.
pub fn decode_printout(value: &str) -> String {
    value.replace('^', "\n")
}

/// Subscribes the status and printout handlers.
pub fn register_psx_handlers(store: &mut Store, notifier: NotifierHandle) {
    store.subscribe(KEY_VERSION, announce_version);
    store.subscribe(KEY_PRINTOUT, move |_: &Store, _: &str, value: &str| {
        relay_printout(&notifier, value)
    });
}

fn announce_version(store: &Store, _key: &str, value: &str) -> Result<()> {
    info!(
        "connected to PSX {value} as client #{}",
        store.get(KEY_CLIENT_ID)
    );
    Ok(())
}

fn relay_printout(notifier: &NotifierHandle, value: &str) -> Result<()> {
    if value.is_empty() {
        return Ok(());
    }

    let text = decode_printout(value);
    println!("\n{PRINTOUT_RULE}\n{text}\n{PRINTOUT_RULE}");
    notifier
        .notify(text)
        .context("failed to queue printout notification")
}

#[cfg(test)]
mod tests {
    use crate::error::NotifyError;
    use crate::notifier::{NotificationSink, Notifier};

    use super::*;

    struct NullSink;

    impl NotificationSink for NullSink {
        async fn send(&self, _text: &str) -> Result<(), NotifyError> {
            Ok(())
        }
    }

    #[test]
    fn carets_become_newlines() {
        assert_eq!(decode_printout("Hello^World"), "Hello\nWorld");
        assert_eq!(decode_printout("^^"), "\n\n");
        assert_eq!(decode_printout("plain"), "plain");
    }

    #[test]
    fn printout_is_queued_once_per_update() {
        let (mut notifier, handle) = Notifier::new(NullSink, 4);
        let mut store = Store::new();
        register_psx_handlers(&mut store, handle);

        let dispatch = store.set(KEY_PRINTOUT, "Hello^World");
        assert_eq!(dispatch.failed, 0);

        let queued = notifier.drain_queued();
        assert_eq!(queued, vec!["Hello\nWorld".to_string()]);
    }

    #[test]
    fn empty_printout_is_ignored() {
        let (mut notifier, handle) = Notifier::new(NullSink, 4);
        let mut store = Store::new();
        register_psx_handlers(&mut store, handle);

        store.set(KEY_PRINTOUT, "");

        assert!(notifier.drain_queued().is_empty());
    }

    #[test]
    fn full_queue_surfaces_as_handler_failure() {
        let (_notifier, handle) = Notifier::new(NullSink, 1);
        let mut store = Store::new();
        register_psx_handlers(&mut store, handle);

        assert_eq!(store.set(KEY_PRINTOUT, "one").failed, 0);
        assert_eq!(store.set(KEY_PRINTOUT, "two").failed, 1);
    }

    #[test]
    fn version_handler_tolerates_missing_id() {
        let mut store = Store::new();
        store.subscribe(KEY_VERSION, announce_version);

        let dispatch = store.set(KEY_VERSION, "10.180");
        assert_eq!(dispatch.failed, 0);
    }
}
