//! Observable state container
//!
//! Components publish their state through an [`Observable`]: updates are
//! atomic snapshot replacements, readers either take a snapshot or subscribe
//! and await changes. Backed by `tokio::sync::watch`.

use tokio::sync::watch;

#[derive(Debug)]
pub struct Observable<T> {
    tx: watch::Sender<T>,
}

impl<T: Clone> Observable<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Current value.
    pub fn snapshot(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Receiver that observes every later update.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }

    /// Apply `f` to the value and notify subscribers.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut result = None;
        self.tx.send_modify(|value| result = Some(f(value)));
        match result {
            Some(r) => r,
            None => unreachable!("send_modify always runs the closure"),
        }
    }

    pub fn replace(&self, value: T) -> T {
        self.tx.send_replace(value)
    }

    /// Wait until `predicate` holds for the current value.
    pub async fn wait_for(&self, predicate: impl FnMut(&T) -> bool) -> T {
        let mut rx = self.tx.subscribe();
        let value = match rx.wait_for(predicate).await {
            Ok(value) => T::clone(&value),
            // The sender lives in `self`, so the channel cannot close while we wait.
            Err(_) => self.snapshot(),
        };
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_update_notifies_subscribers() {
        let observable = Observable::new(0u32);
        let mut rx = observable.subscribe();

        let returned = observable.update(|v| {
            *v += 2;
            *v
        });
        assert_eq!(returned, 2);

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), 2);
        assert_eq!(observable.snapshot(), 2);
    }

    #[tokio::test]
    async fn test_wait_for_resolves_after_update() {
        let observable = std::sync::Arc::new(Observable::new(false));
        let waiter = {
            let observable = observable.clone();
            tokio::spawn(async move { observable.wait_for(|v| *v).await })
        };

        observable.replace(true);
        assert!(waiter.await.unwrap());
    }
}
