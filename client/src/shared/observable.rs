use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Typed state holder. Every write that changes the value wakes all
/// subscribers; writes that leave it unchanged are not observed.
///
/// Cloning yields another handle to the same value.
pub struct StateCell<T> {
    tx: Arc<watch::Sender<T>>,
}

impl<T> Clone for StateCell<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> StateCell<T> {
    pub fn new(value: T) -> Self {
        let (tx, _) = watch::channel(value);
        Self { tx: Arc::new(tx) }
    }

    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Read without cloning. Do not hold on to the borrow across awaits.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.tx.borrow())
    }

    /// Replace the value. Returns true if it changed.
    pub fn set(&self, value: T) -> bool {
        self.tx.send_if_modified(|current| {
            if *current != value {
                *current = value;
                true
            } else {
                false
            }
        })
    }

    /// Mutate in place. Returns true if the value changed.
    pub fn update(&self, f: impl FnOnce(&mut T)) -> bool {
        self.tx.send_if_modified(|current| {
            let before = current.clone();
            f(current);
            *current != before
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }

    /// Invoke `listener` after writes. Bursts of writes between two wakeups
    /// are delivered once, with the latest value. Stops when every cell handle is dropped.
    pub fn listen<F>(&self, mut listener: F) -> JoinHandle<()>
    where
        F: FnMut(&T) + Send + 'static,
    {
        let mut rx = self.tx.subscribe();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let value = rx.borrow_and_update().clone();
                listener(&value);
            }
        })
    }
}

/// Resolves on the next change of `rx`. Once the sender is gone the slot is
/// cleared and this never resolves, which keeps `select!` loops simple.
pub(crate) async fn next_change<T>(rx: &mut Option<watch::Receiver<T>>) {
    if let Some(inner) = rx {
        if inner.changed().await.is_ok() {
            return;
        }
    }
    *rx = None;
    std::future::pending::<()>().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[test]
    fn set_reports_change() {
        let cell = StateCell::new(1);
        assert!(cell.set(2));
        assert!(!cell.set(2));
        assert_eq!(cell.get(), 2);
    }

    #[test]
    fn update_reports_change() {
        let cell = StateCell::new(vec![1, 2]);
        assert!(cell.update(|v| v.push(3)));
        assert!(!cell.update(|v| v.retain(|_| true)));
        assert_eq!(cell.with(|v| v.len()), 3);
    }

    #[test]
    fn unchanged_write_does_not_wake_subscribers() {
        let cell = StateCell::new(5);
        let rx = cell.subscribe();
        cell.set(5);
        assert!(!rx.has_changed().unwrap());
        cell.set(6);
        assert!(rx.has_changed().unwrap());
    }

    #[test]
    fn clones_share_the_value() {
        let a = StateCell::new("x".to_string());
        let b = a.clone();
        b.set("y".to_string());
        assert_eq!(a.get(), "y");
    }

    #[tokio::test]
    async fn listeners_see_latest_value() {
        let cell = StateCell::new(0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handle = cell.listen(move |v| sink.lock().unwrap().push(*v));

        cell.set(1);
        tokio::time::sleep(Duration::from_millis(20)).await;
        cell.set(2);
        cell.set(3);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.first(), Some(&1));
        assert_eq!(seen.last(), Some(&3));
        handle.abort();
    }

    #[tokio::test]
    async fn next_change_clears_closed_receiver() {
        let cell = StateCell::new(0);
        let mut rx = Some(cell.subscribe());
        cell.set(1);
        next_change(&mut rx).await;
        assert!(rx.is_some());

        drop(cell);
        let waited = tokio::time::timeout(Duration::from_millis(20), next_change(&mut rx)).await;
        assert!(waited.is_err());
        assert!(rx.is_none());
    }
}
