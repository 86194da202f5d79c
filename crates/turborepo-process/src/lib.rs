//! Supervises the child processes a run spawns. `ProcessManager` tracks every
//! live [`Child`] so a single `stop`/`wait` call can close them all at once
//! (e.g. on ctrl-c or when the scheduler aborts a run); individual tasks keep
//! using their own `Child` handle for per-task lifecycle.

mod child;
mod command;
mod prefix;

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

pub use child::{Child, ChildExit, ShutdownStyle};
pub use command::Command;
pub use prefix::PrefixedWriter;
use tokio::task::JoinSet;
use tracing::{debug, trace};

#[derive(Debug, Clone)]
pub struct ProcessManager(Arc<Mutex<Inner>>);

#[derive(Debug)]
struct Inner {
    is_closing: bool,
    children: Vec<Child>,
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessManager {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Inner {
            is_closing: false,
            children: Vec::new(),
        })))
    }

    /// Spawns `command`, tracking the child so a later `stop`/`wait` on the
    /// manager reaches it too. Returns `None` if the manager is already
    /// closing and refusing new work.
    pub fn spawn(
        &self,
        command: Command,
        stop_timeout: Duration,
    ) -> Option<std::io::Result<Child>> {
        let mut inner = self.0.lock().unwrap();
        if inner.is_closing {
            return None;
        }
        let child = Child::spawn(command, ShutdownStyle::Graceful(stop_timeout));
        if let Ok(child) = &child {
            inner.children.push(child.clone());
        }
        Some(child)
    }

    /// Signals every tracked child to stop and waits for them all to exit.
    pub async fn stop(&self) {
        self.close(|mut child| async move {
            child.set_closing();
            child.stop().await
        })
        .await
    }

    /// Waits for every tracked child to exit on its own, without signaling.
    pub async fn wait(&self) {
        self.close(|mut child| async move { child.wait().await })
            .await
    }

    /// Runs `callback` against a snapshot of the currently-tracked children,
    /// then clears the tracked set and reopens the manager. Calling this
    /// more than once (e.g. a `wait` racing a `stop`) is safe: each call only
    /// affects the children present at the time it took the lock.
    async fn close<F, C>(&self, callback: F)
    where
        F: Fn(Child) -> C + Send + Sync + Copy + 'static,
        C: std::future::Future<Output = Option<ChildExit>> + Send + 'static,
    {
        let mut set = JoinSet::new();
        {
            let mut inner = self.0.lock().unwrap();
            inner.is_closing = true;
            for child in inner.children.iter().cloned() {
                set.spawn(async move { callback(child).await });
            }
        }

        debug!("waiting for {} processes to exit", set.len());
        while let Some(result) = set.join_next().await {
            trace!("process exited: {result:?}");
        }

        let mut inner = self.0.lock().unwrap();
        inner.children.clear();
        inner.is_closing = false;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn sleep_command(secs: u64) -> Command {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", format!("sleep {secs}").as_str()]);
        cmd
    }

    #[tokio::test]
    async fn stop_closes_tracked_children() {
        let manager = ProcessManager::new();
        manager.spawn(sleep_command(5), Duration::from_millis(200));
        manager.spawn(sleep_command(5), Duration::from_millis(200));
        manager.stop().await;
        assert!(manager.0.lock().unwrap().children.is_empty());
    }

    #[tokio::test]
    async fn refuses_spawn_after_close_until_reopened() {
        let manager = ProcessManager::new();
        manager.spawn(sleep_command(1), Duration::from_millis(200));

        let manager_clone = manager.clone();
        let stopper = tokio::spawn(async move { manager_clone.stop().await });

        // Give `close` a chance to flip `is_closing` before we try to spawn.
        tokio::time::sleep(Duration::from_millis(10)).await;
        stopper.await.unwrap();

        assert!(manager.spawn(sleep_command(1), Duration::from_millis(200)).is_some());
        manager.stop().await;
    }
}
