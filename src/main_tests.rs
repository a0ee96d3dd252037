// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `main.rs` - leadership tracking and signal handling

#[cfg(test)]
mod tests {
    use super::super::leadership_lost;
    use std::time::Duration as StdDuration;
    use tokio::sync::watch;
    use tokio::time::timeout;

    /// Test that SIGTERM signal handler can be created on Unix platforms
    #[tokio::test]
    #[cfg(unix)]
    async fn test_sigterm_signal_handler_creation() {
        use tokio::signal::unix::{signal, SignalKind};

        let result = signal(SignalKind::terminate());
        assert!(
            result.is_ok(),
            "Should be able to create SIGTERM signal handler"
        );
    }

    #[tokio::test]
    async fn test_leadership_held_does_not_resolve() {
        let (_tx, mut rx) = watch::channel(true);

        let result = timeout(StdDuration::from_millis(50), leadership_lost(&mut rx)).await;

        assert!(result.is_err(), "should keep waiting while the lease is held");
    }

    #[tokio::test]
    async fn test_leadership_lost_on_false() {
        let (tx, mut rx) = watch::channel(true);

        let waiter = tokio::spawn(async move { leadership_lost(&mut rx).await });
        tx.send(false).expect("receiver alive");

        timeout(StdDuration::from_secs(1), waiter)
            .await
            .expect("resolves after losing the lease")
            .expect("task completes");
    }

    #[tokio::test]
    async fn test_leadership_lost_when_manager_stops() {
        let (tx, mut rx) = watch::channel(true);
        drop(tx);

        timeout(StdDuration::from_secs(1), leadership_lost(&mut rx))
            .await
            .expect("resolves once the lease manager is gone");
    }

    #[tokio::test]
    async fn test_not_leader_resolves_immediately() {
        let (_tx, mut rx) = watch::channel(false);

        timeout(StdDuration::from_millis(50), leadership_lost(&mut rx))
            .await
            .expect("resolves without waiting");
    }
}
