//! Application registry.
//!
//! # Responsibilities
//! - Hold every application registered over the wire, with its declared
//!   notification types
//! - Answer lookups from the notify path
//!
//! A re-registration replaces the previous entry wholesale; notification
//! types absent from the new registration are forgotten.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

/// One notification type an application declared at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationSpec {
    /// Machine name, matched against `Notification-Name` on notify.
    pub name: String,
    /// Human-readable name shown to the user. Falls back to `name`.
    pub display: String,
    /// Whether the user wants this notification shown.
    pub enabled: bool,
    /// Icon for this notification type; falls back to the application icon.
    pub icon: Option<String>,
}

/// A registered application and its notification types, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct Application {
    pub name: String,
    pub icon: Option<String>,
    pub notifications: HashMap<String, NotificationSpec>,
}

impl Application {
    pub fn notification(&self, name: &str) -> Option<&NotificationSpec> {
        self.notifications.get(name)
    }
}

/// Shared, concurrent view of all registered applications.
#[derive(Debug, Clone, Default)]
pub struct Applications {
    inner: Arc<RwLock<HashMap<String, Arc<Application>>>>,
}

impl Applications {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace an application.
    pub async fn add(&self, application: Application) {
        let mut apps = self.inner.write().await;
        apps.insert(application.name.clone(), Arc::new(application));
    }

    /// Look up an application by name.
    pub async fn get(&self, name: &str) -> Option<Arc<Application>> {
        self.inner.read().await.get(name).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app_with(name: &str, notifications: &[&str]) -> Application {
        Application {
            name: name.to_string(),
            icon: None,
            notifications: notifications
                .iter()
                .map(|n| {
                    (
                        n.to_string(),
                        NotificationSpec {
                            name: n.to_string(),
                            display: n.to_string(),
                            enabled: true,
                            icon: None,
                        },
                    )
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn add_and_get() {
        let apps = Applications::new();
        assert!(apps.get("Foo").await.is_none());

        apps.add(app_with("Foo", &["Bar"])).await;
        let app = apps.get("Foo").await.unwrap();
        assert_eq!(app.name, "Foo");
        assert!(app.notification("Bar").is_some());
        assert!(app.notification("Baz").is_none());
    }

    #[tokio::test]
    async fn reregistration_replaces_notification_set() {
        let apps = Applications::new();
        apps.add(app_with("Foo", &["Bar", "Baz"])).await;
        apps.add(app_with("Foo", &["Qux"])).await;

        let app = apps.get("Foo").await.unwrap();
        assert!(app.notification("Bar").is_none());
        assert!(app.notification("Qux").is_some());
        assert_eq!(apps.len().await, 1);
    }
}
