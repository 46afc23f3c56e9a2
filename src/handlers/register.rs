//! REGISTER request handling.

use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::{self, FileCache};
use crate::protocol::binary::read_binaries;
use crate::protocol::header::read_block;
use crate::protocol::{
    resource_id, GntpError, Handler, Request, RequestStream, Response, ServeError, Version,
};
use crate::registry::{Application, Applications, NotificationSpec};

/// Registers applications and their notification types.
pub struct RegisterHandler {
    apps: Applications,
    cache: Arc<FileCache>,
    download_icons: bool,
}

impl RegisterHandler {
    pub fn new(apps: Applications, cache: Arc<FileCache>, download_icons: bool) -> Self {
        Self {
            apps,
            cache,
            download_icons,
        }
    }

    /// Normalize an icon header value to a cache key. Embedded resources
    /// are already cached under their identifier by parse; URLs are fetched
    /// in the background under a digest key.
    fn resolve_icon(&self, value: &str) -> String {
        if let Some(id) = resource_id(value) {
            return id.to_string();
        }
        let key = cache::url_key(value);
        if self.download_icons {
            cache::spawn_download(Arc::clone(&self.cache), value.to_string());
        }
        key
    }
}

#[async_trait]
impl Handler for RegisterHandler {
    async fn parse(
        &self,
        stream: &mut dyn RequestStream,
        request: &mut Request,
    ) -> Result<(), ServeError> {
        let directive = read_block(stream).await?;

        let count: usize = directive
            .get("Notifications-Count")
            .ok_or_else(|| GntpError::MissingHeader("Notifications-Count".to_string()))?
            .parse()
            .map_err(|_| {
                GntpError::InvalidRequest("notification count format invalid".to_string())
            })?;

        request.headers.push(directive);
        for _ in 0..count {
            request.headers.push(read_block(stream).await?);
        }

        request.binaries = read_binaries(stream, &request.headers, self.cache.as_ref()).await?;
        Ok(())
    }

    async fn respond(&self, request: &Request) -> Result<Response, ServeError> {
        if request.version != Version::ONE_ZERO {
            return Err(GntpError::UnknownProtocolVersion(request.version).into());
        }

        let directive = &request.headers[0];
        let name = directive
            .get("Application-Name")
            .filter(|n| !n.is_empty())
            .ok_or_else(|| GntpError::MissingHeader("Application-Name".to_string()))?
            .to_string();
        let app_icon = directive.get("Application-Icon").map(|v| self.resolve_icon(v));

        let mut application = Application {
            name: name.clone(),
            icon: app_icon.clone(),
            ..Application::default()
        };

        for block in &request.headers[1..] {
            let notification_name = block
                .get("Notification-Name")
                .filter(|n| !n.is_empty())
                .ok_or_else(|| GntpError::MissingHeader("Notification-Name".to_string()))?
                .to_string();
            if application.notifications.contains_key(&notification_name) {
                return Err(GntpError::InvalidRequest(format!(
                    "Duplicate notification registered: {}",
                    notification_name
                ))
                .into());
            }

            let display = block
                .get("Notification-Display")
                .filter(|d| !d.is_empty())
                .unwrap_or(&notification_name)
                .to_string();
            let enabled = block
                .get("Notification-Enabled")
                .map(super::parse_flag)
                .unwrap_or(false);
            let icon = block
                .get("Notification-Icon")
                .map(|v| self.resolve_icon(v))
                .or_else(|| app_icon.clone());

            application.notifications.insert(
                notification_name.clone(),
                NotificationSpec {
                    name: notification_name,
                    display,
                    enabled,
                    icon,
                },
            );
        }

        let count = application.notifications.len();
        self.apps.add(application).await;
        tracing::info!(application = %name, notifications = count, "application registered");

        let mut response = Response::new(request.version.major, request.version.minor);
        response.headers[0].set("Response-Action", "REGISTER");
        Ok(response)
    }
}
