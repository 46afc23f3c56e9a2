//! NOTIFY request handling.

use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::{self, FileCache};
use crate::protocol::binary::read_binaries;
use crate::protocol::header::read_block;
use crate::protocol::{
    resource_id, GntpError, Handler, Request, RequestStream, Response, ServeError, Version,
};
use crate::registry::Applications;

use super::{parse_flag, Notification, NotificationSink};

/// Delivers notifications for registered applications.
pub struct NotifyHandler {
    apps: Applications,
    sink: NotificationSink,
    cache: Arc<FileCache>,
    download_icons: bool,
}

impl NotifyHandler {
    pub fn new(
        apps: Applications,
        sink: NotificationSink,
        cache: Arc<FileCache>,
        download_icons: bool,
    ) -> Self {
        Self {
            apps,
            sink,
            cache,
            download_icons,
        }
    }

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
impl Handler for NotifyHandler {
    async fn parse(
        &self,
        stream: &mut dyn RequestStream,
        request: &mut Request,
    ) -> Result<(), ServeError> {
        let directive = read_block(stream).await?;
        request.headers.push(directive);
        request.binaries = read_binaries(stream, &request.headers, self.cache.as_ref()).await?;
        Ok(())
    }

    async fn respond(&self, request: &Request) -> Result<Response, ServeError> {
        if request.version != Version::ONE_ZERO {
            return Err(GntpError::UnknownProtocolVersion(request.version).into());
        }

        let directive = &request.headers[0];
        let application = directive
            .get("Application-Name")
            .filter(|n| !n.is_empty())
            .ok_or_else(|| GntpError::MissingHeader("Application-Name".to_string()))?;
        let app = self
            .apps
            .get(application)
            .await
            .ok_or_else(|| GntpError::UnknownApplication(application.to_string()))?;

        let name = directive
            .get("Notification-Name")
            .ok_or_else(|| GntpError::MissingHeader("Notification-Name".to_string()))?;
        let spec = app
            .notification(name)
            .ok_or_else(|| GntpError::UnknownNotification {
                application: application.to_string(),
                name: name.to_string(),
            })?;

        let title = directive
            .get("Notification-Title")
            .ok_or_else(|| GntpError::MissingHeader("Notification-Title".to_string()))?
            .to_string();

        let icon = directive
            .get("Notification-Icon")
            .map(|v| self.resolve_icon(v))
            .or_else(|| spec.icon.clone());

        let notification = Notification {
            application: application.to_string(),
            name: name.to_string(),
            title,
            text: directive
                .get("Notification-Text")
                .unwrap_or_default()
                .to_string(),
            icon,
            id: directive.get("Notification-Id").map(str::to_string),
            sticky: directive
                .get("Notification-Sticky")
                .map(parse_flag)
                .unwrap_or(false),
            priority: directive
                .get("Notification-Priority")
                .and_then(|p| p.parse().ok())
                .unwrap_or(0),
            coalescing: directive
                .get("Notification-Coalescing")
                .map(str::to_string),
            enabled: spec.enabled,
        };

        tracing::debug!(
            application = %notification.application,
            notification = %notification.name,
            enabled = notification.enabled,
            "notification accepted"
        );
        if self.sink.send(notification).is_err() {
            tracing::error!("notification sink closed");
            return Err(GntpError::Internal.into());
        }

        let mut response = Response::new(request.version.major, request.version.minor);
        response.headers[0].set("Response-Action", "NOTIFY");
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Application, NotificationSpec};
    use tokio::sync::mpsc;

    struct Fixture {
        _dir: tempfile::TempDir,
        handler: NotifyHandler,
        rx: mpsc::UnboundedReceiver<Notification>,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let apps = Applications::new();
        let mut app = Application {
            name: "Foo".to_string(),
            ..Application::default()
        };
        app.notifications.insert(
            "Bar".to_string(),
            NotificationSpec {
                name: "Bar".to_string(),
                display: "Bar".to_string(),
                enabled: true,
                icon: Some("fallback-icon".to_string()),
            },
        );
        apps.add(app).await;

        let (tx, rx) = mpsc::unbounded_channel();
        let cache = Arc::new(FileCache::new(dir.path()));
        Fixture {
            _dir: dir,
            handler: NotifyHandler::new(apps, tx, cache, false),
            rx,
        }
    }

    async fn parse(handler: &NotifyHandler, body: &[u8]) -> Request {
        let mut request = Request {
            version: Version::ONE_ZERO,
            request_type: "NOTIFY".to_string(),
            ..Request::default()
        };
        let mut stream: &[u8] = body;
        handler.parse(&mut stream, &mut request).await.unwrap();
        request
    }

    #[tokio::test]
    async fn delivers_notification_to_sink() {
        let mut fx = fixture().await;
        let request = parse(
            &fx.handler,
            b"Application-Name: Foo\r\nNotification-Name: Bar\r\n\
              Notification-Title: Hello\r\nNotification-Text: World\r\n\
              Notification-Sticky: yes\r\nNotification-Priority: 2\r\n\r\n",
        )
        .await;

        let response = fx.handler.respond(&request).await.unwrap();
        assert_eq!(response.headers[0].get("Response-Action"), Some("NOTIFY"));

        let delivered = fx.rx.recv().await.unwrap();
        assert_eq!(delivered.application, "Foo");
        assert_eq!(delivered.title, "Hello");
        assert_eq!(delivered.text, "World");
        assert!(delivered.sticky);
        assert_eq!(delivered.priority, 2);
        assert!(delivered.enabled);
        assert_eq!(delivered.icon.as_deref(), Some("fallback-icon"));
    }

    #[tokio::test]
    async fn unknown_application_is_400() {
        let fx = fixture().await;
        let request = parse(
            &fx.handler,
            b"Application-Name: Nope\r\nNotification-Name: Bar\r\n\
              Notification-Title: Hello\r\n\r\n",
        )
        .await;

        let err = fx.handler.respond(&request).await.unwrap_err();
        assert!(matches!(
            err,
            ServeError::Protocol(GntpError::UnknownApplication(ref a)) if a == "Nope"
        ));
    }

    #[tokio::test]
    async fn unknown_notification_is_401() {
        let fx = fixture().await;
        let request = parse(
            &fx.handler,
            b"Application-Name: Foo\r\nNotification-Name: Nope\r\n\
              Notification-Title: Hello\r\n\r\n",
        )
        .await;

        let err = fx.handler.respond(&request).await.unwrap_err();
        match err {
            ServeError::Protocol(GntpError::UnknownNotification { application, name }) => {
                assert_eq!(application, "Foo");
                assert_eq!(name, "Nope");
            }
            other => panic!("expected UnknownNotification, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_title_is_303() {
        let fx = fixture().await;
        let request = parse(
            &fx.handler,
            b"Application-Name: Foo\r\nNotification-Name: Bar\r\n\r\n",
        )
        .await;

        let err = fx.handler.respond(&request).await.unwrap_err();
        assert!(matches!(
            err,
            ServeError::Protocol(GntpError::MissingHeader(ref f)) if f == "Notification-Title"
        ));
    }

    #[tokio::test]
    async fn closed_sink_is_internal_error() {
        let mut fx = fixture().await;
        fx.rx.close();
        let request = parse(
            &fx.handler,
            b"Application-Name: Foo\r\nNotification-Name: Bar\r\n\
              Notification-Title: Hello\r\n\r\n",
        )
        .await;

        let err = fx.handler.respond(&request).await.unwrap_err();
        assert!(matches!(err, ServeError::Protocol(GntpError::Internal)));
    }
}
