//! HTTP server for receiving UPnP event notifications.

use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use warp::http::{Method, StatusCode};
use warp::path::FullPath;
use warp::Filter;

use crate::router::{EventRouter, NotificationPayload};

/// Resource devices deliver notifications to
pub const CALLBACK_PATH: &str = "/listener";

/// Errors raised while starting the server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind callback server to {addr}: {reason}")]
    Bind { addr: SocketAddr, reason: String },

    #[error("Failed to detect local IP address for the callback URL")]
    NoLocalAddress,
}

/// HTTP callback server for receiving UPnP event notifications.
///
/// Accepts `NOTIFY` at [`CALLBACK_PATH`], requires a `SID` header and
/// forwards the raw body through an [`EventRouter`]. The server stops on
/// [`shutdown`](Self::shutdown) or when the value is dropped.
///
/// # Example
///
/// ```no_run
/// use tokio::sync::mpsc;
/// use callback_server::{CallbackServer, NotificationPayload};
///
/// #[tokio::main]
/// async fn main() {
///     let (tx, mut rx) = mpsc::unbounded_channel::<NotificationPayload>();
///
///     let server = CallbackServer::bind("0.0.0.0:6767".parse().unwrap(), tx)
///         .await
///         .expect("Failed to create callback server");
///
///     println!("Devices should call back to: {}", server.callback_url());
///
///     while let Some(notification) = rx.recv().await {
///         println!("Received event for subscription: {}", notification.subscription_id);
///     }
/// }
/// ```
pub struct CallbackServer {
    /// Address the listener is bound to
    local_addr: SocketAddr,
    /// URL handed to devices in the SUBSCRIBE `CALLBACK` header
    callback_url: String,
    event_router: Arc<EventRouter>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    server_handle: Option<JoinHandle<()>>,
}

impl CallbackServer {
    /// Bind to `addr` and start serving.
    ///
    /// When `addr` has an unspecified IP the callback URL advertises the
    /// address used for outbound traffic. Port 0 picks a free port.
    pub async fn bind(
        addr: SocketAddr,
        event_sender: mpsc::UnboundedSender<NotificationPayload>,
    ) -> Result<Self, ServerError> {
        let advertised_ip = if addr.ip().is_unspecified() {
            detect_local_ip().ok_or(ServerError::NoLocalAddress)?
        } else {
            addr.ip()
        };
        Self::bind_advertising(addr, advertised_ip, event_sender).await
    }

    /// Bind to `addr` and advertise `advertised_ip` in the callback URL
    pub async fn bind_advertising(
        addr: SocketAddr,
        advertised_ip: IpAddr,
        event_sender: mpsc::UnboundedSender<NotificationPayload>,
    ) -> Result<Self, ServerError> {
        let event_router = Arc::new(EventRouter::new(event_sender));
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let routes = notify_route(event_router.clone()).recover(handle_rejection);

        // recv() also completes once every sender is dropped
        let (local_addr, server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(addr, async move {
                shutdown_rx.recv().await;
            })
            .map_err(|e| ServerError::Bind {
                addr,
                reason: e.to_string(),
            })?;

        let server_handle = tokio::spawn(server);

        let callback_url = format!(
            "http://{}{}",
            SocketAddr::new(advertised_ip, local_addr.port()),
            CALLBACK_PATH
        );
        tracing::info!(%local_addr, %callback_url, "callback server listening");

        Ok(Self {
            local_addr,
            callback_url,
            event_router,
            shutdown_tx: Some(shutdown_tx),
            server_handle: Some(server_handle),
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Full callback URL, e.g. `http://10.0.1.2:6767/listener`
    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }

    /// `host:port` part of the callback URL
    pub fn callback_host(&self) -> &str {
        self.callback_url
            .trim_start_matches("http://")
            .trim_end_matches(CALLBACK_PATH)
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.event_router
    }

    /// Shutdown the callback server gracefully, letting in-flight requests finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }

        if let Some(handle) = self.server_handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "callback server task ended abnormally");
            }
        }
        tracing::info!(local_addr = %self.local_addr, "callback server stopped");
    }
}

/// Detect the local IP address for callback URLs.
///
/// Connecting a UDP socket selects the outbound interface without sending
/// any data.
pub fn detect_local_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    let local_addr = socket.local_addr().ok()?;
    Some(local_addr.ip())
}

fn notify_route(
    router: Arc<EventRouter>,
) -> impl Filter<Extract = (warp::reply::WithStatus<&'static str>,), Error = warp::Rejection> + Clone {
    warp::method()
        .and(warp::path::full())
        .and(warp::header::optional::<String>("sid"))
        .and(warp::header::optional::<String>("nt"))
        .and(warp::header::optional::<String>("nts"))
        .and(warp::body::bytes())
        .and_then(
            move |method: Method,
                  path: FullPath,
                  sid: Option<String>,
                  nt: Option<String>,
                  nts: Option<String>,
                  body: Bytes| {
                let router = router.clone();
                async move { handle_notify(&router, method, path, sid, nt, nts, body) }
            },
        )
}

fn handle_notify(
    router: &EventRouter,
    method: Method,
    path: FullPath,
    sid: Option<String>,
    nt: Option<String>,
    nts: Option<String>,
    body: Bytes,
) -> Result<warp::reply::WithStatus<&'static str>, warp::Rejection> {
    if path.as_str().trim_end_matches('/') != CALLBACK_PATH {
        return Err(warp::reject::not_found());
    }
    if method.as_str() != "NOTIFY" {
        return Err(warp::reject::custom(MethodNotAllowed));
    }

    let sid = match sid.as_deref().map(str::trim) {
        Some(sid) if !sid.is_empty() && validate_upnp_headers(&nt, &nts) => sid.to_string(),
        _ => {
            tracing::warn!(?sid, ?nt, ?nts, "rejecting NOTIFY with invalid UPnP headers");
            return Err(warp::reject::custom(InvalidUpnpHeaders));
        }
    };

    tracing::debug!(%sid, bytes = body.len(), "NOTIFY received");
    let event_xml = String::from_utf8_lossy(&body).into_owned();

    if !router.route_event(sid, event_xml) {
        tracing::warn!("notification receiver closed, event dropped");
    }

    Ok(warp::reply::with_status("", StatusCode::OK))
}

/// NT and NTS are optional, but when both are sent they must be the eventing values.
fn validate_upnp_headers(nt: &Option<String>, nts: &Option<String>) -> bool {
    match (nt, nts) {
        (Some(nt), Some(nts)) => nt == "upnp:event" && nts == "upnp:propchange",
        _ => true,
    }
}

#[derive(Debug)]
struct InvalidUpnpHeaders;

impl warp::reject::Reject for InvalidUpnpHeaders {}

#[derive(Debug)]
struct MethodNotAllowed;

impl warp::reject::Reject for MethodNotAllowed {}

/// Handle rejections and convert them to HTTP responses.
async fn handle_rejection(
    err: warp::Rejection,
) -> Result<impl warp::Reply, std::convert::Infallible> {
    let (code, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found")
    } else if err.find::<MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Only NOTIFY is accepted")
    } else if err.find::<InvalidUpnpHeaders>().is_some() {
        (StatusCode::BAD_REQUEST, "Invalid UPnP headers")
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    };

    Ok(warp::reply::with_status(message, code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_validate_upnp_headers() {
        assert!(validate_upnp_headers(&None, &None));
        assert!(validate_upnp_headers(&Some("upnp:event".to_string()), &None));
        assert!(validate_upnp_headers(
            &Some("upnp:event".to_string()),
            &Some("upnp:propchange".to_string()),
        ));
        assert!(!validate_upnp_headers(
            &Some("upnp:event".to_string()),
            &Some("wrong".to_string()),
        ));
    }

    #[tokio::test]
    async fn test_bind_reports_chosen_port() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let server = CallbackServer::bind((Ipv4Addr::LOCALHOST, 0).into(), tx)
            .await
            .unwrap();

        assert_ne!(server.port(), 0);
        assert_eq!(
            server.callback_url(),
            format!("http://127.0.0.1:{}/listener", server.port())
        );
        assert_eq!(server.callback_host(), format!("127.0.0.1:{}", server.port()));

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_bind_advertising_uses_given_ip() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let server = CallbackServer::bind_advertising(
            (Ipv4Addr::LOCALHOST, 0).into(),
            IpAddr::V4(Ipv4Addr::new(10, 0, 1, 2)),
            tx,
        )
        .await
        .unwrap();

        assert_eq!(
            server.callback_url(),
            format!("http://10.0.1.2:{}/listener", server.port())
        );
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_bind_conflict_is_error() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let first = CallbackServer::bind((Ipv4Addr::LOCALHOST, 0).into(), tx.clone())
            .await
            .unwrap();

        let second = CallbackServer::bind(first.local_addr(), tx).await;
        assert!(matches!(second, Err(ServerError::Bind { .. })));

        first.shutdown().await;
    }
}
