//! Client-side token lifecycle.
//!
//! [`AuthAgent`] logs in as soon as it is spawned and then refreshes the
//! access token from a background task. A failed refresh is retried after a
//! short interval, after which the normal period resumes. The latest token
//! lives in a [`TokenCell`] shared with every [`AuthAgentService`], which
//! attaches it to outgoing calls whose method requires authentication.

use catalog_tonic_core::{
    proto::{LoginRequest, auth_service_client::AuthServiceClient},
    types::{AUTHORIZATION_KEY, CREATE_LAPTOP, RATE_LAPTOP, UPLOAD_IMAGE},
};
use core::{
    task::{Context, Poll},
    time::Duration,
};
use parking_lot::RwLock;
use std::{collections::HashSet, sync::Arc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tonic::{
    Status,
    codegen::http::{self, HeaderValue},
    transport::Channel,
};
use tower::{Layer, Service};

/// Methods that need a token unless told otherwise.
pub const DEFAULT_AUTH_METHODS: [&str; 3] = [CREATE_LAPTOP, UPLOAD_IMAGE, RATE_LAPTOP];

/// Latest access token. Written by the refresh task, read by every call.
#[derive(Debug, Default)]
pub struct TokenCell {
    token: RwLock<Option<String>>,
}

impl TokenCell {
    pub fn get(&self) -> Option<String> {
        self.token.read().clone()
    }

    pub fn set(&self, token: String) {
        *self.token.write() = Some(token);
    }
}

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl core::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Keeps an access token fresh for as long as it is alive.
///
/// The background task stops on [`AuthAgent::shutdown`] or when the agent is
/// dropped.
pub struct AuthAgent {
    token: Arc<TokenCell>,
    methods: Arc<HashSet<String>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl AuthAgent {
    /// Logs in over `channel` and starts the refresh task.
    ///
    /// `methods` lists the fully-qualified method paths the agent's layer
    /// attaches the token to.
    ///
    /// # Errors
    ///
    /// Returns the status of the first login if it fails. No task is started
    /// in that case.
    pub async fn spawn<M>(
        channel: Channel,
        credentials: Credentials,
        refresh_interval: Duration,
        retry_interval: Duration,
        methods: M,
    ) -> Result<Self, Status>
    where
        M: IntoIterator,
        M::Item: Into<String>,
    {
        let mut client = AuthServiceClient::new(channel);
        let token = Arc::new(TokenCell::default());
        token.set(login(&mut client, &credentials).await?);
        tracing::info!(username = %credentials.username, "logged in");

        let cancel = CancellationToken::new();
        let task = tokio::spawn(refresh_loop(
            client,
            credentials,
            Arc::clone(&token),
            refresh_interval,
            retry_interval,
            cancel.clone(),
        ));

        Ok(Self {
            token,
            methods: Arc::new(methods.into_iter().map(Into::into).collect()),
            cancel,
            task: Some(task),
        })
    }

    pub fn token(&self) -> &Arc<TokenCell> {
        &self.token
    }

    /// Layer that attaches the current token to calls needing one.
    pub fn layer(&self) -> AuthAgentLayer {
        AuthAgentLayer::new(Arc::clone(&self.token), Arc::clone(&self.methods))
    }

    /// Stops the refresh task and waits for it to exit. Tokens already handed
    /// out stay in the cell.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!("token refresh task failed: {e}");
            }
        }
    }
}

impl Drop for AuthAgent {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn login(
    client: &mut AuthServiceClient<Channel>,
    credentials: &Credentials,
) -> Result<String, Status> {
    let resp = client
        .login(LoginRequest {
            username: credentials.username.clone(),
            password: credentials.password.clone(),
        })
        .await?;
    Ok(resp.into_inner().access_token)
}

async fn refresh_loop(
    mut client: AuthServiceClient<Channel>,
    credentials: Credentials,
    token: Arc<TokenCell>,
    refresh_interval: Duration,
    retry_interval: Duration,
    cancel: CancellationToken,
) {
    let mut wait = refresh_interval;
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(wait) => {}
        }

        let outcome = tokio::select! {
            () = cancel.cancelled() => break,
            outcome = login(&mut client, &credentials) => outcome,
        };

        match outcome {
            Ok(fresh) => {
                token.set(fresh);
                wait = refresh_interval;
                tracing::debug!("access token refreshed");
            }
            Err(status) => {
                wait = retry_interval;
                tracing::warn!(
                    "token refresh failed, retrying in {retry_interval:?}: {}",
                    status.message()
                );
            }
        }
    }
    tracing::debug!("token refresh stopped");
}

/// Tower layer producing [`AuthAgentService`]s.
#[derive(Clone)]
pub struct AuthAgentLayer {
    token: Arc<TokenCell>,
    methods: Arc<HashSet<String>>,
}

impl AuthAgentLayer {
    pub fn new(token: Arc<TokenCell>, methods: Arc<HashSet<String>>) -> Self {
        Self { token, methods }
    }
}

impl<S> Layer<S> for AuthAgentLayer {
    type Service = AuthAgentService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthAgentService {
            inner,
            token: Arc::clone(&self.token),
            methods: Arc::clone(&self.methods),
        }
    }
}

/// Inserts the `authorization` entry on calls to protected methods. Other
/// calls, and calls made before any token is available, pass unchanged.
#[derive(Clone)]
pub struct AuthAgentService<S> {
    inner: S,
    token: Arc<TokenCell>,
    methods: Arc<HashSet<String>>,
}

impl<S, B> Service<http::Request<B>> for AuthAgentService<S>
where
    S: Service<http::Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: http::Request<B>) -> Self::Future {
        if self.methods.contains(req.uri().path()) {
            match self.token.get().map(|t| HeaderValue::from_str(&t)) {
                Some(Ok(value)) => {
                    req.headers_mut().insert(AUTHORIZATION_KEY, value);
                }
                Some(Err(_)) => tracing::warn!("access token is not a valid header value"),
                None => tracing::debug!(method = req.uri().path(), "no access token yet"),
            }
        }
        self.inner.call(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_tonic_core::types::SEARCH_LAPTOP;
    use tower::ServiceExt;

    /// Sends a request for `path` through `layer` and returns the
    /// `authorization` value the inner service saw.
    async fn seen(layer: &AuthAgentLayer, path: &str) -> Option<String> {
        let inner = tower::service_fn(|req: http::Request<()>| async move {
            Ok::<_, core::convert::Infallible>(
                req.headers()
                    .get(AUTHORIZATION_KEY)
                    .map(|v| v.to_str().unwrap().to_string()),
            )
        });
        layer.layer(inner).oneshot(request(path)).await.unwrap()
    }

    fn request(path: &str) -> http::Request<()> {
        http::Request::builder()
            .uri(format!("http://localhost{path}"))
            .body(())
            .unwrap()
    }

    fn layer(token: &Arc<TokenCell>) -> AuthAgentLayer {
        AuthAgentLayer::new(
            Arc::clone(token),
            Arc::new(DEFAULT_AUTH_METHODS.iter().map(|m| m.to_string()).collect()),
        )
    }

    #[test]
    fn token_cell_keeps_the_latest_value() {
        let cell = TokenCell::default();
        assert_eq!(cell.get(), None);
        cell.set("one".into());
        cell.set("two".into());
        assert_eq!(cell.get().as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn token_is_attached_only_to_protected_methods() {
        let token = Arc::new(TokenCell::default());
        token.set("abc".into());
        let layer = layer(&token);

        for path in DEFAULT_AUTH_METHODS {
            assert_eq!(seen(&layer, path).await.as_deref(), Some("abc"), "{path}");
        }
        assert_eq!(seen(&layer, SEARCH_LAPTOP).await, None);
    }

    #[tokio::test]
    async fn refreshed_token_is_picked_up_by_existing_layers() {
        let token = Arc::new(TokenCell::default());
        let layer = layer(&token);
        assert_eq!(seen(&layer, CREATE_LAPTOP).await, None);

        token.set("fresh".into());
        assert_eq!(seen(&layer, CREATE_LAPTOP).await.as_deref(), Some("fresh"));
    }

    #[test]
    fn credentials_debug_hides_the_password() {
        let creds = Credentials {
            username: "admin1".into(),
            password: "secret".into(),
        };
        assert!(!format!("{creds:?}").contains("secret"));
    }
}
