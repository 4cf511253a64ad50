use catalog_tonic_client::{AuthAgent, Credentials, auth::DEFAULT_AUTH_METHODS};
use catalog_tonic_core::proto::{
    LoginRequest, LoginResponse,
    auth_service_server::{AuthService, AuthServiceServer},
};
use core::time::Duration;
use parking_lot::Mutex;
use std::{collections::HashSet, sync::Arc, time::Instant};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::{Request, Response, Status, transport::Channel};

/// Login backend that records every call and fails the ones listed in
/// `failing` (by call index). Successful calls return `token-<index>`.
#[derive(Clone, Default)]
struct ScriptedLogin {
    failing: Arc<HashSet<usize>>,
    calls: Arc<Mutex<Vec<Instant>>>,
}

impl ScriptedLogin {
    fn failing(indices: impl IntoIterator<Item = usize>) -> Self {
        Self {
            failing: Arc::new(indices.into_iter().collect()),
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<Instant> {
        self.calls.lock().clone()
    }
}

#[tonic::async_trait]
impl AuthService for ScriptedLogin {
    async fn login(
        &self,
        _req: Request<LoginRequest>,
    ) -> core::result::Result<Response<LoginResponse>, Status> {
        let index = {
            let mut calls = self.calls.lock();
            calls.push(Instant::now());
            calls.len() - 1
        };
        if self.failing.contains(&index) {
            return Err(Status::unavailable("login backend down"));
        }
        Ok(Response::new(LoginResponse {
            access_token: format!("token-{index}"),
        }))
    }
}

async fn serve(login: ScriptedLogin) -> Channel {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(
        tonic::transport::Server::builder()
            .add_service(AuthServiceServer::new(login))
            .serve_with_incoming(TcpListenerStream::new(listener)),
    );

    Channel::from_shared(format!("http://{addr}"))
        .unwrap()
        .connect()
        .await
        .unwrap()
}

fn credentials() -> Credentials {
    Credentials {
        username: "admin1".into(),
        password: "secret".into(),
    }
}

async fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

#[tokio::test]
async fn failed_refresh_retries_on_the_short_interval() {
    let login = ScriptedLogin::failing([1]);
    let channel = serve(login.clone()).await;

    let refresh = Duration::from_millis(300);
    let retry = Duration::from_millis(20);
    let agent = AuthAgent::spawn(channel, credentials(), refresh, retry, DEFAULT_AUTH_METHODS)
        .await
        .unwrap();
    assert_eq!(agent.token().get().as_deref(), Some("token-0"));

    wait_until("the retried login", || {
        agent.token().get().as_deref() == Some("token-2")
    })
    .await;

    let calls = login.calls();
    let first_refresh = calls[1] - calls[0];
    let retried_after = calls[2] - calls[1];
    assert!(first_refresh >= refresh, "refreshed after {first_refresh:?}");
    assert!(retried_after >= retry, "retried after {retried_after:?}");
    assert!(retried_after < refresh, "retried after {retried_after:?}");

    agent.shutdown().await;
}

#[tokio::test]
async fn token_keeps_rotating_until_shutdown() {
    let login = ScriptedLogin::default();
    let channel = serve(login.clone()).await;

    let agent = AuthAgent::spawn(
        channel,
        credentials(),
        Duration::from_millis(20),
        Duration::from_millis(20),
        DEFAULT_AUTH_METHODS,
    )
    .await
    .unwrap();
    let token = Arc::clone(agent.token());

    wait_until("two refreshes", || login.calls().len() >= 3).await;
    assert_ne!(token.get().as_deref(), Some("token-0"));

    agent.shutdown().await;
    // Lets a login that was already on the wire land.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let after_shutdown = login.calls().len();
    let last_token = token.get();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(login.calls().len(), after_shutdown);
    assert_eq!(token.get(), last_token);
}
