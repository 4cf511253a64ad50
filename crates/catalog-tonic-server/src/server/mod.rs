//! Catalog server: stores, auth, services and the transport around them.
//!
//! ## Structure
//!
//! - [`config`] - command line / environment configuration.
//! - [`store`] - laptop, image, rating and user storage.
//! - [`auth`] - token issuing/verification and the inbound auth gate.
//! - [`streaming`] - protocol state machines behind the streaming calls.
//! - [`service`] - the tonic service implementations.
//! - [`telemetry`] - logging, tracing and metric setup.

pub mod auth;
pub mod config;
pub mod service;
pub mod store;
pub mod streaming;
pub mod telemetry;

use anyhow::Context;
use auth::{AuthGate, AuthGateLayer, JwtManager};
use catalog_tonic_core::proto::{
    FILE_DESCRIPTOR_SET, auth_service_server::AuthServiceServer,
    laptop_service_server::LaptopServiceServer,
};
use config::ServerConfig;
use core::{future::Future, time::Duration};
use futures::Stream;
use service::{CatalogService, LoginService};
use std::sync::Arc;
use store::{
    DiskImageStore, InMemoryLaptopStore, InMemoryRatingStore, InMemoryUserStore, UserStore,
    seed_users,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tonic::{
    codec::CompressionEncoding,
    transport::{Server, server::Connected},
};
use tonic_reflection::server::Builder;
use tonic_web::GrpcWebLayer;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

/// Everything a running server needs, wired from a [`ServerConfig`].
#[derive(Clone)]
pub struct Services {
    pub catalog: CatalogService,
    pub login: LoginService,
    pub gate: Arc<AuthGate>,
    pub users: Arc<dyn UserStore>,
    pub jwt: Arc<JwtManager>,
    pub shutdown_timeout: Duration,
}

impl Services {
    /// Builds the stores and services. Creates the image folder if needed and
    /// registers the demo accounts when `seed_users` is set.
    pub fn from_config(config: &ServerConfig) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.image_folder).with_context(|| {
            format!(
                "cannot create image folder {}",
                config.image_folder.display()
            )
        })?;

        let users: Arc<dyn UserStore> = Arc::new(InMemoryUserStore::new());
        if config.seed_users {
            seed_users(users.as_ref()).context("cannot seed users")?;
        }

        let jwt = Arc::new(JwtManager::new(
            &config.token_secret,
            config.token_duration,
        ));
        let gate = Arc::new(AuthGate::new(Arc::clone(&jwt), AuthGate::default_access()));

        let catalog = CatalogService::new(
            Arc::new(InMemoryLaptopStore::new()),
            Arc::new(DiskImageStore::new(&config.image_folder)),
            Arc::new(InMemoryRatingStore::new()),
            config.stream_buffer_size,
        );
        let login = LoginService::new(Arc::clone(&users), Arc::clone(&jwt));

        Ok(Self {
            catalog,
            login,
            gate,
            users,
            jwt,
            shutdown_timeout: config.shutdown_timeout,
        })
    }
}

/// Serves the catalog on `incoming` until `signal` resolves, then drains.
///
/// Besides `LaptopService` and `AuthService` the server exposes gRPC health
/// and reflection, accepts gRPC-web (HTTP/1.1) with permissive CORS and
/// negotiates zstd/gzip/deflate compression. Every call passes the
/// [`AuthGate`] before it reaches a handler.
pub async fn run_server_with_incoming<I, IO, IE, F>(
    services: Services,
    incoming: I,
    signal: F,
) -> anyhow::Result<()>
where
    I: Stream<Item = Result<IO, IE>>,
    IO: AsyncRead + AsyncWrite + Connected + Unpin + Send + 'static,
    IE: Into<tower::BoxError>,
    F: Future<Output = ()>,
{
    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<LaptopServiceServer<CatalogService>>()
        .await;
    health_reporter
        .set_serving::<AuthServiceServer<LoginService>>()
        .await;

    let reflection = Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    let catalog = services.catalog.clone();
    let shutdown_timeout = services.shutdown_timeout;
    let shutdown = async move {
        signal.await;
        tracing::info!("Shutdown signal received, terminating gracefully...");

        // 1. Publish the status
        health_reporter
            .set_not_serving::<LaptopServiceServer<CatalogService>>()
            .await;
        health_reporter
            .set_not_serving::<AuthServiceServer<LoginService>>()
            .await;

        // 2. Drain and cancel in-flight calls
        catalog.shutdown(shutdown_timeout).await;
    };

    Server::builder()
        .accept_http1(true)
        .http2_adaptive_window(Some(true))
        .layer(
            ServiceBuilder::new()
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                )
                .layer(GrpcWebLayer::new())
                .layer(AuthGateLayer::new(services.gate)),
        )
        .add_service(health_service)
        .add_service(reflection)
        .add_service(build_auth_service(services.login))
        .add_service(build_laptop_service(services.catalog))
        .serve_with_incoming_shutdown(incoming, shutdown)
        .await?;

    tracing::info!("Service shut down successfully");
    Ok(())
}

fn build_laptop_service(service: CatalogService) -> LaptopServiceServer<CatalogService> {
    LaptopServiceServer::new(service)
        .send_compressed(CompressionEncoding::Zstd)
        .send_compressed(CompressionEncoding::Gzip)
        .send_compressed(CompressionEncoding::Deflate)
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
        .accept_compressed(CompressionEncoding::Deflate)
}

fn build_auth_service(service: LoginService) -> AuthServiceServer<LoginService> {
    AuthServiceServer::new(service)
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
        .accept_compressed(CompressionEncoding::Deflate)
}
