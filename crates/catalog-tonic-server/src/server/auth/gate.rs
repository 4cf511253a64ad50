//! Inbound authentication and authorization.
//!
//! [`AuthGate`] holds a static table from fully-qualified method path to the
//! roles allowed to call it. Methods missing from the table are public. For
//! every other call the raw token is read from the `authorization` metadata
//! entry, verified with the [`JwtManager`], and the role in its claims is
//! matched against the table.
//!
//! [`AuthGateLayer`] mounts the gate in front of the whole tonic router, so
//! unary and streaming calls alike are rejected before a handler runs. On
//! success the verified [`Claims`] are placed in the request extensions.

use super::token::{Claims, JwtManager};
use catalog_tonic_core::{
    Error, Result,
    types::{AUTHORIZATION_KEY, CREATE_LAPTOP, RATE_LAPTOP, UPLOAD_IMAGE, roles},
};
use core::task::{Context, Poll};
use futures::future::{Either, Ready, ready};
use std::{collections::HashMap, sync::Arc};
use tonic::{
    Status,
    codegen::http::{self, HeaderMap},
};
use tower::{Layer, Service};

/// Method path → roles allowed to call it.
pub type AccessTable = HashMap<&'static str, Vec<&'static str>>;

pub struct AuthGate {
    jwt: Arc<JwtManager>,
    access: AccessTable,
}

impl AuthGate {
    pub fn new(jwt: Arc<JwtManager>, access: AccessTable) -> Self {
        Self { jwt, access }
    }

    /// The catalog's table: creating laptops and uploading images is
    /// reserved to admins, rating is open to admins and users, and search and
    /// login are public.
    pub fn default_access() -> AccessTable {
        HashMap::from([
            (CREATE_LAPTOP, vec![roles::ADMIN]),
            (UPLOAD_IMAGE, vec![roles::ADMIN]),
            (RATE_LAPTOP, vec![roles::ADMIN, roles::USER]),
        ])
    }

    /// Decides whether a call to `path` carrying `headers` may proceed.
    ///
    /// Returns `Ok(None)` for public methods and the verified claims for
    /// protected ones.
    ///
    /// # Errors
    ///
    /// - [`Error::Unauthenticated`] if the token is missing or unreadable.
    /// - [`Error::InvalidToken`] if verification fails.
    /// - [`Error::PermissionDenied`] if the role may not call `path`.
    pub fn authorize(&self, path: &str, headers: &HeaderMap) -> Result<Option<Claims>> {
        let Some(allowed) = self.access.get(path) else {
            return Ok(None);
        };

        let token = headers
            .get(AUTHORIZATION_KEY)
            .ok_or_else(|| Error::Unauthenticated {
                reason: "authorization token is not provided".into(),
            })?
            .to_str()
            .map_err(|_| Error::Unauthenticated {
                reason: "authorization token is not valid ASCII".into(),
            })?;

        let claims = self.jwt.verify(token)?;

        if !allowed.contains(&claims.role.as_str()) {
            return Err(Error::PermissionDenied {
                reason: format!("role {:?} may not call {path}", claims.role),
            });
        }

        Ok(Some(claims))
    }
}

/// Tower layer applying an [`AuthGate`] to every request.
#[derive(Clone)]
pub struct AuthGateLayer {
    gate: Arc<AuthGate>,
}

impl AuthGateLayer {
    pub fn new(gate: Arc<AuthGate>) -> Self {
        Self { gate }
    }
}

impl<S> Layer<S> for AuthGateLayer {
    type Service = AuthGateService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthGateService {
            inner,
            gate: Arc::clone(&self.gate),
        }
    }
}

#[derive(Clone)]
pub struct AuthGateService<S> {
    inner: S,
    gate: Arc<AuthGate>,
}

impl<S, ReqBody, ResBody> Service<http::Request<ReqBody>> for AuthGateService<S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>>,
    ResBody: Default,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Either<Ready<core::result::Result<S::Response, S::Error>>, S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<core::result::Result<(), S::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: http::Request<ReqBody>) -> Self::Future {
        match self.gate.authorize(req.uri().path(), req.headers()) {
            Ok(Some(claims)) => {
                req.extensions_mut().insert(claims);
                Either::Right(self.inner.call(req))
            }
            Ok(None) => Either::Right(self.inner.call(req)),
            Err(err) => {
                tracing::warn!(method = req.uri().path(), "rejected call: {err}");
                crate::server::telemetry::increment_rejected_calls();
                let status = Status::from(err);
                Either::Left(ready(Ok(status.into_http())))
            }
        }
    }
}
