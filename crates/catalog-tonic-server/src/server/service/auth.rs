use super::reject;
use crate::server::{
    auth::JwtManager,
    store::{User, UserStore},
    telemetry::increment_requests,
};
use catalog_tonic_core::{
    Error,
    proto::{LoginRequest, LoginResponse, auth_service_server::AuthService},
};
use std::sync::Arc;
use tonic::{Request, Response, Status};

/// Issues access tokens in exchange for a username and password.
#[derive(Clone)]
pub struct LoginService {
    users: Arc<dyn UserStore>,
    jwt: Arc<JwtManager>,
}

impl LoginService {
    pub fn new(users: Arc<dyn UserStore>, jwt: Arc<JwtManager>) -> Self {
        Self { users, jwt }
    }
}

#[tonic::async_trait]
impl AuthService for LoginService {
    #[tracing::instrument(skip_all, fields(username = %req.get_ref().username))]
    async fn login(&self, req: Request<LoginRequest>) -> Result<Response<LoginResponse>, Status> {
        increment_requests();
        let LoginRequest { username, password } = req.into_inner();

        // Argon2 is CPU bound.
        let candidate = self.users.find(&username);
        let user: Option<User> = tokio::task::spawn_blocking(move || {
            candidate.filter(|user| user.is_correct_password(&password))
        })
        .await
        .map_err(|e| reject(Error::internal(format!("password check failed: {e}"))))?;

        let user = user.ok_or_else(|| reject(Error::BadCredentials))?;
        let access_token = self.jwt.generate(&user).map_err(reject)?;

        tracing::info!(role = %user.role, "user logged in");
        Ok(Response::new(LoginResponse { access_token }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::store::{InMemoryUserStore, seed_users};
    use catalog_tonic_core::types::roles;
    use core::time::Duration;
    use tonic::Code;

    fn service() -> LoginService {
        let users = Arc::new(InMemoryUserStore::new());
        seed_users(users.as_ref()).unwrap();
        LoginService::new(
            users,
            Arc::new(JwtManager::new("secret", Duration::from_secs(60))),
        )
    }

    fn login(username: &str, password: &str) -> Request<LoginRequest> {
        Request::new(LoginRequest {
            username: username.into(),
            password: password.into(),
        })
    }

    #[tokio::test]
    async fn valid_credentials_yield_a_verifiable_token() {
        let service = service();
        let token = service
            .login(login("admin1", "secret"))
            .await
            .unwrap()
            .into_inner()
            .access_token;

        let claims = service.jwt.verify(&token).unwrap();
        assert_eq!(claims.sub, "admin1");
        assert_eq!(claims.role, roles::ADMIN);
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_user_look_the_same() {
        let service = service();

        let wrong = service.login(login("user1", "nope")).await.unwrap_err();
        let unknown = service.login(login("ghost", "secret")).await.unwrap_err();

        assert_eq!(wrong.code(), Code::NotFound);
        assert_eq!(unknown.code(), Code::NotFound);
        assert_eq!(wrong.message(), unknown.message());
        assert_eq!(wrong.message(), "incorrect username/password");
    }
}
