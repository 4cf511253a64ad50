use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use catalog_tonic_core::{Error, Result, types::roles};
use parking_lot::RwLock;
use std::collections::HashMap;

/// A registered account.
///
/// Only the argon2 PHC string of the password is kept.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub username: String,
    pub hashed_password: String,
    pub role: String,
}

impl User {
    /// Creates a user, hashing `password` with a random salt.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if hashing fails.
    pub fn new(username: &str, password: &str, role: &str) -> Result<Self> {
        let salt_bytes: [u8; 16] = rand::random();
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| Error::internal(format!("cannot encode salt: {e}")))?;
        let hashed_password = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| Error::internal(format!("cannot hash password: {e}")))?
            .to_string();

        Ok(Self {
            username: username.to_string(),
            hashed_password,
            role: role.to_string(),
        })
    }

    pub fn is_correct_password(&self, password: &str) -> bool {
        PasswordHash::new(&self.hashed_password).is_ok_and(|hash| {
            Argon2::default()
                .verify_password(password.as_bytes(), &hash)
                .is_ok()
        })
    }
}

/// Account storage consulted by the login call.
pub trait UserStore: Send + Sync {
    /// # Errors
    ///
    /// Returns [`Error::AlreadyExists`] if the username is taken.
    fn save(&self, user: User) -> Result<()>;

    fn find(&self, username: &str) -> Option<User>;
}

#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserStore for InMemoryUserStore {
    fn save(&self, user: User) -> Result<()> {
        let mut users = self.users.write();
        if users.contains_key(&user.username) {
            return Err(Error::AlreadyExists {
                kind: "user",
                id: user.username,
            });
        }
        users.insert(user.username.clone(), user);
        Ok(())
    }

    fn find(&self, username: &str) -> Option<User> {
        self.users.read().get(username).cloned()
    }
}

/// Registers the demo accounts `admin1` (admin) and `user1` (user), both
/// with password `secret`.
pub fn seed_users(store: &dyn UserStore) -> Result<()> {
    store.save(User::new("admin1", "secret", roles::ADMIN)?)?;
    store.save(User::new("user1", "secret", roles::USER)?)?;
    Ok(())
}
