use async_trait::async_trait;
use log::info;
use std::error::Error;
use tokio::sync::watch;

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn is_authenticated(&self) -> watch::Receiver<bool>;
    async fn sign_out(&self) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// Identity taken from configuration: signed in when a user name was given.
pub struct ConfiguredIdentity {
    user: Option<String>,
    authenticated: watch::Sender<bool>,
}

impl ConfiguredIdentity {
    pub fn new(user: Option<String>) -> Self {
        let user = user.filter(|u| !u.trim().is_empty());
        let (authenticated, _) = watch::channel(user.is_some());
        Self { user, authenticated }
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }
}

#[async_trait]
impl IdentityProvider for ConfiguredIdentity {
    fn is_authenticated(&self) -> watch::Receiver<bool> {
        self.authenticated.subscribe()
    }

    async fn sign_out(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        info!("Signing out {}", self.user.as_deref().unwrap_or("anonymous user"));
        self.authenticated.send_replace(false);
        Ok(())
    }
}
