//! Bearer token sources for provider calls.
//!
//! [`Credentials`] holds an ordered list of interchangeable [`AuthMethod`]s.
//! Calls use the active method; on a 401 the endpoint resolver asks for
//! [`Credentials::fallback`] once, which moves to the next method.

use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Tokens issued by a command are reused for this long.
const COMMAND_TOKEN_TTL_MINUTES: i64 = 50;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no authentication method configured")]
    NoMethods,

    #[error("environment variable {0} is not set")]
    MissingEnv(String),

    #[error("token command `{program}` failed: {message}")]
    Command { program: String, message: String },

    #[error("authentication method returned an empty token")]
    EmptyToken,
}

/// One way of obtaining a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum AuthMethod {
    /// A token given verbatim (API key or pre-issued access token).
    Static { token: String },
    /// A token read from an environment variable at call time.
    Env { var: String },
    /// A token printed on stdout by a command, e.g.
    /// `gcloud auth print-access-token`.
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

impl AuthMethod {
    pub fn gcloud_user() -> Self {
        AuthMethod::Command {
            program: "gcloud".into(),
            args: vec!["auth".into(), "print-access-token".into()],
        }
    }

    /// Application-default credentials; honours `GOOGLE_APPLICATION_CREDENTIALS`
    /// pointing at a service-account key.
    pub fn gcloud_application_default() -> Self {
        AuthMethod::Command {
            program: "gcloud".into(),
            args: vec![
                "auth".into(),
                "application-default".into(),
                "print-access-token".into(),
            ],
        }
    }

    fn label(&self) -> String {
        match self {
            AuthMethod::Static { .. } => "static".to_string(),
            AuthMethod::Env { var } => format!("env:{var}"),
            AuthMethod::Command { program, args } => {
                format!("command:{program} {}", args.join(" "))
            }
        }
    }

    async fn fetch(&self) -> Result<String, AuthError> {
        let token = match self {
            AuthMethod::Static { token } => token.clone(),
            AuthMethod::Env { var } => {
                std::env::var(var).map_err(|_| AuthError::MissingEnv(var.clone()))?
            }
            AuthMethod::Command { program, args } => {
                let output = Command::new(program)
                    .args(args)
                    .output()
                    .await
                    .map_err(|e| AuthError::Command {
                        program: program.clone(),
                        message: e.to_string(),
                    })?;
                if !output.status.success() {
                    return Err(AuthError::Command {
                        program: program.clone(),
                        message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                    });
                }
                String::from_utf8_lossy(&output.stdout).to_string()
            }
        };

        let token = token.trim().to_string();
        if token.is_empty() {
            return Err(AuthError::EmptyToken);
        }
        Ok(token)
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    method_index: usize,
    token: String,
    expires_at: DateTime<Utc>,
}

/// Ordered token sources with a single active method.
#[derive(Debug)]
pub struct Credentials {
    methods: Vec<AuthMethod>,
    active: AtomicUsize,
    cache: Mutex<Option<CachedToken>>,
}

impl Credentials {
    pub fn new(methods: Vec<AuthMethod>) -> Self {
        Self {
            methods,
            active: AtomicUsize::new(0),
            cache: Mutex::new(None),
        }
    }

    /// Single static token with no alternate.
    pub fn fixed(token: impl Into<String>) -> Self {
        Self::new(vec![AuthMethod::Static {
            token: token.into(),
        }])
    }

    pub fn active_index(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Token from the active method.
    pub async fn token(&self) -> Result<String, AuthError> {
        let index = self.active_index();
        let method = self.methods.get(index).ok_or(AuthError::NoMethods)?;

        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref()
            && cached.method_index == index
            && cached.expires_at > Utc::now()
        {
            return Ok(cached.token.clone());
        }

        let token = method.fetch().await?;
        debug!(method = %method.label(), "obtained access token");
        if matches!(method, AuthMethod::Command { .. }) {
            *cache = Some(CachedToken {
                method_index: index,
                token: token.clone(),
                expires_at: Utc::now() + ChronoDuration::minutes(COMMAND_TOKEN_TTL_MINUTES),
            });
        }
        Ok(token)
    }

    /// Move to the next method. Returns `false` when there is none.
    pub fn fallback(&self) -> bool {
        let current = self.active_index();
        let next = current + 1;
        if next >= self.methods.len() {
            return false;
        }
        let switched = self
            .active
            .compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if switched {
            warn!(
                from = %self.methods[current].label(),
                to = %self.methods[next].label(),
                "switching to alternate authentication method"
            );
        }
        // A concurrent caller already moved past `current`.
        true
    }
}
