//! Tipos de erro para os clientes dos provedores de vídeo.
//!
//! Define [`ProviderError`] com variantes para erros HTTP, rate limiting,
//! falhas de rede, timeouts e erros de contrato (job ainda não pronto).
//! Os classificadores (`is_not_found`, `is_storage_prerequisite`, ...) são
//! usados pelo resolver de endpoints e pelo serviço para decidir entre
//! tentar o próximo candidato, parar ou repassar o erro ao chamador.

use thiserror::Error;

use super::JobStatus;
use crate::auth::AuthError;

/// Erros que podem ocorrer ao interagir com um provedor de vídeo.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// O servidor retornou um status HTTP diferente de 2xx (exceto 429).
    /// Contém o código e o corpo da resposta, sem alteração.
    #[error("provider returned status {status}: {body}")]
    Http { status: u16, body: String },

    /// O servidor retornou HTTP 429.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Falha de rede subjacente (DNS, conexão recusada, timeout do reqwest).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A chamada excedeu o orçamento de tempo calculado para a duração pedida.
    #[error("provider call timed out after {after_secs}s")]
    Timeout { after_secs: u64 },

    /// O corpo da resposta não tinha o formato esperado.
    #[error("failed to parse provider response: {0}")]
    Parse(String),

    /// `fetch_bytes` chamado antes de o job terminar. Violação de contrato,
    /// não uma condição para retentar.
    #[error("job {handle} is not ready for download (status: {status})")]
    NotReady { handle: String, status: JobStatus },

    /// Operação não suportada por este provedor (ex.: extensão no Sora).
    #[error("operation not supported by provider: {0}")]
    Unsupported(&'static str),

    /// Não foi possível obter um token de acesso.
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Falha ao baixar o vídeo do armazenamento de objetos.
    #[error("storage error: {0}")]
    Storage(String),
}

impl ProviderError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Http { status, .. } => Some(*status),
            ProviderError::RateLimited { .. } => Some(429),
            ProviderError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Modelo ou região inexistente para este projeto.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// HTTP 400 cujo corpo indica que falta o URI de armazenamento de saída.
    pub fn is_storage_prerequisite(&self) -> bool {
        match self {
            ProviderError::Http { status: 400, body } => {
                let body = body.to_ascii_lowercase();
                ["storageuri", "storage uri", "storage_uri", "output storage"]
                    .iter()
                    .any(|needle| body.contains(needle))
            }
            _ => false,
        }
    }

    /// Rejeição por política de conteúdo / moderação.
    pub fn is_content_policy(&self) -> bool {
        match self {
            ProviderError::Http { status: 400, body } => {
                let body = body.to_ascii_lowercase();
                [
                    "moderation",
                    "content policy",
                    "safety",
                    "responsible ai",
                    "usage guidelines",
                ]
                .iter()
                .any(|needle| body.contains(needle))
            }
            _ => false,
        }
    }

    /// Erros em que o chamador pode simplesmente consultar de novo mais tarde.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::RateLimited { .. } | ProviderError::Timeout { .. } => true,
            ProviderError::Network(_) => true,
            ProviderError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
