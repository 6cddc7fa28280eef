//! Configuração do clipchain carregada a partir de `clipchain.toml`.
//!
//! A struct [`ClipConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! Variáveis de ambiente (`OPENAI_API_KEY`, `GOOGLE_CLOUD_PROJECT`,
//! `VERTEX_ACCESS_TOKEN`, `CLIPCHAIN_STORAGE_URI`) têm precedência sobre o arquivo.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::auth::AuthMethod;
use crate::provider::sora::SORA_REGION;
use crate::provider::{ProviderError, ProviderKind};
use crate::resolver::CandidateList;

const CONFIG_FILE: &str = "clipchain.toml";

/// Formato da saída de log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Configuração de nível superior carregada de `clipchain.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClipConfig {
    /// Filtro de log padrão quando `RUST_LOG` não está definido.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,

    #[serde(default)]
    pub veo: VeoConfig,

    #[serde(default)]
    pub sora: SoraConfig,

    #[serde(default)]
    pub timeouts: TimeoutPolicy,

    #[serde(default)]
    pub extension: ExtensionConfig,
}

/// Parâmetros do provedor Veo (Vertex AI).
#[derive(Debug, Clone, Deserialize)]
pub struct VeoConfig {
    /// Projeto GCP. Sem projeto, o provedor Veo fica desabilitado.
    #[serde(default)]
    pub project: String,

    /// Modelo preferido; tentado primeiro em cada região.
    #[serde(default = "default_veo_model")]
    pub model: String,

    /// Modelos alternativos, em ordem de preferência.
    #[serde(default = "default_veo_fallback_models")]
    pub fallback_models: Vec<String>,

    #[serde(default = "default_veo_regions")]
    pub regions: Vec<String>,

    /// Prefixo `gs://` onde o Veo grava os vídeos gerados.
    #[serde(default)]
    pub storage_uri: Option<String>,

    /// Substitui a URL da API (pode conter `{region}`).
    #[serde(default)]
    pub base_url: Option<String>,

    /// Métodos de autenticação, em ordem; o segundo é o alternativo usado após um 401.
    #[serde(default = "default_veo_auth")]
    pub auth: Vec<AuthMethod>,
}

/// Parâmetros do provedor Sora (OpenAI).
#[derive(Debug, Clone, Deserialize)]
pub struct SoraConfig {
    /// Chave da API OpenAI. Sem chave, o provedor Sora fica desabilitado.
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_sora_model")]
    pub model: String,

    #[serde(default = "default_sora_fallback_models")]
    pub fallback_models: Vec<String>,

    #[serde(default)]
    pub base_url: Option<String>,
}

/// Orçamento de tempo das chamadas aos provedores, proporcional à duração pedida.
///
/// `timeout = clamp(base + per_video_second * segundos, floor, ceiling)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TimeoutPolicy {
    #[serde(default = "default_base_secs")]
    pub base_secs: u64,
    #[serde(default = "default_per_video_second_secs")]
    pub per_video_second_secs: u64,
    #[serde(default = "default_floor_secs")]
    pub floor_secs: u64,
    #[serde(default = "default_ceiling_secs")]
    pub ceiling_secs: u64,
}

/// Política de extensão automática.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct ExtensionConfig {
    /// Quantas falhas de extensão são retentadas automaticamente antes de a
    /// cadeia parar. `0` = para na primeira falha.
    #[serde(default)]
    pub auto_retries: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_veo_model() -> String {
    "veo-3.1-generate-preview".to_string()
}

fn default_veo_fallback_models() -> Vec<String> {
    vec![
        "veo-3.1-fast-generate-preview".to_string(),
        "veo-2.0-generate-001".to_string(),
    ]
}

fn default_veo_regions() -> Vec<String> {
    vec!["us-central1".to_string(), "us-east4".to_string()]
}

fn default_veo_auth() -> Vec<AuthMethod> {
    vec![AuthMethod::gcloud_user(), AuthMethod::gcloud_application_default()]
}

fn default_sora_model() -> String {
    "sora-2".to_string()
}

fn default_sora_fallback_models() -> Vec<String> {
    vec!["sora-2-pro".to_string()]
}

fn default_base_secs() -> u64 {
    20
}

fn default_per_video_second_secs() -> u64 {
    4
}

fn default_floor_secs() -> u64 {
    30
}

fn default_ceiling_secs() -> u64 {
    600
}

impl Default for VeoConfig {
    fn default() -> Self {
        Self {
            project: String::new(),
            model: default_veo_model(),
            fallback_models: default_veo_fallback_models(),
            regions: default_veo_regions(),
            storage_uri: None,
            base_url: None,
            auth: default_veo_auth(),
        }
    }
}

impl Default for SoraConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_sora_model(),
            fallback_models: default_sora_fallback_models(),
            base_url: None,
        }
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            base_secs: default_base_secs(),
            per_video_second_secs: default_per_video_second_secs(),
            floor_secs: default_floor_secs(),
            ceiling_secs: default_ceiling_secs(),
        }
    }
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            veo: VeoConfig::default(),
            sora: SoraConfig::default(),
            timeouts: TimeoutPolicy::default(),
            extension: ExtensionConfig::default(),
        }
    }
}

impl TimeoutPolicy {
    /// Orçamento para uma chamada envolvendo `video_secs` segundos de vídeo.
    pub fn for_duration(&self, video_secs: u32) -> Duration {
        let ceiling = self.ceiling_secs.max(self.floor_secs);
        let scaled = self
            .base_secs
            .saturating_add(self.per_video_second_secs.saturating_mul(u64::from(video_secs)));
        Duration::from_secs(scaled.clamp(self.floor_secs, ceiling))
    }

    pub fn ceiling(&self) -> Duration {
        Duration::from_secs(self.ceiling_secs.max(self.floor_secs))
    }

    /// Executa `call` dentro do orçamento; estouro vira [`ProviderError::Timeout`].
    pub async fn run<T, F>(&self, video_secs: u32, call: F) -> Result<T, ProviderError>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        let budget = self.for_duration(video_secs);
        match tokio::time::timeout(budget, call).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                after_secs: budget.as_secs(),
            }),
        }
    }
}

impl ClipConfig {
    /// Carrega a configuração de `clipchain.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self> {
        let path = Path::new(CONFIG_FILE);
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Carrega a configuração de um arquivo explícito, aplicando as variáveis de ambiente.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str::<ClipConfig>(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Sobrescreve campos com variáveis de ambiente não vazias.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = var("OPENAI_API_KEY") {
            self.sora.api_key = key;
        }
        if let Some(project) = var("GOOGLE_CLOUD_PROJECT") {
            self.veo.project = project;
        }
        if let Some(uri) = var("CLIPCHAIN_STORAGE_URI") {
            self.veo.storage_uri = Some(uri);
        }
        // Token explícito vira o método primário; os demais ficam como alternativos.
        if let Some(token) = var("VERTEX_ACCESS_TOKEN") {
            self.veo.auth.insert(0, AuthMethod::Static { token });
        }
    }

    /// Lista de candidatos (modelo, região) para o provedor, em ordem de preferência.
    pub fn candidates(&self, provider: ProviderKind) -> CandidateList {
        match provider {
            ProviderKind::Veo => CandidateList::new(
                std::iter::once(self.veo.model.clone())
                    .chain(self.veo.fallback_models.iter().cloned())
                    .collect(),
                self.veo.regions.clone(),
            ),
            ProviderKind::Sora => CandidateList::new(
                std::iter::once(self.sora.model.clone())
                    .chain(self.sora.fallback_models.iter().cloned())
                    .collect(),
                vec![SORA_REGION.to_string()],
            ),
        }
    }
}
