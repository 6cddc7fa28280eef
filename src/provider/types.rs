//! Tipos de dados para requisições e respostas das APIs de vídeo.
//!
//! Os tipos `Veo*` seguem o formato das operações de longa duração do
//! Vertex AI (`predictLongRunning` / `fetchPredictOperation`); os tipos
//! `Sora*` seguem o endpoint `/v1/videos` da OpenAI. Todos derivam
//! `Serialize`/`Deserialize` para conversão JSON.

use serde::{Deserialize, Serialize};

/// Corpo de `:predictLongRunning` (submissão inicial e extensão).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VeoPredictRequest {
    pub instances: Vec<VeoInstance>,
    pub parameters: VeoParameters,
}

/// Uma instância de geração: o prompt e, para extensões, o vídeo de origem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VeoInstance {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<VeoVideo>,
}

/// Parâmetros de geração. Serializados em camelCase.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VeoParameters {
    pub duration_seconds: u32,
    pub sample_count: u32,
    pub aspect_ratio: String,
    pub resolution: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_uri: Option<String>,
}

/// Um vídeo, seja como referência de entrada ou como resultado.
/// Exatamente um entre `gcs_uri` e `bytes_base64_encoded` costuma estar presente.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VeoVideo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcs_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_base64_encoded: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Resposta de `:predictLongRunning`: apenas o nome da operação.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VeoOperationName {
    pub name: String,
}

/// Corpo de `:fetchPredictOperation`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VeoFetchRequest {
    pub operation_name: String,
}

/// Estado de uma operação de longa duração.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VeoOperation {
    pub name: String,
    /// `false` (ou ausente) enquanto a geração está em andamento.
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<VeoStatus>,
    #[serde(default)]
    pub response: Option<VeoGenerateResponse>,
}

/// Erro no formato `google.rpc.Status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VeoStatus {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

/// Resultado de uma operação concluída.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VeoGenerateResponse {
    #[serde(default)]
    pub videos: Vec<VeoVideo>,
    /// Quantos vídeos foram descartados pelos filtros de segurança.
    #[serde(default)]
    pub rai_media_filtered_count: Option<u32>,
    #[serde(default)]
    pub rai_media_filtered_reasons: Vec<String>,
}

/// Corpo de `POST /v1/videos`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoraCreateRequest {
    pub model: String,
    pub prompt: String,
    /// A API espera a duração como string ("4", "8" ou "12").
    pub seconds: String,
    pub size: String,
}

/// Objeto de vídeo retornado por criação e consulta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoraVideo {
    pub id: String,
    /// "queued", "in_progress", "completed" ou "failed".
    pub status: String,
    #[serde(default)]
    pub progress: Option<u8>,
    #[serde(default)]
    pub seconds: Option<String>,
    #[serde(default)]
    pub error: Option<SoraError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoraError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
}
