//! Wire protocol shared by every embedder backend (spec §6.4): a single
//! request/response codec regardless of which concrete service answers it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct EmbedRequest {
    pub model: String,
    pub input: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct EmbedDatum {
    pub embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
pub struct EmbedResponse {
    pub data: Vec<EmbedDatum>,
}
