//! Model registry — the list of models a connection can pick from.
//!
//! A [`ModelList`] is never empty: it always carries the configured default
//! model first, or the "no models available" sentinel when there is nothing
//! to offer. Listing failures are logged and absorbed here; callers never
//! see them.

use serde::Serialize;

use super::client::OllamaClient;

/// Synthetic entry used when the registry has nothing to offer.
pub const NO_MODELS_AVAILABLE: &str = "no models available";

// ─── ModelList ───────────────────────────────────────────────────────────────

/// Ordered, deduplicated, non-empty list of model identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ModelList(Vec<String>);

impl ModelList {
    /// Normalize a raw listing.
    ///
    /// 1. Deduplicate, keeping first occurrences (blank names are dropped).
    /// 2. Move `default` to the front if present.
    /// 3. Insert `default` at the front if absent.
    /// 4. Substitute the sentinel if the result is empty.
    pub fn normalize<I>(raw: I, default: Option<&str>) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut models: Vec<String> = Vec::new();
        for name in raw {
            let name = name.trim();
            if name.is_empty() || models.iter().any(|m| m == name) {
                continue;
            }
            models.push(name.to_string());
        }

        if let Some(default) = default.map(str::trim).filter(|d| !d.is_empty()) {
            match models.iter().position(|m| m == default) {
                Some(0) => {}
                Some(idx) => {
                    let promoted = models.remove(idx);
                    models.insert(0, promoted);
                }
                None => models.insert(0, default.to_string()),
            }
        }

        if models.is_empty() {
            return Self::unavailable();
        }
        Self(models)
    }

    /// The single-sentinel list.
    pub fn unavailable() -> Self {
        Self(vec![NO_MODELS_AVAILABLE.to_string()])
    }

    /// Whether this list is the sentinel alone.
    pub fn is_unavailable(&self) -> bool {
        self.0.len() == 1 && self.0[0] == NO_MODELS_AVAILABLE
    }

    /// The entry selected when the user has made no choice.
    pub fn default_model(&self) -> &str {
        // Non-empty by construction.
        &self.0[0]
    }

    /// Resolve a UI selection: the requested model if listed, else the
    /// default entry.
    pub fn select<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        match requested {
            Some(model) if self.contains(model) => model,
            _ => self.default_model(),
        }
    }

    pub fn contains(&self, model: &str) -> bool {
        self.0.iter().any(|m| m == model)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

/// Whether `model` is the "no models available" sentinel.
pub fn is_sentinel(model: &str) -> bool {
    model == NO_MODELS_AVAILABLE
}

// ─── ModelRegistry ───────────────────────────────────────────────────────────

/// Fetches and normalizes the model listing of one inference server.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    client: OllamaClient,
    default_model: Option<String>,
}

impl ModelRegistry {
    pub fn new(client: OllamaClient, default_model: Option<String>) -> Self {
        Self {
            client,
            default_model,
        }
    }

    pub fn default_model(&self) -> Option<&str> {
        self.default_model.as_deref()
    }

    /// Fetch the current listing. Never fails: on any error the listing is
    /// treated as empty.
    pub async fn fetch_models(&self) -> ModelList {
        let raw = match self.client.list_model_names().await {
            Ok(names) => {
                tracing::debug!(count = names.len(), "fetched model listing");
                names
            }
            Err(e) => {
                tracing::warn!(
                    base_url = %self.client.base_url(),
                    error = %e,
                    "model listing failed, falling back to default model"
                );
                Vec::new()
            }
        };

        let models = ModelList::normalize(raw, self.default_model.as_deref());
        tracing::info!(
            models = ?models.as_slice(),
            selected = %models.default_model(),
            "model list refreshed"
        );
        models
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
