//! Storing and reading back the inference template.

use scriptbayes_core::InferenceTemplate;
use tracing::info;

use crate::backend::SearchBackend;
use crate::SearchError;

/// Store `template` under its id, replacing whatever was there.
pub async fn publish<B: SearchBackend + ?Sized>(
    backend: &B,
    template: &InferenceTemplate,
) -> Result<(), SearchError> {
    let params = template.params()?;
    backend
        .put_script(template.id(), &template.script_request())
        .await?;
    info!(
        id = template.id(),
        features = params.features.len(),
        labels = ?params.labels,
        "published inference template"
    );
    Ok(())
}

/// Read a stored template back.
pub async fn fetch_template<B: SearchBackend + ?Sized>(
    backend: &B,
    id: &str,
) -> Result<InferenceTemplate, SearchError> {
    let stored = backend
        .get_script(id)
        .await?
        .ok_or_else(|| SearchError::TemplateNotFound(id.to_string()))?;
    Ok(InferenceTemplate::from_stored(id, &stored.source)?)
}
