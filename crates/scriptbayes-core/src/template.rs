//! Compiles a trained model into a stored search template.
//!
//! The template embeds the model as script parameters so the search engine
//! can run the decision rule itself at query time:
//!
//! ```text
//! predicted = labels[argmax_i(pi[i] + thetas[i] · v)]
//! ```
//!
//! where `v` is the document's weight for each term in `features`. The names
//! `features`, `thetas`, `labels`, and `pi` and their row order are the
//! calling convention of the server-side script and must not change.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{ClassifierModel, FeatureVocabulary, ModelError};

/// Identifier the template is stored under.
pub const TEMPLATE_ID: &str = "model_script";
/// Language the template itself is stored in.
pub const TEMPLATE_LANG: &str = "mustache";
/// Placeholder bound to the caller's `field` parameter at invocation time.
pub const FIELD_PLACEHOLDER: &str = "{{field}}";
/// Script field holding the per-document prediction.
pub const PREDICTED_LABEL: &str = "predicted_label";
/// Aggregation recomputing terms over query-time results.
pub const TERMS_AGGREGATION: &str = "terms";

/// A named server-side script and the language it is registered under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptRef {
    pub lang: String,
    pub source: String,
}

impl ScriptRef {
    pub fn new(lang: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            lang: lang.into(),
            source: source.into(),
        }
    }

    /// Script object invoking this script with `params`.
    pub fn invoke(&self, params: Value) -> Value {
        json!({
            "lang": self.lang,
            "source": self.source,
            "params": params,
        })
    }
}

/// Parameters handed to the inference script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    pub features: Vec<String>,
    pub field: String,
    pub thetas: Vec<Vec<f64>>,
    pub labels: Vec<f64>,
    pub pi: Vec<f64>,
}

impl ModelParams {
    /// Map a model and its vocabulary onto the script parameters.
    ///
    /// `field` is usually [`FIELD_PLACEHOLDER`].
    pub fn compile(
        vocab: &FeatureVocabulary,
        model: &ClassifierModel,
        field: &str,
    ) -> Result<Self, ModelError> {
        if model.num_features() != vocab.len() {
            return Err(ModelError::VocabularyMismatch {
                vocabulary: vocab.len(),
                columns: model.num_features(),
            });
        }
        // serde_json writes NaN and infinities as null.
        ensure_finite("labels", model.labels())?;
        ensure_finite("pi", model.pi())?;
        for row in model.theta() {
            ensure_finite("thetas", row)?;
        }

        Ok(Self {
            features: vocab.terms().to_vec(),
            field: field.to_string(),
            thetas: model.theta().to_vec(),
            labels: model.labels().to_vec(),
            pi: model.pi().to_vec(),
        })
    }

    /// Rebuild the vocabulary and model, re-checking every shape invariant.
    pub fn into_parts(self) -> Result<(FeatureVocabulary, ClassifierModel), ModelError> {
        let vocab = FeatureVocabulary::new(self.features)?;
        let model = ClassifierModel::new(self.labels, self.pi, self.thetas)?;
        if model.num_features() != vocab.len() {
            return Err(ModelError::VocabularyMismatch {
                vocabulary: vocab.len(),
                columns: model.num_features(),
            });
        }
        Ok((vocab, model))
    }
}

fn ensure_finite(param: &'static str, values: &[f64]) -> Result<(), ModelError> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(ModelError::NonFinite { param })
    }
}

/// A compiled, storable search template.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceTemplate {
    id: String,
    body: Value,
}

impl InferenceTemplate {
    /// Assemble the template: a `predicted_label` script field and a `terms`
    /// aggregation, both driven by the same parameters, returning the label
    /// field and `_source`.
    pub fn compile(
        id: impl Into<String>,
        vocab: &FeatureVocabulary,
        model: &ClassifierModel,
        script: &ScriptRef,
        label_field: &str,
    ) -> Result<Self, ModelError> {
        let params = serde_json::to_value(ModelParams::compile(vocab, model, FIELD_PLACEHOLDER)?)
            .map_err(|e| ModelError::MalformedParam {
                param: "params",
                reason: e.to_string(),
            })?;

        let body = json!({
            "script_fields": {
                PREDICTED_LABEL: {
                    "script": script.invoke(params.clone()),
                },
            },
            "aggregations": {
                TERMS_AGGREGATION: {
                    "terms": {
                        "script": script.invoke(params),
                    },
                },
            },
            "fields": [label_field, "_source"],
        });

        Ok(Self {
            id: id.into(),
            body,
        })
    }

    /// Wrap a template body read back from the store.
    ///
    /// Stored templates come back with `source` either as an object or as a
    /// JSON string, depending on how the engine normalised it.
    pub fn from_stored(id: impl Into<String>, source: &Value) -> Result<Self, ModelError> {
        let body = match source {
            Value::String(text) => {
                serde_json::from_str(text).map_err(|e| ModelError::MalformedParam {
                    param: "source",
                    reason: e.to_string(),
                })?
            }
            Value::Object(_) => source.clone(),
            _ => return Err(ModelError::MissingSection("source")),
        };
        Ok(Self {
            id: id.into(),
            body,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Request body for storing this template as a script.
    pub fn script_request(&self) -> Value {
        json!({
            "script": {
                "lang": TEMPLATE_LANG,
                "source": self.body,
            }
        })
    }

    /// Parameters of the `predicted_label` script field.
    ///
    /// Fails if the aggregation disagrees with the script field, since both
    /// must classify with the same model.
    pub fn params(&self) -> Result<ModelParams, ModelError> {
        let field_params = self
            .body
            .pointer(&format!("/script_fields/{PREDICTED_LABEL}/script/params"))
            .ok_or(ModelError::MissingSection("script_fields.predicted_label"))?;
        let agg_params = self
            .body
            .pointer(&format!("/aggregations/{TERMS_AGGREGATION}/terms/script/params"))
            .ok_or(ModelError::MissingSection("aggregations.terms"))?;
        if field_params != agg_params {
            return Err(ModelError::MalformedParam {
                param: "params",
                reason: "script field and aggregation parameters differ".into(),
            });
        }
        parse_params(field_params)
    }

    /// Bind `{{field}}` the way the template engine does at invocation time.
    pub fn render(&self, field: &str) -> Value {
        substitute(&self.body, field)
    }
}

/// Read the four-parameter contract out of a script `params` object.
pub fn parse_params(params: &Value) -> Result<ModelParams, ModelError> {
    let obj = params.as_object().ok_or(ModelError::MalformedParam {
        param: "params",
        reason: "not an object".into(),
    })?;
    for name in ["features", "field", "thetas", "labels", "pi"] {
        if !obj.contains_key(name) {
            return Err(ModelError::MissingParam(name));
        }
    }
    serde_json::from_value(params.clone()).map_err(|e| ModelError::MalformedParam {
        param: "params",
        reason: e.to_string(),
    })
}

fn substitute(value: &Value, field: &str) -> Value {
    match value {
        Value::String(s) => Value::String(s.replace(FIELD_PLACEHOLDER, field)),
        Value::Array(items) => Value::Array(items.iter().map(|v| substitute(v, field)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute(v, field)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab() -> FeatureVocabulary {
        FeatureVocabulary::merge(["bad", "worst", "great"]).unwrap()
    }

    fn model() -> ClassifierModel {
        ClassifierModel::new(
            vec![0.0, 1.0],
            vec![-0.9, -0.5],
            vec![vec![-0.5, -1.0, -3.0], vec![-2.5, -2.0, -0.3]],
        )
        .unwrap()
    }

    fn script() -> ScriptRef {
        ScriptRef::new("native", "nb_model")
    }

    fn compiled() -> InferenceTemplate {
        InferenceTemplate::compile(TEMPLATE_ID, &vocab(), &model(), &script(), "label").unwrap()
    }

    #[test]
    fn params_shapes_follow_labels() {
        let params = compiled().params().unwrap();
        assert_eq!(params.labels, vec![0.0, 1.0]);
        assert_eq!(params.pi.len(), 2);
        assert_eq!(params.thetas.len(), 2);
        assert!(params.thetas.iter().all(|row| row.len() == 3));
        // Row i of thetas and pi[i] stay with labels[i].
        assert_eq!(params.thetas[1], vec![-2.5, -2.0, -0.3]);
        assert_eq!(params.pi[1], -0.5);
        assert_eq!(params.features, vec!["bad", "worst", "great"]);
        assert_eq!(params.field, FIELD_PLACEHOLDER);
    }

    #[test]
    fn template_layout() {
        let t = compiled();
        let body = t.body();
        assert_eq!(
            body.pointer("/script_fields/predicted_label/script/source"),
            Some(&json!("nb_model"))
        );
        assert_eq!(
            body.pointer("/aggregations/terms/terms/script/lang"),
            Some(&json!("native"))
        );
        assert_eq!(body["fields"], json!(["label", "_source"]));

        let request = t.script_request();
        assert_eq!(request["script"]["lang"], json!("mustache"));
        assert_eq!(&request["script"]["source"], body);
    }

    #[test]
    fn terms_are_escaped_by_the_serializer() {
        let vocab = FeatureVocabulary::merge(["say \"hi\"", "a\\b", "x"]).unwrap();
        let t = InferenceTemplate::compile(TEMPLATE_ID, &vocab, &model(), &script(), "label")
            .unwrap();
        let text = t.script_request().to_string();
        let back: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            back.pointer("/script/source/script_fields/predicted_label/script/params/features/0"),
            Some(&json!("say \"hi\""))
        );
    }

    #[test]
    fn compiled_model_predicts_like_the_original() {
        let (vocab, rebuilt) = compiled().params().unwrap().into_parts().unwrap();
        assert_eq!(vocab.terms(), ["bad", "worst", "great"]);
        for v in [[3.0, 1.0, 0.0], [0.0, 0.0, 4.0], [1.0, 1.0, 1.0]] {
            assert_eq!(rebuilt.predict(&v).unwrap(), model().predict(&v).unwrap());
        }
    }

    #[test]
    fn vocabulary_mismatch_is_a_contract_violation() {
        let short = FeatureVocabulary::merge(["bad", "worst"]).unwrap();
        assert_eq!(
            InferenceTemplate::compile(TEMPLATE_ID, &short, &model(), &script(), "label")
                .unwrap_err(),
            ModelError::VocabularyMismatch {
                vocabulary: 2,
                columns: 3
            }
        );
    }

    #[test]
    fn non_finite_parameters_rejected() {
        let model = ClassifierModel::new(
            vec![0.0, 1.0],
            vec![-0.7, -0.7],
            vec![vec![f64::NEG_INFINITY, -1.0, -1.0], vec![-1.0, -1.0, -1.0]],
        )
        .unwrap();
        assert_eq!(
            ModelParams::compile(&vocab(), &model, FIELD_PLACEHOLDER).unwrap_err(),
            ModelError::NonFinite { param: "thetas" }
        );
    }

    #[test]
    fn missing_parameter_detected() {
        let mut params = serde_json::to_value(
            ModelParams::compile(&vocab(), &model(), FIELD_PLACEHOLDER).unwrap(),
        )
        .unwrap();
        params.as_object_mut().unwrap().remove("pi");
        assert_eq!(
            parse_params(&params).unwrap_err(),
            ModelError::MissingParam("pi")
        );
    }

    #[test]
    fn stored_string_source_is_parsed() {
        let t = compiled();
        let stored = Value::String(t.body().to_string());
        let back = InferenceTemplate::from_stored(TEMPLATE_ID, &stored).unwrap();
        assert_eq!(back.body(), t.body());
    }

    #[test]
    fn render_binds_field() {
        let rendered = compiled().render("text");
        assert_eq!(
            rendered.pointer("/script_fields/predicted_label/script/params/field"),
            Some(&json!("text"))
        );
        assert_eq!(
            rendered.pointer("/aggregations/terms/terms/script/params/field"),
            Some(&json!("text"))
        );
    }
}
