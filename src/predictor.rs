use crate::tokens::words_iter;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PredictorError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid artifact: {0}")]
    Invalid(String),
}

/// Sparse feature vector as `(index, value)` pairs in index order.
pub type Features = Vec<(usize, f64)>;

pub trait FeatureExtractor {
    fn n_features(&self) -> usize;
    fn transform(&self, text: &str) -> Features;
}

pub trait Classifier {
    fn classes(&self) -> &[String];
    fn n_features(&self) -> usize;
    /// Index into `classes` of the predicted label.
    fn predict(&self, x: &Features) -> usize;
    /// Per-class probabilities, if the model provides them.
    fn predict_proba(&self, x: &Features) -> Option<Vec<f64>>;
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Norm {
    L1,
    L2,
}

fn default_norm() -> Option<Norm> {
    Some(Norm::L2)
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Vectorizer {
    Count {
        vocabulary: HashMap<String, usize>,
        #[serde(default)]
        binary: bool,
    },
    Tfidf {
        vocabulary: HashMap<String, usize>,
        idf: Vec<f64>,
        #[serde(default = "default_norm")]
        norm: Option<Norm>,
        #[serde(default)]
        sublinear_tf: bool,
    },
}

impl Vectorizer {
    fn vocabulary(&self) -> &HashMap<String, usize> {
        match self {
            Vectorizer::Count { vocabulary, .. } | Vectorizer::Tfidf { vocabulary, .. } => {
                vocabulary
            }
        }
    }

    fn validate(&self) -> Result<(), PredictorError> {
        let n = self.vocabulary().len();
        if let Some((term, _)) = self.vocabulary().iter().find(|(_, &idx)| idx >= n) {
            return Err(PredictorError::Invalid(format!(
                "vocabulary index of {:?} out of range",
                term
            )));
        }
        if let Vectorizer::Tfidf { idf, .. } = self {
            if idf.len() != n {
                return Err(PredictorError::Invalid(format!(
                    "{} idf weights for {} terms",
                    idf.len(),
                    n
                )));
            }
        }
        Ok(())
    }
}

impl FeatureExtractor for Vectorizer {
    fn n_features(&self) -> usize {
        self.vocabulary().len()
    }

    fn transform(&self, text: &str) -> Features {
        let vocabulary = self.vocabulary();
        let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
        for word in words_iter(text) {
            if let Some(&idx) = vocabulary.get(word) {
                *counts.entry(idx).or_insert(0.0) += 1.0;
            }
        }
        let mut features: Features = counts.into_iter().collect();
        match self {
            Vectorizer::Count { binary, .. } => {
                if *binary {
                    features.iter_mut().for_each(|(_, v)| *v = 1.0);
                }
            }
            Vectorizer::Tfidf {
                idf,
                norm,
                sublinear_tf,
                ..
            } => {
                for (idx, v) in features.iter_mut() {
                    if *sublinear_tf {
                        *v = v.ln() + 1.0;
                    }
                    *v *= idf[*idx];
                }
                let total = match norm {
                    Some(Norm::L1) => features.iter().map(|(_, v)| v.abs()).sum::<f64>(),
                    Some(Norm::L2) => features.iter().map(|(_, v)| v * v).sum::<f64>().sqrt(),
                    None => 0.0,
                };
                if total > 0.0 {
                    features.iter_mut().for_each(|(_, v)| *v /= total);
                }
            }
        }
        features
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Model {
    LogisticRegression {
        classes: Vec<String>,
        coef: Vec<Vec<f64>>,
        intercept: Vec<f64>,
    },
    MultinomialNb {
        classes: Vec<String>,
        class_log_prior: Vec<f64>,
        feature_log_prob: Vec<Vec<f64>>,
    },
    LinearSvc {
        classes: Vec<String>,
        coef: Vec<Vec<f64>>,
        intercept: Vec<f64>,
    },
}

fn dot(row: &[f64], x: &Features) -> f64 {
    x.iter().map(|&(idx, v)| row[idx] * v).sum()
}

fn argmax(scores: &[f64]) -> usize {
    let mut best = 0;
    for (i, &score) in scores.iter().enumerate() {
        if score > scores[best] {
            best = i;
        }
    }
    best
}

fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f64 = exp.iter().sum();
    exp.into_iter().map(|e| e / sum).collect()
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn check_rows(rows: &[Vec<f64>], expected: usize, what: &str) -> Result<(), PredictorError> {
    if rows.len() != expected {
        return Err(PredictorError::Invalid(format!(
            "expected {} {} rows, found {}",
            expected,
            what,
            rows.len()
        )));
    }
    let width = rows.first().map_or(0, Vec::len);
    if rows.iter().any(|row| row.len() != width) {
        return Err(PredictorError::Invalid(format!("ragged {} rows", what)));
    }
    Ok(())
}

impl Model {
    /// Raw per-row scores: one row for binary linear models, one per class otherwise.
    fn scores(&self, x: &Features) -> Vec<f64> {
        match self {
            Model::LogisticRegression {
                coef, intercept, ..
            }
            | Model::LinearSvc {
                coef, intercept, ..
            } => coef
                .iter()
                .zip(intercept)
                .map(|(row, b)| dot(row, x) + b)
                .collect(),
            Model::MultinomialNb {
                class_log_prior,
                feature_log_prob,
                ..
            } => feature_log_prob
                .iter()
                .zip(class_log_prior)
                .map(|(row, prior)| dot(row, x) + prior)
                .collect(),
        }
    }

    fn validate(&self) -> Result<(), PredictorError> {
        let n_classes = self.classes().len();
        if n_classes < 2 {
            return Err(PredictorError::Invalid(format!(
                "need at least two classes, found {}",
                n_classes
            )));
        }
        match self {
            Model::LogisticRegression {
                coef, intercept, ..
            }
            | Model::LinearSvc {
                coef, intercept, ..
            } => {
                let rows = if n_classes == 2 { 1 } else { n_classes };
                check_rows(coef, rows, "coefficient")?;
                if intercept.len() != rows {
                    return Err(PredictorError::Invalid(format!(
                        "expected {} intercepts, found {}",
                        rows,
                        intercept.len()
                    )));
                }
            }
            Model::MultinomialNb {
                class_log_prior,
                feature_log_prob,
                ..
            } => {
                check_rows(feature_log_prob, n_classes, "feature log probability")?;
                if class_log_prior.len() != n_classes {
                    return Err(PredictorError::Invalid(format!(
                        "expected {} class priors, found {}",
                        n_classes,
                        class_log_prior.len()
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Classifier for Model {
    fn classes(&self) -> &[String] {
        match self {
            Model::LogisticRegression { classes, .. }
            | Model::MultinomialNb { classes, .. }
            | Model::LinearSvc { classes, .. } => classes,
        }
    }

    fn n_features(&self) -> usize {
        match self {
            Model::LogisticRegression { coef, .. } | Model::LinearSvc { coef, .. } => {
                coef.first().map_or(0, Vec::len)
            }
            Model::MultinomialNb {
                feature_log_prob, ..
            } => feature_log_prob.first().map_or(0, Vec::len),
        }
    }

    fn predict(&self, x: &Features) -> usize {
        let scores = self.scores(x);
        if scores.len() == 1 {
            (scores[0] > 0.0) as usize
        } else {
            argmax(&scores)
        }
    }

    fn predict_proba(&self, x: &Features) -> Option<Vec<f64>> {
        match self {
            Model::LinearSvc { .. } => None,
            Model::LogisticRegression { .. } | Model::MultinomialNb { .. } => {
                let scores = self.scores(x);
                if scores.len() == 1 {
                    let p = sigmoid(scores[0]);
                    Some(vec![1.0 - p, p])
                } else {
                    Some(softmax(&scores))
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    /// Probability of the positive class (index 1), when the model has probabilities.
    pub positive: Option<f64>,
}

pub struct Predictor {
    vectorizer: Box<dyn FeatureExtractor + Send + Sync>,
    model: Box<dyn Classifier + Send + Sync>,
}

fn read_artifact<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, PredictorError> {
    let data = std::fs::read(path).map_err(|source| PredictorError::Io {
        path: path.to_owned(),
        source,
    })?;
    serde_json::from_slice(&data).map_err(|source| PredictorError::Parse {
        path: path.to_owned(),
        source,
    })
}

impl Predictor {
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(
        model_path: P,
        vectorizer_path: Q,
    ) -> Result<Self, PredictorError> {
        let model: Model = read_artifact(model_path.as_ref())?;
        let vectorizer: Vectorizer = read_artifact(vectorizer_path.as_ref())?;
        model.validate()?;
        vectorizer.validate()?;
        Self::new(vectorizer, model)
    }

    pub fn new<V, M>(vectorizer: V, model: M) -> Result<Self, PredictorError>
    where
        V: FeatureExtractor + Send + Sync + 'static,
        M: Classifier + Send + Sync + 'static,
    {
        if vectorizer.n_features() != model.n_features() {
            return Err(PredictorError::Invalid(format!(
                "vectorizer has {} features but the model expects {}",
                vectorizer.n_features(),
                model.n_features()
            )));
        }
        Ok(Predictor {
            vectorizer: Box::new(vectorizer),
            model: Box::new(model),
        })
    }

    pub fn classes(&self) -> &[String] {
        self.model.classes()
    }

    pub fn predict(&self, text: &str) -> Prediction {
        let x = self.vectorizer.transform(&text.to_lowercase());
        let label = self.model.classes()[self.model.predict(&x)].clone();
        let positive = self
            .model
            .predict_proba(&x)
            .and_then(|proba| proba.get(1).copied());
        Prediction { label, positive }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VECTORIZER: &str = r#"{
        "kind": "tfidf",
        "vocabulary": {"great": 0, "boring": 1, "plot": 2},
        "idf": [1.5, 1.5, 1.0]
    }"#;

    const LOGISTIC: &str = r#"{
        "kind": "logistic_regression",
        "classes": ["negative", "positive"],
        "coef": [[3.0, -3.0, 0.0]],
        "intercept": [0.0]
    }"#;

    fn predictor(model: &str) -> Predictor {
        let model: Model = serde_json::from_str(model).unwrap();
        model.validate().unwrap();
        let vectorizer: Vectorizer = serde_json::from_str(VECTORIZER).unwrap();
        vectorizer.validate().unwrap();
        Predictor::new(vectorizer, model).unwrap()
    }

    #[test]
    fn tfidf_is_l2_normalised() {
        let vectorizer: Vectorizer = serde_json::from_str(VECTORIZER).unwrap();
        let x = vectorizer.transform("great great plot unknown");
        assert_eq!(x.len(), 2);
        let norm: f64 = x.iter().map(|(_, v)| v * v).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-9);
        assert_eq!(x[0].0, 0);
        assert!((x[0].1 / x[1].1 - 3.0).abs() < 1e-9);
    }

    #[test]
    fn count_vectorizer_binary() {
        let vectorizer: Vectorizer = serde_json::from_str(
            r#"{"kind": "count", "vocabulary": {"good": 0, "bad": 1}, "binary": true}"#,
        )
        .unwrap();
        assert_eq!(vectorizer.transform("good good bad"), vec![(0, 1.0), (1, 1.0)]);
    }

    #[test]
    fn logistic_regression_with_confidence() {
        let predictor = predictor(LOGISTIC);
        let prediction = predictor.predict("GREAT plot!");
        assert_eq!(prediction.label, "positive");
        let positive = prediction.positive.unwrap();
        assert!(positive > 0.5 && positive < 1.0);

        let prediction = predictor.predict("boring");
        assert_eq!(prediction.label, "negative");
        assert!(prediction.positive.unwrap() < 0.5);
    }

    #[test]
    fn prediction_is_deterministic() {
        let predictor = predictor(LOGISTIC);
        let text = "Great acting but a boring plot";
        assert_eq!(predictor.predict(text), predictor.predict(text));
    }

    #[test]
    fn empty_text_uses_bias_only() {
        let prediction = predictor(LOGISTIC).predict("");
        assert_eq!(prediction.label, "negative");
        assert_eq!(prediction.positive, Some(0.5));
    }

    #[test]
    fn svc_has_no_confidence() {
        let prediction = predictor(
            r#"{
                "kind": "linear_svc",
                "classes": ["neg", "pos"],
                "coef": [[1.0, -1.0, 0.0]],
                "intercept": [0.1]
            }"#,
        )
        .predict("great");
        assert_eq!(prediction.label, "pos");
        assert_eq!(prediction.positive, None);
    }

    #[test]
    fn naive_bayes_probabilities_sum_to_one() {
        let model: Model = serde_json::from_str(
            r#"{
                "kind": "multinomial_nb",
                "classes": ["negative", "neutral", "positive"],
                "class_log_prior": [-1.0986, -1.0986, -1.0986],
                "feature_log_prob": [[-3.0, -0.5, -1.0], [-1.5, -1.5, -1.0], [-0.5, -3.0, -1.0]]
            }"#,
        )
        .unwrap();
        model.validate().unwrap();
        let vectorizer: Vectorizer = serde_json::from_str(VECTORIZER).unwrap();
        let x = vectorizer.transform("boring plot");
        let proba = model.predict_proba(&x).unwrap();
        assert!((proba.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert_eq!(model.classes()[model.predict(&x)], "negative");
    }

    #[test]
    fn mismatched_dimensions_are_rejected() {
        let model: Model = serde_json::from_str(
            r#"{"kind": "linear_svc", "classes": ["a", "b"], "coef": [[1.0]], "intercept": [0.0]}"#,
        )
        .unwrap();
        let vectorizer: Vectorizer = serde_json::from_str(VECTORIZER).unwrap();
        assert!(matches!(
            Predictor::new(vectorizer, model),
            Err(PredictorError::Invalid(_))
        ));
    }

    #[test]
    fn malformed_shapes_are_rejected() {
        let model: Model = serde_json::from_str(
            r#"{"kind": "logistic_regression", "classes": ["a", "b", "c"], "coef": [[1.0]], "intercept": [0.0]}"#,
        )
        .unwrap();
        assert!(model.validate().is_err());
        let vectorizer: Vectorizer =
            serde_json::from_str(r#"{"kind": "tfidf", "vocabulary": {"x": 0}, "idf": []}"#)
                .unwrap();
        assert!(vectorizer.validate().is_err());
    }

    #[test]
    fn missing_artifact() {
        assert!(matches!(
            Predictor::load("/nonexistent/model.json", "/nonexistent/vectorizer.json"),
            Err(PredictorError::Io { .. })
        ));
    }
}
